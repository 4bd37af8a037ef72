//! EWI USB device session
//!
//! A [`DeviceSession`] owns the MIDI channels of one opened device and runs
//! the configuration protocol over them:
//!
//! - single parameter writes as NRPN Control Change sequences,
//! - SysEx dump requests, answered asynchronously through the input
//!   callback and collected with a per-bank timeout,
//! - replay of previously captured dumps.
//!
//! Dump transfers are only accepted while the device is in edit mode.
//! [`DeviceSession::edit_mode`] returns a guard that leaves edit mode when
//! dropped, so the device is never left in edit mode on error or
//! cancellation.

mod queue;


pub use queue::DumpQueue;

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::catalog::{self, EDIT_MODE, EDIT_MODE_ENTER, EDIT_MODE_EXIT};
use crate::error::{Error, Result};
use crate::framer::{SysexFilter, SysexFramer};
use crate::midi::{format_hex, MidiMessage};
use crate::nrpn::{self, NrpnWord, Setting};
use crate::sysex::{SysexMessage, DEVICE_ID_ANY};
use crate::transport::{MidiSink, MidiSource};

/// Default time to wait for each dump bank
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive queue polling granularity
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default MIDI channel (1-based)
pub const DEFAULT_CHANNEL: u8 = 1;

/// Banks requested by a dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BankSet {
    /// Banks 0 and 2, which hold the user settings
    #[default]
    Settings,
    /// Banks 0-3; the purpose of banks 1 and 3 is unknown
    All,
}

impl BankSet {
    pub fn banks(&self) -> &'static [u8] {
        match self {
            BankSet::Settings => &[0, 2],
            BankSet::All => &[0, 1, 2, 3],
        }
    }
}

/// Shared flag interrupting a blocking dump wait
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SysEx device id (0x7F = any)
    pub device_id: u8,
    /// MIDI channel for NRPN writes (1-16)
    pub channel: u8,
    /// Time to wait for each dump bank
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: CancelToken,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: DEVICE_ID_ANY,
            channel: DEFAULT_CHANNEL,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            cancel: CancelToken::new(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.channel) {
            return Err(Error::InvalidChannel(self.channel));
        }
        Ok(())
    }
}

/// Outcome of a dump request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpResult {
    /// Received frames, in request order
    pub frames: Vec<SysexMessage>,
    /// Banks that did not answer in time
    pub timed_out: Vec<u8>,
}

impl DumpResult {
    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// Outcome of a batch of setting tokens
#[derive(Debug, Default)]
pub struct SettingsReport {
    pub applied: Vec<Setting>,
    /// Rejected tokens and why
    pub rejected: Vec<(String, Error)>,
}

/// An opened EWI USB
pub struct DeviceSession {
    output: Option<Box<dyn MidiSink>>,
    input: Option<Box<dyn MidiSource>>,
    config: SessionConfig,
    received: Arc<DumpQueue>,
}

impl DeviceSession {
    /// Bind the session to an output and an optional input channel.
    ///
    /// With an input, SysEx reception is enabled and EWI USB frames arriving
    /// on it are queued for [`request_dump`](Self::request_dump). On failure
    /// both channels are released.
    pub fn open(
        mut output: Box<dyn MidiSink>,
        input: Option<Box<dyn MidiSource>>,
        config: SessionConfig,
    ) -> Result<Self> {
        if let Err(e) = config.validate() {
            output.close();
            if let Some(mut input) = input {
                input.close();
            }
            return Err(e);
        }

        let mut session = Self {
            output: Some(output),
            input: None,
            config,
            received: Arc::new(DumpQueue::new()),
        };

        if let Some(mut input) = input {
            debug!("Enabling reception of SysEx messages");
            input.enable_sysex();

            debug!("Attaching MIDI input callback handler");
            let queue = session.received.clone();
            let mut framer = SysexFramer::with_filter(SysexFilter::EWI_USB);
            let attached = input.attach(Box::new(move |data: &[u8]| {
                for msg in framer.push_slice(data) {
                    debug!("Received SysEx message of {} bytes", msg.len());
                    queue.push(msg);
                }
            }));

            if let Err(e) = attached {
                input.close();
                return Err(e);
            }
            session.input = Some(input);
        }

        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_id(&self) -> u8 {
        self.config.device_id
    }

    /// MIDI channel, 1-16
    pub fn channel(&self) -> u8 {
        self.config.channel
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.config.cancel.clone()
    }

    /// Whether the output channel is still bound
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    /// Messages received but not yet taken by a dump request
    pub fn pending_dumps(&self) -> usize {
        self.received.len()
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let output = self.output.as_deref_mut().ok_or(Error::NotConnected)?;
        output.send(data)
    }

    fn send_messages(&mut self, messages: &[MidiMessage]) -> Result<()> {
        for message in messages {
            let data = message.encode();
            self.send_raw(&data)?;
            debug!("Sent: {} | {}", format_hex(&data), message);
        }
        Ok(())
    }

    /// Send one SysEx frame verbatim.
    pub fn send_sysex(&mut self, msg: &SysexMessage) -> Result<()> {
        self.send_raw(msg.as_bytes())?;
        debug!("Sent SysEx: {}", msg);
        Ok(())
    }

    /// Send an NRPN write. No edit mode is needed; the device applies it at once.
    pub fn set_parameter(
        &mut self,
        address: impl Into<NrpnWord>,
        value: impl Into<NrpnWord>,
    ) -> Result<()> {
        let messages = nrpn::encode(self.config.channel - 1, address, value);
        self.send_messages(&messages)
    }

    /// Send a decoded setting.
    pub fn set(&mut self, setting: &Setting) -> Result<()> {
        info!("Sending {}", setting);
        let messages = setting.messages(self.config.channel - 1);
        self.send_messages(&messages)
    }

    /// Decode and send each `name=value` token.
    ///
    /// Tokens that fail to decode are reported and skipped; a transport
    /// failure or cancellation stops the batch.
    pub fn apply_settings<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<SettingsReport> {
        let mut report = SettingsReport::default();

        for token in tokens {
            self.check_cancelled()?;

            let token = token.as_ref();
            let sent = nrpn::parse_setting(token).and_then(|setting| {
                self.set(&setting)?;
                Ok(setting)
            });

            match sent {
                Ok(setting) => report.applied.push(setting),
                Err(e) if e.is_recoverable() => {
                    error!("{}", e);
                    report.rejected.push((token.to_string(), e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Send the factory default of every catalog parameter.
    pub fn apply_defaults(&mut self) -> Result<usize> {
        let mut count = 0;
        for (parameter, value) in catalog::factory_defaults() {
            self.check_cancelled()?;
            info!("Resetting {} ({}) to {}", parameter.name, parameter.address, value);
            self.set_parameter(parameter.address, NrpnWord::MsbOnly(value))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn enter_edit_mode(&mut self) -> Result<()> {
        debug!("Entering edit mode");
        self.set_parameter(EDIT_MODE, NrpnWord::MsbOnly(EDIT_MODE_ENTER))
    }

    pub fn exit_edit_mode(&mut self) -> Result<()> {
        debug!("Leaving edit mode");
        self.set_parameter(EDIT_MODE, NrpnWord::MsbOnly(EDIT_MODE_EXIT))
    }

    /// Enter edit mode for the lifetime of the returned guard.
    pub fn edit_mode(&mut self) -> Result<EditMode<'_>> {
        self.enter_edit_mode()?;
        Ok(EditMode {
            session: self,
            active: true,
        })
    }

    /// Request a settings dump and collect the answers.
    ///
    /// Each bank gets its own timeout; banks that do not answer are listed
    /// in [`DumpResult::timed_out`] and the next bank is requested.
    /// If the cancel token fires while waiting, edit mode is left, the
    /// session is closed and [`Error::Cancelled`] is returned.
    pub fn request_dump(&mut self, banks: BankSet) -> Result<DumpResult> {
        let collected = {
            let mut edit = self.edit_mode()?;
            let collected = edit.collect_dumps(banks);

            // Keep the frames even if the device did not take the exit command
            if collected.is_ok() {
                if let Err(e) = edit.finish() {
                    warn!("Failed to leave edit mode: {}", e);
                }
            }
            collected
        };

        if let Err(Error::Cancelled) = collected {
            self.close();
        }
        collected
    }

    fn collect_dumps(&mut self, banks: BankSet) -> Result<DumpResult> {
        let mut result = DumpResult::default();

        info!("Requesting dumps. Waiting to receive...");
        for &bank in banks.banks() {
            let request = SysexMessage::dump_request(self.config.device_id, bank);
            self.send_sysex(&request)?;

            match self.wait_for_dump(bank)? {
                Some(msg) => {
                    info!("Received dump for bank {} ({} bytes)", bank, msg.len());
                    result.frames.push(msg);
                }
                None => {
                    error!("{}", Error::DumpTimeout { bank });
                    result.timed_out.push(bank);
                }
            }
        }

        Ok(result)
    }

    fn wait_for_dump(&self, bank: u8) -> Result<Option<SysexMessage>> {
        let start = Instant::now();

        loop {
            if let Some(msg) = self.received.pop() {
                return Ok(Some(msg));
            }
            if self.config.cancel.is_cancelled() {
                info!("Dump request cancelled while waiting for bank {}", bank);
                return Err(Error::Cancelled);
            }
            if start.elapsed() > self.config.timeout {
                return Ok(None);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Replay dump frames verbatim inside edit mode.
    ///
    /// A failing send stops the replay; edit mode is left either way. The
    /// cancel token is checked before each frame; on cancellation the
    /// session is closed and [`Error::Cancelled`] returned.
    pub fn send_dump(&mut self, frames: &[SysexMessage]) -> Result<()> {
        let sent = self.replay(frames);
        if let Err(Error::Cancelled) = sent {
            self.close();
        }
        sent
    }

    fn replay(&mut self, frames: &[SysexMessage]) -> Result<()> {
        let mut edit = self.edit_mode()?;

        for msg in frames {
            edit.check_cancelled()?;
            info!("Sending SysEx message with {} bytes.", msg.len());
            edit.send_sysex(msg)?;
        }

        edit.finish()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.config.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Release both channels. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.close();
        }
        if let Some(mut input) = self.input.take() {
            input.close();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Edit mode guard; leaves edit mode when dropped
pub struct EditMode<'a> {
    session: &'a mut DeviceSession,
    active: bool,
}

impl EditMode<'_> {
    /// Leave edit mode now, reporting failure.
    pub fn finish(mut self) -> Result<()> {
        self.active = false;
        self.session.exit_edit_mode()
    }
}

impl Deref for EditMode<'_> {
    type Target = DeviceSession;

    fn deref(&self) -> &DeviceSession {
        self.session
    }
}

impl DerefMut for EditMode<'_> {
    fn deref_mut(&mut self) -> &mut DeviceSession {
        self.session
    }
}

impl Drop for EditMode<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.session.exit_edit_mode() {
                warn!("Failed to leave edit mode: {}", e);
            }
        }
    }
}
