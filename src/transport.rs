//! MIDI byte channels
//!
//! The device session talks to the EWI through the [`MidiSink`] and
//! [`MidiSource`] traits. [`MidirOutput`] and [`MidirInput`] implement them
//! on top of `midir`; ports are picked by index or by case-insensitive
//! substring of their name.

use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::midi::format_hex;

/// Client name announced to the MIDI system
pub const CLIENT_NAME: &str = "ewi-usb-config";

/// Callback receiving raw bytes of each incoming MIDI message
pub type InputCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Outgoing MIDI byte channel
pub trait MidiSink {
    /// Send one complete MIDI message.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Release the channel. Further sends fail with [`Error::NotConnected`].
    fn close(&mut self);
}

/// Incoming MIDI byte channel
pub trait MidiSource {
    /// Stop filtering System Exclusive messages.
    ///
    /// Some transports drop SysEx unless asked; call before [`attach`](Self::attach).
    fn enable_sysex(&mut self);

    /// Start delivering incoming messages to `callback`.
    ///
    /// The callback runs on a transport-owned thread.
    fn attach(&mut self, callback: InputCallback) -> Result<()>;

    /// Release the channel.
    fn close(&mut self);
}

/// Find a port by index or by case-insensitive name substring
fn find_port<IO: MidiIO>(io: &IO, pattern: &str) -> Option<(IO::Port, String)> {
    let ports = io.ports();

    // Check if pattern is a numeric index
    if let Ok(index) = pattern.trim().parse::<usize>() {
        let port = ports.into_iter().nth(index)?;
        let name = io.port_name(&port).ok()?;
        return Some((port, name));
    }

    let pattern = pattern.to_lowercase();
    for port in ports {
        if let Ok(name) = io.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// `midir` output connection
pub struct MidirOutput {
    conn: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidirOutput {
    /// Open the output port matching `pattern`.
    pub fn open(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| Error::PortUnavailable(format!("failed to create MIDI output: {}", e)))?;

        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, port_name) = find_port(&midi_out, pattern)
            .ok_or_else(|| Error::PortUnavailable(format!("output port '{}' not found", pattern)))?;

        info!("Opening MIDI output port: {}", port_name);

        let conn = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| Error::PortUnavailable(format!("{}: {}", port_name, e)))?;

        Ok(Self {
            conn: Some(conn),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSink for MidirOutput {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.send(data)
            .map_err(|e| Error::Transport(format!("{}: {}", format_hex(data), e)))
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            debug!("Closed MIDI output port: {}", self.port_name);
        }
    }
}

/// `midir` input port, connected once a callback is attached
pub struct MidirInput {
    input: Option<MidiInput>,
    port: midir::MidiInputPort,
    conn: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidirInput {
    /// Find the input port matching `pattern`.
    pub fn open(pattern: &str) -> Result<Self> {
        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| Error::PortUnavailable(format!("failed to create MIDI input: {}", e)))?;

        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (port, port_name) = find_port(&midi_in, pattern)
            .ok_or_else(|| Error::PortUnavailable(format!("input port '{}' not found", pattern)))?;

        info!("Opening MIDI input port: {}", port_name);

        Ok(Self {
            input: Some(midi_in),
            port,
            conn: None,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSource for MidirInput {
    fn enable_sysex(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.ignore(Ignore::None);
        }
    }

    fn attach(&mut self, mut callback: InputCallback) -> Result<()> {
        let input = self.input.take().ok_or(Error::NotConnected)?;

        let conn = input
            .connect(
                &self.port,
                CLIENT_NAME,
                move |_timestamp, data, _| callback(data),
                (),
            )
            .map_err(|e| Error::PortUnavailable(format!("{}: {}", self.port_name, e)))?;

        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) {
        self.input = None;
        if let Some(conn) = self.conn.take() {
            conn.close();
            debug!("Closed MIDI input port: {}", self.port_name);
        }
    }
}
