//! Byte-stream SysEx framer.
//!
//! Extracts complete SysEx frames from an arbitrary byte stream, either
//! incrementally ([`SysexFramer::push`], used by the live MIDI input) or
//! from any [`Read`] source with a scan budget ([`read_sysex`], used for
//! dump files).
//!
//! A `0xF0` always opens a new frame. An unterminated frame that is still
//! open at that point is dropped, which resynchronizes the framer after
//! truncated or garbled input. Bytes outside a frame are ignored.

use std::io::{BufReader, Read};

use tracing::debug;

use crate::error::{Error, Result};
use crate::midi::{is_realtime, END_OF_EXCLUSIVE, SYSTEM_EXCLUSIVE};
use crate::sysex::{SysexMessage, MANUFACTURER_ID_AKAI, MODEL_ID_EWI_USB};

/// Default number of bytes [`read_sysex`] scans before giving up.
pub const DEFAULT_MAX_SCAN: usize = 1024;

/// Manufacturer/model filter applied to completed frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysexFilter {
    /// Required one-byte manufacturer id, if any.
    pub manufacturer_id: Option<u8>,
    /// Required model id, if any.
    pub model_id: Option<u8>,
}

impl SysexFilter {
    /// Accept only Akai EWI USB frames.
    pub const EWI_USB: SysexFilter = SysexFilter {
        manufacturer_id: Some(MANUFACTURER_ID_AKAI),
        model_id: Some(MODEL_ID_EWI_USB),
    };

    /// Check `msg` against the filter.
    ///
    /// Returns [`Error::ForeignVendorFrame`] on mismatch.
    pub fn check(&self, msg: &SysexMessage) -> Result<()> {
        let manufacturer_ok = self
            .manufacturer_id
            .map_or(true, |id| msg.manufacturer_id().is(id));
        let model_ok = self.model_id.map_or(true, |id| msg.model_id() == id);

        if manufacturer_ok && model_ok {
            Ok(())
        } else {
            Err(Error::ForeignVendorFrame {
                manufacturer: msg.manufacturer_id().to_string(),
                model: msg.model_id(),
            })
        }
    }
}

/// Incremental SysEx framer.
#[derive(Debug, Default)]
pub struct SysexFramer {
    filter: Option<SysexFilter>,
    frame: Option<Vec<u8>>,
}

impl SysexFramer {
    /// Create a framer that keeps every well-formed frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a framer that keeps only frames passing `filter`.
    pub fn with_filter(filter: SysexFilter) -> Self {
        Self {
            filter: Some(filter),
            frame: None,
        }
    }

    /// Feed one byte. Returns a message when `byte` completes an accepted frame.
    pub fn push(&mut self, byte: u8) -> Option<SysexMessage> {
        if byte == SYSTEM_EXCLUSIVE {
            if let Some(partial) = self.frame.replace(vec![SYSTEM_EXCLUSIVE]) {
                debug!("Discarding unterminated SysEx fragment of {} bytes", partial.len());
            }
            return None;
        }

        let frame = self.frame.as_mut()?;

        // Real-time messages may be interleaved anywhere on the wire
        if is_realtime(byte) {
            return None;
        }

        frame.push(byte);
        if byte != END_OF_EXCLUSIVE {
            return None;
        }

        let data = self.frame.take()?;
        self.close(data)
    }

    /// Feed a run of bytes, returning every frame completed by it.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<SysexMessage> {
        data.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Returns `true` while a frame is open.
    pub fn has_partial(&self) -> bool {
        self.frame.is_some()
    }

    /// Drop the open frame, if any.
    pub fn reset(&mut self) {
        if let Some(partial) = self.frame.take() {
            debug!("Discarding SysEx fragment of {} bytes", partial.len());
        }
    }

    fn close(&self, data: Vec<u8>) -> Option<SysexMessage> {
        let msg = match SysexMessage::from_bytes(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Skipping SysEx frame: {}", e);
                return None;
            }
        };

        if let Some(filter) = &self.filter {
            if let Err(e) = filter.check(&msg) {
                debug!("Read unsupported SysEx message: {} ({})", msg, e);
                return None;
            }
        }

        Some(msg)
    }
}

/// Read SysEx frames from `reader`, scanning at most `max_size` bytes.
///
/// Frames completed within the budget are returned in stream order even if
/// the tail of the input is cut off.
///
/// # Example
///
/// ```
/// use ewi_usb_config::framer::{read_sysex, SysexFilter};
///
/// let data: &[u8] = &[0xF0, 0x47, 0x7F, 0x6D, 0x00, 0xF7, 0xF0, 0x43, 0x10, 0x4C, 0xF7];
/// let frames = read_sysex(data, Some(SysexFilter::EWI_USB), 1024).unwrap();
/// assert_eq!(frames.len(), 1);
/// ```
pub fn read_sysex<R: Read>(
    reader: R,
    filter: Option<SysexFilter>,
    max_size: usize,
) -> Result<Vec<SysexMessage>> {
    let mut framer = match filter {
        Some(filter) => SysexFramer::with_filter(filter),
        None => SysexFramer::new(),
    };
    let mut frames = Vec::new();
    let mut bytes_read = 0;

    for byte in BufReader::new(reader).bytes().take(max_size) {
        bytes_read += 1;
        if let Some(msg) = framer.push(byte?) {
            frames.push(msg);
        }
    }

    if bytes_read == max_size && framer.has_partial() {
        debug!("Scan limit of {} bytes reached inside a SysEx frame", max_size);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EWI_A: &[u8] = &[0xF0, 0x47, 0x7F, 0x6D, 0x00, 0x01, 0x02, 0xF7];
    const EWI_B: &[u8] = &[0xF0, 0x47, 0x00, 0x6D, 0x02, 0x40, 0xF7];
    const YAMAHA: &[u8] = &[0xF0, 0x43, 0x10, 0x4C, 0x00, 0xF7];
    const AKAI_OTHER_MODEL: &[u8] = &[0xF0, 0x47, 0x7F, 0x40, 0x00, 0xF7];

    fn concat(parts: &[&[u8]]) -> Vec<u8> {
        parts.iter().flat_map(|p| p.iter().copied()).collect()
    }

    #[test]
    fn filters_foreign_frames_in_order() {
        let stream = concat(&[YAMAHA, EWI_A, AKAI_OTHER_MODEL, EWI_B, YAMAHA]);
        let frames = read_sysex(&stream[..], Some(SysexFilter::EWI_USB), 1024).unwrap();

        let bytes: Vec<&[u8]> = frames.iter().map(|m| m.as_bytes()).collect();
        assert_eq!(bytes, vec![EWI_A, EWI_B]);
    }

    #[test]
    fn no_filter_keeps_everything() {
        let stream = concat(&[YAMAHA, EWI_A]);
        let frames = read_sysex(&stream[..], None, 1024).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn resynchronizes_after_unterminated_fragment() {
        let stream = concat(&[&[0xF0, 0x47, 0x7F, 0x6D, 0x00, 0x01], EWI_B]);
        let frames = read_sysex(&stream[..], Some(SysexFilter::EWI_USB), 1024).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), EWI_B);
    }

    #[test]
    fn keeps_frames_completed_within_budget() {
        let stream = concat(&[EWI_A, EWI_B]);
        let budget = EWI_A.len() + 3;
        let frames = read_sysex(&stream[..], None, budget).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), EWI_A);
    }

    #[test]
    fn zero_budget_reads_nothing() {
        let frames = read_sysex(EWI_A, None, 0).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn ignores_bytes_outside_frames() {
        let stream = concat(&[&[0xB0, 99, 1, 0xF7, 0x12], EWI_A, &[0x00, 0x7F]]);
        let frames = read_sysex(&stream[..], None, 1024).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn skips_interleaved_realtime_bytes() {
        let mut framer = SysexFramer::new();
        let frames = framer.push_slice(&[0xF0, 0x47, 0xF8, 0x7F, 0x6D, 0xFE, 0x00, 0xF7]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0xF0, 0x47, 0x7F, 0x6D, 0x00, 0xF7]);
    }

    #[test]
    fn drops_malformed_frames() {
        let mut framer = SysexFramer::new();
        assert!(framer.push_slice(&[0xF0, 0x47, 0xF7]).is_empty());
        assert!(framer.push_slice(&[0xF0, 0x47, 0x7F, 0x90, 0x01, 0xF7]).is_empty());
        assert!(!framer.has_partial());
        assert_eq!(framer.push_slice(EWI_A).len(), 1);
    }

    #[test]
    fn frames_split_across_pushes() {
        let mut framer = SysexFramer::with_filter(SysexFilter::EWI_USB);
        assert!(framer.push_slice(&EWI_A[..3]).is_empty());
        assert!(framer.has_partial());
        let frames = framer.push_slice(&EWI_A[3..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn reset_drops_open_frame() {
        let mut framer = SysexFramer::new();
        framer.push_slice(&EWI_A[..4]);
        framer.reset();
        assert!(!framer.has_partial());
        assert!(framer.push_slice(&EWI_A[4..]).is_empty());
    }

    #[test]
    fn filter_reports_foreign_vendor() {
        let msg = SysexMessage::from_bytes(YAMAHA).unwrap();
        match SysexFilter::EWI_USB.check(&msg) {
            Err(Error::ForeignVendorFrame { manufacturer, model }) => {
                assert_eq!(manufacturer, "43");
                assert_eq!(model, 0x4C);
            }
            other => panic!("expected ForeignVendorFrame, got {:?}", other),
        }
        assert!(SysexFilter::default().check(&msg).is_ok());
    }

    fn body() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..=0x7F, 0..40)
    }

    proptest! {
        #[test]
        fn interleaved_streams_keep_only_ewi_frames(
            frames in prop::collection::vec((any::<bool>(), body()), 0..12)
        ) {
            let mut stream = Vec::new();
            let mut expected = Vec::new();
            for (is_ewi, payload) in &frames {
                let mut frame = if *is_ewi {
                    vec![0xF0, 0x47, 0x7F, 0x6D]
                } else {
                    vec![0xF0, 0x41, 0x10, 0x42]
                };
                frame.extend(payload);
                frame.push(0xF7);
                if *is_ewi {
                    expected.push(frame.clone());
                }
                stream.extend(frame);
            }

            let got = read_sysex(&stream[..], Some(SysexFilter::EWI_USB), stream.len()).unwrap();
            let got: Vec<Vec<u8>> = got.into_iter().map(SysexMessage::into_bytes).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
