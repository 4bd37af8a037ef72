//! SysEx message model.
//!
//! A [`SysexMessage`] is one validated System Exclusive frame. It is built
//! once from raw bytes and never mutated; the id accessors read straight
//! from the stored bytes.
//!
//! # Frame format
//!
//! ```text
//! F0 <manufacturer> <device> <model> <payload>... F7
//! F0 00 <m1> <m2> <x> <model> <device> <payload>... F7   (extended manufacturer id)
//! ```
//!
//! For the EWI USB the manufacturer is `47` (Akai) and the model `6D`. A
//! dump request carries message id `0x40 + bank` as first payload byte.

use std::fmt;

use crate::error::{Error, Result};
use crate::midi::{format_hex, END_OF_EXCLUSIVE, SYSTEM_EXCLUSIVE};

/// Akai Professional manufacturer id.
pub const MANUFACTURER_ID_AKAI: u8 = 0x47;

/// EWI USB model id.
pub const MODEL_ID_EWI_USB: u8 = 0x6D;

/// Base message id of a dump request; the bank number is added to it.
pub const MSG_ID_DUMP_REQUEST: u8 = 0x40;

/// Device id addressing any device on the port.
pub const DEVICE_ID_ANY: u8 = 0x7F;

/// Shortest legal frame: start, manufacturer, device, model, end.
const MIN_FRAME_LEN: usize = 5;

/// Shortest legal frame using a three-byte manufacturer id.
const MIN_EXTENDED_FRAME_LEN: usize = 8;

/// Manufacturer id of a SysEx frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManufacturerId {
    /// One-byte id (0x01-0x7F).
    Short(u8),
    /// Three-byte id, introduced by a 0x00 byte.
    Extended([u8; 3]),
}

impl ManufacturerId {
    /// Returns `true` if this is the one-byte id `id`.
    pub fn is(&self, id: u8) -> bool {
        *self == ManufacturerId::Short(id)
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManufacturerId::Short(id) => write!(f, "{:02X}", id),
            ManufacturerId::Extended(id) => f.write_str(&format_hex(id)),
        }
    }
}

/// A validated System Exclusive frame.
///
/// Equality and hashing use the raw bytes only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SysexMessage {
    data: Vec<u8>,
}

impl SysexMessage {
    /// Validate `data` as a complete SysEx frame.
    ///
    /// # Example
    ///
    /// ```
    /// use ewi_usb_config::sysex::{ManufacturerId, SysexMessage};
    ///
    /// let msg = SysexMessage::from_bytes(vec![0xF0, 0x47, 0x7F, 0x6D, 0x40, 0x00, 0x00, 0xF7]).unwrap();
    /// assert_eq!(msg.manufacturer_id(), ManufacturerId::Short(0x47));
    /// assert_eq!(msg.model_id(), 0x6D);
    /// assert_eq!(msg.message_id(), Some(0x40));
    /// ```
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        Self::validate(&data)?;
        Ok(Self { data })
    }

    fn validate(data: &[u8]) -> Result<()> {
        let malformed = |reason: &'static str| -> Result<()> { Err(Error::MalformedFrame { reason }) };

        if data.first() != Some(&SYSTEM_EXCLUSIVE) {
            return malformed("message does not start with 0xF0");
        }
        if data.last() != Some(&END_OF_EXCLUSIVE) {
            return malformed("message does not end with 0xF7");
        }
        if data.len() < MIN_FRAME_LEN {
            return malformed("message too short");
        }
        if data[1..data.len() - 1].iter().any(|&b| b > 0x7F) {
            return malformed("data byte above 0x7F");
        }
        if data[1] == 0 && data.len() < MIN_EXTENDED_FRAME_LEN {
            return malformed("extended manufacturer header too short");
        }
        Ok(())
    }

    /// Build a dump request for `bank` addressed to `device_id`.
    ///
    /// ```
    /// use ewi_usb_config::sysex::SysexMessage;
    ///
    /// let req = SysexMessage::dump_request(0x7F, 2);
    /// assert_eq!(req.as_bytes(), &[0xF0, 0x47, 0x7F, 0x6D, 0x42, 0x00, 0x00, 0xF7]);
    /// ```
    pub fn dump_request(device_id: u8, bank: u8) -> Self {
        Self {
            data: vec![
                SYSTEM_EXCLUSIVE,
                MANUFACTURER_ID_AKAI,
                device_id & 0x7F,
                MODEL_ID_EWI_USB,
                MSG_ID_DUMP_REQUEST + (bank & 0x3F),
                0,
                0,
                END_OF_EXCLUSIVE,
            ],
        }
    }

    fn is_extended(&self) -> bool {
        self.data[1] == 0
    }

    /// Manufacturer id, one or three bytes.
    pub fn manufacturer_id(&self) -> ManufacturerId {
        if self.is_extended() {
            ManufacturerId::Extended([self.data[1], self.data[2], self.data[3]])
        } else {
            ManufacturerId::Short(self.data[1])
        }
    }

    /// Model id.
    pub fn model_id(&self) -> u8 {
        if self.is_extended() {
            self.data[5]
        } else {
            self.data[3]
        }
    }

    /// Device id (0x7F addresses any device).
    pub fn device_id(&self) -> u8 {
        if self.is_extended() {
            self.data[6]
        } else {
            self.data[2]
        }
    }

    /// Bytes after the id header, up to but excluding the terminator.
    pub fn payload(&self) -> &[u8] {
        let start = if self.is_extended() { 7 } else { 4 };
        &self.data[start..self.data.len() - 1]
    }

    /// First payload byte, if any.
    pub fn message_id(&self) -> Option<u8> {
        self.payload().first().copied()
    }

    /// Returns `true` if the frame comes from an Akai EWI USB.
    pub fn is_ewi_usb(&self) -> bool {
        self.manufacturer_id().is(MANUFACTURER_ID_AKAI) && self.model_id() == MODEL_ID_EWI_USB
    }

    /// The complete frame, including start and end bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the message, returning the complete frame.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`: a valid frame has at least five bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for SysexMessage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl TryFrom<Vec<u8>> for SysexMessage {
    type Error = Error;

    fn try_from(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl TryFrom<&[u8]> for SysexMessage {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl fmt::Display for SysexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hex(&self.data))
    }
}

impl fmt::Debug for SysexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SysexMessage({})", format_hex(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reason(data: &[u8]) -> &'static str {
        match SysexMessage::from_bytes(data) {
            Err(Error::MalformedFrame { reason }) => reason,
            other => panic!("expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn short_form_ids() {
        let msg = SysexMessage::from_bytes(vec![0xF0, 0x47, 0x05, 0x6D, 0x00, 0x11, 0xF7]).unwrap();
        assert_eq!(msg.manufacturer_id(), ManufacturerId::Short(0x47));
        assert_eq!(msg.device_id(), 0x05);
        assert_eq!(msg.model_id(), 0x6D);
        assert_eq!(msg.payload(), &[0x00, 0x11]);
        assert!(msg.is_ewi_usb());
    }

    #[test]
    fn extended_form_ids() {
        let msg = SysexMessage::from_bytes(vec![
            0xF0, 0x00, 0x20, 0x29, 0x02, 0x18, 0x01, 0x0E, 0xF7,
        ])
        .unwrap();
        assert_eq!(msg.manufacturer_id(), ManufacturerId::Extended([0x00, 0x20, 0x29]));
        assert_eq!(msg.manufacturer_id().to_string(), "00 20 29");
        assert_eq!(msg.model_id(), 0x18);
        assert_eq!(msg.device_id(), 0x01);
        assert_eq!(msg.payload(), &[0x0E]);
        assert!(!msg.is_ewi_usb());
    }

    #[test]
    fn minimum_frame_has_empty_payload() {
        let msg = SysexMessage::from_bytes(vec![0xF0, 0x47, 0x7F, 0x6D, 0xF7]).unwrap();
        assert!(msg.payload().is_empty());
        assert_eq!(msg.message_id(), None);
        assert_eq!(msg.len(), 5);
    }

    #[test]
    fn rejects_structural_violations() {
        assert_eq!(reason(&[]), "message does not start with 0xF0");
        assert_eq!(reason(&[0x47, 0x7F, 0x6D, 0x00, 0xF7]), "message does not start with 0xF0");
        assert_eq!(reason(&[0xF0, 0x47, 0x7F, 0x6D, 0x00]), "message does not end with 0xF7");
        assert_eq!(reason(&[0xF0, 0x47, 0xF7]), "message too short");
        assert_eq!(reason(&[0xF0, 0x47, 0x7F, 0x6D, 0x90, 0xF7]), "data byte above 0x7F");
        assert_eq!(reason(&[0xF0, 0x00, 0x20, 0x29, 0xF7]), "extended manufacturer header too short");
    }

    #[test]
    fn dump_request_masks_bank_and_device() {
        let req = SysexMessage::dump_request(0x85, 3);
        assert_eq!(req.as_bytes(), &[0xF0, 0x47, 0x05, 0x6D, 0x43, 0x00, 0x00, 0xF7]);
        assert_eq!(req.message_id(), Some(0x43));
        assert!(SysexMessage::from_bytes(req.as_bytes()).is_ok());
    }

    #[test]
    fn display_is_hex_line() {
        let msg = SysexMessage::dump_request(0x7F, 0);
        assert_eq!(msg.to_string(), "F0 47 7F 6D 40 00 00 F7");
    }

    #[test]
    fn equality_by_bytes() {
        use std::collections::HashSet;

        let a = SysexMessage::dump_request(0x7F, 1);
        let b = SysexMessage::try_from(a.as_bytes()).unwrap();
        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert_eq!(a, b);
    }

    fn valid_frame() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            (1u8..=0x7F, prop::collection::vec(0u8..=0x7F, 2..200)).prop_map(|(mfr, body)| {
                let mut frame = vec![0xF0, mfr];
                frame.extend(body);
                frame.push(0xF7);
                frame
            }),
            prop::collection::vec(0u8..=0x7F, 5..200).prop_map(|body| {
                let mut frame = vec![0xF0, 0x00];
                frame.extend(body);
                frame.push(0xF7);
                frame
            }),
        ]
    }

    proptest! {
        #[test]
        fn round_trip_identity(frame in valid_frame()) {
            let msg = SysexMessage::from_bytes(frame.clone()).unwrap();
            prop_assert_eq!(msg.as_bytes(), &frame[..]);
            prop_assert_eq!(msg.into_bytes(), frame);
        }
    }
}
