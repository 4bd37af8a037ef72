//! MIDI utilities and message types
//!
//! Status bytes, the Control Change messages NRPN writes are built from,
//! and hex formatting for logs and ASCII dumps.

use std::fmt;

/// System Exclusive start byte
pub const SYSTEM_EXCLUSIVE: u8 = 0xF0;

/// System Exclusive terminator
pub const END_OF_EXCLUSIVE: u8 = 0xF7;

/// Control Change status nibble
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Controller numbers used by NRPN sequences
pub mod cc {
    /// Data Entry (coarse)
    pub const DATA_ENTRY_MSB: u8 = 6;
    /// Data Entry (fine)
    pub const DATA_ENTRY_LSB: u8 = 38;
    /// Non-registered Parameter Number (fine)
    pub const NRPN_LSB: u8 = 98;
    /// Non-registered Parameter Number (coarse)
    pub const NRPN_MSB: u8 = 99;
}

/// Channel messages sent to the EWI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![CONTROL_CHANGE | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

/// Whether `byte` is a MIDI real-time status byte (0xF8-0xFF)
pub fn is_realtime(byte: u8) -> bool {
    byte >= 0xF8
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_control_change() {
        let msg = MidiMessage::ControlChange { channel: 2, cc: 7, value: 100 };
        assert_eq!(msg.encode(), vec![0xB2, 7, 100]);
        assert_eq!(msg.to_string(), "CC ch:3 cc:7 v:100");
    }

    #[test]
    fn test_encode_control_change_masks_data() {
        let msg = MidiMessage::ControlChange { channel: 0, cc: cc::NRPN_MSB, value: 0x81 };
        assert_eq!(msg.encode(), vec![0xB0, 99, 0x01]);
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xF0, 0x47, 0x0A, 0xF7]), "F0 47 0A F7");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_realtime_bytes() {
        assert!(is_realtime(0xF8));
        assert!(is_realtime(0xFE));
        assert!(!is_realtime(0xF7));
        assert!(!is_realtime(0x7F));
    }
}
