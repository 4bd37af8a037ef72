//! NRPN codec
//!
//! Encodes parameter writes as Control Change sequences
//! (NRPN MSB, NRPN LSB, Data Entry MSB, Data Entry LSB) and decodes
//! `name=value` setting tokens against the [parameter catalog](crate::catalog).

use std::fmt;
use std::num::IntErrorKind;

use tracing::warn;

use crate::catalog::{self, NrpnAddress, NrpnParameter};
use crate::error::{Error, Result};
use crate::midi::{cc, MidiMessage};

/// 14-bit NRPN quantity split into 7-bit halves.
///
/// An omitted half produces no Control Change message, which the EWI needs
/// for commands that only carry an MSB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrpnWord {
    /// 14-bit value: MSB = `v >> 7`, LSB = `v & 0x7F`
    Full(u16),
    /// Explicit MSB and LSB
    Pair(u8, u8),
    /// MSB only
    MsbOnly(u8),
    /// LSB only
    LsbOnly(u8),
}

impl NrpnWord {
    pub fn msb(&self) -> Option<u8> {
        match *self {
            NrpnWord::Full(v) => Some(((v >> 7) & 0x7F) as u8),
            NrpnWord::Pair(msb, _) | NrpnWord::MsbOnly(msb) => Some(msb),
            NrpnWord::LsbOnly(_) => None,
        }
    }

    pub fn lsb(&self) -> Option<u8> {
        match *self {
            NrpnWord::Full(v) => Some((v & 0x7F) as u8),
            NrpnWord::Pair(_, lsb) | NrpnWord::LsbOnly(lsb) => Some(lsb),
            NrpnWord::MsbOnly(_) => None,
        }
    }
}

impl From<u16> for NrpnWord {
    fn from(value: u16) -> Self {
        NrpnWord::Full(value)
    }
}

impl From<NrpnAddress> for NrpnWord {
    fn from(address: NrpnAddress) -> Self {
        NrpnWord::Pair(address.bank, address.index)
    }
}

/// Encode an NRPN write on `channel` (0-15).
///
/// Values are not range-checked here; internal commands use data outside
/// the user-facing table.
///
/// # Example
///
/// ```
/// use ewi_usb_config::catalog::NrpnAddress;
/// use ewi_usb_config::midi::MidiMessage;
/// use ewi_usb_config::nrpn::encode;
///
/// let msgs = encode(0, NrpnAddress::new(2, 2), 64u16);
/// assert_eq!(msgs.len(), 4);
/// assert_eq!(msgs[3], MidiMessage::ControlChange { channel: 0, cc: 38, value: 64 });
/// ```
pub fn encode(
    channel: u8,
    address: impl Into<NrpnWord>,
    value: impl Into<NrpnWord>,
) -> Vec<MidiMessage> {
    let address = address.into();
    let value = value.into();

    [
        (cc::NRPN_MSB, address.msb()),
        (cc::NRPN_LSB, address.lsb()),
        (cc::DATA_ENTRY_MSB, value.msb()),
        (cc::DATA_ENTRY_LSB, value.lsb()),
    ]
    .into_iter()
    .filter_map(|(cc, data)| {
        data.map(|value| MidiMessage::ControlChange {
            channel,
            cc,
            value: value & 0x7F,
        })
    })
    .collect()
}

/// A decoded setting: catalog parameter and 7-bit value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub parameter: &'static NrpnParameter,
    pub value: u8,
}

impl Setting {
    /// Control Change sequence writing this setting on `channel` (0-15).
    ///
    /// The EWI takes the value in Data Entry MSB; no LSB is sent.
    pub fn messages(&self, channel: u8) -> Vec<MidiMessage> {
        encode(channel, self.parameter.address, NrpnWord::MsbOnly(self.value))
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NRPN {} ({}) value={}",
            self.parameter.address, self.parameter.name, self.value
        )?;
        if let Some(label) = self.parameter.label_for(self.value) {
            write!(f, " ({})", label)?;
        }
        Ok(())
    }
}

/// Decode the value `text` for the setting `name`.
///
/// `text` is one of the parameter's labels or an integer; labels win, so
/// signed transposition offsets like `-12` resolve to their data value.
/// Accepted values are 1..=127; 0 is rejected at this boundary.
pub fn decode(name: &str, text: &str) -> Result<Setting> {
    let parameter =
        catalog::find(name).ok_or_else(|| Error::UnknownParameter(name.trim().to_string()))?;

    let text = text.trim();
    let value = match parameter.label_value(text) {
        Some(value) => i64::from(value),
        None => match text.parse::<i64>() {
            Ok(value) => value,
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow => i64::MAX,
                IntErrorKind::NegOverflow => i64::MIN,
                _ => {
                    return Err(Error::InvalidValue {
                        name: parameter.name.to_string(),
                        value: text.to_string(),
                    })
                }
            },
        },
    };

    if !(0 < value && value < 128) {
        return Err(Error::ValueOutOfRange {
            name: parameter.name.to_string(),
            value,
        });
    }

    let value = value as u8;
    if !parameter.in_documented_range(value) {
        warn!(
            "Value {} for '{}' is outside the documented range {:?}",
            value, parameter.name, parameter.range
        );
    }

    Ok(Setting { parameter, value })
}

/// Parse a `name=value` setting token.
pub fn parse_setting(token: &str) -> Result<Setting> {
    match token.split_once('=') {
        Some((name, value)) if !value.contains('=') => decode(name, value),
        _ => Err(Error::MalformedSetting(token.to_string())),
    }
}
