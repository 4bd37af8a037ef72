//! Parameter catalog
//!
//! Static table of the NRPN parameters the EWI USB understands, with
//! documented value ranges, factory defaults and symbolic value labels.
//! Setting names are matched case-insensitively, with `-` and `_`
//! interchangeable.

use std::fmt;
use std::ops::RangeInclusive;

/// NRPN address: bank (NRPN MSB) and index (NRPN LSB), each 0-127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NrpnAddress {
    pub bank: u8,
    pub index: u8,
}

impl NrpnAddress {
    pub const fn new(bank: u8, index: u8) -> Self {
        Self { bank, index }
    }
}

impl fmt::Display for NrpnAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bank, self.index)
    }
}

/// Edit mode switch; the device only accepts dumps while it is on.
pub const EDIT_MODE: NrpnAddress = NrpnAddress::new(1, 4);

/// Data value entering edit mode
pub const EDIT_MODE_ENTER: u8 = 0x20;

/// Data value leaving edit mode
pub const EDIT_MODE_EXIT: u8 = 0x10;

/// Symbolic name for one value of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLabel {
    pub name: &'static str,
    pub value: u8,
}

const fn label(name: &'static str, value: u8) -> ValueLabel {
    ValueLabel { name, value }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrpnParameter {
    /// Canonical setting name (lower case, hyphenated)
    pub name: &'static str,
    /// Alternative setting names
    pub aliases: &'static [&'static str],
    pub address: NrpnAddress,
    /// Values the device documents for this parameter
    pub range: RangeInclusive<u8>,
    /// Factory default, if known
    pub default: Option<u8>,
    pub description: &'static str,
    pub labels: &'static [ValueLabel],
}

impl NrpnParameter {
    /// Returns `true` if `name` refers to this parameter.
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize(name);
        self.name == name || self.aliases.iter().any(|alias| *alias == name)
    }

    /// Value of the label `text` (case-insensitive), if defined.
    pub fn label_value(&self, text: &str) -> Option<u8> {
        let text = normalize(text);
        self.labels.iter().find(|l| l.name == text).map(|l| l.value)
    }

    /// Label of `value`, if defined.
    pub fn label_for(&self, value: u8) -> Option<&'static str> {
        self.labels.iter().find(|l| l.value == value).map(|l| l.name)
    }

    /// Whether `value` lies in the documented range.
    pub fn in_documented_range(&self, value: u8) -> bool {
        self.range.contains(&value)
    }
}

/// Canonical form of a setting name or label.
pub fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

const FINGERING_LABELS: &[ValueLabel] = &[
    label("ewi", 0),
    label("saxophone", 1),
    label("sax", 1),
    label("flute", 2),
    label("oboe", 3),
    label("evi-valve-1", 4),
    label("evi-valve-2", 5),
];

const BREATH_CC_LABELS: &[ValueLabel] = &[label("off", 0), label("aftertouch", 127)];

const BITE_CC_1_LABELS: &[ValueLabel] = &[
    label("off", 0),
    label("pitchbend-up", 124),
    label("pitchbend-down", 125),
    label("pitchbend-up-down", 126),
    label("pitchbend-down-up", 127),
];

const PB_UP_LABELS: &[ValueLabel] = &[label("off", 0), label("pitchbend-up", 127)];

const PB_DOWN_LABELS: &[ValueLabel] = &[label("off", 0), label("pitchbend-down", 127)];

const VELOCITY_LABELS: &[ValueLabel] = &[label("dynamic", 0)];

const MIDI_CHANNEL_LABELS: &[ValueLabel] = &[
    label("channel-1", 0),
    label("channel-2", 1),
    label("channel-3", 2),
    label("channel-4", 3),
    label("channel-5", 4),
    label("channel-6", 5),
    label("channel-7", 6),
    label("channel-8", 7),
    label("channel-9", 8),
    label("channel-10", 9),
    label("channel-11", 10),
    label("channel-12", 11),
    label("channel-13", 12),
    label("channel-14", 13),
    label("channel-15", 14),
    label("channel-16", 15),
];

// Semitone offsets; signed so they never shadow a plain data value
const TRANSPOSITION_LABELS: &[ValueLabel] = &[
    label("-12", 52),
    label("-11", 53),
    label("-10", 54),
    label("-9", 55),
    label("-8", 56),
    label("-7", 57),
    label("-6", 58),
    label("-5", 59),
    label("-4", 60),
    label("-3", 61),
    label("-2", 62),
    label("-1", 63),
    label("c", 64),
    label("+1", 65),
    label("+2", 66),
    label("+3", 67),
    label("+4", 68),
    label("+5", 69),
    label("+6", 70),
    label("+7", 71),
    label("+8", 72),
    label("+9", 73),
    label("+10", 74),
    label("+11", 75),
    label("+12", 76),
];

static PARAMETERS: &[NrpnParameter] = &[
    NrpnParameter {
        name: "breath-gain",
        aliases: &[],
        address: NrpnAddress::new(0, 0),
        range: 0..=127,
        default: Some(64),
        description: "Breath gain",
        labels: &[],
    },
    NrpnParameter {
        name: "bite-gain",
        aliases: &[],
        address: NrpnAddress::new(0, 1),
        range: 0..=127,
        default: Some(64),
        description: "Bite gain",
        labels: &[],
    },
    NrpnParameter {
        name: "bite-ac-gain",
        aliases: &[],
        address: NrpnAddress::new(0, 2),
        range: 0..=127,
        default: Some(64),
        description: "Bite AC gain",
        labels: &[],
    },
    NrpnParameter {
        name: "pb-gain",
        aliases: &["pitchbend-gain"],
        address: NrpnAddress::new(0, 3),
        range: 0..=127,
        default: Some(64),
        description: "Pitch bend gain",
        labels: &[],
    },
    NrpnParameter {
        name: "key-delay",
        aliases: &[],
        address: NrpnAddress::new(0, 4),
        range: 0..=127,
        default: Some(7),
        description: "Key delay",
        labels: &[],
    },
    NrpnParameter {
        name: "unknown-1",
        aliases: &[],
        address: NrpnAddress::new(0, 5),
        range: 0..=127,
        default: None,
        description: "Unknown (bank 0)",
        labels: &[],
    },
    NrpnParameter {
        name: "midi-channel",
        aliases: &["channel"],
        address: NrpnAddress::new(2, 0),
        range: 0..=15,
        default: Some(0),
        description: "MIDI channel (0 = channel 1)",
        labels: MIDI_CHANNEL_LABELS,
    },
    NrpnParameter {
        name: "fingering",
        aliases: &[],
        address: NrpnAddress::new(2, 1),
        range: 0..=5,
        default: Some(0),
        description: "Fingering mode",
        labels: FINGERING_LABELS,
    },
    NrpnParameter {
        name: "transposition",
        aliases: &["transpose"],
        address: NrpnAddress::new(2, 2),
        range: 52..=76,
        default: Some(64),
        description: "Transpose (64 = C, +/- 12 semitones)",
        labels: TRANSPOSITION_LABELS,
    },
    NrpnParameter {
        name: "velocity",
        aliases: &[],
        address: NrpnAddress::new(2, 3),
        range: 0..=127,
        default: Some(120),
        description: "Velocity (0 = dynamic)",
        labels: VELOCITY_LABELS,
    },
    NrpnParameter {
        name: "breath-cc-1",
        aliases: &[],
        address: NrpnAddress::new(2, 4),
        range: 0..=127,
        default: Some(2),
        description: "Breath CC 1 (default CC #2 breath)",
        labels: BREATH_CC_LABELS,
    },
    NrpnParameter {
        name: "breath-cc-2",
        aliases: &[],
        address: NrpnAddress::new(2, 5),
        range: 0..=127,
        default: Some(127),
        description: "Breath CC 2 (default aftertouch)",
        labels: BREATH_CC_LABELS,
    },
    NrpnParameter {
        name: "unknown-2",
        aliases: &[],
        address: NrpnAddress::new(2, 6),
        range: 0..=127,
        default: None,
        description: "Unknown (bank 2)",
        labels: &[],
    },
    NrpnParameter {
        name: "bite-cc-1",
        aliases: &[],
        address: NrpnAddress::new(2, 7),
        range: 0..=127,
        default: Some(127),
        description: "Bite CC 1 (default pitchbend down-up)",
        labels: BITE_CC_1_LABELS,
    },
    NrpnParameter {
        name: "bite-cc-2",
        aliases: &[],
        address: NrpnAddress::new(2, 8),
        range: 0..=127,
        default: Some(0),
        description: "Bite CC 2 (default off)",
        labels: BREATH_CC_LABELS,
    },
    NrpnParameter {
        name: "pb-up-cc",
        aliases: &[],
        address: NrpnAddress::new(2, 9),
        range: 0..=127,
        default: Some(127),
        description: "Pitchbend up CC (default pitchbend up)",
        labels: PB_UP_LABELS,
    },
    NrpnParameter {
        name: "pb-down-cc",
        aliases: &[],
        address: NrpnAddress::new(2, 10),
        range: 0..=127,
        default: Some(127),
        description: "Pitchbend down CC (default pitchbend down)",
        labels: PB_DOWN_LABELS,
    },
];

/// All catalog entries, in address order.
pub fn parameters() -> &'static [NrpnParameter] {
    PARAMETERS
}

/// Look up a parameter by name or alias.
pub fn find(name: &str) -> Option<&'static NrpnParameter> {
    PARAMETERS.iter().find(|p| p.matches(name))
}

/// Canonical names of all parameters.
pub fn names() -> impl Iterator<Item = &'static str> {
    PARAMETERS.iter().map(|p| p.name)
}

/// Factory default profile: every parameter with a known default.
pub fn factory_defaults() -> impl Iterator<Item = (&'static NrpnParameter, u8)> {
    PARAMETERS
        .iter()
        .filter_map(|p| p.default.map(|value| (p, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lookup_is_case_and_separator_insensitive() {
        let p = find("BREATH_CC_1").unwrap();
        assert_eq!(p.address, NrpnAddress::new(2, 4));
        assert_eq!(find("breath-cc-1"), Some(p));
        assert_eq!(find(" Breath_Cc-1 "), Some(p));
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(find("transpose").unwrap().name, "transposition");
        assert_eq!(find("Channel").unwrap().address, NrpnAddress::new(2, 0));
        assert!(find("volume").is_none());
    }

    #[test]
    fn addresses_and_names_are_unique() {
        let addresses: HashSet<_> = parameters().iter().map(|p| p.address).collect();
        let names: HashSet<_> = names().collect();
        assert_eq!(addresses.len(), parameters().len());
        assert_eq!(names.len(), parameters().len());
        assert!(parameters().iter().all(|p| p.address != EDIT_MODE));
    }

    #[test]
    fn defaults_lie_in_documented_range() {
        for (p, value) in factory_defaults() {
            assert!(p.in_documented_range(value), "{} default {}", p.name, value);
        }
        assert_eq!(factory_defaults().count(), 15);
    }

    #[test]
    fn labels() {
        let fingering = find("fingering").unwrap();
        assert_eq!(fingering.label_value("SAX"), Some(1));
        assert_eq!(fingering.label_value("evi_valve_2"), Some(5));
        assert_eq!(fingering.label_value("clarinet"), None);
        assert_eq!(fingering.label_for(3), Some("oboe"));

        let bite = find("bite-cc-1").unwrap();
        assert_eq!(bite.label_value("pitchbend-down-up"), Some(127));
        assert_eq!(bite.label_for(127), Some("pitchbend-down-up"));
    }

    #[test]
    fn transposition_and_channel_labels() {
        let transposition = find("transpose").unwrap();
        assert_eq!(transposition.label_value("-12"), Some(52));
        assert_eq!(transposition.label_value("C"), Some(64));
        assert_eq!(transposition.label_value("+12"), Some(76));
        assert_eq!(transposition.label_value("12"), None);
        assert_eq!(transposition.labels.len(), 25);
        assert!(transposition.labels.iter().all(|l| transposition.in_documented_range(l.value)));

        let channel = find("midi-channel").unwrap();
        assert_eq!(channel.label_value("Channel_16"), Some(15));
        assert_eq!(channel.label_for(1), Some("channel-2"));
    }

    #[test]
    fn address_display() {
        assert_eq!(NrpnAddress::new(2, 10).to_string(), "2/10");
        assert_eq!(EDIT_MODE.to_string(), "1/4");
    }
}
