//! EWI USB configuration over MIDI
//!
//! Talks to the Akai EWI USB wind controller: single settings are written
//! as NRPN Control Change sequences, complete settings are read and
//! restored as SysEx dumps.
//!
//! Layers, bottom up:
//!
//! - [`midi`]: Control Change and SysEx messages on the wire
//! - [`sysex`] and [`framer`]: SysEx frame model and stream framing
//! - [`catalog`] and [`nrpn`]: parameter table and NRPN codec
//! - [`transport`]: MIDI byte channels (`midir` backed)
//! - [`session`]: the device protocol (edit mode, dumps, settings)
//! - [`dumpfile`]: dump persistence

pub mod catalog;
pub mod dumpfile;
pub mod error;
pub mod framer;
pub mod midi;
pub mod nrpn;
pub mod session;
pub mod sysex;
pub mod transport;

pub use error::{Error, Result};
pub use nrpn::Setting;
pub use session::{BankSet, CancelToken, DeviceSession, DumpResult, SessionConfig};
pub use sysex::SysexMessage;
