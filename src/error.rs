//! Error types for the EWI USB protocol layer.
//!
//! All fallible library operations return [`Result<T>`]. Frame-level and
//! setting-level errors are recoverable: callers log them and move on to the
//! next frame or setting. Port and transport errors end the operation.

/// The error type for all library operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A byte run violates the SysEx framing rules.
    #[error("malformed SysEx frame: {reason}")]
    MalformedFrame {
        /// Which rule was violated.
        reason: &'static str,
    },

    /// A well-formed SysEx frame from another manufacturer or model.
    #[error("SysEx frame from foreign vendor (manufacturer {manufacturer}, model {model:02X})")]
    ForeignVendorFrame {
        /// Manufacturer id of the frame, as hex.
        manufacturer: String,
        /// Model id of the frame.
        model: u8,
    },

    /// The setting name is not in the parameter catalog.
    #[error("setting '{0}' not supported")]
    UnknownParameter(String),

    /// The setting value is outside the accepted range.
    #[error("value {value} for setting '{name}' out of range (1..=127)")]
    ValueOutOfRange {
        /// Catalog name of the setting.
        name: String,
        /// The rejected value.
        value: i64,
    },

    /// The setting value is neither an integer nor a known label.
    #[error("value '{value}' for setting '{name}' must be an integer 1..127")]
    InvalidValue {
        /// Catalog name of the setting.
        name: String,
        /// The rejected text.
        value: String,
    },

    /// The setting token is not of the form `name=value`.
    #[error("mal-formed setting '{0}' (use: name=value)")]
    MalformedSetting(String),

    /// No dump arrived for a bank before the timeout elapsed.
    #[error("timeout waiting for dump of bank {bank}")]
    DumpTimeout {
        /// The requested bank.
        bank: u8,
    },

    /// The requested MIDI port could not be found or opened.
    #[error("MIDI port unavailable: {0}")]
    PortUnavailable(String),

    /// MIDI channel outside 1..=16.
    #[error("invalid MIDI channel {0} (must be 1-16)")]
    InvalidChannel(u8),

    /// The operation was interrupted.
    #[error("operation cancelled")]
    Cancelled,

    /// The output channel has already been released.
    #[error("not connected")]
    NotConnected,

    /// Sending or receiving on an open MIDI channel failed.
    #[error("MIDI transport error: {0}")]
    Transport(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error only affects one frame, setting or bank.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedFrame { .. }
                | Error::ForeignVendorFrame { .. }
                | Error::UnknownParameter(_)
                | Error::ValueOutOfRange { .. }
                | Error::InvalidValue { .. }
                | Error::MalformedSetting(_)
                | Error::DumpTimeout { .. }
        )
    }
}
