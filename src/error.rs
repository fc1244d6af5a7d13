//! Error types for the pattern engine.

use thiserror::Error;

/// Errors raised while building or loading configuration.
///
/// These are only produced at construction time. Steady-state event
/// processing never fails; it drops malformed input instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors returned when pushing into the capture channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Capture queue is full")]
    Full,

    #[error("Engine worker has stopped")]
    Disconnected,
}
