//! # Error Module
//!
//! Error types shared by every part of the tuning engine.
//!
//! Reaching the end of the representable note range while shifting a tuning is
//! *not* an error: those operations return `Ok(false)` and leave state untouched.

use thiserror::Error;

/// Result type for tuning engine operations.
pub type Result<T> = std::result::Result<T, TunerError>;

/// Errors raised by the tuning engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TunerError {
    /// An index or note supplied by the caller is out of range, or the
    /// operation is not valid in the tuner's current mode.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A note symbol or persisted record could not be parsed.
    #[error("Format error: {0}")]
    Format(String),

    /// A mandatory value was not provided at all.
    #[error("Missing value: {0}")]
    MissingValue(String),

    /// A background write to the key-value store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The engine thread is no longer accepting commands.
    #[error("Engine has stopped")]
    Stopped,
}

/// Failure reported by a [`KeyValueStore`](crate::store::KeyValueStore) write.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to write '{key}': {reason}")]
pub struct StoreError {
    pub key: String,
    pub reason: String,
}

impl TunerError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TunerError::Validation(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        TunerError::Format(msg.into())
    }
}
