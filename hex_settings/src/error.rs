//! Settings errors

use hex_core::EngineError;
use thiserror::Error;

/// Errors raised while editing, resolving or persisting settings
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Setting {key} expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Setting {key} out of range: {value}")]
    OutOfRange { key: String, value: i64 },

    #[error("Setting {key} has invalid value {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Engine rejected configuration: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to serialize settings: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize settings: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported settings version: {0}")]
    UnsupportedVersion(u32),
}

/// Settings result
pub type SettingsResult<T> = Result<T, SettingsError>;
