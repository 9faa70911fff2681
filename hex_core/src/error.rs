//! Engine error types

use crate::Address;
use thiserror::Error;

/// Errors reported by the editing engine
///
/// Every variant is recoverable: the memory is left exactly as it was before
/// the failing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed range, length or address
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation would touch addresses at or above the configured ceiling
    #[error("Out of bounds: address {address:#x} exceeds limit {limit:#x}")]
    OutOfBounds { address: Address, limit: Address },

    /// History exhausted (start reached)
    #[error("Nothing to undo")]
    NothingToUndo,

    /// History exhausted (end reached)
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Search miss
    #[error("Pattern not found")]
    NotFound,

    /// Long operation interrupted; state rolled back
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    /// Returns true for the "negative answer" kinds a front end uses to
    /// disable menus rather than report a failure.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            EngineError::NothingToUndo | EngineError::NothingToRedo | EngineError::NotFound
        )
    }
}

/// Engine result
pub type EngineResult<T> = Result<T, EngineError>;
