//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::Address;

/// Default exclusive address ceiling: a 32-bit address space
pub const DEFAULT_ADDRESS_LIMIT: Address = 1 << 32;

/// Default number of undoable edits kept
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Which neighbors a flood run may absorb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodMode {
    /// Only bytes equal to the seed value (or only gap, for an unset seed)
    #[default]
    EqualValue,
    /// Bytes equal to the seed value and any gaps in between
    EqualOrUnset,
}

impl FloodMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloodMode::EqualValue => "equal_value",
            FloodMode::EqualOrUnset => "equal_or_unset",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "equal_value" => Some(FloodMode::EqualValue),
            "equal_or_unset" => Some(FloodMode::EqualOrUnset),
            _ => None,
        }
    }
}

/// Configuration surface consumed by [`EditSession`](crate::EditSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo steps kept; older ones are discarded
    pub max_history: usize,
    /// Exclusive ceiling of the address space
    pub address_limit: Address,
    pub flood_mode: FloodMode,
    pub search_wrap: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            address_limit: DEFAULT_ADDRESS_LIMIT,
            flood_mode: FloodMode::EqualValue,
            search_wrap: true,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_address_limit(mut self, address_limit: Address) -> Self {
        self.address_limit = address_limit;
        self
    }

    pub fn with_flood_mode(mut self, flood_mode: FloodMode) -> Self {
        self.flood_mode = flood_mode;
        self
    }

    pub fn with_search_wrap(mut self, search_wrap: bool) -> Self {
        self.search_wrap = search_wrap;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.address_limit == 0 {
            return Err(EngineError::invalid("address limit must be positive"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
