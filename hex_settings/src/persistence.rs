//! Settings persistence layer
//!
//! This module handles loading and saving settings overrides as JSON.
//! Loading is deterministic and safe against corruption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, SettingsResult};
use crate::{SettingKey, SettingValue, SettingsRegistry};

/// Serializable container for settings overrides
/// Uses BTreeMap for stable ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverridesData {
    /// Version of the settings format (for future migrations)
    pub version: u32,
    pub overrides: BTreeMap<String, SettingValue>,
}

impl SettingsOverridesData {
    /// Current version of the settings format
    pub const CURRENT_VERSION: u32 = 1;

    /// Creates a new empty settings data
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            overrides: BTreeMap::new(),
        }
    }

    /// Captures the overrides of a registry
    pub fn from_registry(registry: &SettingsRegistry) -> Self {
        let mut data = Self::new();
        for (key, value) in registry.export_overrides() {
            data.overrides.insert(key.as_str().to_string(), value);
        }
        data
    }

    /// Converts settings data to registry overrides
    pub fn to_overrides(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.overrides
            .iter()
            .map(|(key, value)| (SettingKey::new(key.as_str()), value.clone()))
            .collect()
    }

    /// Installs the overrides into `registry`, replacing its current ones
    pub fn apply_to(&self, registry: &mut SettingsRegistry) -> SettingsResult<()> {
        registry.import_overrides(self.to_overrides())
    }
}

impl Default for SettingsOverridesData {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes settings overrides to JSON bytes
pub fn serialize_overrides(data: &SettingsOverridesData) -> SettingsResult<Vec<u8>> {
    serde_json::to_vec_pretty(data).map_err(|e| SettingsError::SerializationFailed(e.to_string()))
}

/// Deserializes settings overrides from JSON bytes
pub fn deserialize_overrides(bytes: &[u8]) -> SettingsResult<SettingsOverridesData> {
    let data: SettingsOverridesData = serde_json::from_slice(bytes)
        .map_err(|e| SettingsError::DeserializationFailed(e.to_string()))?;

    if data.version != SettingsOverridesData::CURRENT_VERSION {
        return Err(SettingsError::UnsupportedVersion(data.version));
    }

    Ok(data)
}

/// Attempts to load settings from bytes, falling back to no overrides on error
pub fn load_overrides_safe(bytes: &[u8]) -> SettingsOverridesData {
    deserialize_overrides(bytes).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "settings_load_failed");
        SettingsOverridesData::new()
    })
}
