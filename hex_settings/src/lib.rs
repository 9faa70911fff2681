//! # Hex Settings
//!
//! A typed settings layer that resolves into a [`hex_core::EngineConfig`].
//!
//! ## Philosophy
//!
//! - **Typed settings**: All settings have explicit types, not stringly-typed
//! - **Layered**: Read-only defaults + user overrides
//! - **Checked**: Overrides must name a known key and match its type
//! - **Deterministic**: Settings are serializable and reproducible
//!
//! ## Example
//!
//! ```ignore
//! use hex_settings::{create_default_registry, keys, SettingValue};
//!
//! let mut registry = create_default_registry();
//! registry.set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(16))?;
//!
//! let config = registry.to_engine_config()?;
//! assert_eq!(config.address_limit, 1 << 16);
//! ```

pub mod error;
pub mod persistence;

use std::collections::BTreeMap;
use std::fmt;

use hex_core::{Address, EngineConfig, FloodMode, DEFAULT_MAX_HISTORY};
use serde::{Deserialize, Serialize};

pub use error::{SettingsError, SettingsResult};

/// Setting key (path-like identifier)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettingKey(String);

impl SettingKey {
    /// Creates a new setting key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if this key starts with the given prefix
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SettingKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Setting value (strongly typed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl SettingValue {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Integer(_) => "integer",
            SettingValue::String(_) => "string",
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            SettingValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    fn same_type(&self, other: &SettingValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Boolean(v) => write!(f, "{}", v),
            SettingValue::Integer(v) => write!(f, "{}", v),
            SettingValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// Settings registry
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    /// Default settings (read-only)
    defaults: BTreeMap<SettingKey, SettingValue>,
    /// User overrides
    overrides: BTreeMap<SettingKey, SettingValue>,
}

impl SettingsRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a default setting
    pub fn register_default(&mut self, key: impl Into<SettingKey>, value: SettingValue) {
        self.defaults.insert(key.into(), value);
    }

    /// Sets an override; the key must have a default of the same type
    pub fn set_override(
        &mut self,
        key: impl Into<SettingKey>,
        value: SettingValue,
    ) -> SettingsResult<()> {
        let key = key.into();
        if let Err(err) = self.check_override(&key, &value) {
            tracing::warn!(key = key.as_str(), value = %value, error = %err, "setting_rejected");
            return Err(err);
        }
        tracing::debug!(key = key.as_str(), value = %value, "setting_overridden");
        self.overrides.insert(key, value);
        Ok(())
    }

    /// Removes an override, returning true if there was one
    pub fn remove_override(&mut self, key: &SettingKey) -> bool {
        self.overrides.remove(key).is_some()
    }

    /// Gets the effective value (override or default)
    pub fn get(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.overrides.get(key).or_else(|| self.defaults.get(key))
    }

    pub fn get_default(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.defaults.get(key)
    }

    pub fn get_override(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.overrides.get(key)
    }

    /// Returns all default setting keys
    pub fn list_defaults(&self) -> Vec<SettingKey> {
        self.defaults.keys().cloned().collect()
    }

    /// Returns all overridden keys
    pub fn list_overrides(&self) -> Vec<SettingKey> {
        self.overrides.keys().cloned().collect()
    }

    /// Returns effective settings whose key starts with `prefix`
    pub fn list_with_prefix(&self, prefix: &str) -> Vec<(SettingKey, SettingValue)> {
        self.defaults
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Resets a setting to its default value
    pub fn reset_to_default(&mut self, key: &SettingKey) -> bool {
        self.remove_override(key)
    }

    /// Exports all overrides for persistence
    pub fn export_overrides(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.overrides.clone()
    }

    /// Replaces the overrides; nothing changes if any entry is rejected
    pub fn import_overrides(
        &mut self,
        overrides: BTreeMap<SettingKey, SettingValue>,
    ) -> SettingsResult<()> {
        for (key, value) in &overrides {
            if let Err(err) = self.check_override(key, value) {
                tracing::warn!(key = key.as_str(), error = %err, "overrides_rejected");
                return Err(err);
            }
        }
        self.overrides = overrides;
        Ok(())
    }

    /// Resolves the effective settings into an engine configuration
    ///
    /// The address limit is `2^memory.address_bits` unless
    /// `memory.address_limit` is overridden explicitly.
    pub fn to_engine_config(&self) -> SettingsResult<EngineConfig> {
        let max_history = self.integer(keys::HISTORY_MAX_ENTRIES)?;
        let max_history = usize::try_from(max_history).map_err(|_| SettingsError::OutOfRange {
            key: keys::HISTORY_MAX_ENTRIES.into(),
            value: max_history,
        })?;

        let bits = self.integer(keys::MEMORY_ADDRESS_BITS)?;
        if !(1..=64).contains(&bits) {
            return Err(SettingsError::OutOfRange {
                key: keys::MEMORY_ADDRESS_BITS.into(),
                value: bits,
            });
        }

        let address_limit = match self.get_override(&keys::MEMORY_ADDRESS_LIMIT.into()) {
            Some(_) => {
                let limit = self.integer(keys::MEMORY_ADDRESS_LIMIT)?;
                if limit <= 0 {
                    return Err(SettingsError::OutOfRange {
                        key: keys::MEMORY_ADDRESS_LIMIT.into(),
                        value: limit,
                    });
                }
                limit as Address
            }
            None => limit_for_bits(bits as u32),
        };

        let mode = self.string(keys::FLOOD_MODE)?;
        let flood_mode = FloodMode::parse(mode).ok_or_else(|| SettingsError::InvalidValue {
            key: keys::FLOOD_MODE.into(),
            value: mode.into(),
        })?;

        let config = EngineConfig::new()
            .with_max_history(max_history)
            .with_address_limit(address_limit)
            .with_flood_mode(flood_mode)
            .with_search_wrap(self.boolean(keys::SEARCH_WRAP)?);
        config.validate()?;

        tracing::debug!(
            max_history,
            address_limit,
            flood_mode = flood_mode.as_str(),
            search_wrap = config.search_wrap,
            "engine_config_resolved"
        );
        Ok(config)
    }

    fn check_override(&self, key: &SettingKey, value: &SettingValue) -> SettingsResult<()> {
        let default = self
            .defaults
            .get(key)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        if !default.same_type(value) {
            return Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: default.type_name(),
                found: value.type_name(),
            });
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> SettingsResult<&SettingValue> {
        self.get(&SettingKey::from(key))
            .ok_or_else(|| SettingsError::UnknownKey(key.into()))
    }

    fn mismatch(key: &str, expected: &'static str, found: &SettingValue) -> SettingsError {
        SettingsError::TypeMismatch {
            key: key.into(),
            expected,
            found: found.type_name(),
        }
    }

    fn integer(&self, key: &str) -> SettingsResult<i64> {
        let value = self.lookup(key)?;
        value
            .as_integer()
            .ok_or_else(|| Self::mismatch(key, "integer", value))
    }

    fn boolean(&self, key: &str) -> SettingsResult<bool> {
        let value = self.lookup(key)?;
        value
            .as_boolean()
            .ok_or_else(|| Self::mismatch(key, "boolean", value))
    }

    fn string(&self, key: &str) -> SettingsResult<&str> {
        let value = self.lookup(key)?;
        value
            .as_string()
            .ok_or_else(|| Self::mismatch(key, "string", value))
    }
}

/// Exclusive ceiling of a `bits`-wide address space
fn limit_for_bits(bits: u32) -> Address {
    if bits >= 64 {
        Address::MAX
    } else {
        1 << bits
    }
}

/// Engine setting keys
pub mod keys {
    pub const HISTORY_MAX_ENTRIES: &str = "history.max_entries";
    pub const MEMORY_ADDRESS_BITS: &str = "memory.address_bits";
    pub const MEMORY_ADDRESS_LIMIT: &str = "memory.address_limit";
    pub const FLOOD_MODE: &str = "flood.mode";
    pub const SEARCH_WRAP: &str = "search.wrap";
}

/// Creates a settings registry with default settings
pub fn create_default_registry() -> SettingsRegistry {
    let mut registry = SettingsRegistry::new();

    // History
    registry.register_default(
        keys::HISTORY_MAX_ENTRIES,
        SettingValue::Integer(DEFAULT_MAX_HISTORY as i64),
    );

    // Address space
    registry.register_default(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(32));
    registry.register_default(keys::MEMORY_ADDRESS_LIMIT, SettingValue::Integer(1 << 32));

    // Matching
    registry.register_default(
        keys::FLOOD_MODE,
        SettingValue::String(FloodMode::default().as_str().to_string()),
    );
    registry.register_default(keys::SEARCH_WRAP, SettingValue::Boolean(true));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_core::DEFAULT_ADDRESS_LIMIT;

    #[test]
    fn test_setting_key_starts_with() {
        let key = SettingKey::new("memory.address_bits");
        assert!(key.starts_with("memory"));
        assert!(!key.starts_with("flood"));
        assert_eq!(key.to_string(), "memory.address_bits");
    }

    #[test]
    fn test_setting_value_accessors() {
        let val = SettingValue::Integer(42);
        assert_eq!(val.as_integer(), Some(42));
        assert_eq!(val.as_boolean(), None);
        assert_eq!(val.type_name(), "integer");
        assert_eq!(SettingValue::String("x".into()).as_string(), Some("x"));
    }

    #[test]
    fn test_defaults_resolve_to_engine_defaults() {
        let registry = create_default_registry();
        let config = registry.to_engine_config().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.address_limit, DEFAULT_ADDRESS_LIMIT);
    }

    #[test]
    fn test_override_precedence_and_reset() {
        let mut registry = create_default_registry();
        let key = SettingKey::from(keys::SEARCH_WRAP);
        registry
            .set_override(keys::SEARCH_WRAP, SettingValue::Boolean(false))
            .unwrap();
        assert_eq!(registry.get(&key), Some(&SettingValue::Boolean(false)));
        assert_eq!(registry.get_default(&key), Some(&SettingValue::Boolean(true)));

        assert!(registry.reset_to_default(&key));
        assert_eq!(registry.get(&key), Some(&SettingValue::Boolean(true)));
        assert!(!registry.reset_to_default(&key));
    }

    #[test]
    fn test_override_rejects_unknown_and_mistyped() {
        let mut registry = create_default_registry();
        assert_eq!(
            registry.set_override("editor.tab_size", SettingValue::Integer(4)),
            Err(SettingsError::UnknownKey("editor.tab_size".into()))
        );
        assert_eq!(
            registry.set_override(keys::SEARCH_WRAP, SettingValue::Integer(1)),
            Err(SettingsError::TypeMismatch {
                key: keys::SEARCH_WRAP.into(),
                expected: "boolean",
                found: "integer",
            })
        );
        assert!(registry.list_overrides().is_empty());
    }

    #[test]
    fn test_address_bits_derive_limit() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(16))
            .unwrap();
        assert_eq!(registry.to_engine_config().unwrap().address_limit, 1 << 16);

        registry
            .set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(64))
            .unwrap();
        assert_eq!(
            registry.to_engine_config().unwrap().address_limit,
            Address::MAX
        );
    }

    #[test]
    fn test_explicit_limit_wins_over_bits() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(8))
            .unwrap();
        registry
            .set_override(keys::MEMORY_ADDRESS_LIMIT, SettingValue::Integer(1000))
            .unwrap();
        assert_eq!(registry.to_engine_config().unwrap().address_limit, 1000);
    }

    #[test]
    fn test_out_of_range_values() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(65))
            .unwrap();
        assert!(matches!(
            registry.to_engine_config(),
            Err(SettingsError::OutOfRange { value: 65, .. })
        ));

        let mut registry = create_default_registry();
        registry
            .set_override(keys::HISTORY_MAX_ENTRIES, SettingValue::Integer(-1))
            .unwrap();
        assert!(matches!(
            registry.to_engine_config(),
            Err(SettingsError::OutOfRange { value: -1, .. })
        ));

        let mut registry = create_default_registry();
        registry
            .set_override(keys::MEMORY_ADDRESS_LIMIT, SettingValue::Integer(0))
            .unwrap();
        assert!(matches!(
            registry.to_engine_config(),
            Err(SettingsError::OutOfRange { value: 0, .. })
        ));
    }

    #[test]
    fn test_flood_mode_parsing() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::FLOOD_MODE, SettingValue::String("equal_or_unset".into()))
            .unwrap();
        assert_eq!(
            registry.to_engine_config().unwrap().flood_mode,
            FloodMode::EqualOrUnset
        );

        registry
            .set_override(keys::FLOOD_MODE, SettingValue::String("sideways".into()))
            .unwrap();
        assert!(matches!(
            registry.to_engine_config(),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_list_with_prefix() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::MEMORY_ADDRESS_BITS, SettingValue::Integer(24))
            .unwrap();
        let memory = registry.list_with_prefix("memory.");
        assert_eq!(memory.len(), 2);
        assert!(memory.contains(&(
            SettingKey::from(keys::MEMORY_ADDRESS_BITS),
            SettingValue::Integer(24)
        )));
    }

    #[test]
    fn test_import_overrides_is_all_or_nothing() {
        let mut registry = create_default_registry();
        let mut overrides = BTreeMap::new();
        overrides.insert(SettingKey::from(keys::SEARCH_WRAP), SettingValue::Boolean(false));
        overrides.insert(SettingKey::from("bogus.key"), SettingValue::Boolean(false));

        assert!(registry.import_overrides(overrides).is_err());
        assert!(registry.list_overrides().is_empty());
    }
}
