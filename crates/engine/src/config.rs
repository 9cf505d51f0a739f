//! Opaque typed-getter configuration provider.
//!
//! `spec.md` §1 treats XML configuration loading as an external collaborator
//! and spec.md §9 design notes a "`Config` provider exposing typed getters".
//! We back it with a `serde_json::Value` document (the loading format is
//! not a compatibility surface any more than XML would have been) and
//! expose only typed accessors — callers never see the raw value.

use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// A read-only view over a JSON document, addressed by dotted key paths
/// (`"pal.channels"`).
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn from_str(json: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_json::from_str(json).map_err(|e| ConfigError::BadValue {
            key: "<root>",
            expected: "json",
            value: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::BadValue {
            key: "<file>",
            expected: "readable file",
            value: e.to_string(),
        })?;
        Self::from_str(&text)
    }

    pub fn empty() -> Self {
        Self { root: Value::Object(Default::default()) }
    }

    fn lookup(&self, key: &'static str) -> Option<&Value> {
        let mut cur = &self.root;
        for segment in key.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    pub fn get_u64(&self, key: &'static str) -> Result<u64, ConfigError> {
        self.lookup(key)
            .and_then(Value::as_u64)
            .ok_or(ConfigError::MissingKey(key))
    }

    pub fn get_u32(&self, key: &'static str) -> Result<u32, ConfigError> {
        self.get_u64(key).map(|v| v as u32)
    }

    pub fn get_i64(&self, key: &'static str) -> Result<i64, ConfigError> {
        self.lookup(key)
            .and_then(Value::as_i64)
            .ok_or(ConfigError::MissingKey(key))
    }

    pub fn get_f64(&self, key: &'static str) -> Result<f64, ConfigError> {
        self.lookup(key)
            .and_then(Value::as_f64)
            .ok_or(ConfigError::MissingKey(key))
    }

    pub fn get_bool(&self, key: &'static str) -> Result<bool, ConfigError> {
        self.lookup(key)
            .and_then(Value::as_bool)
            .ok_or(ConfigError::MissingKey(key))
    }

    pub fn get_str(&self, key: &'static str) -> Result<String, ConfigError> {
        self.lookup(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(ConfigError::MissingKey(key))
    }

    pub fn get_u64_or(&self, key: &'static str, default: u64) -> u64 {
        self.get_u64(key).unwrap_or(default)
    }

    pub fn get_u32_or(&self, key: &'static str, default: u32) -> u32 {
        self.get_u32(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &'static str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_str_or(&self, key: &'static str, default: &str) -> String {
        self.get_str(key).unwrap_or_else(|_| default.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lookup() {
        let cfg = Config::from_str(r#"{"pal": {"channels": 4, "dies": 2.0}}"#).unwrap();
        assert_eq!(cfg.get_u64("pal.channels").unwrap(), 4);
        assert_eq!(cfg.get_u32("pal.dies").unwrap(), 2);
    }

    #[test]
    fn missing_key_is_reported() {
        let cfg = Config::empty();
        assert!(matches!(cfg.get_u64("nope"), Err(ConfigError::MissingKey("nope"))));
    }

    #[test]
    fn default_fallback() {
        let cfg = Config::empty();
        assert_eq!(cfg.get_u64_or("nope", 42), 42);
    }
}
