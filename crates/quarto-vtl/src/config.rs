/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.
//!
//! Every knob has the classic Velocity default, so an empty TOML document
//! (or `RuntimeConfig::default()`) yields a working engine. Unknown keys
//! belong in the free-form `[properties]` table, which is what
//! [`RuntimeConfig::get_string`] and friends read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{VtlError, VtlResult};

/// Runtime configuration shared by every template merged through one engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name of the loop counter variable maintained by `#foreach`.
    pub foreach_counter_name: String,

    /// Value of the loop counter on the first iteration.
    pub foreach_counter_initial_value: i32,

    /// Name of the "has next element" variable maintained by `#foreach`.
    pub foreach_has_next_name: String,

    /// Warn when a non-quiet reference renders as its literal text.
    pub log_invalid_references: bool,

    /// Character encoding of template sources (`UTF-8` or `ISO-8859-1`).
    pub input_encoding: String,

    /// Capacity of the resource cache. Zero means unbounded.
    pub resource_cache_size: usize,

    /// Log an info line whenever a loader supplies a resource.
    pub resource_log_when_found: bool,

    /// Search path of the file resource loader.
    pub file_resource_loader_path: Vec<PathBuf>,

    /// Whether resources loaded from files are kept in the cache.
    pub file_resource_loader_cache: bool,

    /// Seconds between modification checks of a cached file resource.
    /// Zero or less disables checking.
    pub file_resource_loader_modification_check_interval: i64,

    /// Templates whose macros are registered at startup as library macros.
    pub velocimacro_library: Vec<String>,

    /// Reload library templates when a library macro is looked up and the
    /// library source changed.
    pub velocimacro_library_autoreload: bool,

    /// Allow `#macro` definitions inside regular templates.
    pub velocimacro_permissions_allow_inline: bool,

    /// Allow inline macros to replace library macros in the global namespace.
    pub velocimacro_permissions_allow_inline_to_replace_global: bool,

    /// Give every template its own macro namespace.
    pub velocimacro_permissions_allow_inline_local_scope: bool,

    /// Maximum nesting of macro calls.
    pub velocimacro_max_depth: usize,

    /// Maximum nesting of `#parse`.
    pub parse_directive_max_depth: usize,

    /// Free-form properties.
    pub properties: BTreeMap<String, toml::Value>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            foreach_counter_name: "velocityCount".to_string(),
            foreach_counter_initial_value: 1,
            foreach_has_next_name: "velocityHasNext".to_string(),
            log_invalid_references: true,
            input_encoding: "UTF-8".to_string(),
            resource_cache_size: 89,
            resource_log_when_found: true,
            file_resource_loader_path: vec![PathBuf::from(".")],
            file_resource_loader_cache: false,
            file_resource_loader_modification_check_interval: 2,
            velocimacro_library: Vec::new(),
            velocimacro_library_autoreload: false,
            velocimacro_permissions_allow_inline: true,
            velocimacro_permissions_allow_inline_to_replace_global: false,
            velocimacro_permissions_allow_inline_local_scope: false,
            velocimacro_max_depth: 20,
            parse_directive_max_depth: 10,
            properties: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> VtlResult<Self> {
        let config: RuntimeConfig =
            toml::from_str(text).map_err(|e| VtlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> VtlResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> VtlResult<()> {
        if !is_supported_encoding(&self.input_encoding) {
            return Err(VtlError::Config(format!(
                "unsupported input encoding '{}'",
                self.input_encoding
            )));
        }
        if self.foreach_counter_name.is_empty() {
            return Err(VtlError::Config(
                "foreach_counter_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Modification check interval for file resources, `None` when disabled.
    pub fn file_check_interval(&self) -> Option<Duration> {
        u64::try_from(self.file_resource_loader_modification_check_interval)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Look up a string property, falling back to `default`.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.properties.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    /// Look up an integer property, falling back to `default`.
    ///
    /// String values are parsed, so `"12"` and `12` both work.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.properties.get(key) {
            Some(toml::Value::Integer(i)) => *i,
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Look up a boolean property, falling back to `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.properties.get(key) {
            Some(toml::Value::Boolean(b)) => *b,
            Some(toml::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => true,
                "false" | "no" | "off" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Set a free-form property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.properties.insert(key.into(), value.into());
    }
}

/// Encodings the resource layer can decode.
pub fn is_supported_encoding(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "UTF-8" | "UTF8" | "ISO-8859-1" | "LATIN1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.foreach_counter_name, "velocityCount");
        assert_eq!(config.foreach_counter_initial_value, 1);
        assert_eq!(config.resource_cache_size, 89);
        assert!(config.log_invalid_references);
        assert_eq!(config.file_check_interval(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            foreach_counter_name = "i"
            resource_cache_size = 0
            file_resource_loader_modification_check_interval = 0

            [properties]
            "custom.name" = "abc"
            "custom.count" = 7
            "custom.flag" = "yes"
            "#,
        )
        .unwrap();
        assert_eq!(config.foreach_counter_name, "i");
        assert_eq!(config.resource_cache_size, 0);
        assert_eq!(config.file_check_interval(), None);
        assert_eq!(config.input_encoding, "UTF-8");
        assert_eq!(config.get_string("custom.name", "x"), "abc");
        assert_eq!(config.get_int("custom.count", 1), 7);
        assert!(config.get_bool("custom.flag", false));
        assert_eq!(config.get_int("missing", 42), 42);
    }

    #[test]
    fn test_unsupported_encoding_rejected() {
        let err = RuntimeConfig::from_toml_str("input_encoding = \"EBCDIC\"").unwrap_err();
        assert!(matches!(err, VtlError::Config(_)));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = RuntimeConfig::from_toml_str("resource_cache_size = \"many\"").unwrap_err();
        assert!(matches!(err, VtlError::Config(_)));
    }
}
