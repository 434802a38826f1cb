//! Flat key-value configuration source
//!
//! Lookups resolve in order: `LOKI_<KEY>` environment variable, then the
//! loaded file values, then the caller's default.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use super::file;
use crate::Result;

/// Key-value configuration with typed accessors
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    values: HashMap<String, String>,
    read_env: bool,
}

impl ConfigSource {
    /// Create an empty source that ignores the environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a config file and the environment
    ///
    /// With an explicit path the file must exist and parse. Without one,
    /// `~/.config/loki/config.toml` is used if present.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let table = match path {
            Some(p) => file::read_config_table(p)?,
            None => file::load_default_config_table(),
        };

        let mut source = Self::from_table(&table);
        source.read_env = true;
        Ok(source)
    }

    /// Build a source from TOML text (environment not consulted)
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        Ok(Self::from_table(&table))
    }

    fn from_table(table: &toml::Table) -> Self {
        let mut entries = Vec::new();
        file::flatten(table, "", &mut entries);
        Self {
            values: entries.into_iter().collect(),
            read_env: false,
        }
    }

    /// Set a value, replacing any loaded one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a raw value
    #[must_use]
    pub fn get_opt(&self, key: &str) -> Option<String> {
        if self.read_env {
            if let Ok(value) = std::env::var(env_key(key)) {
                return Some(value);
            }
        }
        self.values.get(key).cloned()
    }

    /// Get a string value or the default
    #[must_use]
    pub fn get(&self, key: &str, default: &str) -> String {
        self.get_opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a float value, falling back to the default on a missing or
    /// unparsable value
    #[must_use]
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.parse_or(key, default)
    }

    /// Get an unsigned integer value with the same fallback rule as
    /// [`get_float`](Self::get_float)
    #[must_use]
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.parse_or(key, default)
    }

    /// Get a boolean value with the same fallback rule as
    /// [`get_float`](Self::get_float)
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.parse_or(key, default)
    }

    fn parse_or<T: FromStr + Copy>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.get_opt(key) else {
            return default;
        };

        raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "could not convert config value, using default");
            default
        })
    }
}

/// Environment variable name for a dotted key: `vad.threshold` -> `LOKI_VAD_THRESHOLD`
fn env_key(key: &str) -> String {
    format!("LOKI_{}", key.replace('.', "_").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_with_default() {
        let mut source = ConfigSource::new();
        source.set("llm.model", "phi3");

        assert_eq!(source.get("llm.model", "dolphin-phi"), "phi3");
        assert_eq!(source.get("llm.host", "http://localhost:11434"), "http://localhost:11434");
    }

    #[test]
    fn test_get_float_fallback() {
        let mut source = ConfigSource::new();
        source.set("vad.threshold", "0.02");
        source.set("intent.dispatch_threshold", "seventy percent");

        assert!((source.get_float("vad.threshold", 0.01) - 0.02).abs() < f32::EPSILON);
        assert!((source.get_float("intent.dispatch_threshold", 0.7) - 0.7).abs() < f32::EPSILON);
        assert!((source.get_float("missing", 0.5) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_toml_types() {
        let source = ConfigSource::from_toml_str(
            r"
            [vad]
            threshold = 0.05
            min_command_ms = 400
            [daemon]
            speak_responses = false
            ",
        )
        .unwrap();

        assert!((source.get_float("vad.threshold", 0.01) - 0.05).abs() < f32::EPSILON);
        assert_eq!(source.get_u64("vad.min_command_ms", 300), 400);
        assert!(!source.get_bool("daemon.speak_responses", true));
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("vad.min_command_ms"), "LOKI_VAD_MIN_COMMAND_MS");
    }
}
