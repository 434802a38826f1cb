//! TOML configuration file loading
//!
//! Supports `~/.config/loki/config.toml` as a persistent config source.
//! The file is a partial overlay: any key it omits keeps its default.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Read a TOML config file into a table
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let table: toml::Table = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(table)
}

/// Load the config table from the standard path
///
/// Returns an empty table if the file doesn't exist or can't be parsed.
pub fn load_default_config_table() -> toml::Table {
    let Some(path) = config_file_path() else {
        return toml::Table::new();
    };

    if !path.exists() {
        return toml::Table::new();
    }

    match read_config_table(&path) {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            toml::Table::new()
        }
    }
}

/// Return the config file path: `~/.config/loki/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("loki").join("config.toml"))
}

/// Flatten nested TOML tables into dotted keys
///
/// `[vad] threshold = 0.02` becomes `vad.threshold = "0.02"`.
pub(crate) fn flatten(table: &toml::Table, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            toml::Value::Table(nested) => flatten(nested, &full_key, out),
            toml::Value::String(s) => out.push((full_key, s.clone())),
            other => out.push((full_key, other.to_string())),
        }
    }
}
