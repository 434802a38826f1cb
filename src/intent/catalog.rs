//! Intent catalog file
//!
//! A JSON array of groups, each naming an intent type, an action, and the
//! example phrases that should map to them:
//!
//! ```json
//! [{ "type": "general", "action": "get_time", "prompts": ["what time is it"] }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentGroup {
    /// Intent type
    #[serde(rename = "type")]
    pub kind: String,

    /// Action within the type
    pub action: String,

    /// Example phrases
    pub prompts: Vec<String>,
}

/// Load the catalog from disk
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a valid catalog
pub fn load_catalog(path: &Path) -> Result<Vec<IntentGroup>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Catalog(format!("failed to read intent catalog {}: {e}", path.display()))
    })?;

    let groups = parse_catalog(&content)
        .map_err(|e| Error::Catalog(format!("{}: {e}", path.display())))?;

    tracing::info!(
        path = %path.display(),
        groups = groups.len(),
        "loaded intent catalog"
    );

    Ok(groups)
}

/// Parse catalog JSON
///
/// # Errors
///
/// Returns error if the JSON does not match the catalog schema or a group has
/// an empty type
pub fn parse_catalog(json: &str) -> Result<Vec<IntentGroup>> {
    let groups: Vec<IntentGroup> = serde_json::from_str(json)
        .map_err(|e| Error::Catalog(format!("invalid intent catalog: {e}")))?;

    for group in &groups {
        if group.kind.trim().is_empty() {
            return Err(Error::Catalog(format!(
                "intent group with action '{}' has an empty type",
                group.action
            )));
        }
        if group.prompts.is_empty() {
            tracing::warn!(kind = %group.kind, action = %group.action, "intent group has no prompts");
        }
    }

    Ok(groups)
}
