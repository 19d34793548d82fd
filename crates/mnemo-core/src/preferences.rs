//! User preferences document.
//!
//! A small JSON file next to the database, created with defaults on first
//! open and surfaced unchanged in every context snapshot. Unknown keys are
//! kept so hand edits survive a rewrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::MemoryResult;
use crate::graph::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coding_style: Option<String>,
    pub preferred_tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_pattern: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserPreferences {
    /// Read the document, writing defaults if it does not exist.
    ///
    /// An unparsable file is left untouched and defaults are used in memory.
    pub fn load_or_init(path: &Path) -> MemoryResult<Self> {
        if !path.exists() {
            let prefs = Self::default();
            prefs.save(path)?;
            info!(path = %path.display(), "Created default user preferences");
            return Ok(prefs);
        }

        let bytes = std::fs::read(path)?;
        match serde_json::from_slice(&bytes) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable user preferences");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> MemoryResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        Ok(())
    }
}
