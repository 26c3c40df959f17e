//! Prompt handlers
//!
//! A prompt handler records which JSON keys a given prompt version asks the
//! model to emit, and which kind of entity the object side names.

use geokg_core::{EntityKind, GeoKgError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON key mapping for one prompt version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptHandler {
    pub version: String,
    pub subject_key: String,
    pub object_key: String,
    pub predicate_key: String,
    pub object_kind: EntityKind,
}

impl PromptHandler {
    /// Location → stratigraphic name prompt
    pub fn stratname_v3() -> Self {
        Self {
            version: "stratname_v3".to_string(),
            subject_key: "location".to_string(),
            object_key: "stratigraphic_name".to_string(),
            predicate_key: "relationship".to_string(),
            object_kind: EntityKind::StratName,
        }
    }

    /// Location → mineral prompt
    pub fn mineral_v0() -> Self {
        Self {
            version: "mineral_v0".to_string(),
            subject_key: "location".to_string(),
            object_key: "mineral".to_string(),
            predicate_key: "relationship".to_string(),
            object_kind: EntityKind::Mineral,
        }
    }

    /// Built-in handler for a prompt version
    pub fn from_version(version: &str) -> Result<Self> {
        match version {
            "stratname_v3" => Ok(Self::stratname_v3()),
            "mineral_v0" => Ok(Self::mineral_v0()),
            other => Err(GeoKgError::ConfigError(format!(
                "unknown prompt version: {other}"
            ))),
        }
    }

    /// Custom handler from a TOML file with the same fields
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            GeoKgError::ConfigError(format!("invalid prompt handler {}: {e}", path.display()))
        })
    }
}

impl Default for PromptHandler {
    fn default() -> Self {
        Self::stratname_v3()
    }
}
