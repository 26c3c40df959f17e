//! GeoKG Core - Domain models, provenance, and shared types
//!
//! This crate defines the core abstractions used throughout the GeoKG pipeline:
//! - Provenance chain (immutable, append-only lineage of every value)
//! - Triplet data model (locations, stratigraphic units, minerals)
//! - Common error types
//! - Configuration management

pub mod config;
pub mod provenance;
pub mod schema;

pub use config::{
    AlignmentConfig, AppConfig, AuthorityConfig, ConfigError, EmbeddingConfig, EmbeddingProvider,
    GeocoderConfig, LoggingConfig, RateLimitConfig, SerializerConfig,
};
pub use provenance::{Provenance, ProvenanceIter, ProvenanceValue};
pub use schema::{
    GeologicInterval, GraphOutput, Location, Mineral, RelationshipTriplet, Stratigraphy,
    TripletObject,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for GeoKG operations
#[derive(Error, Debug)]
pub enum GeoKgError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Alignment error: {0}")]
    AlignmentError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Authority error: {0}")]
    AuthorityError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GeoKgError>;

impl From<ConfigError> for GeoKgError {
    fn from(e: ConfigError) -> Self {
        GeoKgError::ConfigError(e.to_string())
    }
}

// ============================================================================
// Entity Kinds
// ============================================================================

/// Kind of geo-entity an extraction prompt or alignment vocabulary targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Location,
    StratName,
    Mineral,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Location => "location",
            EntityKind::StratName => "strat_name",
            EntityKind::Mineral => "mineral",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = GeoKgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "location" => Ok(EntityKind::Location),
            "strat_name" | "stratigraphy" | "stratname" => Ok(EntityKind::StratName),
            "mineral" => Ok(EntityKind::Mineral),
            other => Err(GeoKgError::ValidationError(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in [EntityKind::Location, EntityKind::StratName, EntityKind::Mineral] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("lithology".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_error_display() {
        let err = GeoKgError::ParseError("missing triplets".to_string());
        assert_eq!(err.to_string(), "Parse error: missing triplets");

        let err: GeoKgError = ConfigError::MissingRequired("GEOCODE_API_KEY".to_string()).into();
        assert!(matches!(err, GeoKgError::ConfigError(_)));
    }
}
