//! Hydrator traits
//!
//! Hydrators look an entity up in an external authority and, on a match,
//! copy the authority's attributes onto it together with a new provenance
//! node. They never return errors: every failure is downgraded to a
//! [`HydrationOutcome`] and the entity is left as it was.

use async_trait::async_trait;
use geokg_core::{Location, TripletObject};

/// Result of one hydration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Attributes and provenance were assigned
    Hydrated,
    /// The authority answered but had no matching record
    NoMatch,
    /// The lookup itself failed; the entity is unchanged
    Failed(String),
}

impl HydrationOutcome {
    pub fn is_hydrated(&self) -> bool {
        matches!(self, HydrationOutcome::Hydrated)
    }
}

/// Enriches triplet subjects
#[async_trait]
pub trait LocationHydrator: Send + Sync {
    /// Name recorded in provenance nodes
    fn source_name(&self) -> &str;

    async fn hydrate_location(&self, location: &mut Location) -> HydrationOutcome;
}

/// Enriches triplet objects
#[async_trait]
pub trait ObjectHydrator: Send + Sync {
    /// Name recorded in provenance nodes
    fn source_name(&self) -> &str;

    async fn hydrate_object(&self, object: &mut TripletObject) -> HydrationOutcome;
}

/// Replace characters that cannot appear in an authority query with `-`
pub fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | ',' | '-' | '_' | ' ') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
