//! GeoKG Hydrate - Entity enrichment against external authorities
//!
//! - [`RateLimitedClient`]: bounded, paced, adaptively backed-off HTTP client
//! - [`GeocodeHydrator`]: location names to coordinates
//! - [`MacrostratHydrator`]: stratigraphic units and minerals to lexicon records
//! - [`GraphHydrator`]: concurrent hydration of a whole graph output

pub mod geocode;
pub mod hydrator;
pub mod macrostrat;
pub mod orchestrator;
pub mod rate_limit;

pub use geocode::GeocodeHydrator;
pub use hydrator::{sanitize_query, HydrationOutcome, LocationHydrator, ObjectHydrator};
pub use macrostrat::MacrostratHydrator;
pub use orchestrator::{GraphHydrator, HydrationReport, OutcomeCounts};
pub use rate_limit::{HasStatus, RateLimitedClient, Reservation, SendSchedule, WINDOW};
