//! Graph output orchestrator
//!
//! Fans hydration out over every subject and object of a [`GraphOutput`] and
//! waits for all of them. Each future borrows exactly one entity, so the
//! hydrations never contend for the same data; pacing is left to the
//! rate-limited clients inside the hydrators.

use crate::geocode::GeocodeHydrator;
use crate::hydrator::{HydrationOutcome, LocationHydrator, ObjectHydrator};
use crate::macrostrat::MacrostratHydrator;
use crate::rate_limit::RateLimitedClient;
use futures::future::{join, join_all};
use geokg_core::{AppConfig, GraphOutput, RelationshipTriplet, Result};
use serde::Serialize;
use std::sync::Arc;

/// Outcome tally for one side of the triplets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub hydrated: usize,
    pub no_match: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &HydrationOutcome) {
        match outcome {
            HydrationOutcome::Hydrated => self.hydrated += 1,
            HydrationOutcome::NoMatch => self.no_match += 1,
            HydrationOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hydrated + self.no_match + self.failed
    }
}

/// Summary of one [`GraphHydrator::hydrate`] call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    pub subjects: OutcomeCounts,
    pub objects: OutcomeCounts,
}

/// Hydrates every entity of a graph output concurrently
#[derive(Clone)]
pub struct GraphHydrator {
    location: Arc<dyn LocationHydrator>,
    object: Arc<dyn ObjectHydrator>,
}

impl GraphHydrator {
    pub fn new(location: Arc<dyn LocationHydrator>, object: Arc<dyn ObjectHydrator>) -> Self {
        Self { location, object }
    }

    /// Geocoder and Macrostrat hydrators, each behind its own paced client
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let geocoder_client = Arc::new(RateLimitedClient::new(
            &config.geocoder.source_name,
            &config.geocoder.rate_limit,
        )?);
        let authority_client = Arc::new(RateLimitedClient::new(
            &config.authority.source_name,
            &config.authority.rate_limit,
        )?);

        Ok(Self::new(
            Arc::new(GeocodeHydrator::new(geocoder_client, &config.geocoder)),
            Arc::new(MacrostratHydrator::new(authority_client, &config.authority)),
        ))
    }

    /// Hydrate all subjects and objects, returning once every lookup has
    /// finished. Entities whose lookup failed are left as they were.
    pub async fn hydrate(&self, graph: &mut GraphOutput) -> HydrationReport {
        let location = self.location.as_ref();
        let object_hydrator = self.object.as_ref();

        let mut subject_tasks = Vec::with_capacity(graph.triplets.len());
        let mut object_tasks = Vec::with_capacity(graph.triplets.len());
        for triplet in graph.triplets.iter_mut() {
            let RelationshipTriplet { subject, object, .. } = triplet;
            subject_tasks.push(location.hydrate_location(subject));
            object_tasks.push(object_hydrator.hydrate_object(object));
        }

        let (subject_outcomes, object_outcomes) =
            join(join_all(subject_tasks), join_all(object_tasks)).await;

        let mut report = HydrationReport::default();
        subject_outcomes.iter().for_each(|o| report.subjects.record(o));
        object_outcomes.iter().for_each(|o| report.objects.record(o));

        tracing::info!(
            triplets = graph.triplets.len(),
            subjects_hydrated = report.subjects.hydrated,
            objects_hydrated = report.objects.hydrated,
            failed = report.subjects.failed + report.objects.failed,
            "Hydrated graph output"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geokg_core::{EntityKind, Location, Provenance, TripletObject};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct FixedLocation;

    #[async_trait]
    impl LocationHydrator for FixedLocation {
        fn source_name(&self) -> &str {
            "fixed"
        }

        async fn hydrate_location(&self, location: &mut Location) -> HydrationOutcome {
            match location.set_coordinates(45.0, -93.0, Provenance::new("fixed")) {
                Ok(()) => HydrationOutcome::Hydrated,
                Err(e) => HydrationOutcome::Failed(e.to_string()),
            }
        }
    }

    struct BrokenAuthority;

    #[async_trait]
    impl ObjectHydrator for BrokenAuthority {
        fn source_name(&self) -> &str {
            "broken"
        }

        async fn hydrate_object(&self, _object: &mut TripletObject) -> HydrationOutcome {
            HydrationOutcome::Failed("connection refused".to_string())
        }
    }

    /// Sleeps before answering and tracks how many calls overlap
    struct SlowLocation {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LocationHydrator for SlowLocation {
        fn source_name(&self) -> &str {
            "slow"
        }

        async fn hydrate_location(&self, _location: &mut Location) -> HydrationOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            HydrationOutcome::NoMatch
        }
    }

    fn graph(n: usize) -> GraphOutput {
        let triplets = (0..n)
            .map(|i| {
                RelationshipTriplet::from_raw(
                    &format!("Place {i}"),
                    "has",
                    &format!("Unit {i}"),
                    EntityKind::StratName,
                )
                .unwrap()
            })
            .collect();
        GraphOutput::new(triplets)
    }

    #[tokio::test]
    async fn test_partial_hydration_with_failing_authority() {
        let hydrator = GraphHydrator::new(Arc::new(FixedLocation), Arc::new(BrokenAuthority));
        let mut output = graph(3);
        let before: Vec<_> = output.triplets.iter().map(|t| t.object.clone()).collect();

        let report = hydrator.hydrate(&mut output).await;

        assert_eq!(report.subjects.hydrated, 3);
        assert_eq!(report.objects.failed, 3);
        assert!(output.triplets.iter().all(|t| t.subject.coordinates().is_some()));
        let after: Vec<_> = output.triplets.iter().map(|t| t.object.clone()).collect();
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrations_run_concurrently() {
        let slow = Arc::new(SlowLocation {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let hydrator = GraphHydrator::new(slow.clone(), Arc::new(BrokenAuthority));
        let mut output = graph(5);

        let start = Instant::now();
        let report = hydrator.hydrate(&mut output).await;

        assert_eq!(report.subjects.no_match, 5);
        assert_eq!(report.subjects.total(), 5);
        assert_eq!(slow.peak.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let hydrator = GraphHydrator::new(Arc::new(FixedLocation), Arc::new(BrokenAuthority));
        let mut output = GraphOutput::new(vec![]);
        assert_eq!(hydrator.hydrate(&mut output).await, HydrationReport::default());
    }
}
