//! Ontology serializer
//!
//! Runs the feature list for each triplet, folds successful deltas into one
//! graph and records failures without stopping.

use crate::features::{features_for, FeatureContext, FeatureError};
use crate::intervals::IntervalVocabulary;
use crate::rdf::{GraphDelta, RdfGraph};
use crate::turtle::to_turtle;
use geokg_core::{GraphOutput, RelationshipTriplet, Result, SerializerConfig};

/// A feature that could not be applied to one triplet
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFailure {
    pub triplet_index: usize,
    pub feature: &'static str,
    pub error: FeatureError,
}

/// Graph and failures for one graph output
#[derive(Debug, Clone)]
pub struct SerializedGraph {
    pub graph: RdfGraph,
    pub failures: Vec<FeatureFailure>,
}

impl SerializedGraph {
    pub fn to_turtle(&self) -> Result<String> {
        to_turtle(&self.graph)
    }
}

/// Maps hydrated triplets onto the geoscience ontology
#[derive(Debug, Clone)]
pub struct OntologySerializer {
    intervals: IntervalVocabulary,
}

impl Default for OntologySerializer {
    fn default() -> Self {
        Self::new(IntervalVocabulary::builtin())
    }
}

impl OntologySerializer {
    pub fn new(intervals: IntervalVocabulary) -> Self {
        Self { intervals }
    }

    /// Interval vocabulary from the configured file, or the built-in periods
    pub fn from_config(config: &SerializerConfig) -> Result<Self> {
        let intervals = match &config.intervals_file {
            Some(path) => IntervalVocabulary::from_json_file(path)?,
            None => IntervalVocabulary::builtin(),
        };
        Ok(Self::new(intervals))
    }

    pub fn intervals(&self) -> &IntervalVocabulary {
        &self.intervals
    }

    /// Statements for one triplet and the features that failed on it
    pub fn triplet_delta(
        &self,
        index: usize,
        triplet: &RelationshipTriplet,
    ) -> (GraphDelta, Vec<FeatureFailure>) {
        let ctx = FeatureContext::new(triplet, &self.intervals);
        let mut delta = GraphDelta::new();
        let mut failures = Vec::new();

        for &(name, feature) in features_for(&triplet.object) {
            match feature(&ctx) {
                Ok(feature_delta) => delta.extend(feature_delta),
                Err(error) => {
                    tracing::info!(
                        triplet = index,
                        feature = name,
                        object = %triplet.object.name(),
                        %error,
                        "Skipped graph feature"
                    );
                    failures.push(FeatureFailure {
                        triplet_index: index,
                        feature: name,
                        error,
                    });
                }
            }
        }
        (delta, failures)
    }

    pub fn to_graph(&self, output: &GraphOutput) -> SerializedGraph {
        let mut graph = RdfGraph::new();
        let mut failures = Vec::new();
        for (index, triplet) in output.triplets.iter().enumerate() {
            let (delta, triplet_failures) = self.triplet_delta(index, triplet);
            graph.merge(delta);
            failures.extend(triplet_failures);
        }

        tracing::info!(
            triplets = output.triplets.len(),
            statements = graph.len(),
            failures = failures.len(),
            "Mapped graph output to ontology"
        );
        SerializedGraph { graph, failures }
    }

    pub fn serialize(&self, output: &GraphOutput) -> Result<String> {
        self.to_graph(output).to_turtle()
    }
}

/// Turtle for `output` using the built-in interval vocabulary
pub fn serialize(output: &GraphOutput) -> Result<String> {
    OntologySerializer::default().serialize(output)
}
