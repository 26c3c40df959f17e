//! GeoKG Graph - Ontology mapping and Turtle output
//!
//! Maps hydrated triplets onto the GeoScience Ontology (GSO) with W3C PROV
//! lineage and writes the result as Turtle.

pub mod features;
pub mod intervals;
pub mod namespace;
pub mod rdf;
pub mod serializer;
pub mod turtle;

pub use features::{FeatureContext, FeatureError};
pub use intervals::IntervalVocabulary;
pub use namespace::Namespace;
pub use rdf::{literal, GraphDelta, RdfGraph};
pub use serializer::{serialize, FeatureFailure, OntologySerializer, SerializedGraph};
pub use turtle::to_turtle;
