//! Turtle output
//!
//! Output is a pure function of the graph. Only the prefixes the graph uses
//! are declared. Subjects are written named nodes first, then blank nodes,
//! with `rdf:type` ahead of other predicates, and blank nodes are relabelled
//! `_:b0`, `_:b1`, ... in order of first appearance. Prefixed names and
//! escaping are left to `oxttl`.

use crate::namespace::{Namespace, RDF_TYPE};
use crate::rdf::{blank_index, numbered_blank, RdfGraph};
use geokg_core::{GeoKgError, Result};
use oxrdf::{BlankNode, Subject, Term, Triple, TripleRef};
use oxttl::TurtleSerializer;
use std::collections::HashMap;

type SortKey = (u8, u64, String);

fn subject_key(subject: &Subject) -> SortKey {
    match subject {
        Subject::NamedNode(node) => (0, 0, node.as_str().to_string()),
        Subject::BlankNode(node) => (1, blank_index(node).unwrap_or(u64::MAX), node.to_string()),
        #[allow(unreachable_patterns)]
        other => (2, 0, other.to_string()),
    }
}

fn object_key(object: &Term) -> SortKey {
    match object {
        Term::NamedNode(node) => (0, 0, node.as_str().to_string()),
        Term::BlankNode(node) => (1, blank_index(node).unwrap_or(u64::MAX), node.to_string()),
        other => (2, 0, other.to_string()),
    }
}

fn statement_key(triple: &Triple) -> (SortKey, bool, String, SortKey) {
    (
        subject_key(&triple.subject),
        triple.predicate.as_ref() != RDF_TYPE,
        triple.predicate.as_str().to_string(),
        object_key(&triple.object),
    )
}

struct BlankLabels(HashMap<BlankNode, BlankNode>);

impl BlankLabels {
    fn label(&mut self, node: BlankNode) -> BlankNode {
        let next = self.0.len() as u64;
        self.0.entry(node).or_insert_with(|| numbered_blank(next)).clone()
    }

    fn relabel(&mut self, triple: Triple) -> Triple {
        let subject = match triple.subject {
            Subject::BlankNode(node) => Subject::BlankNode(self.label(node)),
            other => other,
        };
        let object = match triple.object {
            Term::BlankNode(node) => Term::BlankNode(self.label(node)),
            other => other,
        };
        Triple {
            subject,
            predicate: triple.predicate,
            object,
        }
    }
}

/// Whether a written IRI of `triple` falls under `namespace`
fn mentions(triple: &Triple, namespace: &Namespace) -> bool {
    let in_namespace = |iri: &str| iri.starts_with(namespace.iri);
    let subject = matches!(&triple.subject, Subject::NamedNode(node) if in_namespace(node.as_str()));
    let predicate = triple.predicate.as_ref() != RDF_TYPE && in_namespace(triple.predicate.as_str());
    let object = match &triple.object {
        Term::NamedNode(node) => in_namespace(node.as_str()),
        Term::Literal(literal) => !literal.is_plain() && in_namespace(literal.datatype().as_str()),
        _ => false,
    };
    subject || predicate || object
}

/// Serialize `graph` as Turtle
pub fn to_turtle(graph: &RdfGraph) -> Result<String> {
    let mut triples: Vec<Triple> = graph.iter().map(TripleRef::into_owned).collect();
    triples.sort_by_cached_key(statement_key);

    let mut labels = BlankLabels(HashMap::new());
    let triples: Vec<Triple> = triples.into_iter().map(|t| labels.relabel(t)).collect();

    let mut serializer = TurtleSerializer::new();
    for namespace in graph.bindings() {
        if triples.iter().any(|t| mentions(t, namespace)) {
            serializer = serializer
                .with_prefix(namespace.prefix, namespace.iri)
                .map_err(|e| {
                    GeoKgError::SerializationError(format!("prefix {}: {e}", namespace.prefix))
                })?;
        }
    }

    let mut writer = serializer.for_writer(Vec::new());
    for triple in &triples {
        writer.serialize_triple(triple)?;
    }
    let bytes = writer.finish()?;
    String::from_utf8(bytes).map_err(|e| GeoKgError::SerializationError(e.to_string()))
}
