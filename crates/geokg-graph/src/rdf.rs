//! In-memory RDF graph
//!
//! Terms and triples are `oxrdf` types. Blank nodes are labelled `b0`, `b1`,
//! ... per [`GraphDelta`] and renumbered when a delta is merged, which keeps
//! features independent of each other and the numbering a function of the
//! input.

use crate::namespace::{Namespace, DEFAULT_BINDINGS, RDF_TYPE};
use oxrdf::vocab::xsd;
use oxrdf::{Graph, TripleRef};

pub use oxrdf::{BlankNode, Literal, NamedNode, Subject, Term, Triple};

// ============================================================================
// Literals
// ============================================================================

/// Literal constructors for the datatypes the ontology mapping uses
pub mod literal {
    use super::*;

    /// `xsd:string`, written as a plain literal
    pub fn string(value: impl Into<String>) -> Literal {
        Literal::new_simple_literal(value)
    }

    /// Language-tagged string; `tag` must be a BCP 47 tag such as `en`
    pub fn lang(value: impl Into<String>, tag: &str) -> Literal {
        Literal::new_language_tagged_literal_unchecked(value, tag.to_ascii_lowercase())
    }

    pub fn any_uri(value: impl Into<String>) -> Literal {
        Literal::new_typed_literal(value, xsd::ANY_URI)
    }

    pub fn date_time(value: impl Into<String>) -> Literal {
        Literal::new_typed_literal(value, xsd::DATE_TIME)
    }

    pub fn double(value: f64) -> Literal {
        Literal::new_typed_literal(format_number(value), xsd::DOUBLE)
    }
}

/// Shortest decimal form that keeps at least one fractional digit
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

// ============================================================================
// Blank node numbering
// ============================================================================

pub(crate) fn numbered_blank(index: u64) -> BlankNode {
    BlankNode::new_unchecked(format!("b{index}"))
}

/// Position of a blank node labelled by [`numbered_blank`]
pub(crate) fn blank_index(node: &BlankNode) -> Option<u64> {
    node.as_str().strip_prefix('b')?.parse().ok()
}

fn offset_blank(node: BlankNode, offset: u64) -> BlankNode {
    match blank_index(&node) {
        Some(index) => numbered_blank(index + offset),
        None => node,
    }
}

fn offset_triple(triple: Triple, offset: u64) -> Triple {
    let subject = match triple.subject {
        Subject::BlankNode(node) => Subject::BlankNode(offset_blank(node, offset)),
        other => other,
    };
    let object = match triple.object {
        Term::BlankNode(node) => Term::BlankNode(offset_blank(node, offset)),
        other => other,
    };
    Triple {
        subject,
        predicate: triple.predicate,
        object,
    }
}

// ============================================================================
// Graph delta
// ============================================================================

/// Statements produced by one graph feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDelta {
    triples: Vec<Triple>,
    blank_nodes: u64,
}

impl GraphDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh blank node, local to this delta
    pub fn blank_node(&mut self) -> BlankNode {
        let node = numbered_blank(self.blank_nodes);
        self.blank_nodes += 1;
        node
    }

    pub fn add(
        &mut self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) {
        self.triples.push(Triple::new(subject, predicate, object));
    }

    /// `subject rdf:type class`
    pub fn add_type(&mut self, subject: impl Into<Subject>, class: impl Into<Term>) {
        self.add(subject, RDF_TYPE, class);
    }

    /// Append `other`, renumbering its blank nodes after ours
    pub fn extend(&mut self, other: GraphDelta) {
        let offset = self.blank_nodes;
        self.triples
            .extend(other.triples.into_iter().map(|t| offset_triple(t, offset)));
        self.blank_nodes += other.blank_nodes;
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn contains(
        &self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> bool {
        self.triples
            .contains(&Triple::new(subject, predicate, object))
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Set of triples plus the namespace bindings used to abbreviate them
#[derive(Debug, Clone)]
pub struct RdfGraph {
    bindings: Vec<Namespace>,
    graph: Graph,
    blank_nodes: u64,
}

impl Default for RdfGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RdfGraph {
    /// Empty graph with the ontology namespaces bound
    pub fn new() -> Self {
        Self {
            bindings: DEFAULT_BINDINGS.to_vec(),
            graph: Graph::new(),
            blank_nodes: 0,
        }
    }

    /// Bind `namespace`, replacing any binding with the same prefix
    pub fn bind(&mut self, namespace: Namespace) {
        match self.bindings.iter_mut().find(|ns| ns.prefix == namespace.prefix) {
            Some(existing) => *existing = namespace,
            None => self.bindings.push(namespace),
        }
    }

    pub fn bindings(&self) -> &[Namespace] {
        &self.bindings
    }

    pub fn add(&mut self, triple: Triple) -> bool {
        let subject = match &triple.subject {
            Subject::BlankNode(node) => blank_index(node),
            _ => None,
        };
        let object = match &triple.object {
            Term::BlankNode(node) => blank_index(node),
            _ => None,
        };
        if let Some(highest) = subject.max(object) {
            self.blank_nodes = self.blank_nodes.max(highest + 1);
        }
        self.graph.insert(&triple)
    }

    /// Insert every statement of `delta` under fresh blank node ids
    pub fn merge(&mut self, delta: GraphDelta) {
        let offset = self.blank_nodes;
        self.blank_nodes += delta.blank_nodes;
        for triple in delta.triples {
            self.graph.insert(&offset_triple(triple, offset));
        }
    }

    pub fn contains(
        &self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> bool {
        self.graph.contains(&Triple::new(subject, predicate, object))
    }

    /// Objects of every `subject predicate ?` statement
    pub fn objects(&self, subject: &Subject, predicate: &NamedNode) -> Vec<Term> {
        self.graph
            .iter()
            .filter(|t| t.subject == subject.as_ref() && t.predicate == predicate.as_ref())
            .map(|t| t.object.into_owned())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.graph.iter()
    }

    /// The underlying `oxrdf` graph
    pub fn as_graph(&self) -> &Graph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
