//! Provenance chain
//!
//! Every value in the pipeline carries a singly-linked, most-recent-first chain
//! of [`Provenance`] nodes. Nodes are immutable once built; enrichment creates
//! a new node whose `previous` link points at the existing chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Scalar or list value stored in a provenance node's `additional_values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProvenanceValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ProvenanceValue>),
}

impl std::fmt::Display for ProvenanceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvenanceValue::Bool(b) => write!(f, "{b}"),
            ProvenanceValue::Integer(i) => write!(f, "{i}"),
            ProvenanceValue::Float(x) => write!(f, "{x}"),
            ProvenanceValue::Text(s) => f.write_str(s),
            ProvenanceValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ProvenanceValue {
    fn from(s: &str) -> Self {
        ProvenanceValue::Text(s.to_string())
    }
}

impl From<String> for ProvenanceValue {
    fn from(s: String) -> Self {
        ProvenanceValue::Text(s)
    }
}

impl From<i64> for ProvenanceValue {
    fn from(i: i64) -> Self {
        ProvenanceValue::Integer(i)
    }
}

impl From<f64> for ProvenanceValue {
    fn from(x: f64) -> Self {
        ProvenanceValue::Float(x)
    }
}

impl From<bool> for ProvenanceValue {
    fn from(b: bool) -> Self {
        ProvenanceValue::Bool(b)
    }
}

impl<T: Into<ProvenanceValue>> From<Vec<T>> for ProvenanceValue {
    fn from(items: Vec<T>) -> Self {
        ProvenanceValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// One node of a provenance chain
///
/// Fields are private; a node never changes after construction. Use the
/// builder methods to describe a source, then [`Provenance::chain`] to link it
/// in front of an existing chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    id: Uuid,
    source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_version: Option<String>,
    requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    additional_values: BTreeMap<String, ProvenanceValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous: Option<Arc<Provenance>>,
}

impl Provenance {
    /// Create a provenance node for `source_name`, requested now
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            source_url: None,
            source_version: None,
            requested_at: Utc::now(),
            additional_values: BTreeMap::new(),
            previous: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.source_version = Some(version.into());
        self
    }

    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<ProvenanceValue>) -> Self {
        self.additional_values.insert(key.into(), value.into());
        self
    }

    /// Link this node in front of `previous`, making it the most recent node.
    pub fn chain(mut self, previous: Option<Provenance>) -> Self {
        self.previous = previous.map(Arc::new);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn source_version(&self) -> Option<&str> {
        self.source_version.as_deref()
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn additional_values(&self) -> &BTreeMap<String, ProvenanceValue> {
        &self.additional_values
    }

    pub fn value(&self, key: &str) -> Option<&ProvenanceValue> {
        self.additional_values.get(key)
    }

    pub fn previous(&self) -> Option<&Provenance> {
        self.previous.as_deref()
    }

    /// Walk the chain newest to oldest
    pub fn iter(&self) -> ProvenanceIter<'_> {
        ProvenanceIter { next: Some(self) }
    }

    /// Most recent node whose `source_name` matches
    pub fn find(&self, source_name: &str) -> Option<&Provenance> {
        self.iter().find(|p| p.source_name == source_name)
    }

    /// Newest link recorded by a lookup service, i.e. one that kept its request URL
    pub fn most_recent_authority(&self) -> Option<&Provenance> {
        self.iter().find(|p| p.source_url.is_some())
    }

    /// Number of nodes in the chain, this one included
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always `false`: a chain holds at least the node it is read from,
    /// and an absent chain is `Option::None` on the owning entity
    pub fn is_empty(&self) -> bool {
        false
    }
}

// Unlink iteratively so dropping a long chain does not recurse once per node.
impl Drop for Provenance {
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => next = inner.previous.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator over a provenance chain, most recent first
pub struct ProvenanceIter<'a> {
    next: Option<&'a Provenance>,
}

impl<'a> Iterator for ProvenanceIter<'a> {
    type Item = &'a Provenance;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.previous.as_deref();
        Some(current)
    }
}

impl<'a> IntoIterator for &'a Provenance {
    type Item = &'a Provenance;
    type IntoIter = ProvenanceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
