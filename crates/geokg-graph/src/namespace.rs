//! Ontology namespaces
//!
//! See <https://loop3d.org/GKM/geology.html> for the GSO modules.

use oxrdf::{NamedNode, NamedNodeRef};
use std::fmt::Write;

/// Prefix / IRI pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub prefix: &'static str,
    pub iri: &'static str,
}

impl Namespace {
    pub const fn new(prefix: &'static str, iri: &'static str) -> Self {
        Self { prefix, iri }
    }

    /// IRI for `local` in this namespace. Characters an IRI cannot carry
    /// are percent-encoded, so the result is always a valid IRI.
    pub fn term(&self, local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{}", self.iri, encode_local(local)))
    }
}

pub const RDF: Namespace = Namespace::new("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
pub const RDFS: Namespace = Namespace::new("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
pub const XSD: Namespace = Namespace::new("xsd", "http://www.w3.org/2001/XMLSchema#");

pub const GSOC: Namespace = Namespace::new("gsoc", "https://w3id.org/gso/1.0/common/");
pub const GSOG: Namespace = Namespace::new("gsog", "https://w3id.org/gso/geology/");
pub const GSGU: Namespace = Namespace::new("gsgu", "https://w3id.org/gso/geologicunit/");
pub const GST: Namespace = Namespace::new("gst", "https://w3id.org/gso/geologictime/");
pub const GSPR: Namespace = Namespace::new("gspr", "https://w3id.org/gso/geologicprocess/");
pub const GSRM: Namespace = Namespace::new("gsrm", "https://w3id.org/gso/1.0/rockmaterial/");

pub const MSL: Namespace = Namespace::new("msl", "https://macrostrat.org/lexicon/");
pub const XDD: Namespace = Namespace::new("xdd", "https://xdd.wisc.edu/lexicon/");
pub const PROV: Namespace = Namespace::new("prov", "http://www.w3.org/ns/prov#");
pub const PAV: Namespace = Namespace::new("pav", "http://purl.org/pav/");

/// Bindings of a fresh graph, in prefix output order
pub const DEFAULT_BINDINGS: [Namespace; 13] = [
    RDF, RDFS, GSOC, GSOG, GSGU, GST, GSPR, GSRM, MSL, XDD, PROV, PAV, XSD,
];

pub const RDF_TYPE: NamedNodeRef<'static> = oxrdf::vocab::rdf::TYPE;

/// WGS 84 coordinate reference system
pub const WGS84: &str = "https://epsg.io/4326";

pub fn rdf_type() -> NamedNode {
    RDF_TYPE.into_owned()
}

pub fn wgs84() -> NamedNode {
    NamedNode::new_unchecked(WGS84)
}

/// Percent-encode every character outside the IRI path alphabet
fn encode_local(local: &str) -> String {
    let mut encoded = String::with_capacity(local.len());
    for c in local.chars() {
        if is_path_char(c) {
            encoded.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

fn is_path_char(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphanumeric() || "-._~!$&'()*+,;=:@/".contains(c);
    }
    let code = c as u32;
    !c.is_control()
        && !(0xE000..=0xF8FF).contains(&code)
        && !(0xFDD0..=0xFDEF).contains(&code)
        && code & 0xFFFE != 0xFFFE
}
