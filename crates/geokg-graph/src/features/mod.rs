//! Graph features
//!
//! A feature maps one triplet onto a bounded set of statements about its
//! object node. Features are independent: each returns its own
//! [`GraphDelta`] or a [`FeatureError`], and a failing feature contributes
//! nothing.

pub mod mineral;
pub mod stratigraphy;

use crate::intervals::IntervalVocabulary;
use crate::namespace::{wgs84, Namespace, GSOC, MSL, PAV, PROV, RDFS, XDD};
use crate::rdf::{format_number, literal, GraphDelta, NamedNode, Subject};
use geokg_core::{Provenance, RelationshipTriplet, TripletObject};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("missing attribute: {0}")]
    MissingAttribute(String),

    #[error("missing provenance: {0}")]
    MissingProvenance(String),

    #[error("unknown stratigraphic rank: {0}")]
    UnknownRank(String),

    #[error("unknown geologic interval: {0}")]
    UnknownInterval(String),
}

/// Everything a feature may read
pub struct FeatureContext<'a> {
    pub triplet: &'a RelationshipTriplet,
    pub object_node: NamedNode,
    pub intervals: &'a IntervalVocabulary,
}

impl<'a> FeatureContext<'a> {
    pub fn new(triplet: &'a RelationshipTriplet, intervals: &'a IntervalVocabulary) -> Self {
        Self {
            triplet,
            object_node: object_node(&triplet.object),
            intervals,
        }
    }
}

pub type Feature = fn(&FeatureContext<'_>) -> Result<GraphDelta, FeatureError>;

/// Ordered feature list for stratigraphic objects
pub const STRATIGRAPHY_FEATURES: &[(&str, Feature)] = &[
    ("stratigraphic_type", stratigraphy::stratigraphic_type),
    ("stratigraphic_label", stratigraphy::stratigraphic_label),
    ("triplet_provenance", triplet_provenance),
    ("spatial_location", spatial_location),
    ("stratigraphic_rank_relations", stratigraphy::stratigraphic_rank_relations),
    ("deposition_age", stratigraphy::deposition_age),
    ("time_span", stratigraphy::time_span),
];

/// Ordered feature list for mineral objects
pub const MINERAL_FEATURES: &[(&str, Feature)] = &[
    ("mineral_type", mineral::mineral_type),
    ("triplet_provenance", triplet_provenance),
    ("spatial_location", spatial_location),
];

pub fn features_for(object: &TripletObject) -> &'static [(&'static str, Feature)] {
    match object {
        TripletObject::Stratigraphy(_) => STRATIGRAPHY_FEATURES,
        TripletObject::Mineral(_) => MINERAL_FEATURES,
    }
}

/// Node standing for the triplet object
pub fn object_node(object: &TripletObject) -> NamedNode {
    match object {
        TripletObject::Stratigraphy(strat) => MSL.term(&entity_name(strat.display_name())),
        TripletObject::Mineral(mineral) => XDD.term(&mineral::mineral_name(mineral)),
    }
}

/// Name with spaces removed, for use as an IRI local part
pub fn entity_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

// ============================================================================
// Provenance statements
// ============================================================================

/// Entity and query activity for one provenance node, with `attributed`
/// marked as generated by the query
fn add_source_query(
    delta: &mut GraphDelta,
    namespace: Namespace,
    provenance: &Provenance,
    attributed: Subject,
) {
    let name = entity_name(provenance.source_name());
    let entity = namespace.term(&name);
    delta.add_type(entity.clone(), PROV.term("entity"));
    if let Some(version) = provenance.source_version() {
        delta.add(entity.clone(), PAV.term("version"), literal::string(version));
    }

    let query = namespace.term(&format!("{name}Query"));
    delta.add_type(query.clone(), PROV.term("activity"));
    delta.add(query.clone(), PROV.term("used"), entity);
    if let Some(url) = provenance.source_url() {
        delta.add(query.clone(), PROV.term("atLocation"), literal::any_uri(url));
    }
    delta.add(
        query.clone(),
        PROV.term("requestedAt"),
        literal::date_time(provenance.requested_at().to_rfc3339()),
    );

    delta.add(attributed, PROV.term("wasGeneratedBy"), query);
}

/// Attribute `attributed` to the authority that hydrated the object
pub(crate) fn add_authority_provenance(
    delta: &mut GraphDelta,
    ctx: &FeatureContext<'_>,
    attributed: impl Into<Subject>,
) -> Result<(), FeatureError> {
    let object = &ctx.triplet.object;
    let provenance = object
        .provenance()
        .filter(|_| object.is_hydrated())
        .and_then(Provenance::most_recent_authority)
        .ok_or_else(|| FeatureError::MissingProvenance(format!("authority for {}", object.name())))?;
    add_source_query(delta, MSL, provenance, attributed.into());
    Ok(())
}

/// Attribute `attributed` to the geocoder that located the subject
fn add_geolocation_provenance(
    delta: &mut GraphDelta,
    ctx: &FeatureContext<'_>,
    attributed: impl Into<Subject>,
) -> Result<(), FeatureError> {
    let subject = &ctx.triplet.subject;
    let provenance = subject
        .provenance
        .as_ref()
        .and_then(Provenance::most_recent_authority)
        .ok_or_else(|| FeatureError::MissingProvenance(format!("geocoder for {}", subject.name)))?;
    add_source_query(delta, XDD, provenance, attributed.into());
    Ok(())
}

// ============================================================================
// Shared features
// ============================================================================

const PREPROCESSOR_ID: &str = "preprocessor_id";
const PAPER_ID: &str = "paper_id";
const DOCUMENT_URL: &str = "url";

/// Extraction lineage of the triplet.
///
/// The most recent link is the language model whose query generated the
/// object; every earlier link is an upstream source that query used. A link
/// carrying document values also yields the corpus and text preprocessor
/// it drew from.
pub fn triplet_provenance(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let chain = ctx
        .triplet
        .provenance
        .as_ref()
        .ok_or_else(|| FeatureError::MissingProvenance("triplet".to_string()))?;
    let mut delta = GraphDelta::new();

    let model_name = entity_name(chain.source_name());
    let model = XDD.term(&model_name);
    delta.add_type(model.clone(), PROV.term("entity"));
    if let Some(version) = chain.source_version() {
        delta.add(model.clone(), PAV.term("version"), literal::string(version));
    }

    let query = XDD.term(&format!("{model_name}_query"));
    delta.add_type(query.clone(), PROV.term("activity"));
    delta.add(
        query.clone(),
        PROV.term("startedAtTime"),
        literal::date_time(chain.requested_at().to_rfc3339()),
    );
    delta.add(query.clone(), PROV.term("used"), model);

    for upstream in chain.iter().skip(1) {
        let source = XDD.term(&entity_name(upstream.source_name()));
        delta.add_type(source.clone(), PROV.term("entity"));
        delta.add(
            source.clone(),
            RDFS.term("label"),
            literal::lang(upstream.source_name(), "en"),
        );
        if let Some(version) = upstream.source_version() {
            delta.add(source.clone(), PAV.term("version"), literal::string(version));
        }
        add_corpus(&mut delta, upstream, &source)?;
        delta.add(query.clone(), PROV.term("used"), source);
    }

    delta.add(ctx.object_node.clone(), PROV.term("wasGeneratedBy"), query);
    Ok(delta)
}

/// Document corpus behind a retrieval source, when the link names one
fn add_corpus(
    delta: &mut GraphDelta,
    link: &Provenance,
    source: &NamedNode,
) -> Result<(), FeatureError> {
    let paper_id = link.value(PAPER_ID);
    let preprocessor = link.value(PREPROCESSOR_ID);
    if paper_id.is_none() && preprocessor.is_none() {
        return Ok(());
    }

    let paper_id = paper_id.ok_or_else(|| FeatureError::MissingAttribute(PAPER_ID.to_string()))?;
    let url = link
        .value(DOCUMENT_URL)
        .ok_or_else(|| FeatureError::MissingAttribute(DOCUMENT_URL.to_string()))?;
    let preprocessor = preprocessor
        .ok_or_else(|| FeatureError::MissingAttribute(PREPROCESSOR_ID.to_string()))?
        .to_string();

    let preprocessor_node = XDD.term("XDDTextPreProcessor");
    delta.add_type(preprocessor_node.clone(), PROV.term("entity"));
    delta.add(
        preprocessor_node.clone(),
        RDFS.term("label"),
        literal::lang(preprocessor.clone(), "en"),
    );
    delta.add(preprocessor_node.clone(), PAV.term("version"), literal::string(preprocessor));

    let corpus = XDD.term("XDDCorpus");
    delta.add_type(corpus.clone(), PROV.term("entity"));
    delta.add(corpus.clone(), RDFS.term("label"), literal::lang("xDD document ids", "en"));
    delta.add(corpus.clone(), XDD.term("docID"), literal::string(paper_id.to_string()));
    delta.add(corpus.clone(), XDD.term("docURL"), literal::any_uri(url.to_string()));
    delta.add(corpus.clone(), PROV.term("used"), preprocessor_node);

    delta.add(source.clone(), PROV.term("used"), corpus);
    Ok(())
}

/// Place name of the subject, plus a WGS 84 point when it was geocoded
pub fn spatial_location(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let subject = &ctx.triplet.subject;
    let mut delta = GraphDelta::new();

    let location = delta.blank_node();
    delta.add_type(location.clone(), GSOC.term("SpatialLocation"));
    delta.add(ctx.object_node.clone(), GSOC.term("hasQuality"), location.clone());

    let name_value = delta.blank_node();
    delta.add_type(name_value.clone(), GSOC.term("SpatialValue"));
    delta.add(
        name_value.clone(),
        GSOC.term("hasDataValue"),
        literal::lang(subject.name.clone(), "en"),
    );
    delta.add(location.clone(), GSOC.term("hasValue"), name_value);

    if let Some((lat, lon)) = subject.coordinates() {
        let crs = wgs84();
        let point = delta.blank_node();
        delta.add_type(point.clone(), GSOC.term("WKT_Value"));
        delta.add(
            point.clone(),
            GSOC.term("hasDataValue"),
            literal::string(format!(
                "( POINT {} {} )",
                format_number(lon),
                format_number(lat)
            )),
        );
        delta.add(point.clone(), GSOC.term("hasReferenceSystem"), crs.clone());
        delta.add(location, GSOC.term("hasValue"), point.clone());
        delta.add_type(crs, GSOC.term("Geographic_Coordinate_System"));
        add_geolocation_provenance(&mut delta, ctx, point)?;
    }

    Ok(delta)
}

#[cfg(test)]
pub(crate) mod test_support {
    use geokg_core::{EntityKind, Location, Provenance, RelationshipTriplet, Stratigraphy, TripletObject};

    /// Model provenance on top of a retrieval link carrying document values
    pub fn extraction_chain() -> Provenance {
        Provenance::new("mixtral")
            .with_version("8x7b")
            .chain(Some(
                Provenance::new("Ask_xDD_hybrid_API")
                    .with_version("v1")
                    .with_value("preprocessor_id", "haystack_v0.0.2")
                    .with_value("paper_id", "5c3b6c8b1faed6551763c6ff")
                    .with_value("url", "https://xdd.wisc.edu/api/articles?docid=5c3b6c8b1faed6551763c6ff"),
            ))
    }

    /// Hydrated Waldron Shale formation in the Wayne group
    pub fn waldron_triplet() -> RelationshipTriplet {
        let strat = Stratigraphy {
            strat_name: "Waldron Shale".to_string(),
            strat_name_long: Some("Waldron Shale".to_string()),
            rank: Some("Fm".to_string()),
            strat_name_id: Some(4260),
            fm: Some("Waldron".to_string()),
            gp: Some("Wayne".to_string()),
            bed: Some(String::new()),
            b_age: Some(429.65),
            t_age: Some(427.4),
            b_period: Some("Silurian".to_string()),
            t_period: Some("Silurian".to_string()),
            provenance: Some(
                Provenance::new("macrostrat")
                    .with_version("2")
                    .with_url("https://macrostrat.org/api/defs/strat_names?strat_name_id=4260"),
            ),
            ..Stratigraphy::default()
        };

        let mut subject = Location::new("Indiana").with_provenance(extraction_chain());
        subject
            .set_coordinates(
                40.3270127,
                -86.1746933,
                Provenance::new("geocodingAPI")
                    .with_version("v1")
                    .with_url("https://geocode.maps.co/search?q=Indiana"),
            )
            .unwrap();

        let mut triplet =
            RelationshipTriplet::from_raw("Indiana", "has", "Waldron Shale", EntityKind::StratName)
                .unwrap()
                .with_provenance(Some(extraction_chain()));
        triplet.subject = subject;
        triplet.object = TripletObject::Stratigraphy(strat);
        triplet
    }
}
