//! Triplet data model
//!
//! A [`RelationshipTriplet`] links a [`Location`] subject to a geo-entity
//! object (a [`Stratigraphy`] unit or a [`Mineral`]) through a free-text
//! predicate. Entities start out with only a name and gain attributes and
//! provenance as they are hydrated.

use crate::{EntityKind, GeoKgError, Provenance, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================================================
// Location
// ============================================================================

/// Named place, optionally geocoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationRecord")]
pub struct Location {
    pub name: String,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

#[derive(Deserialize)]
struct LocationRecord {
    name: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

impl TryFrom<LocationRecord> for Location {
    type Error = GeoKgError;

    fn try_from(record: LocationRecord) -> Result<Self> {
        if let Some(lat) = record.lat {
            validate_latitude(lat)?;
        }
        if let Some(lon) = record.lon {
            validate_longitude(lon)?;
        }
        Ok(Self {
            name: record.name,
            lat: record.lat,
            lon: record.lon,
            provenance: record.provenance,
        })
    }
}

pub fn validate_latitude(lat: f64) -> Result<f64> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(lat)
    } else {
        Err(GeoKgError::ValidationError(format!(
            "latitude {lat} outside [-90, 90]"
        )))
    }
}

pub fn validate_longitude(lon: f64) -> Result<f64> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(lon)
    } else {
        Err(GeoKgError::ValidationError(format!(
            "longitude {lon} outside [-180, 180]"
        )))
    }
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lat: None,
            lon: None,
            provenance: None,
        }
    }

    /// Builder variant of [`Location::set_coordinates`] without provenance
    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Result<Self> {
        self.lat = Some(validate_latitude(lat)?);
        self.lon = Some(validate_longitude(lon)?);
        Ok(self)
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn lat(&self) -> Option<f64> {
        self.lat
    }

    pub fn lon(&self) -> Option<f64> {
        self.lon
    }

    /// Both coordinates, when geocoded
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    /// Assign both coordinates at once and append `provenance` to the chain.
    ///
    /// Nothing is modified when either coordinate is out of range.
    pub fn set_coordinates(&mut self, lat: f64, lon: f64, provenance: Provenance) -> Result<()> {
        let lat = validate_latitude(lat)?;
        let lon = validate_longitude(lon)?;
        self.lat = Some(lat);
        self.lon = Some(lon);
        self.provenance = Some(provenance.chain(self.provenance.take()));
        Ok(())
    }
}

// ============================================================================
// Stratigraphy
// ============================================================================

/// Stratigraphic unit, with the attributes a lexicon authority returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stratigraphy {
    pub strat_name: String,
    pub strat_name_long: Option<String>,
    pub rank: Option<String>,
    pub strat_name_id: Option<i64>,
    pub concept_id: Option<i64>,
    pub bed: Option<String>,
    pub bed_id: Option<i64>,
    pub mbr: Option<String>,
    pub mbr_id: Option<i64>,
    pub fm: Option<String>,
    pub fm_id: Option<i64>,
    pub subgp: Option<String>,
    pub subgp_id: Option<i64>,
    pub gp: Option<String>,
    pub gp_id: Option<i64>,
    pub sgp: Option<String>,
    pub sgp_id: Option<i64>,
    pub b_age: Option<f64>,
    pub t_age: Option<f64>,
    pub b_period: Option<String>,
    pub t_period: Option<String>,
    pub c_interval: Option<String>,
    pub t_units: Option<i64>,
    pub ref_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Stratigraphy {
    pub fn new(strat_name: impl Into<String>) -> Self {
        Self {
            strat_name: strat_name.into(),
            ..Default::default()
        }
    }

    /// Long name when the authority supplied one, otherwise the short name
    pub fn display_name(&self) -> &str {
        non_empty(&self.strat_name_long).unwrap_or(&self.strat_name)
    }

    /// Whether authority attributes have been copied onto this unit
    pub fn is_hydrated(&self) -> bool {
        self.strat_name_id.is_some()
    }
}

// ============================================================================
// Mineral
// ============================================================================

/// Mineral species, with the attributes a mineral authority returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mineral {
    pub mineral: String,
    pub mineral_id: Option<i64>,
    #[serde(alias = "min_type")]
    pub mineral_type: Option<String>,
    pub formula: Option<String>,
    pub formula_tags: Option<String>,
    pub hardness_min: Option<f64>,
    pub hardness_max: Option<f64>,
    pub crystal_form: Option<String>,
    #[serde(alias = "mineral_color")]
    pub color: Option<String>,
    pub lustre: Option<String>,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Mineral {
    pub fn new(mineral: impl Into<String>) -> Self {
        Self {
            mineral: mineral.into(),
            ..Default::default()
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.mineral_id.is_some()
    }
}

// ============================================================================
// Triplet object union
// ============================================================================

/// Object of a triplet; the variant is fixed by the prompt that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripletObject {
    Stratigraphy(Stratigraphy),
    Mineral(Mineral),
}

impl TripletObject {
    /// Promote a raw name into the variant for `kind`
    pub fn from_name(name: impl Into<String>, kind: EntityKind) -> Result<Self> {
        match kind {
            EntityKind::StratName => Ok(TripletObject::Stratigraphy(Stratigraphy::new(name))),
            EntityKind::Mineral => Ok(TripletObject::Mineral(Mineral::new(name))),
            EntityKind::Location => Err(GeoKgError::ValidationError(
                "location is not a valid triplet object kind".to_string(),
            )),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TripletObject::Stratigraphy(s) => &s.strat_name,
            TripletObject::Mineral(m) => &m.mineral,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            TripletObject::Stratigraphy(s) => s.strat_name = name.into(),
            TripletObject::Mineral(m) => m.mineral = name.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            TripletObject::Stratigraphy(_) => EntityKind::StratName,
            TripletObject::Mineral(_) => EntityKind::Mineral,
        }
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            TripletObject::Stratigraphy(s) => s.provenance.as_ref(),
            TripletObject::Mineral(m) => m.provenance.as_ref(),
        }
    }

    pub fn is_hydrated(&self) -> bool {
        match self {
            TripletObject::Stratigraphy(s) => s.is_hydrated(),
            TripletObject::Mineral(m) => m.is_hydrated(),
        }
    }
}

// ============================================================================
// Relationship triplet
// ============================================================================

/// (location, relationship, geo-entity) fact extracted from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTriplet {
    pub subject: Location,
    pub predicate: String,
    pub object: TripletObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl RelationshipTriplet {
    /// Build a triplet from raw strings, promoting the object with `kind`.
    ///
    /// Blank subject, predicate or object is a validation failure.
    pub fn from_raw(subject: &str, predicate: &str, object: &str, kind: EntityKind) -> Result<Self> {
        let subject = require_text("subject", subject)?;
        let predicate = require_text("predicate", predicate)?;
        let object = require_text("object", object)?;

        Ok(Self {
            subject: Location::new(subject),
            predicate: predicate.to_string(),
            object: TripletObject::from_name(object, kind)?,
            provenance: None,
        })
    }

    /// Attach extraction provenance, also seeding it on entities that have none
    pub fn with_provenance(mut self, provenance: Option<Provenance>) -> Self {
        if self.subject.provenance.is_none() {
            self.subject.provenance = provenance.clone();
        }
        let object_provenance = match &mut self.object {
            TripletObject::Stratigraphy(s) => &mut s.provenance,
            TripletObject::Mineral(m) => &mut m.provenance,
        };
        if object_provenance.is_none() {
            *object_provenance = provenance.clone();
        }
        self.provenance = provenance;
        self
    }
}

fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(GeoKgError::ValidationError(format!("empty {field}")))
    } else {
        Ok(trimmed)
    }
}

/// Treat a missing or blank authority string the same way
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None")
}

// ============================================================================
// Geologic time
// ============================================================================

/// Named geologic time interval as listed by a lexicon authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeologicInterval {
    pub name: String,
    /// Interval type, e.g. `period` or `epoch`
    #[serde(default)]
    pub int_type: String,
    #[serde(default)]
    pub b_age: Option<f64>,
    #[serde(default)]
    pub t_age: Option<f64>,
}

impl GeologicInterval {
    pub fn new(name: impl Into<String>, int_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            int_type: int_type.into(),
            b_age: None,
            t_age: None,
        }
    }
}

// ============================================================================
// Graph output
// ============================================================================

/// Triplets extracted from one passage, plus where they came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphOutput {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub hashed_text: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
    pub triplets: Vec<RelationshipTriplet>,
}

impl GraphOutput {
    pub fn new(triplets: Vec<RelationshipTriplet>) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            triplets,
            ..Default::default()
        }
    }

    pub fn with_paper_id(mut self, paper_id: impl Into<String>) -> Self {
        self.paper_id = Some(paper_id.into());
        self
    }

    /// Record the source passage and its SHA-256 digest
    pub fn with_text_content(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.hashed_text = Some(hash_text(&text));
        self.text_content = Some(text);
        self
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }
}

/// Lowercase hex SHA-256 of `text`
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_coordinate_bounds() {
        assert!(Location::new("Madison").with_coordinates(43.07, -89.38).is_ok());
        assert!(Location::new("Nowhere").with_coordinates(91.0, 0.0).is_err());
        assert!(Location::new("Nowhere").with_coordinates(0.0, -180.5).is_err());
        assert!(Location::new("Pole").with_coordinates(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_set_coordinates_appends_one_provenance_node() {
        let mut loc = Location::new("Minnesota").with_provenance(Provenance::new("mixtral"));
        loc.set_coordinates(45.98, 1.31, Provenance::new("geocodingAPI"))
            .unwrap();
        assert_eq!(loc.coordinates(), Some((45.98, 1.31)));
        let chain = loc.provenance.as_ref().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.source_name(), "geocodingAPI");
    }

    #[test]
    fn test_repeated_hydration_keeps_every_source() {
        const STEPS: usize = 5;
        let mut loc = Location::new("Minnesota").with_provenance(Provenance::new("mixtral"));
        for step in 0..STEPS {
            let lat = 40.0 + step as f64;
            loc.set_coordinates(lat, -94.6, Provenance::new(format!("geocoder-{step}")))
                .unwrap();
        }

        assert_eq!(loc.coordinates(), Some((44.0, -94.6)));
        let chain = loc.provenance.as_ref().unwrap();
        assert_eq!(chain.len(), STEPS + 1);
        assert_eq!(chain.source_name(), "geocoder-4");
        for step in 0..STEPS {
            let source = format!("geocoder-{step}");
            assert_eq!(chain.find(&source).map(Provenance::source_name), Some(source.as_str()));
        }
        assert!(chain.find("mixtral").is_some());
        assert_eq!(chain.iter().last().map(Provenance::source_name), Some("mixtral"));
    }

    #[test]
    fn test_set_coordinates_rejects_invalid_without_mutation() {
        let mut loc = Location::new("Minnesota");
        let result = loc.set_coordinates(123.0, 10.0, Provenance::new("geocodingAPI"));
        assert!(result.is_err());
        assert!(loc.coordinates().is_none());
        assert!(loc.provenance.is_none());
    }

    #[test]
    fn test_location_deserialize_validates() {
        let ok: std::result::Result<Location, _> =
            serde_json::from_str(r#"{"name":"Madison","lat":43.0,"lon":-89.0}"#);
        assert!(ok.is_ok());
        let bad: std::result::Result<Location, _> =
            serde_json::from_str(r#"{"name":"Madison","lat":143.0,"lon":-89.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_from_raw_uses_declared_kind() {
        let t = RelationshipTriplet::from_raw(
            "Minnesota",
            "has",
            "Shakopee Formation",
            EntityKind::StratName,
        )
        .unwrap();
        assert!(matches!(t.object, TripletObject::Stratigraphy(_)));
        assert_eq!(t.object.name(), "Shakopee Formation");

        let t = RelationshipTriplet::from_raw("Margnac Mine", "contains", "Agrinierite", EntityKind::Mineral)
            .unwrap();
        assert_eq!(t.object.kind(), EntityKind::Mineral);
    }

    #[test]
    fn test_from_raw_rejects_blank_fields() {
        assert!(RelationshipTriplet::from_raw(" ", "has", "Shakopee", EntityKind::StratName).is_err());
        assert!(RelationshipTriplet::from_raw("Minnesota", "", "Shakopee", EntityKind::StratName).is_err());
        assert!(RelationshipTriplet::from_raw("Minnesota", "has", "Shakopee", EntityKind::Location).is_err());
    }

    #[test]
    fn test_stratigraphy_from_authority_record() {
        let record = r#"{
            "strat_name": "Waldron Shale", "strat_name_long": "Waldron Shale",
            "rank": "Fm", "strat_name_id": 4260, "concept_id": 4273,
            "bed": "", "bed_id": 0, "fm": "Waldron Shale", "fm_id": 4260,
            "gp": "Wayne", "gp_id": 2700, "b_age": 429.65, "t_age": 427.4,
            "b_period": "Silurian", "t_period": "Silurian", "t_units": 9, "ref_id": 1
        }"#;
        let strat: Stratigraphy = serde_json::from_str(record).unwrap();
        assert_eq!(strat.rank.as_deref(), Some("Fm"));
        assert_eq!(strat.gp.as_deref(), Some("Wayne"));
        assert_eq!(non_empty(&strat.bed), None);
        assert_eq!(strat.display_name(), "Waldron Shale");
        assert!(strat.is_hydrated());
    }

    #[test]
    fn test_graph_output_hash() {
        let graph = GraphOutput::new(vec![]).with_text_content("abc");
        assert_eq!(
            graph.hashed_text.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(graph.text_content.as_deref(), Some("abc"));
    }

    #[test]
    fn test_triplet_object_tagged_json() {
        let obj = TripletObject::Mineral(Mineral::new("Agrinierite"));
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "mineral");
        let back: TripletObject = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn test_triplet_provenance_seeds_entities() {
        let model = Provenance::new("mixtral");
        let t = RelationshipTriplet::from_raw("Minnesota", "has", "Shakopee", EntityKind::StratName)
            .unwrap()
            .with_provenance(Some(model.clone()));
        assert_eq!(t.subject.provenance.as_ref(), Some(&model));
        assert_eq!(t.object.provenance(), Some(&model));

        // entities that already carry lineage keep it
        let geocoded = Location::new("Minnesota").with_provenance(Provenance::new("geocodingAPI"));
        let mut t = RelationshipTriplet::from_raw("Minnesota", "has", "Shakopee", EntityKind::StratName)
            .unwrap();
        t.subject = geocoded.clone();
        let t = t.with_provenance(Some(model));
        assert_eq!(t.subject, geocoded);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn coordinates_accepted_iff_in_range(lat in -200.0f64..200.0, lon in -400.0f64..400.0) {
                let in_range = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
                prop_assert_eq!(Location::new("x").with_coordinates(lat, lon).is_ok(), in_range);
            }

            #[test]
            fn hash_is_hex_sha256(text in ".*") {
                let hash = hash_text(&text);
                prop_assert_eq!(hash.len(), 64);
                prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
            }
        }
    }
}
