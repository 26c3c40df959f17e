//! Geologic time interval vocabulary
//!
//! Maps interval names such as `Ordovician` onto `gst:` classes
//! (`gst:OrdovicianPeriod`).

use crate::namespace::GST;
use crate::rdf::NamedNode;
use geokg_core::{GeoKgError, GeologicInterval, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// `"late ordovician"` → `"Late Ordovician"`
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if previous_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}

/// Title-cased name with spaces and quotes removed
pub fn class_local_name(value: &str) -> String {
    title_case(value.trim())
        .chars()
        .filter(|c| !matches!(c, ' ' | '"'))
        .collect()
}

const PHANEROZOIC_PERIODS: &[(&str, f64, f64)] = &[
    ("Cambrian", 538.8, 485.4),
    ("Ordovician", 485.4, 443.8),
    ("Silurian", 443.8, 419.2),
    ("Devonian", 419.2, 358.9),
    ("Carboniferous", 358.9, 298.9),
    ("Permian", 298.9, 251.902),
    ("Triassic", 251.902, 201.4),
    ("Jurassic", 201.4, 145.0),
    ("Cretaceous", 145.0, 66.0),
    ("Paleogene", 66.0, 23.03),
    ("Neogene", 23.03, 2.58),
    ("Quaternary", 2.58, 0.0),
];

#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalFile {
    List(Vec<GeologicInterval>),
    Envelope { success: IntervalData },
}

#[derive(Deserialize)]
struct IntervalData {
    data: Vec<GeologicInterval>,
}

/// Interval name → `gst:` class IRI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalVocabulary {
    classes: BTreeMap<String, NamedNode>,
}

impl IntervalVocabulary {
    pub fn from_records(intervals: &[GeologicInterval]) -> Self {
        let classes = intervals
            .iter()
            .filter(|i| !i.name.trim().is_empty())
            .map(|interval| {
                let key = class_local_name(&interval.name);
                let class = GST.term(&format!(
                    "{key}{}",
                    title_case(&interval.int_type).replace(' ', "")
                ));
                (key, class)
            })
            .collect();
        Self { classes }
    }

    /// Phanerozoic periods, for use without an authority
    pub fn builtin() -> Self {
        let records: Vec<_> = PHANEROZOIC_PERIODS
            .iter()
            .map(|(name, b_age, t_age)| GeologicInterval {
                name: (*name).to_string(),
                int_type: "period".to_string(),
                b_age: Some(*b_age),
                t_age: Some(*t_age),
            })
            .collect();
        Self::from_records(&records)
    }

    /// Load a JSON list of intervals, bare or inside a
    /// `{"success": {"data": [...]}}` envelope
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: IntervalFile = serde_json::from_str(&content).map_err(|e| {
            GeoKgError::SerializationError(format!("{}: {e}", path.display()))
        })?;
        let records = match file {
            IntervalFile::List(records) => records,
            IntervalFile::Envelope { success } => success.data,
        };
        tracing::debug!(path = %path.display(), count = records.len(), "Loaded interval vocabulary");
        Ok(Self::from_records(&records))
    }

    /// Class for an interval name as it appears on a stratigraphic record
    pub fn class_for(&self, name: &str) -> Option<NamedNode> {
        self.classes
            .get(&class_local_name(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
