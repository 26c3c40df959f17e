//! Triplet parser
//!
//! Turns raw language-model output into a [`GraphOutput`]. The payload may be
//! wrapped in Markdown fences or prose, and may be either an object with a
//! `triplets` array or a bare array. Malformed entries are dropped and
//! reported; only an unparseable payload or a missing triplet container is
//! fatal.

use crate::prompt::PromptHandler;
use geokg_core::{GeoKgError, GraphOutput, Provenance, RelationshipTriplet, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Entry that could not be turned into a triplet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedTriplet {
    /// Position in the triplet container
    pub index: usize,
    pub reason: String,
    pub raw: Value,
}

/// Parse model output, attaching `provenance` to every triplet
pub fn parse(raw: &str, handler: &PromptHandler, provenance: Option<Provenance>) -> Result<GraphOutput> {
    parse_with_report(raw, handler, provenance).map(|(graph, _)| graph)
}

/// Like [`parse`], also returning the entries that were dropped
pub fn parse_with_report(
    raw: &str,
    handler: &PromptHandler,
    provenance: Option<Provenance>,
) -> Result<(GraphOutput, Vec<DroppedTriplet>)> {
    let payload = decode_payload(raw)?;
    let entries = triplet_container(payload)?;

    let mut triplets = Vec::with_capacity(entries.len());
    let mut dropped = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match to_triplet(&entry, handler) {
            Ok(triplet) => triplets.push(triplet.with_provenance(provenance.clone())),
            Err(reason) => {
                tracing::warn!(
                    index,
                    reason = %reason,
                    prompt = %handler.version,
                    "Dropping malformed triplet"
                );
                dropped.push(DroppedTriplet {
                    index,
                    reason,
                    raw: entry,
                });
            }
        }
    }

    tracing::info!(
        parsed = triplets.len(),
        dropped = dropped.len(),
        prompt = %handler.version,
        "Parsed model output"
    );

    Ok((GraphOutput::new(triplets), dropped))
}

fn to_triplet(entry: &Value, handler: &PromptHandler) -> std::result::Result<RelationshipTriplet, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| format!("entry is not an object: {entry}"))?;

    let subject = string_field(object, &handler.subject_key)?;
    let predicate = string_field(object, &handler.predicate_key)?;
    let obj = string_field(object, &handler.object_key)?;

    RelationshipTriplet::from_raw(subject, predicate, obj, handler.object_kind)
        .map_err(|e| e.to_string())
}

fn string_field<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
) -> std::result::Result<&'a str, String> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(format!("'{key}' is not a string: {other}")),
        None => Err(format!("missing key '{key}'")),
    }
}

fn triplet_container(payload: Value) -> Result<Vec<Value>> {
    match payload {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => match map.remove("triplets") {
            Some(Value::Array(entries)) => Ok(entries),
            Some(other) => Err(GeoKgError::ParseError(format!(
                "'triplets' is not an array: {other}"
            ))),
            None => Err(GeoKgError::ParseError(
                "Response does not contain 'triplets' key".to_string(),
            )),
        },
        other => Err(GeoKgError::ParseError(format!(
            "expected a JSON object or array, got {other}"
        ))),
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").ok())
        .as_ref()
}

/// Find the JSON value in raw model output
fn decode_payload(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(fenced) = fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
    {
        if let Ok(value) = serde_json::from_str::<Value>(fenced.as_str().trim()) {
            return Ok(value);
        }
    }

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(GeoKgError::ParseError(format!(
        "model output is not valid JSON: {first_error}"
    )))
}
