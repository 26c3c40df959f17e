//! Macrostrat lexicon hydrator
//!
//! Looks stratigraphic names and minerals up in a Macrostrat-compatible API
//! (`{"success": {"v": ..., "data": [...]}}` envelopes) and copies matching
//! records onto triplet objects. The same client also serves the full name
//! lists used to build alignment vocabularies and the interval list used by
//! the ontology serializer.

use crate::hydrator::{sanitize_query, HydrationOutcome, ObjectHydrator};
use crate::rate_limit::RateLimitedClient;
use async_trait::async_trait;
use geokg_core::schema::non_empty;
use geokg_core::{
    AuthorityConfig, GeoKgError, GeologicInterval, Mineral, Provenance, Result, Stratigraphy,
    TripletObject,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Trailing words that name a rank rather than the unit itself
const RANK_WORDS: &[&str] = &[
    "formation",
    "member",
    "group",
    "subgroup",
    "supergroup",
    "bed",
    "beds",
    "fm",
    "mbr",
    "gp",
    "sgp",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: Payload<T>,
}

#[derive(Debug, Deserialize)]
struct Payload<T> {
    #[serde(default)]
    v: Option<Value>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StratNameRecord {
    strat_name: String,
    #[serde(default)]
    strat_name_long: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MineralNameRecord {
    mineral: String,
}

/// `"Shakopee Formation"` → `Some("Shakopee")`
fn strip_rank_word(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    let (head, last) = trimmed.rsplit_once(' ')?;
    let head = head.trim_end();
    (!head.is_empty() && RANK_WORDS.contains(&last.to_lowercase().as_str())).then_some(head)
}

/// Stratigraphy and mineral hydrator backed by Macrostrat
pub struct MacrostratHydrator {
    client: Arc<RateLimitedClient>,
    base_url: String,
    source_name: String,
    exact_match: bool,
}

impl MacrostratHydrator {
    pub fn new(client: Arc<RateLimitedClient>, config: &AuthorityConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            source_name: config.source_name.clone(),
            exact_match: config.exact_match,
        }
    }

    fn url(&self, route: &str, params: &[(&str, &str)]) -> std::result::Result<Url, String> {
        let endpoint = format!("{}{route}", self.base_url);
        Url::parse_with_params(&endpoint, params).map_err(|e| format!("invalid authority url: {e}"))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> std::result::Result<(Vec<T>, Option<String>), String> {
        let response = self
            .client
            .get(url)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "rate limit retries exhausted".to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("authority returned {status}: {body}"));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| format!("invalid authority response: {e}"))?;

        let version = envelope.success.v.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Ok((envelope.success.data, version))
    }

    fn provenance(&self, route: &str, id_key: &str, id: Option<i64>, version: Option<String>) -> Provenance {
        let url = match id {
            Some(id) => format!("{}{route}?{id_key}={id}", self.base_url),
            None => format!("{}{route}", self.base_url),
        };
        let mut provenance = Provenance::new(&self.source_name).with_url(url);
        if let Some(version) = version {
            provenance = provenance.with_version(version);
        }
        if let Some(id) = id {
            provenance = provenance.with_value(id_key, id);
        }
        provenance
    }

    async fn query_strat(&self, name: &str) -> std::result::Result<Option<(Stratigraphy, Option<String>)>, String> {
        let sanitized = sanitize_query(name);
        let url = self.url("/defs/strat_names", &[("strat_name", sanitized.as_str())])?;
        let (records, version) = self.fetch::<Stratigraphy>(url).await?;

        let found = records.into_iter().find(|record| {
            !self.exact_match
                || record.strat_name.eq_ignore_ascii_case(&sanitized)
                || non_empty(&record.strat_name_long)
                    .is_some_and(|long| long.eq_ignore_ascii_case(&sanitized))
        });
        Ok(found.map(|record| (record, version)))
    }

    /// Authority record for a stratigraphic name.
    ///
    /// A trailing rank word is dropped and the lookup repeated when the full
    /// name has no match.
    pub async fn find_strat(&self, name: &str) -> std::result::Result<Option<(Stratigraphy, Provenance)>, String> {
        let mut found = self.query_strat(name).await?;
        if found.is_none() {
            if let Some(bare) = strip_rank_word(name) {
                tracing::debug!(name, bare, "Retrying without rank word");
                found = self.query_strat(bare).await?;
            }
        }

        Ok(found.map(|(record, version)| {
            let provenance =
                self.provenance("/defs/strat_names", "strat_name_id", record.strat_name_id, version);
            (record, provenance)
        }))
    }

    /// Authority record for a mineral name
    pub async fn find_mineral(&self, name: &str) -> std::result::Result<Option<(Mineral, Provenance)>, String> {
        let sanitized = sanitize_query(name);
        let url = self.url("/defs/minerals", &[("mineral", sanitized.as_str())])?;
        let (records, version) = self.fetch::<Mineral>(url).await?;

        let found = records
            .into_iter()
            .find(|record| !self.exact_match || record.mineral.eq_ignore_ascii_case(&sanitized));

        Ok(found.map(|record| {
            let provenance = self.provenance("/defs/minerals", "mineral_id", record.mineral_id, version);
            (record, provenance)
        }))
    }

    // ========================================================================
    // Vocabulary fetchers
    // ========================================================================

    /// Every stratigraphic name, sorted and de-duplicated
    pub async fn fetch_strat_names(&self, long: bool) -> Result<Vec<String>> {
        let url = self
            .url("/defs/strat_names", &[("all", "")])
            .map_err(GeoKgError::AuthorityError)?;
        let (records, _) = self
            .fetch::<StratNameRecord>(url)
            .await
            .map_err(GeoKgError::AuthorityError)?;

        let names: BTreeSet<String> = records
            .into_iter()
            .map(|r| match (long, non_empty(&r.strat_name_long)) {
                (true, Some(long_name)) => long_name.to_string(),
                _ => r.strat_name,
            })
            .filter(|n| !n.trim().is_empty())
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Every mineral name, sorted and de-duplicated
    pub async fn fetch_mineral_names(&self) -> Result<Vec<String>> {
        let url = self
            .url("/defs/minerals", &[("all", "")])
            .map_err(GeoKgError::AuthorityError)?;
        let (records, _) = self
            .fetch::<MineralNameRecord>(url)
            .await
            .map_err(GeoKgError::AuthorityError)?;

        let names: BTreeSet<String> = records
            .into_iter()
            .map(|r| r.mineral)
            .filter(|n| !n.trim().is_empty())
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Every geologic time interval
    pub async fn fetch_intervals(&self) -> Result<Vec<GeologicInterval>> {
        let url = self
            .url("/defs/intervals", &[("all", "")])
            .map_err(GeoKgError::AuthorityError)?;
        let (records, _) = self
            .fetch::<GeologicInterval>(url)
            .await
            .map_err(GeoKgError::AuthorityError)?;
        tracing::info!(count = records.len(), "Fetched geologic intervals");
        Ok(records)
    }
}

#[async_trait]
impl ObjectHydrator for MacrostratHydrator {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn hydrate_object(&self, object: &mut TripletObject) -> HydrationOutcome {
        let name = object.name().to_string();
        let result = match object {
            TripletObject::Stratigraphy(strat) => match self.find_strat(&name).await {
                Ok(Some((mut record, provenance))) => {
                    record.provenance = Some(provenance.chain(strat.provenance.take()));
                    *strat = record;
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            },
            TripletObject::Mineral(mineral) => match self.find_mineral(&name).await {
                Ok(Some((mut record, provenance))) => {
                    record.provenance = Some(provenance.chain(mineral.provenance.take()));
                    *mineral = record;
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(true) => {
                tracing::debug!(name = %name, "Hydrated object from authority");
                HydrationOutcome::Hydrated
            }
            Ok(false) => {
                tracing::warn!(name = %name, kind = %object.kind(), "No authority record found");
                HydrationOutcome::NoMatch
            }
            Err(reason) => {
                tracing::warn!(name = %name, %reason, "Authority lookup failed");
                HydrationOutcome::Failed(reason)
            }
        }
    }
}
