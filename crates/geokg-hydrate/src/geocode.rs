//! Geocoder hydrator
//!
//! Resolves location names to coordinates with a `maps.co`-style search API
//! returning `[{"lat": "...", "lon": "..."}]`.

use crate::hydrator::{sanitize_query, HydrationOutcome, LocationHydrator};
use crate::rate_limit::RateLimitedClient;
use async_trait::async_trait;
use geokg_core::schema::{validate_latitude, validate_longitude};
use geokg_core::{GeocoderConfig, Location, Provenance};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    lat: Value,
    lon: Value,
}

/// Coordinates come back as strings from some providers and numbers from others
fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Location hydrator backed by a geocoding search API
pub struct GeocodeHydrator {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: Option<String>,
    source_name: String,
    source_version: String,
}

impl GeocodeHydrator {
    pub fn new(client: Arc<RateLimitedClient>, config: &GeocoderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            source_name: config.source_name.clone(),
            source_version: config.source_version.clone(),
        }
    }

    /// Request URL and its key-free form for provenance
    fn urls(&self, name: &str) -> Result<(Url, Url), String> {
        let endpoint = format!("{}/search", self.base_url);
        let query = sanitize_query(name);

        let public = Url::parse_with_params(&endpoint, &[("q", query.as_str())])
            .map_err(|e| format!("invalid geocoder url: {e}"))?;
        let request = match &self.api_key {
            Some(key) => Url::parse_with_params(&endpoint, &[("q", query.as_str()), ("api_key", key.as_str())])
                .map_err(|e| format!("invalid geocoder url: {e}"))?,
            None => public.clone(),
        };
        Ok((request, public))
    }

    /// Coordinates and provenance for `name`, or `None` when nothing matched
    pub async fn lookup(&self, name: &str) -> Result<Option<(f64, f64, Provenance)>, String> {
        let (request_url, public_url) = self.urls(name)?;

        let response = self
            .client
            .get(request_url)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "rate limit retries exhausted".to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("geocoder returned {status}: {body}"));
        }

        let results: Vec<GeocodeResult> = response
            .json()
            .await
            .map_err(|e| format!("invalid geocoder response: {e}"))?;

        let Some(first) = results.first() else {
            return Ok(None);
        };

        let lat = coordinate(&first.lat).ok_or_else(|| format!("unparseable lat {}", first.lat))?;
        let lon = coordinate(&first.lon).ok_or_else(|| format!("unparseable lon {}", first.lon))?;
        validate_latitude(lat).map_err(|e| e.to_string())?;
        validate_longitude(lon).map_err(|e| e.to_string())?;

        let provenance = Provenance::new(&self.source_name)
            .with_url(public_url.as_str())
            .with_version(&self.source_version);
        Ok(Some((lat, lon, provenance)))
    }
}

#[async_trait]
impl LocationHydrator for GeocodeHydrator {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn hydrate_location(&self, location: &mut Location) -> HydrationOutcome {
        match self.lookup(&location.name).await {
            Ok(Some((lat, lon, provenance))) => match location.set_coordinates(lat, lon, provenance) {
                Ok(()) => {
                    tracing::debug!(location = %location.name, lat, lon, "Geocoded location");
                    HydrationOutcome::Hydrated
                }
                Err(e) => HydrationOutcome::Failed(e.to_string()),
            },
            Ok(None) => {
                tracing::info!(location = %location.name, "No geocoder match");
                HydrationOutcome::NoMatch
            }
            Err(reason) => {
                tracing::warn!(location = %location.name, %reason, "Geocoding failed");
                HydrationOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geokg_core::RateLimitConfig;
    use mockito::Matcher;

    fn hydrator(base_url: String, api_key: Option<&str>) -> GeocodeHydrator {
        let config = GeocoderConfig {
            base_url,
            api_key: api_key.map(str::to_string),
            rate_limit: RateLimitConfig {
                interval_secs: 0.0,
                ..RateLimitConfig::default()
            },
            ..GeocoderConfig::default()
        };
        let client = Arc::new(RateLimitedClient::new("geocoder", &config.rate_limit).unwrap());
        GeocodeHydrator::new(client, &config)
    }

    #[test]
    fn test_coordinate_accepts_strings_and_numbers() {
        assert_eq!(coordinate(&Value::from("43.074761")), Some(43.074761));
        assert_eq!(coordinate(&Value::from(-89.38)), Some(-89.38));
        assert_eq!(coordinate(&Value::from("north")), None);
        assert_eq!(coordinate(&Value::Null), None);
    }

    #[test]
    fn test_public_url_omits_key() {
        let h = hydrator("https://geocode.maps.co".to_string(), Some("secret"));
        let (request, public) = h.urls("Madison, WI").unwrap();
        assert!(request.as_str().contains("api_key=secret"));
        assert!(!public.as_str().contains("secret"));
        assert_eq!(public.as_str(), "https://geocode.maps.co/search?q=Madison%2C+WI");
    }

    #[tokio::test]
    async fn test_hydrates_string_coordinates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "Madison".into()),
                Matcher::UrlEncoded("api_key".into(), "k".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"lat":"43.074761","lon":"-89.3837613"}]"#)
            .create_async()
            .await;

        let h = hydrator(server.url(), Some("k"));
        let mut location = Location::new("Madison");
        assert_eq!(h.hydrate_location(&mut location).await, HydrationOutcome::Hydrated);
        assert_eq!(location.coordinates(), Some((43.074761, -89.3837613)));

        let provenance = location.provenance.as_ref().unwrap();
        assert_eq!(provenance.source_name(), "geocodingAPI");
        assert!(!provenance.source_url().unwrap().contains("api_key"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_result_is_no_match() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let h = hydrator(server.url(), None);
        let mut location = Location::new("Atlantis");
        assert_eq!(h.hydrate_location(&mut location).await, HydrationOutcome::NoMatch);
        assert!(location.coordinates().is_none());
        assert!(location.provenance.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_leave_location_untouched() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"lat":"143.0","lon":"10.0"}]"#)
            .create_async()
            .await;

        let h = hydrator(server.url(), None);
        let mut location = Location::new("Nowhere");
        assert!(matches!(
            h.hydrate_location(&mut location).await,
            HydrationOutcome::Failed(_)
        ));
        assert!(location.coordinates().is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_soft_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let h = hydrator(server.url(), None);
        let mut location = Location::new("Madison");
        assert!(matches!(
            h.hydrate_location(&mut location).await,
            HydrationOutcome::Failed(_)
        ));
    }
}
