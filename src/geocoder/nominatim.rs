//! Nominatim (OpenStreetMap) forward geocoding client.
//!
//! Issues one `/search` request per address. Rate limiting is not done
//! here: the [`Pipeline`](crate::pipeline::Pipeline) spaces the calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{ClientError, GeocodeError, Geocoder};
use crate::models::Coordinate;

/// Connection settings for a Nominatim instance
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Nominatim's usage policy requires an identifying user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Comma-separated ISO 3166-1 alpha-2 codes, empty for no filter
    #[serde(default)]
    pub country_codes: String,
}

fn default_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    format!("geopin/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_timeout_secs() -> u64 {
    10
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            country_codes: String::new(),
        }
    }
}

/// Raw `/search?format=jsonv2` hit; Nominatim sends coordinates as strings
#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: Client,
    search_url: Url,
    country_codes: String,
}

impl NominatimGeocoder {
    pub fn new(config: &NominatimConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let search_url = Url::parse(&format!(
            "{}/search",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|source| ClientError::BaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        Ok(Self {
            client,
            search_url,
            country_codes: config.country_codes.trim().to_string(),
        })
    }

    fn request_url(&self, address: &str) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", address)
                .append_pair("format", "jsonv2")
                .append_pair("limit", "1");
            if !self.country_codes.is_empty() {
                pairs.append_pair("countrycodes", &self.country_codes);
            }
        }
        url
    }
}

fn parse_hits(hits: &[SearchHit]) -> Result<Option<Coordinate>, GeocodeError> {
    let Some(hit) = hits.first() else {
        return Ok(None);
    };

    let latitude: f64 = hit
        .lat
        .trim()
        .parse()
        .map_err(|_| GeocodeError::Parse(format!("invalid latitude '{}'", hit.lat)))?;
    let longitude: f64 = hit
        .lon
        .trim()
        .parse()
        .map_err(|_| GeocodeError::Parse(format!("invalid longitude '{}'", hit.lon)))?;

    Ok(Some(Coordinate::new(latitude, longitude)))
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let response = self
            .client
            .get(self.request_url(address))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        let result = parse_hits(&hits)?;
        debug!(hits = hits.len(), ?result, "Nominatim response");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NominatimConfig::default();
        assert_eq!(config.base_url, "https://nominatim.openstreetmap.org");
        assert!(config.user_agent.starts_with("geopin/"));
        assert_eq!(config.timeout_secs, 10);
        assert!(config.country_codes.is_empty());
    }

    #[test]
    fn test_request_url() {
        let geocoder = NominatimGeocoder::new(&NominatimConfig {
            base_url: "http://localhost:8080/".to_string(),
            country_codes: "us".to_string(),
            ..Default::default()
        })
        .unwrap();

        let url = geocoder.request_url("123 Main St, Austin, TX 78701");
        assert_eq!(url.path(), "/search");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "123 Main St, Austin, TX 78701".into())));
        assert!(pairs.contains(&("format".into(), "jsonv2".into())));
        assert!(pairs.contains(&("limit".into(), "1".into())));
        assert!(pairs.contains(&("countrycodes".into(), "us".into())));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = NominatimGeocoder::new(&NominatimConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        match result {
            Err(ClientError::BaseUrl { url, .. }) => assert_eq!(url, "not a url"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("invalid base url was accepted"),
        }
    }

    #[test]
    fn test_parse_hits() {
        let hits: Vec<SearchHit> =
            serde_json::from_str(r#"[{"lat": "30.2672", "lon": "-97.7431", "display_name": "Austin"}]"#)
                .unwrap();
        assert_eq!(
            parse_hits(&hits).unwrap(),
            Some(Coordinate::new(30.2672, -97.7431))
        );

        assert_eq!(parse_hits(&[]).unwrap(), None);

        let bad = vec![SearchHit {
            lat: "north".into(),
            lon: "0".into(),
        }];
        assert!(matches!(parse_hits(&bad), Err(GeocodeError::Parse(_))));
    }
}
