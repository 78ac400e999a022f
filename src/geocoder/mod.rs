//! Geocoding capability and its providers.

mod nominatim;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Coordinate;

pub use nominatim::{NominatimConfig, NominatimGeocoder};

/// Reasons a geocoding call failed.
///
/// "No match" is not an error: providers return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Request(String),

    #[error("geocoding request timed out")]
    Timeout,

    #[error("geocoding service returned HTTP {0}")]
    Status(u16),

    #[error("geocoding response could not be parsed: {0}")]
    Parse(String),
}

/// Reasons a provider client could not be built
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base url '{url}': {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Resolves a free-text address to a coordinate.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError>;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
        (**self).geocode(address).await
    }
}
