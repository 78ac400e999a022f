//! geopin - batch address geocoding and GeoJSON export
//!
//! This library provides the pipeline and table/export modules shared by
//! the geocode and export binaries.

pub mod config;
pub mod geocoder;
pub mod geojson;
pub mod models;
pub mod pipeline;
pub mod table;

pub use geocoder::{ClientError, GeocodeError, Geocoder, NominatimGeocoder};
pub use models::{AddressRecord, Coordinate, Status};
pub use pipeline::{resolve, Pipeline};
