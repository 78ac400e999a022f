//! GeoJSON point export.
//!
//! Turns a table with Latitude/Longitude columns into a `FeatureCollection`
//! of points in WGS84 (EPSG:4326, lon/lat axis order).

mod aggregate;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo_types::Point;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::Coordinate;
use crate::table::{Table, TableError, LATITUDE_COLUMN, LONGITUDE_COLUMN};

pub use aggregate::aggregate_max;

/// OGC URN for EPSG:4326 with longitude first
pub const CRS84: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub geo_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Crs {
    #[serde(rename = "type")]
    pub crs_type: &'static str,
    pub properties: CrsProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrsProperties {
    pub name: &'static str,
}

impl Default for Crs {
    fn default() -> Self {
        Self {
            crs_type: "name",
            properties: CrsProperties { name: CRS84 },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub geo_type: &'static str,
    pub properties: Map<String, Value>,
    pub geometry: PointGeometry,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub geo_type: &'static str,
    /// [longitude, latitude]
    pub coordinates: [f64; 2],
}

impl From<Point<f64>> for PointGeometry {
    fn from(point: Point<f64>) -> Self {
        Self {
            geo_type: "Point",
            coordinates: [point.x(), point.y()],
        }
    }
}

/// Outcome counts of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub features: usize,
    pub skipped: usize,
}

/// Parse a Latitude/Longitude cell pair. Empty, unparsable or out-of-range
/// values give `None`.
pub(crate) fn parse_location(lat: &str, lon: &str) -> Option<Coordinate> {
    let latitude = lat.trim().parse::<f64>().ok()?;
    let longitude = lon.trim().parse::<f64>().ok()?;
    Some(Coordinate::new(latitude, longitude)).filter(Coordinate::is_valid)
}

/// Type a cell the way a dataframe reader would: integers and floats become
/// numbers, empty cells become null. Values with leading zeros (ZIP codes
/// such as `00501`) stay strings.
pub(crate) fn typed_value(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }

    let digits = cell.trim_start_matches('-');
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if !leading_zero {
        if let Ok(i) = cell.parse::<i64>() {
            return Value::from(i);
        }
        if let Some(f) = cell.parse::<f64>().ok().filter(|v| v.is_finite()) {
            return Value::from(f);
        }
    }
    Value::String(cell.to_string())
}

impl FeatureCollection {
    /// Build one point feature per row with valid coordinates
    pub fn from_table(table: &Table, name: Option<String>) -> Result<(Self, ExportStats), ExportError> {
        let lat_idx = table.column_index(LATITUDE_COLUMN)?;
        let lon_idx = table.column_index(LONGITUDE_COLUMN)?;

        let mut stats = ExportStats::default();
        let mut features = Vec::with_capacity(table.len());

        for row in table.rows() {
            let Some(location) = parse_location(&row[lat_idx], &row[lon_idx]) else {
                stats.skipped += 1;
                continue;
            };

            let properties: Map<String, Value> = table
                .headers()
                .iter()
                .zip(row)
                .map(|(header, cell)| (header.clone(), typed_value(cell)))
                .collect();

            features.push(Feature {
                geo_type: "Feature",
                properties,
                geometry: Point::from(location).into(),
            });
        }

        stats.features = features.len();
        if stats.skipped > 0 {
            warn!("Skipped {} rows without valid coordinates", stats.skipped);
        }

        Ok((
            Self {
                geo_type: "FeatureCollection",
                name,
                crs: Crs::default(),
                features,
            },
            stats,
        ))
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("Wrote {} features to {}", self.features.len(), path.display());
        Ok(())
    }
}

/// Collection name derived from an output path, e.g. `bsw_atx_facilities`
pub fn collection_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.trim_end_matches(".geo").to_string())
}
