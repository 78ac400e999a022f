//! CSV tables in and out of the geocoder.

mod template;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::AddressRecord;

pub use template::AddressTemplate;

pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";
pub const STATUS_COLUMN: &str = "Status";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("invalid address template: {0}")]
    Template(String),

    #[error("column has {got} values but the table has {expected} rows")]
    LengthMismatch { expected: usize, got: usize },
}

/// Header row plus string cells; every row has exactly the header width
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Short rows are padded with empty cells. Cells past the last header
    /// have no column to live in and are dropped with a warning.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let mut rows = rows;
        for (i, row) in rows.iter_mut().enumerate() {
            if row.len() > width {
                let extra = &row[width..];
                if extra.iter().any(|cell| !cell.trim().is_empty()) {
                    warn!(
                        "Row {} has {} cells but the header has {}; dropping {:?}",
                        i + 1,
                        row.len(),
                        width,
                        extra
                    );
                }
                row.truncate(width);
            } else {
                row.resize(width, String::new());
            }
        }
        Self { headers, rows }
    }

    /// Load a CSV file; `.gz` files are decompressed on the fly
    pub fn from_csv_path(path: &Path) -> Result<Self, TableError> {
        info!("Loading table from {}", path.display());

        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let table = Self::from_reader(reader)?;
        info!("Loaded {} rows", table.len());
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self::new(headers, rows))
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableError> {
        let file = File::create(path)?;
        self.to_writer(file)?;
        info!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut csv_writer = WriterBuilder::new().from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Replace the named column, or append it when absent
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                expected: self.rows.len(),
                got: values.len(),
            });
        }

        match self.column_index(name) {
            Ok(i) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[i] = value;
                }
            }
            Err(_) => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Compose one address per row
    pub fn addresses(&self, template: &AddressTemplate) -> Vec<String> {
        self.rows.iter().map(|row| template.render(row)).collect()
    }

    /// Attach Latitude, Longitude and Status columns, one record per row
    pub fn attach_geocodes(&mut self, records: &[AddressRecord]) -> Result<(), TableError> {
        let latitudes = records
            .iter()
            .map(|r| r.latitude().map(|v| v.to_string()).unwrap_or_default())
            .collect();
        let longitudes = records
            .iter()
            .map(|r| r.longitude().map(|v| v.to_string()).unwrap_or_default())
            .collect();
        let statuses = records.iter().map(|r| r.status().to_string()).collect();

        self.set_column(LATITUDE_COLUMN, latitudes)?;
        self.set_column(LONGITUDE_COLUMN, longitudes)?;
        self.set_column(STATUS_COLUMN, statuses)
    }
}
