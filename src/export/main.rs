//! GeoJSON exporter.
//!
//! Converts a geocoded CSV (Latitude/Longitude columns) into a GeoJSON
//! point FeatureCollection in EPSG:4326, optionally collapsing rows that
//! share a location first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geopin::geojson::{aggregate_max, collection_name, FeatureCollection};
use geopin::table::Table;

#[derive(Parser, Debug)]
#[command(name = "export")]
#[command(about = "Export a geocoded CSV as GeoJSON points")]
struct Args {
    /// Geocoded CSV file (may be gzip-compressed)
    #[arg(short, long)]
    input: PathBuf,

    /// Output GeoJSON file
    #[arg(short, long)]
    output: PathBuf,

    /// Columns to group by along with the location (comma-separated)
    #[arg(long, value_delimiter = ',', requires = "max")]
    group_by: Vec<String>,

    /// Column to aggregate with max() within each group
    #[arg(long)]
    max: Option<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("geopin export");
    let table = Table::from_csv_path(&args.input).context("Failed to read input table")?;

    let table = match &args.max {
        Some(column) => aggregate_max(&table, &args.group_by, column)
            .context("Failed to aggregate rows")?,
        None => table,
    };

    let (collection, stats) = FeatureCollection::from_table(&table, collection_name(&args.output))
        .context("Failed to build feature collection")?;
    collection
        .write_to_path(&args.output)
        .context("Failed to write GeoJSON")?;

    info!(
        "Exported {} features ({} rows without coordinates skipped)",
        stats.features, stats.skipped
    );
    Ok(())
}
