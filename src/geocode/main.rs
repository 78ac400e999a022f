//! Batch geocoder.
//!
//! Reads a CSV of addresses, resolves each row through Nominatim with a
//! minimum delay between requests, and writes the table back out with
//! Latitude, Longitude and Status columns.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geopin::config::{min_delay_from_secs, Config, Overrides};
use geopin::pipeline::{BatchSummary, GeocodeCache, Pipeline};
use geopin::table::{AddressTemplate, Table};
use geopin::NominatimGeocoder;

#[derive(Parser, Debug)]
#[command(name = "geocode")]
#[command(about = "Geocode the addresses of a CSV file")]
struct Args {
    /// Input CSV file (may be gzip-compressed)
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    output: PathBuf,

    /// Column holding the full address
    #[arg(long, conflicts_with = "address_template", required_unless_present = "address_template")]
    address_column: Option<String>,

    /// Address pattern built from columns, e.g. "{Address 1}, {City}, {State} {Zip Code}"
    #[arg(long)]
    address_template: Option<String>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum seconds between geocoding requests
    #[arg(long)]
    min_delay: Option<f64>,

    /// Nominatim base URL
    #[arg(long)]
    base_url: Option<String>,

    /// User agent sent to Nominatim
    #[arg(long)]
    user_agent: Option<String>,

    /// Restrict matches to these country codes (comma-separated)
    #[arg(long)]
    country_codes: Option<String>,

    /// Look up duplicate addresses again instead of reusing the first answer
    #[arg(long)]
    no_cache: bool,

    /// Passes over failed lookups after the batch
    #[arg(long)]
    retries: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(Overrides {
        min_delay_seconds: args.min_delay,
        base_url: args.base_url.clone(),
        user_agent: args.user_agent.clone(),
        country_codes: args.country_codes.clone(),
        no_cache: args.no_cache,
        retries: args.retries,
    });
    let min_delay = min_delay_from_secs(config.pipeline.min_delay_seconds)?;

    info!("geopin geocoder");
    info!("Input: {}", args.input.display());
    info!(
        "Nominatim at {} ({:?} between requests)",
        config.nominatim.base_url, min_delay
    );

    let mut table = Table::from_csv_path(&args.input).context("Failed to read input table")?;

    let template = match (&args.address_column, &args.address_template) {
        (_, Some(pattern)) => AddressTemplate::parse(pattern, table.headers()),
        (Some(column), None) => AddressTemplate::single_column(column, table.headers()),
        (None, None) => anyhow::bail!("either --address-column or --address-template is required"),
    }
    .context("Failed to build address template")?;
    let addresses = table.addresses(&template);

    let geocoder =
        NominatimGeocoder::new(&config.nominatim).context("Failed to create Nominatim client")?;
    let cache = config.pipeline.cache.then(GeocodeCache::new);
    let mut pipeline = Pipeline::with_cache(geocoder, min_delay, cache);

    let pb = ProgressBar::new(addresses.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (eta {eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut records = pipeline.resolve_with(&addresses, |_| pb.inc(1)).await;
    pb.finish_and_clear();

    if config.pipeline.retries > 0 {
        let remaining = pipeline
            .retry_service_errors(&mut records, config.pipeline.retries)
            .await;
        info!("{} lookups still failing after retries", remaining);
    }

    table
        .attach_geocodes(&records)
        .context("Failed to attach coordinates")?;
    table
        .write_csv_path(&args.output)
        .context("Failed to write output table")?;

    let summary = BatchSummary::from_records(&records);
    info!(
        "Geocoding complete: {} resolved, {} not found, {} service errors. Data has been saved to {}",
        summary.resolved,
        summary.not_found,
        summary.service_errors,
        args.output.display()
    );

    Ok(())
}
