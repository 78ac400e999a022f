//! Optional TOML configuration for the geocoding run.
//!
//! ```toml
//! [nominatim]
//! base_url = "https://nominatim.openstreetmap.org"
//! user_agent = "tagbswfacilites"
//! country_codes = "us"
//!
//! [pipeline]
//! min_delay_seconds = 5.0
//! cache = true
//! retries = 1
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::geocoder::NominatimConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min delay must be a finite, non-negative number of seconds, got {0}")]
    InvalidDelay(f64),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub nominatim: NominatimConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_min_delay_seconds")]
    pub min_delay_seconds: f64,
    #[serde(default = "default_cache")]
    pub cache: bool,
    #[serde(default)]
    pub retries: usize,
}

/// Nominatim's public instance allows one request per second
const fn default_min_delay_seconds() -> f64 {
    1.0
}

const fn default_cache() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_delay_seconds: default_min_delay_seconds(),
            cache: default_cache(),
            retries: 0,
        }
    }
}

impl PipelineConfig {
    pub fn min_delay(&self) -> Result<Duration, ConfigError> {
        min_delay_from_secs(self.min_delay_seconds)
    }
}

pub fn min_delay_from_secs(seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidDelay(seconds))
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub min_delay_seconds: Option<f64>,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub country_codes: Option<String>,
    pub no_cache: bool,
    pub retries: Option<usize>,
}

impl Config {
    /// Apply command-line overrides; unset values keep the file's setting
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(delay) = overrides.min_delay_seconds {
            self.pipeline.min_delay_seconds = delay;
        }
        if let Some(url) = overrides.base_url {
            self.nominatim.base_url = url;
        }
        if let Some(agent) = overrides.user_agent {
            self.nominatim.user_agent = agent;
        }
        if let Some(codes) = overrides.country_codes {
            self.nominatim.country_codes = codes;
        }
        if overrides.no_cache {
            self.pipeline.cache = false;
        }
        if let Some(retries) = overrides.retries {
            self.pipeline.retries = retries;
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.pipeline.min_delay()?;
        Ok(config)
    }
}
