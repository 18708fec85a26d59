//! Configuration module for the weather archive.
//!
//! Values are read from the process environment (after `.env` is loaded by
//! `dotenvy`) through `figment`. Keys are matched case-insensitively.

use crate::collector::{
    BackoffPolicy, BatchSettings, CollectorSettings, OrchestratorSettings, PortSettings,
};
use crate::data::seed::{GridBounds, SeedSettings, grid_dimensions};
use crate::provider::open_meteo::DEFAULT_CURRENT_FIELDS;
use anyhow::Context;
use custom_debug_derive::Debug as CustomDebug;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(CustomDebug, Deserialize, Clone)]
pub struct Config {
    /// Log level for the application's own targets
    ///
    /// Dependencies are pinned at `warn`; `RUST_LOG` overrides both.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Database connection URL
    ///
    /// A `memory:` URL selects the in-process store (nothing is persisted).
    #[debug(skip)]
    pub database_url: String,

    /// Base URL of the batched current-conditions provider
    #[serde(default = "default_weather_api_url")]
    pub weather_api_url: String,
    /// Base URL of the per-port provider; the slug is appended as a path segment
    #[serde(default = "default_port_api_url")]
    pub port_api_url: String,
    /// Comma-separated `current` fields requested from the batched provider
    #[serde(default = "default_current_fields")]
    pub current_fields: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(
        default = "default_batch_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub batch_delay: Duration,
    /// Attempts per batch, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles after each further failed attempt
    #[serde(
        default = "default_retry_base_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_base_delay: Duration,

    #[serde(
        default = "default_port_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub port_delay: Duration,
    #[serde(
        default = "default_port_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub port_request_timeout: Duration,

    /// Attempts per class flow, including the first
    #[serde(default = "default_class_retries")]
    pub class_retries: u32,
    #[serde(
        default = "default_class_retry_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub class_retry_delay: Duration,
    #[serde(
        default = "default_class_pause",
        deserialize_with = "deserialize_duration"
    )]
    pub class_pause: Duration,

    #[serde(default = "default_city_max_age_hours")]
    pub city_max_age_hours: u32,
    #[serde(default = "default_grid_max_age_hours")]
    pub grid_max_age_hours: u32,
    #[serde(default = "default_port_max_age_hours")]
    pub port_max_age_hours: u32,

    /// Days of history kept by `cleanup` when no `--days` is given
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Grid seed area as `min_lat,min_lon,max_lat,max_lon`
    #[serde(default = "default_grid_bounds")]
    pub grid_bounds: GridBounds,
    /// Grid seed spacing in degrees
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,
}

impl Config {
    /// Extract the configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract().context("Failed to load config")?;
        grid_dimensions(config.grid_bounds, config.grid_step)
            .context("Invalid GRID_BOUNDS/GRID_STEP")?;
        Ok(config)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }

    pub fn current_fields(&self) -> Vec<String> {
        self.current_fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            batch: BatchSettings {
                batch_size: self.batch_size.max(1),
                batch_delay: self.batch_delay,
                backoff: BackoffPolicy::new(self.max_retries, self.retry_base_delay),
            },
            port: PortSettings {
                item_delay: self.port_delay,
                request_timeout: self.port_request_timeout,
            },
            seed: SeedSettings {
                grid_bounds: self.grid_bounds,
                grid_step: self.grid_step,
            },
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let hours = |h: u32| chrono::Duration::hours(i64::from(h));
        OrchestratorSettings {
            class_attempts: self.class_retries.max(1),
            class_retry_delay: self.class_retry_delay,
            class_pause: self.class_pause,
            city_max_age: hours(self.city_max_age_hours),
            grid_max_age: hours(self.grid_max_age_hours),
            port_max_age: hours(self.port_max_age_hours),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_weather_api_url() -> String {
    "https://api.open-meteo.com".to_string()
}

fn default_port_api_url() -> String {
    "http://localhost:8081/ports".to_string()
}

fn default_current_fields() -> String {
    DEFAULT_CURRENT_FIELDS.join(",")
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_port_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_port_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_class_retries() -> u32 {
    3
}

fn default_class_retry_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_class_pause() -> Duration {
    Duration::from_secs(2)
}

fn default_city_max_age_hours() -> u32 {
    1
}

fn default_grid_max_age_hours() -> u32 {
    3
}

fn default_port_max_age_hours() -> u32 {
    6
}

fn default_retention_days() -> u32 {
    90
}

fn default_grid_bounds() -> GridBounds {
    GridBounds {
        min_lat: 24.0,
        min_lon: -125.0,
        max_lat: 50.0,
        max_lon: -66.0,
    }
}

fn default_grid_step() -> f64 {
    2.0
}

/// Duration parser accepting `ms`, `s`, `m` and `h` units; bare numbers are seconds.
const DURATION_PARSER: DurationParser = DurationParser::with_time_units(&[
    TimeUnit::MilliSecond,
    TimeUnit::Second,
    TimeUnit::Minute,
    TimeUnit::Hour,
]);

pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parsed = DURATION_PARSER
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration '{raw}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

/// Deserialize a duration from a whole number of seconds or a string like `500ms`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
