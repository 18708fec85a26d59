//! Batched current-conditions client for the Open-Meteo forecast API.
//!
//! One request carries many coordinates as comma-separated `latitude` and
//! `longitude` lists; the answer holds one result per coordinate, in order.

use crate::data::models::Coordinates;
use crate::provider::errors::ProviderError;
use crate::provider::json::parse_json;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Current-condition fields requested when none are configured.
pub const DEFAULT_CURRENT_FIELDS: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "apparent_temperature",
    "precipitation",
    "weather_code",
    "cloud_cover",
    "pressure_msl",
    "wind_speed_10m",
    "wind_direction_10m",
    "wind_gusts_10m",
];

/// Conditions for one submitted coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConditions {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub utc_offset_seconds: Option<i32>,
    pub current: Map<String, Value>,
}

impl LocationConditions {
    /// The opaque payload stored on a snapshot.
    pub fn into_weather_data(self) -> Value {
        json!({
            "current": self.current,
            "timezone": self.timezone,
            "utc_offset_seconds": self.utc_offset_seconds,
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}

/// A provider answering many coordinates in one call.
#[async_trait]
pub trait CurrentConditionsApi: Send + Sync {
    /// Fetch current conditions, one result per coordinate in submission order.
    async fn fetch_current(
        &self,
        coordinates: &[Coordinates],
    ) -> Result<Vec<LocationConditions>, ProviderError>;
}

pub struct OpenMeteoClient {
    http: reqwest::Client,
    endpoint: Url,
    fields: Vec<String>,
}

impl OpenMeteoClient {
    pub fn new(base_url: &str, fields: Vec<String>) -> anyhow::Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("v1/forecast"))
            .with_context(|| format!("invalid weather API URL '{base_url}'"))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("wxarchive/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let fields = if fields.is_empty() {
            DEFAULT_CURRENT_FIELDS.iter().map(|f| f.to_string()).collect()
        } else {
            fields
        };

        Ok(Self {
            http,
            endpoint,
            fields,
        })
    }

    fn request_url(&self, coordinates: &[Coordinates]) -> Url {
        let join = |f: fn(&Coordinates) -> f64| {
            coordinates
                .iter()
                .map(|c| format!("{:.4}", f(c)))
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &join(|c| c.lat))
            .append_pair("longitude", &join(|c| c.lon))
            .append_pair("current", &self.fields.join(","))
            .append_pair("timezone", "auto");
        url
    }
}

/// Decode a forecast body: a JSON array for several coordinates, a bare object for one.
pub fn parse_forecast_body(body: &str) -> anyhow::Result<Vec<LocationConditions>> {
    if body.trim_start().starts_with('[') {
        parse_json(body)
    } else {
        parse_json::<LocationConditions>(body).map(|one| vec![one])
    }
}

#[async_trait]
impl CurrentConditionsApi for OpenMeteoClient {
    async fn fetch_current(
        &self,
        coordinates: &[Coordinates],
    ) -> Result<Vec<LocationConditions>, ProviderError> {
        if coordinates.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.request_url(coordinates);
        trace!(url = %url, count = coordinates.len(), "Requesting current conditions");

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_response(status, url.as_str(), &body));
        }

        let results = parse_forecast_body(&body).map_err(|source| ProviderError::ParseFailed {
            url: url.to_string(),
            source,
        })?;

        debug!(
            requested = coordinates.len(),
            returned = results.len(),
            "Received current conditions"
        );
        Ok(results)
    }
}
