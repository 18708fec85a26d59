//! Per-port weather client: one request per port slug.

use crate::provider::errors::ProviderError;
use crate::provider::json::parse_json;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// A provider answering one port per call with an opaque JSON document.
#[async_trait]
pub trait PortWeatherApi: Send + Sync {
    async fn fetch_port(&self, slug: &str) -> Result<Value, ProviderError>;
}

pub struct PortClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PortClient {
    /// `timeout` bounds each request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid port API URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("port API URL '{base_url}' cannot carry a path");
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("wxarchive/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    fn port_url(&self, slug: &str) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base always accepts path segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(slug);
        }
        url
    }
}

#[async_trait]
impl PortWeatherApi for PortClient {
    async fn fetch_port(&self, slug: &str) -> Result<Value, ProviderError> {
        let url = self.port_url(slug);
        trace!(url = %url, "Requesting port weather");

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_response(status, url.as_str(), &body));
        }

        parse_json(&body).map_err(|source| ProviderError::ParseFailed {
            url: url.to_string(),
            source,
        })
    }
}
