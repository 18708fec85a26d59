//! Sequential per-port fetching with independent failures.

use crate::data::models::{FetchStatus, Location, Snapshot};
use crate::provider::{PortWeatherApi, ProviderError};
use crate::utils::{fmt_duration, fmt_ratio};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Pause between consecutive requests.
    pub item_delay: Duration,
    /// Upper bound on a single request.
    pub request_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct PortFetchOutcome {
    /// One snapshot per input location, in input order.
    pub snapshots: Vec<Snapshot>,
    pub succeeded: usize,
    pub failed: usize,
}

impl PortFetchOutcome {
    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }
}

/// Map a provider failure onto a snapshot status.
///
/// Non-2xx answers are `Failed`; requests that never got a usable answer are `Error`.
pub fn failure_status(err: &ProviderError) -> FetchStatus {
    match err {
        ProviderError::RateLimited { .. } | ProviderError::Status { .. } => {
            FetchStatus::Failed(err.to_string())
        }
        ProviderError::Transport(_) => FetchStatus::Error(err.to_string()),
        ProviderError::ParseFailed { source, .. } => {
            FetchStatus::Error(format!("{err}: {source:#}"))
        }
    }
}

pub struct PortFetcher<'a> {
    api: &'a dyn PortWeatherApi,
    settings: &'a PortSettings,
}

impl<'a> PortFetcher<'a> {
    pub fn new(api: &'a dyn PortWeatherApi, settings: &'a PortSettings) -> Self {
        Self { api, settings }
    }

    /// Fetch each port in turn. A failed port is recorded, never fatal.
    pub async fn fetch_all(&self, locations: &[Location]) -> PortFetchOutcome {
        let mut outcome = PortFetchOutcome::default();
        let start = Instant::now();

        for (index, location) in locations.iter().enumerate() {
            let slug = location.key();
            let result =
                time::timeout(self.settings.request_timeout, self.api.fetch_port(&slug)).await;

            let (weather_data, status) = match result {
                Ok(Ok(payload)) => {
                    debug!(port = %slug, "Fetched port weather");
                    (Some(payload), FetchStatus::Success)
                }
                Ok(Err(err)) => {
                    let status = failure_status(&err);
                    warn!(port = %slug, status = status.as_str(), error = %err, "Port fetch failed");
                    (None, status)
                }
                Err(_elapsed) => {
                    let msg = format!(
                        "request timed out after {}",
                        fmt_duration(self.settings.request_timeout)
                    );
                    warn!(port = %slug, "Port fetch timed out");
                    (None, FetchStatus::Error(msg))
                }
            };

            if status.is_success() {
                outcome.succeeded += 1;
            } else {
                outcome.failed += 1;
            }

            outcome.snapshots.push(Snapshot {
                id: location.id.clone(),
                coordinates: location.coordinates,
                weather_data,
                fetched_at: Utc::now(),
                status: Some(status),
            });

            if index + 1 < locations.len() {
                time::sleep(self.settings.item_delay).await;
            }
        }

        info!(
            succeeded = fmt_ratio(outcome.succeeded, locations.len()),
            failed = outcome.failed,
            duration = fmt_duration(start.elapsed()),
            "Port fetch finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_mapping() {
        let status = ProviderError::Status {
            status: 503,
            url: "http://ports/x".into(),
            body: "maintenance".into(),
        };
        assert!(matches!(failure_status(&status), FetchStatus::Failed(msg) if msg.contains("503")));

        let limited = ProviderError::RateLimited {
            status: 429,
            reason: "slow down".into(),
        };
        assert!(matches!(failure_status(&limited), FetchStatus::Failed(_)));

        let parse = ProviderError::ParseFailed {
            url: "http://ports/x".into(),
            source: anyhow::anyhow!("expected value"),
        };
        match failure_status(&parse) {
            FetchStatus::Error(msg) => assert!(msg.contains("expected value"), "{msg}"),
            other => panic!("expected error status, got {other:?}"),
        }
    }
}
