//! Rate-aware batched fetching for the city and grid classes.
//!
//! Locations are split into contiguous batches, one provider request per
//! batch. A failing batch is retried with exponential backoff; once its
//! attempts are exhausted it is dropped and the run moves on.

use crate::data::models::{Location, LocationClass, LocationId};
use crate::provider::{CurrentConditionsApi, LocationConditions, ProviderError};
use crate::utils::{fmt_duration, fmt_ratio};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, error, info, warn};

/// Largest coordinate difference, in degrees, still accepted as the same
/// location. Providers snap coordinates to their model grid.
const COORDINATE_TOLERANCE: f64 = 0.5;

/// Split `items` into contiguous batches of at most `size` elements.
///
/// Yields `ceil(len / size)` batches whose concatenation is `items`. A zero
/// size is treated as one.
pub fn partition<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// Exponential backoff over a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts per unit of work, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub batch_size: usize,
    /// Pause between consecutive batches, never after the last one.
    pub batch_delay: Duration,
    pub backoff: BackoffPolicy,
}

/// A location paired with the conditions fetched for it.
#[derive(Debug, Clone)]
pub struct FetchedLocation {
    pub location: Location,
    pub conditions: LocationConditions,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct BatchFetchOutcome {
    pub results: Vec<FetchedLocation>,
    /// Locations with no result, in input order.
    pub dropped: Vec<LocationId>,
    pub batches: usize,
    pub failed_batches: usize,
}

impl BatchFetchOutcome {
    pub fn attempted(&self) -> usize {
        self.results.len() + self.dropped.len()
    }
}

/// Timing summary after a batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub avg_per_batch: Duration,
    pub eta: Duration,
}

impl BatchProgress {
    pub fn new(done: usize, total: usize, elapsed: Duration) -> Self {
        let done_u32 = u32::try_from(done.max(1)).unwrap_or(u32::MAX);
        let remaining = u32::try_from(total.saturating_sub(done)).unwrap_or(u32::MAX);
        let avg_per_batch = elapsed / done_u32;
        Self {
            done,
            total,
            elapsed,
            avg_per_batch,
            eta: avg_per_batch.saturating_mul(remaining),
        }
    }
}

pub struct BatchFetcher<'a> {
    api: &'a dyn CurrentConditionsApi,
    settings: &'a BatchSettings,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(api: &'a dyn CurrentConditionsApi, settings: &'a BatchSettings) -> Self {
        Self { api, settings }
    }

    /// Fetch every location, batch by batch, in input order.
    ///
    /// Never fails as a whole: locations of exhausted or malformed batches are
    /// listed in [`BatchFetchOutcome::dropped`].
    pub async fn fetch_all(&self, class: LocationClass, locations: &[Location]) -> BatchFetchOutcome {
        let batches = partition(locations, self.settings.batch_size);
        let total = batches.len();
        let mut outcome = BatchFetchOutcome {
            batches: total,
            ..Default::default()
        };

        info!(
            class = %class,
            locations = locations.len(),
            batches = total,
            batch_size = self.settings.batch_size,
            "Starting batched fetch"
        );

        let start = Instant::now();
        for (index, batch) in batches.into_iter().enumerate() {
            let batch_no = index + 1;

            match self.fetch_batch(class, batch_no, total, batch).await {
                Some(conditions) => {
                    let fetched_at = Utc::now();
                    let kept = matching_prefix(batch, &conditions);
                    if kept < batch.len() {
                        warn!(
                            class = %class,
                            batch = batch_no,
                            submitted = batch.len(),
                            returned = conditions.len(),
                            kept,
                            "Partial batch result, keeping matching prefix"
                        );
                    }

                    outcome.results.extend(batch.iter().zip(conditions).take(kept).map(
                        |(location, conditions)| FetchedLocation {
                            location: location.clone(),
                            conditions,
                            fetched_at,
                        },
                    ));
                    outcome
                        .dropped
                        .extend(batch[kept..].iter().map(|l| l.id.clone()));
                }
                None => {
                    outcome.failed_batches += 1;
                    outcome.dropped.extend(batch.iter().map(|l| l.id.clone()));
                }
            }

            let progress = BatchProgress::new(batch_no, total, start.elapsed());
            info!(
                class = %class,
                batch = batch_no,
                total,
                fetched = outcome.results.len(),
                elapsed = fmt_duration(progress.elapsed),
                avg_per_batch = fmt_duration(progress.avg_per_batch),
                eta = fmt_duration(progress.eta),
                "Batch complete"
            );

            if batch_no < total {
                time::sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            class = %class,
            fetched = fmt_ratio(outcome.results.len(), locations.len()),
            failed_batches = outcome.failed_batches,
            duration = fmt_duration(start.elapsed()),
            "Batched fetch finished"
        );
        outcome
    }

    /// Request one batch, retrying any failure with backoff.
    ///
    /// Returns `None` once attempts are exhausted.
    async fn fetch_batch(
        &self,
        class: LocationClass,
        batch_no: usize,
        total: usize,
        batch: &[Location],
    ) -> Option<Vec<LocationConditions>> {
        let coordinates: Vec<_> = batch.iter().map(|l| l.coordinates).collect();
        let backoff = self.settings.backoff;

        for attempt in 1..=backoff.max_attempts {
            let err = match self.api.fetch_current(&coordinates).await {
                Ok(conditions) => {
                    if attempt > 1 {
                        debug!(class = %class, batch = batch_no, attempt, "Batch succeeded after retry");
                    }
                    return Some(conditions);
                }
                Err(err) => err,
            };

            let remaining = backoff.max_attempts - attempt;
            log_batch_failure(class, batch_no, total, attempt, remaining, &err);

            if remaining > 0 {
                time::sleep(backoff.delay_after(attempt)).await;
            }
        }

        error!(
            class = %class,
            batch = batch_no,
            attempts = backoff.max_attempts,
            dropped = ?batch.iter().map(Location::key).collect::<Vec<_>>(),
            "Batch dropped after exhausting retries"
        );
        None
    }
}

fn log_batch_failure(
    class: LocationClass,
    batch_no: usize,
    total: usize,
    attempt: u32,
    remaining: u32,
    err: &ProviderError,
) {
    if err.is_rate_limited() {
        warn!(
            class = %class,
            batch = batch_no,
            total,
            attempt,
            remaining_attempts = remaining,
            error = %err,
            "Rate limited by provider, backing off"
        );
    } else if err.is_transient() {
        warn!(
            class = %class,
            batch = batch_no,
            total,
            attempt,
            remaining_attempts = remaining,
            status = err.status(),
            error = %err,
            "Batch request failed"
        );
    } else {
        error!(
            class = %class,
            batch = batch_no,
            total,
            attempt,
            remaining_attempts = remaining,
            status = err.status(),
            error = %err,
            "Batch request rejected by provider"
        );
    }
}

/// Length of the leading run of results that line up with the submitted locations.
fn matching_prefix(batch: &[Location], conditions: &[LocationConditions]) -> usize {
    batch
        .iter()
        .zip(conditions)
        .take_while(|(location, c)| {
            (location.coordinates.lat - c.latitude).abs() <= COORDINATE_TOLERANCE
                && (location.coordinates.lon - c.longitude).abs() <= COORDINATE_TOLERANCE
        })
        .count()
}
