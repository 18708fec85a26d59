//! Freshness gate: decides whether a class needs collecting at all.

use crate::data::models::LocationClass;
use crate::data::store::WeatherStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

/// Whether data fetched at `latest` is still within `max_age` at `now`.
///
/// Absent data is always stale. Data is stale once `now - latest` exceeds
/// `max_age`; exactly `max_age` old still counts as fresh.
pub fn is_fresh_at(latest: Option<DateTime<Utc>>, max_age: Duration, now: DateTime<Utc>) -> bool {
    match latest {
        None => false,
        Some(fetched_at) => now - fetched_at <= max_age,
    }
}

pub fn is_fresh(latest: Option<DateTime<Utc>>, max_age: Duration) -> bool {
    is_fresh_at(latest, max_age, Utc::now())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub latest: Option<DateTime<Utc>>,
    pub fresh: bool,
}

/// Read the class's most recent `fetched_at` and judge it against `max_age`.
pub async fn check(
    store: &dyn WeatherStore,
    class: LocationClass,
    max_age: Duration,
) -> Result<Freshness> {
    let latest = store.latest_fetched_at(class).await?;
    Ok(Freshness {
        latest,
        fresh: is_fresh(latest, max_age),
    })
}
