//! Time-based cleanup of the history log.

use crate::data::models::LocationClass;
use crate::data::store::WeatherStore;
use crate::utils::fmt_duration;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Instant;
use tracing::{error, info, warn};

/// Per-class result of one cleanup pass.
#[derive(Debug)]
pub struct CleanupReport {
    pub cutoff: DateTime<Utc>,
    pub per_class: Vec<(LocationClass, anyhow::Result<u64>)>,
}

impl CleanupReport {
    /// Records deleted across the classes that succeeded.
    pub fn total(&self) -> u64 {
        self.per_class
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .sum()
    }

    pub fn deleted(&self, class: LocationClass) -> Option<u64> {
        self.per_class
            .iter()
            .find(|(c, _)| *c == class)
            .and_then(|(_, r)| r.as_ref().ok().copied())
    }

    pub fn is_success(&self) -> bool {
        self.per_class.iter().all(|(_, r)| r.is_ok())
    }
}

pub struct RetentionCleaner<'a> {
    store: &'a dyn WeatherStore,
}

impl<'a> RetentionCleaner<'a> {
    pub fn new(store: &'a dyn WeatherStore) -> Self {
        Self { store }
    }

    /// Delete history archived more than `days_to_keep` days ago.
    pub async fn cleanup(&self, days_to_keep: u32) -> CleanupReport {
        self.cleanup_at(days_to_keep, Utc::now()).await
    }

    /// Cleanup relative to an explicit `now`.
    ///
    /// Each class is cleaned independently; one class failing leaves the
    /// others' deletions in place.
    pub async fn cleanup_at(&self, days_to_keep: u32, now: DateTime<Utc>) -> CleanupReport {
        let Some(cutoff) = retention_cutoff(days_to_keep, now) else {
            // Nothing can be archived before the earliest representable instant
            warn!(days_to_keep, "Retention window reaches past the earliest date, nothing to delete");
            return CleanupReport {
                cutoff: DateTime::<Utc>::MIN_UTC,
                per_class: LocationClass::ALL.iter().map(|&c| (c, Ok(0))).collect(),
            };
        };
        info!(days_to_keep, cutoff = %cutoff, "Starting history cleanup");

        let start = Instant::now();
        let mut per_class = Vec::with_capacity(LocationClass::ALL.len());
        for class in LocationClass::ALL {
            let result = self.store.delete_history_before(class, cutoff).await;
            match &result {
                Ok(deleted) => info!(class = %class, deleted, "History cleaned"),
                Err(e) => error!(class = %class, error = ?e, "Failed to clean history"),
            }
            per_class.push((class, result));
        }

        let report = CleanupReport { cutoff, per_class };
        info!(
            total = report.total(),
            success = report.is_success(),
            duration = fmt_duration(start.elapsed()),
            "History cleanup finished"
        );
        report
    }
}

/// `now - days_to_keep`, or `None` when that falls outside the representable range.
pub fn retention_cutoff(days_to_keep: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days_to_keep)).and_then(|window| now.checked_sub_signed(window))
}
