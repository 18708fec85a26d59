//! The store capability consumed by the collector.
//!
//! One current snapshot collection and one history collection per class,
//! plus the reference location list. Every component receives the store as
//! an explicit `&dyn WeatherStore` handle owned by the application.

use crate::data::models::{HistoryRecord, Location, LocationClass, Snapshot, StoredSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait WeatherStore: Send + Sync {
    /// Reference locations for a class, in fetch order.
    async fn load_locations(&self, class: LocationClass) -> Result<Vec<Location>>;

    /// Insert reference locations, ignoring identities already present.
    /// Returns the number of newly inserted locations.
    async fn seed_locations(&self, class: LocationClass, locations: &[Location]) -> Result<u64>;

    /// `fetched_at` of the most recently fetched current snapshot.
    async fn latest_fetched_at(&self, class: LocationClass) -> Result<Option<DateTime<Utc>>>;

    /// Current snapshots whose identity key is in `keys`.
    async fn find_current(&self, class: LocationClass, keys: &[String])
    -> Result<Vec<StoredSnapshot>>;

    /// Insert or overwrite current snapshots by identity.
    async fn upsert_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64>;

    /// Delete every current snapshot of the class, then insert `snapshots`.
    async fn replace_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64>;

    /// Append records to the class's history log.
    async fn insert_history(&self, class: LocationClass, records: &[HistoryRecord]) -> Result<u64>;

    /// Delete history records archived strictly before `cutoff`.
    async fn delete_history_before(
        &self,
        class: LocationClass,
        cutoff: DateTime<Utc>,
    ) -> Result<u64>;

    async fn count_current(&self, class: LocationClass) -> Result<u64>;

    async fn count_history(&self, class: LocationClass) -> Result<u64>;

    /// Release the underlying connection. Called once at shutdown.
    async fn close(&self);
}
