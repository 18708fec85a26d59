//! In-process [`WeatherStore`] for tests and database-less local runs.

use crate::data::models::{HistoryRecord, Location, LocationClass, Snapshot, StoredSnapshot};
use crate::data::store::WeatherStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    next_row_id: i64,
    locations: HashMap<LocationClass, IndexMap<String, Location>>,
    current: HashMap<LocationClass, IndexMap<String, StoredSnapshot>>,
    history: HashMap<LocationClass, Vec<HistoryRecord>>,
}

impl Inner {
    fn stored(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> StoredSnapshot {
        self.next_row_id += 1;
        StoredSnapshot {
            row_id: self.next_row_id,
            snapshot: snapshot.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All current snapshots of a class, in first-write order.
    pub async fn current(&self, class: LocationClass) -> Vec<StoredSnapshot> {
        let inner = self.inner.lock().await;
        inner
            .current
            .get(&class)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The full history log of a class, in append order.
    pub async fn history(&self, class: LocationClass) -> Vec<HistoryRecord> {
        let inner = self.inner.lock().await;
        inner.history.get(&class).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl WeatherStore for MemoryStore {
    async fn load_locations(&self, class: LocationClass) -> Result<Vec<Location>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .locations
            .get(&class)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn seed_locations(&self, class: LocationClass, locations: &[Location]) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let entries = inner.locations.entry(class).or_default();
        let mut inserted = 0;
        for location in locations {
            if !entries.contains_key(&location.key()) {
                entries.insert(location.key(), location.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn latest_fetched_at(&self, class: LocationClass) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .current
            .get(&class)
            .and_then(|m| m.values().map(|s| s.snapshot.fetched_at).max()))
    }

    async fn find_current(
        &self,
        class: LocationClass,
        keys: &[String],
    ) -> Result<Vec<StoredSnapshot>> {
        let inner = self.inner.lock().await;
        let Some(current) = inner.current.get(&class) else {
            return Ok(Vec::new());
        };
        Ok(keys.iter().filter_map(|k| current.get(k).cloned()).collect())
    }

    async fn upsert_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let rows: Vec<_> = snapshots.iter().map(|s| inner.stored(s, now)).collect();
        let current = inner.current.entry(class).or_default();
        for row in rows {
            match current.get_mut(&row.snapshot.key()) {
                // Overwrites keep the existing row identity, as an upsert does
                Some(existing) => {
                    existing.snapshot = row.snapshot;
                    existing.updated_at = row.updated_at;
                }
                None => {
                    current.insert(row.snapshot.key(), row);
                }
            }
        }
        Ok(snapshots.len() as u64)
    }

    async fn replace_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let rows: IndexMap<_, _> = snapshots
            .iter()
            .map(|s| (s.key(), inner.stored(s, now)))
            .collect();
        let written = rows.len() as u64;
        inner.current.insert(class, rows);
        Ok(written)
    }

    async fn insert_history(&self, class: LocationClass, records: &[HistoryRecord]) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner
            .history
            .entry(class)
            .or_default()
            .extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn delete_history_before(
        &self,
        class: LocationClass,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let Some(history) = inner.history.get_mut(&class) else {
            return Ok(0);
        };
        let before = history.len();
        history.retain(|r| r.archived_at >= cutoff);
        Ok((before - history.len()) as u64)
    }

    async fn count_current(&self, class: LocationClass) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.current.get(&class).map_or(0, |m| m.len() as u64))
    }

    async fn count_history(&self, class: LocationClass) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.history.get(&class).map_or(0, |h| h.len() as u64))
    }

    async fn close(&self) {}
}
