//! Archive-then-overwrite writer.
//!
//! Before a new snapshot set becomes current, every stored snapshot it
//! supersedes is copied into the history log. If archival fails nothing new
//! is written, so a snapshot is never lost without its history record.

use crate::collector::CollectError;
use crate::data::models::{HistoryRecord, LocationClass, Snapshot, WriteMode};
use crate::data::store::WeatherStore;
use crate::utils::fmt_duration;
use chrono::Utc;
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteCounts {
    pub archived: u64,
    pub written: u64,
}

/// Writer for one class's current/history collections.
pub struct ArchiveWriter<'a> {
    store: &'a dyn WeatherStore,
    class: LocationClass,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(store: &'a dyn WeatherStore, class: LocationClass) -> Self {
        Self { store, class }
    }

    /// Archive the snapshots about to be superseded, then write `snapshots`
    /// as the class's current state.
    ///
    /// An empty set is a no-op: it never clears the current state.
    pub async fn write(&self, snapshots: Vec<Snapshot>) -> Result<WriteCounts, CollectError> {
        let class = self.class;
        let snapshots = dedupe_by_identity(class, snapshots);
        if snapshots.is_empty() {
            debug!(class = %class, "No snapshots to write");
            return Ok(WriteCounts::default());
        }

        let start = Instant::now();
        let keys: Vec<String> = snapshots.iter().map(Snapshot::key).collect();

        let previous = self
            .store
            .find_current(class, &keys)
            .await
            .map_err(|source| CollectError::Archive { class, source })?;

        let archived = if previous.is_empty() {
            debug!(class = %class, "No current snapshots to archive (first run for these locations)");
            0
        } else {
            let now = Utc::now();
            let records: Vec<HistoryRecord> = previous
                .into_iter()
                .map(|stored| HistoryRecord::archive(stored, now))
                .collect();
            self.store
                .insert_history(class, &records)
                .await
                .map_err(|source| CollectError::Archive { class, source })?
        };

        let written = match class.write_mode() {
            WriteMode::Upsert => self.store.upsert_current(class, &snapshots).await,
            WriteMode::Replace => self.store.replace_current(class, &snapshots).await,
        }
        .map_err(|source| CollectError::Write { class, source })?;

        info!(
            class = %class,
            archived,
            written,
            mode = ?class.write_mode(),
            duration = fmt_duration(start.elapsed()),
            "Snapshots archived and written"
        );

        Ok(WriteCounts { archived, written })
    }
}

/// Keep one snapshot per identity (the last one given), in first-seen order,
/// and drop snapshots that belong to another class.
fn dedupe_by_identity(class: LocationClass, snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    let total = snapshots.len();
    let mut by_key: IndexMap<String, Snapshot> = IndexMap::with_capacity(total);
    for snapshot in snapshots {
        if snapshot.class() != class {
            warn!(expected = %class, id = %snapshot.id, "Ignoring snapshot of another class");
            continue;
        }
        by_key.insert(snapshot.key(), snapshot);
    }

    if by_key.len() < total {
        debug!(class = %class, total, unique = by_key.len(), "Collapsed duplicate snapshots");
    }
    by_key.into_values().collect()
}
