//! Shared fakes and builders for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use wxarchive::collector::{
    BackoffPolicy, BatchSettings, CollectorSettings, OrchestratorSettings, PortSettings,
};
use wxarchive::data::models::{
    Coordinates, HistoryRecord, Location, LocationClass, LocationId, Snapshot, StoredSnapshot,
};
use wxarchive::data::seed::SeedSettings;
use wxarchive::data::{MemoryStore, WeatherStore};
use wxarchive::provider::{CurrentConditionsApi, LocationConditions, PortWeatherApi, ProviderError};

/// Failure injected for a given call: `(call_no, coordinates) -> Some(err)`.
type FailRule = Box<dyn Fn(usize, &[Coordinates]) -> Option<ProviderError> + Send + Sync>;

/// Scripted batched provider echoing each coordinate back with a temperature.
pub struct FakeConditions {
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Coordinates>>>,
    fail: Option<FailRule>,
    /// Results returned per call are cut to this many entries.
    truncate_to: Option<usize>,
}

impl FakeConditions {
    pub fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: None,
            truncate_to: None,
        }
    }

    pub fn failing(rule: impl Fn(usize, &[Coordinates]) -> Option<ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            fail: Some(Box::new(rule)),
            ..Self::ok()
        }
    }

    pub fn truncating(len: usize) -> Self {
        Self {
            truncate_to: Some(len),
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<Coordinates>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CurrentConditionsApi for FakeConditions {
    async fn fetch_current(
        &self,
        coordinates: &[Coordinates],
    ) -> Result<Vec<LocationConditions>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(coordinates.to_vec());

        if let Some(rule) = &self.fail
            && let Some(err) = rule(call, coordinates)
        {
            return Err(err);
        }

        let mut results: Vec<LocationConditions> =
            coordinates.iter().map(|c| conditions_for(*c, call)).collect();
        if let Some(len) = self.truncate_to {
            results.truncate(len);
        }
        Ok(results)
    }
}

pub fn conditions_for(c: Coordinates, call: usize) -> LocationConditions {
    let mut current = Map::new();
    current.insert("temperature_2m".into(), json!(c.lat / 2.0));
    current.insert("call".into(), json!(call));
    LocationConditions {
        latitude: c.lat,
        longitude: c.lon,
        timezone: Some("GMT".into()),
        utc_offset_seconds: Some(0),
        current,
    }
}

/// Scripted per-port provider; listed slugs fail.
pub struct FakePorts {
    failing: HashSet<String>,
    calls: AtomicUsize,
    hang: bool,
}

impl FakePorts {
    pub fn ok() -> Self {
        Self::failing_slugs(&[])
    }

    pub fn failing_slugs(slugs: &[&str]) -> Self {
        Self {
            failing: slugs.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
            hang: false,
        }
    }

    /// Every request never completes.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortWeatherApi for FakePorts {
    async fn fetch_port(&self, slug: &str) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(slug) {
            return Err(ProviderError::Status {
                status: 503,
                url: format!("http://ports.test/{slug}"),
                body: "upstream unavailable".into(),
            });
        }
        Ok(json!({ "port": slug, "wave_height_m": 1.2 }))
    }
}

/// Which store operation a [`FlakyStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    FindCurrent,
    InsertHistory,
    WriteCurrent,
    LatestFetchedAt,
    LoadLocations,
    DeleteHistory(LocationClass),
}

/// Wraps a [`MemoryStore`] and fails one operation while armed.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fault: Fault,
    armed: AtomicBool,
    /// Remaining failures before disarming; `usize::MAX` never disarms.
    remaining: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, fault: Fault) -> Self {
        Self::failing_times(inner, fault, usize::MAX)
    }

    pub fn failing_times(inner: MemoryStore, fault: Fault, times: usize) -> Self {
        Self {
            inner,
            fault,
            armed: AtomicBool::new(true),
            remaining: AtomicUsize::new(times),
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn check(&self, op: Fault) -> anyhow::Result<()> {
        if op != self.fault || !self.armed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        if left != usize::MAX {
            self.remaining.store(left - 1, Ordering::SeqCst);
        }
        anyhow::bail!("injected {op:?} failure")
    }
}

#[async_trait]
impl WeatherStore for FlakyStore {
    async fn load_locations(&self, class: LocationClass) -> anyhow::Result<Vec<Location>> {
        self.check(Fault::LoadLocations)?;
        self.inner.load_locations(class).await
    }

    async fn seed_locations(&self, class: LocationClass, locations: &[Location]) -> anyhow::Result<u64> {
        self.inner.seed_locations(class, locations).await
    }

    async fn latest_fetched_at(&self, class: LocationClass) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.check(Fault::LatestFetchedAt)?;
        self.inner.latest_fetched_at(class).await
    }

    async fn find_current(
        &self,
        class: LocationClass,
        keys: &[String],
    ) -> anyhow::Result<Vec<StoredSnapshot>> {
        self.check(Fault::FindCurrent)?;
        self.inner.find_current(class, keys).await
    }

    async fn upsert_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> anyhow::Result<u64> {
        self.check(Fault::WriteCurrent)?;
        self.inner.upsert_current(class, snapshots).await
    }

    async fn replace_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> anyhow::Result<u64> {
        self.check(Fault::WriteCurrent)?;
        self.inner.replace_current(class, snapshots).await
    }

    async fn insert_history(&self, class: LocationClass, records: &[HistoryRecord]) -> anyhow::Result<u64> {
        self.check(Fault::InsertHistory)?;
        self.inner.insert_history(class, records).await
    }

    async fn delete_history_before(
        &self,
        class: LocationClass,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        self.check(Fault::DeleteHistory(class))?;
        self.inner.delete_history_before(class, cutoff).await
    }

    async fn count_current(&self, class: LocationClass) -> anyhow::Result<u64> {
        self.inner.count_current(class).await
    }

    async fn count_history(&self, class: LocationClass) -> anyhow::Result<u64> {
        self.inner.count_history(class).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Settings with no waiting anywhere.
pub fn collector_settings(batch_size: usize, max_attempts: u32) -> CollectorSettings {
    CollectorSettings {
        batch: BatchSettings {
            batch_size,
            batch_delay: Duration::ZERO,
            backoff: BackoffPolicy::new(max_attempts, Duration::ZERO),
        },
        port: PortSettings {
            item_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        },
        seed: SeedSettings {
            grid_bounds: "0,0,1,1".parse().unwrap(),
            grid_step: 1.0,
        },
    }
}

pub fn orchestrator_settings(class_attempts: u32) -> OrchestratorSettings {
    OrchestratorSettings {
        class_attempts,
        class_retry_delay: Duration::ZERO,
        class_pause: Duration::ZERO,
        city_max_age: chrono::Duration::hours(1),
        grid_max_age: chrono::Duration::hours(3),
        port_max_age: chrono::Duration::hours(6),
    }
}

/// `n` distinct grid locations, one degree apart along a row.
pub fn grid_locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::grid(10.0, -120.0 + i as f64))
        .collect()
}

pub fn port_locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::port(format!("port-{i}"), format!("Port {i}"), 25.0 + i as f64, -80.0))
        .collect()
}

pub fn city_snapshot(name: &str, temp: f64, fetched_at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        id: LocationId::City { name: name.into() },
        coordinates: Coordinates::new(40.0, -74.0),
        weather_data: Some(json!({ "current": { "temperature_2m": temp } })),
        fetched_at,
        status: None,
    }
}

/// A store pre-seeded with `locations` for their class.
pub async fn seeded_store(class: LocationClass, locations: &[Location]) -> MemoryStore {
    let store = MemoryStore::new();
    store.seed_locations(class, locations).await.unwrap();
    store
}
