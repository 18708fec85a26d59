//! The archive-then-overwrite write protocol, end to end and under store faults.

mod helpers;

use chrono::Utc;
use helpers::{
    FakeConditions, FakePorts, Fault, FlakyStore, city_snapshot, collector_settings, seeded_store,
};
use serde_json::json;
use wxarchive::collector::{ArchiveWriter, CollectError, Collector};
use wxarchive::data::models::{Location, LocationClass};
use wxarchive::data::{MemoryStore, WeatherStore};

fn cities() -> Vec<Location> {
    vec![
        Location::city("Boise", 43.615, -116.2023),
        Location::city("Reno", 39.5296, -119.8138),
        Location::city("Tulsa", 36.154, -95.9928),
    ]
}

#[tokio::test]
async fn test_first_run_then_second_run() {
    let store = seeded_store(LocationClass::City, &cities()).await;
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let collector = Collector::new(&store, &conditions, &ports, &settings);

    let first = collector.collect(LocationClass::City).await.unwrap();
    assert_eq!(first.archived, 0);
    assert_eq!(first.written, 3);
    assert!(store.history(LocationClass::City).await.is_empty());
    let after_first = store.current(LocationClass::City).await;
    assert_eq!(after_first.len(), 3);

    let second = collector.collect(LocationClass::City).await.unwrap();
    assert_eq!(second.archived, 3);
    assert_eq!(second.written, 3);

    let history = store.history(LocationClass::City).await;
    assert_eq!(history.len(), 3);
    for (record, previous) in history.iter().zip(&after_first) {
        // The archived copy is the first snapshot, untouched
        assert_eq!(record.snapshot, previous.snapshot);
        assert_eq!(record.original_updated_at, previous.updated_at);
        assert!(record.archived_at >= previous.updated_at);
    }

    let current = store.current(LocationClass::City).await;
    assert_eq!(current.len(), 3);
    for stored in &current {
        let data = stored.snapshot.weather_data.as_ref().unwrap();
        assert_eq!(data["current"]["call"], json!(2));
    }
}

#[tokio::test]
async fn test_archive_precedes_overwrite() {
    let store = MemoryStore::new();
    let writer = ArchiveWriter::new(&store, LocationClass::City);

    writer
        .write(vec![city_snapshot("Boise", 10.0, Utc::now())])
        .await
        .unwrap();
    let counts = writer
        .write(vec![city_snapshot("Boise", 20.0, Utc::now())])
        .await
        .unwrap();
    assert_eq!(counts.archived, 1);

    let history = store.history(LocationClass::City).await;
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].snapshot.weather_data,
        Some(json!({ "current": { "temperature_2m": 10.0 } }))
    );
    let current = store.current(LocationClass::City).await;
    assert_eq!(
        current[0].snapshot.weather_data,
        Some(json!({ "current": { "temperature_2m": 20.0 } }))
    );
}

#[tokio::test]
async fn test_archive_failure_aborts_write() {
    for fault in [Fault::FindCurrent, Fault::InsertHistory] {
        let store = FlakyStore::new(MemoryStore::new(), fault);
        store
            .inner
            .upsert_current(LocationClass::City, &[city_snapshot("Boise", 10.0, Utc::now())])
            .await
            .unwrap();

        let err = ArchiveWriter::new(&store, LocationClass::City)
            .write(vec![city_snapshot("Boise", 20.0, Utc::now())])
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Archive { .. }), "{fault:?}: {err}");

        // The old snapshot is still current and nothing reached history
        let current = store.inner.current(LocationClass::City).await;
        assert_eq!(
            current[0].snapshot.weather_data,
            Some(json!({ "current": { "temperature_2m": 10.0 } }))
        );
        assert!(store.inner.history(LocationClass::City).await.is_empty());
    }
}

#[tokio::test]
async fn test_write_failure_keeps_history() {
    let store = FlakyStore::new(MemoryStore::new(), Fault::WriteCurrent);
    store
        .inner
        .upsert_current(LocationClass::City, &[city_snapshot("Boise", 10.0, Utc::now())])
        .await
        .unwrap();

    let err = ArchiveWriter::new(&store, LocationClass::City)
        .write(vec![city_snapshot("Boise", 20.0, Utc::now())])
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::Write { .. }));
    assert!(err.is_retryable());

    assert_eq!(store.inner.history(LocationClass::City).await.len(), 1);
    assert_eq!(store.inner.current(LocationClass::City).await.len(), 1);
}

#[tokio::test]
async fn test_upsert_leaves_other_identities_untouched() {
    let store = MemoryStore::new();
    let writer = ArchiveWriter::new(&store, LocationClass::City);
    writer
        .write(vec![
            city_snapshot("Boise", 10.0, Utc::now()),
            city_snapshot("Reno", 12.0, Utc::now()),
        ])
        .await
        .unwrap();

    let counts = writer
        .write(vec![city_snapshot("Reno", 13.0, Utc::now())])
        .await
        .unwrap();
    assert_eq!(counts.archived, 1);

    let keys: Vec<String> = store
        .current(LocationClass::City)
        .await
        .iter()
        .map(|s| s.snapshot.key())
        .collect();
    assert_eq!(keys, vec!["Boise", "Reno"]);
}

#[tokio::test]
async fn test_grid_write_replaces_whole_collection() {
    let store = MemoryStore::new();
    let writer = ArchiveWriter::new(&store, LocationClass::Grid);
    let snapshot = |lat: f64, lon: f64| wxarchive::data::models::Snapshot {
        id: Location::grid(lat, lon).id,
        coordinates: Location::grid(lat, lon).coordinates,
        weather_data: Some(json!({ "lat": lat })),
        fetched_at: Utc::now(),
        status: None,
    };

    writer
        .write(vec![snapshot(10.0, 20.0), snapshot(12.0, 20.0)])
        .await
        .unwrap();
    let counts = writer
        .write(vec![snapshot(12.0, 20.0), snapshot(14.0, 20.0)])
        .await
        .unwrap();

    // Only the point present in both sets is archived
    assert_eq!(counts.archived, 1);
    assert_eq!(counts.written, 2);

    let keys: Vec<String> = store
        .current(LocationClass::Grid)
        .await
        .iter()
        .map(|s| s.snapshot.key())
        .collect();
    assert_eq!(keys, vec!["12.0000,20.0000", "14.0000,20.0000"]);

    let history = store.history(LocationClass::Grid).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].snapshot.key(), "12.0000,20.0000");
}

#[tokio::test]
async fn test_empty_write_never_clears_current() {
    let store = MemoryStore::new();
    let writer = ArchiveWriter::new(&store, LocationClass::Grid);
    writer
        .write(vec![wxarchive::data::models::Snapshot {
            id: Location::grid(1.0, 1.0).id,
            coordinates: Location::grid(1.0, 1.0).coordinates,
            weather_data: None,
            fetched_at: Utc::now(),
            status: None,
        }])
        .await
        .unwrap();

    let counts = writer.write(Vec::new()).await.unwrap();
    assert_eq!(counts.archived, 0);
    assert_eq!(counts.written, 0);
    assert_eq!(store.count_current(LocationClass::Grid).await.unwrap(), 1);
}

#[tokio::test]
async fn test_history_accumulates_across_runs() {
    let store = MemoryStore::new();
    let writer = ArchiveWriter::new(&store, LocationClass::City);
    for temp in [1.0, 2.0, 3.0, 4.0] {
        writer
            .write(vec![city_snapshot("Boise", temp, Utc::now())])
            .await
            .unwrap();
    }

    let history = store.history(LocationClass::City).await;
    let temps: Vec<_> = history
        .iter()
        .map(|r| r.snapshot.weather_data.clone().unwrap()["current"]["temperature_2m"].clone())
        .collect();
    assert_eq!(temps, vec![json!(1.0), json!(2.0), json!(3.0)]);
    assert!(history.windows(2).all(|w| w[0].archived_at <= w[1].archived_at));
}
