//! Class sequencing, freshness gating and class-level retry.

mod helpers;

use chrono::Utc;
use helpers::{
    FakeConditions, FakePorts, Fault, FlakyStore, city_snapshot, collector_settings, grid_locations,
    orchestrator_settings, port_locations, seeded_store,
};
use std::time::Duration;
use tokio::time::Instant;
use wxarchive::collector::{ClassStatus, Orchestrator};
use wxarchive::data::models::{Location, LocationClass};
use wxarchive::data::{MemoryStore, WeatherStore};

async fn seed_all(store: &dyn WeatherStore) {
    store
        .seed_locations(LocationClass::City, &[Location::city("Boise", 43.615, -116.2023)])
        .await
        .unwrap();
    store
        .seed_locations(LocationClass::Grid, &grid_locations(4))
        .await
        .unwrap();
    store
        .seed_locations(LocationClass::Port, &port_locations(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fresh_class_is_skipped() {
    let store = MemoryStore::new();
    store
        .upsert_current(LocationClass::City, &[city_snapshot("Boise", 10.0, Utc::now())])
        .await
        .unwrap();
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let run = orchestrator_settings(3);

    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::City)
        .await;

    assert_eq!(outcome.status, ClassStatus::Skipped);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.written, 0);
    assert_eq!(conditions.calls(), 0);
}

#[tokio::test]
async fn test_stale_class_is_collected() {
    let store = seeded_store(LocationClass::City, &[Location::city("Boise", 43.615, -116.2023)]).await;
    let stale = Utc::now() - chrono::Duration::hours(2);
    store
        .upsert_current(LocationClass::City, &[city_snapshot("Boise", 10.0, stale)])
        .await
        .unwrap();
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let run = orchestrator_settings(3);

    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::City)
        .await;

    assert_eq!(outcome.status, ClassStatus::Succeeded);
    assert_eq!(outcome.archived, 1);
    assert_eq!(outcome.written, 1);
}

#[tokio::test(start_paused = true)]
async fn test_class_flow_retried_after_store_failure() {
    let store = FlakyStore::failing_times(MemoryStore::new(), Fault::LoadLocations, 2);
    seed_all(&store.inner).await;
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let mut run = orchestrator_settings(3);
    run.class_retry_delay = Duration::from_secs(30);

    let start = Instant::now();
    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::Grid)
        .await;

    assert_eq!(outcome.status, ClassStatus::Succeeded);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.written, 4);
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test]
async fn test_retries_exhausted_reports_failure() {
    let store = FlakyStore::new(MemoryStore::new(), Fault::InsertHistory);
    seed_all(&store.inner).await;
    // A prior grid snapshot forces archival on the next write
    store
        .inner
        .replace_current(
            LocationClass::Grid,
            &[wxarchive::data::models::Snapshot {
                id: grid_locations(1)[0].id.clone(),
                coordinates: grid_locations(1)[0].coordinates,
                weather_data: None,
                fetched_at: Utc::now() - chrono::Duration::days(1),
                status: None,
            }],
        )
        .await
        .unwrap();
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let run = orchestrator_settings(2);

    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::Grid)
        .await;

    assert_eq!(outcome.attempts, 2);
    match &outcome.status {
        ClassStatus::Failed { error } => assert!(error.contains("archive"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    // The old snapshot survived both attempts
    assert_eq!(store.inner.count_current(LocationClass::Grid).await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_locations_not_retried() {
    let store = MemoryStore::new();
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let mut settings = collector_settings(50, 3);
    // A zero step seeds no grid points
    settings.seed.grid_step = 0.0;
    let run = orchestrator_settings(3);

    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::Grid)
        .await;

    assert_eq!(outcome.attempts, 1);
    assert!(matches!(outcome.status, ClassStatus::Failed { .. }));
    assert_eq!(conditions.calls(), 0);
}

#[tokio::test]
async fn test_freshness_failure_treated_as_stale() {
    let store = FlakyStore::new(MemoryStore::new(), Fault::LatestFetchedAt);
    seed_all(&store.inner).await;
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let run = orchestrator_settings(1);

    let outcome = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_class(LocationClass::City)
        .await;

    assert_eq!(outcome.status, ClassStatus::Succeeded);
    assert_eq!(conditions.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_all_sequential_with_partial_failure() {
    let store = MemoryStore::new();
    seed_all(&store).await;
    let conditions = FakeConditions::ok();
    let ports = FakePorts::failing_slugs(&["port-0", "port-1"]);
    let settings = collector_settings(50, 3);
    let mut run = orchestrator_settings(1);
    run.class_pause = Duration::from_secs(2);

    let start = Instant::now();
    let summary = Orchestrator::new(&store, &conditions, &ports, &settings, &run)
        .run_all()
        .await;

    let classes: Vec<LocationClass> = summary.outcomes.iter().map(|o| o.class).collect();
    assert_eq!(classes, LocationClass::ALL.to_vec());
    assert_eq!(summary.outcome(LocationClass::City).unwrap().status, ClassStatus::Succeeded);
    assert_eq!(summary.outcome(LocationClass::Grid).unwrap().status, ClassStatus::Succeeded);
    assert!(matches!(
        summary.outcome(LocationClass::Port).unwrap().status,
        ClassStatus::Failed { .. }
    ));
    assert!(!summary.is_success());
    // Two pauses, none after the last class
    assert_eq!(start.elapsed(), Duration::from_secs(4));
    summary.log();
}

#[tokio::test]
async fn test_second_run_all_skips_everything() {
    let store = MemoryStore::new();
    seed_all(&store).await;
    let conditions = FakeConditions::ok();
    let ports = FakePorts::ok();
    let settings = collector_settings(50, 3);
    let run = orchestrator_settings(1);
    let orchestrator = Orchestrator::new(&store, &conditions, &ports, &settings, &run);

    assert!(orchestrator.run_all().await.is_success());
    let calls = conditions.calls();

    let again = orchestrator.run_all().await;
    assert!(again.is_success());
    assert!(again.outcomes.iter().all(|o| o.status == ClassStatus::Skipped));
    assert_eq!(conditions.calls(), calls);
}
