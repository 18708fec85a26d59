//! PostgreSQL-backed [`WeatherStore`].
//!
//! All three classes share the `locations`, `snapshots` and `snapshot_history`
//! tables, partitioned by the `class` column. Bulk writes bind parallel arrays
//! and expand them with `UNNEST`.

use crate::data::models::{
    Coordinates, FetchStatus, HistoryRecord, Location, LocationClass, LocationId, Snapshot,
    StoredSnapshot,
};
use crate::data::store::WeatherStore;
use crate::utils::{fmt_duration, log_if_slow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(sqlx::FromRow)]
struct LocationRow {
    key: String,
    label: Option<String>,
    lat: f64,
    lon: f64,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    identity: Json<LocationId>,
    lat: f64,
    lon: f64,
    weather_data: Option<serde_json::Value>,
    fetched_at: DateTime<Utc>,
    status: Option<String>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for StoredSnapshot {
    fn from(row: SnapshotRow) -> Self {
        let status = row
            .status
            .as_deref()
            .and_then(|s| FetchStatus::from_columns(s, row.error));
        StoredSnapshot {
            row_id: row.id,
            snapshot: Snapshot {
                id: row.identity.0,
                coordinates: Coordinates::new(row.lat, row.lon),
                weather_data: row.weather_data,
                fetched_at: row.fetched_at,
                status,
            },
            updated_at: row.updated_at,
        }
    }
}

/// Column-wise view of a snapshot slice, ready to bind as arrays.
struct SnapshotColumns {
    keys: Vec<String>,
    identities: Vec<serde_json::Value>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    weather_data: Vec<Option<serde_json::Value>>,
    fetched_at: Vec<DateTime<Utc>>,
    statuses: Vec<Option<String>>,
    errors: Vec<Option<String>>,
}

impl SnapshotColumns {
    fn new<'a>(snapshots: impl ExactSizeIterator<Item = &'a Snapshot>) -> Result<Self> {
        let len = snapshots.len();
        let mut cols = Self {
            keys: Vec::with_capacity(len),
            identities: Vec::with_capacity(len),
            lats: Vec::with_capacity(len),
            lons: Vec::with_capacity(len),
            weather_data: Vec::with_capacity(len),
            fetched_at: Vec::with_capacity(len),
            statuses: Vec::with_capacity(len),
            errors: Vec::with_capacity(len),
        };
        for s in snapshots {
            cols.keys.push(s.key());
            cols.identities
                .push(serde_json::to_value(&s.id).context("failed to encode identity")?);
            cols.lats.push(s.coordinates.lat);
            cols.lons.push(s.coordinates.lon);
            cols.weather_data.push(s.weather_data.clone());
            cols.fetched_at.push(s.fetched_at);
            cols.statuses
                .push(s.status.as_ref().map(|st| st.as_str().to_owned()));
            cols.errors
                .push(s.status.as_ref().and_then(|st| st.error()).map(str::to_owned));
        }
        Ok(cols)
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the process-lifetime pool and apply pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_options = PgConnectOptions::from_str(database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        // A single logical worker: one connection in use at a time, one spare
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 2,
            acquire_timeout = "4s",
            "database pool established"
        );

        let start = Instant::now();
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!(duration = fmt_duration(start.elapsed()), "database migrations applied");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_snapshots(
        tx: &mut Transaction<'_, Postgres>,
        class: LocationClass,
        snapshots: &[Snapshot],
    ) -> Result<u64> {
        let cols = SnapshotColumns::new(snapshots.iter())?;
        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (class, key, identity, lat, lon, weather_data, fetched_at, status, error, updated_at)
            SELECT $1, u.key, u.identity, u.lat, u.lon, u.weather_data, u.fetched_at, u.status, u.error, now()
            FROM UNNEST($2::text[], $3::jsonb[], $4::float8[], $5::float8[], $6::jsonb[], $7::timestamptz[], $8::text[], $9::text[])
                AS u(key, identity, lat, lon, weather_data, fetched_at, status, error)
            "#,
        )
        .bind(class.as_str())
        .bind(&cols.keys)
        .bind(&cols.identities)
        .bind(&cols.lats)
        .bind(&cols.lons)
        .bind(&cols.weather_data)
        .bind(&cols.fetched_at)
        .bind(&cols.statuses)
        .bind(&cols.errors)
        .execute(&mut **tx)
        .await
        .context("failed to insert current snapshots")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WeatherStore for PgStore {
    async fn load_locations(&self, class: LocationClass) -> Result<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            "SELECT key, label, lat, lon FROM locations WHERE class = $1 ORDER BY position, key",
        )
        .bind(class.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load {class} locations"))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let coordinates = Coordinates::new(row.lat, row.lon);
                Location {
                    id: LocationId::from_parts(class, row.key, coordinates),
                    coordinates,
                    label: row.label,
                }
            })
            .collect())
    }

    async fn seed_locations(&self, class: LocationClass, locations: &[Location]) -> Result<u64> {
        if locations.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = locations.iter().map(Location::key).collect();
        let labels: Vec<Option<String>> = locations.iter().map(|l| l.label.clone()).collect();
        let lats: Vec<f64> = locations.iter().map(|l| l.coordinates.lat).collect();
        let lons: Vec<f64> = locations.iter().map(|l| l.coordinates.lon).collect();
        let positions: Vec<i32> = (0..locations.len())
            .map(|i| i32::try_from(i).unwrap_or(i32::MAX))
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO locations (class, key, label, lat, lon, position)
            SELECT $1, u.key, u.label, u.lat, u.lon, u.position
            FROM UNNEST($2::text[], $3::text[], $4::float8[], $5::float8[], $6::int4[])
                AS u(key, label, lat, lon, position)
            ON CONFLICT (class, key) DO NOTHING
            "#,
        )
        .bind(class.as_str())
        .bind(&keys)
        .bind(&labels)
        .bind(&lats)
        .bind(&lons)
        .bind(&positions)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to seed {class} locations"))?;

        Ok(result.rows_affected())
    }

    async fn latest_fetched_at(&self, class: LocationClass) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(fetched_at) FROM snapshots WHERE class = $1",
        )
        .bind(class.as_str())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to read latest {class} fetch time"))
    }

    async fn find_current(
        &self,
        class: LocationClass,
        keys: &[String],
    ) -> Result<Vec<StoredSnapshot>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, identity, lat, lon, weather_data, fetched_at, status, error, updated_at
            FROM snapshots
            WHERE class = $1 AND key = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(class.as_str())
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to query current {class} snapshots"))?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "find_current");

        Ok(rows.into_iter().map(StoredSnapshot::from).collect())
    }

    async fn upsert_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let cols = SnapshotColumns::new(snapshots.iter())?;
        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (class, key, identity, lat, lon, weather_data, fetched_at, status, error, updated_at)
            SELECT $1, u.key, u.identity, u.lat, u.lon, u.weather_data, u.fetched_at, u.status, u.error, now()
            FROM UNNEST($2::text[], $3::jsonb[], $4::float8[], $5::float8[], $6::jsonb[], $7::timestamptz[], $8::text[], $9::text[])
                AS u(key, identity, lat, lon, weather_data, fetched_at, status, error)
            ON CONFLICT (class, key) DO UPDATE SET
                identity = EXCLUDED.identity,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                weather_data = EXCLUDED.weather_data,
                fetched_at = EXCLUDED.fetched_at,
                status = EXCLUDED.status,
                error = EXCLUDED.error,
                updated_at = now()
            "#,
        )
        .bind(class.as_str())
        .bind(&cols.keys)
        .bind(&cols.identities)
        .bind(&cols.lats)
        .bind(&cols.lons)
        .bind(&cols.weather_data)
        .bind(&cols.fetched_at)
        .bind(&cols.statuses)
        .bind(&cols.errors)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert current {class} snapshots"))?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "upsert_current");

        Ok(result.rows_affected())
    }

    async fn replace_current(&self, class: LocationClass, snapshots: &[Snapshot]) -> Result<u64> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        sqlx::query("DELETE FROM snapshots WHERE class = $1")
            .bind(class.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to clear current {class} snapshots"))?;

        let written = Self::insert_snapshots(&mut tx, class, snapshots).await?;
        tx.commit()
            .await
            .with_context(|| format!("failed to commit {class} snapshot replace"))?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "replace_current");

        Ok(written)
    }

    async fn insert_history(&self, class: LocationClass, records: &[HistoryRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let cols = SnapshotColumns::new(records.iter().map(|r| &r.snapshot))?;
        let archived_at: Vec<DateTime<Utc>> = records.iter().map(|r| r.archived_at).collect();
        let original_updated_at: Vec<DateTime<Utc>> =
            records.iter().map(|r| r.original_updated_at).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO snapshot_history
                (class, key, identity, lat, lon, weather_data, fetched_at, status, error, archived_at, original_updated_at)
            SELECT $1, u.key, u.identity, u.lat, u.lon, u.weather_data, u.fetched_at, u.status, u.error, u.archived_at, u.original_updated_at
            FROM UNNEST($2::text[], $3::jsonb[], $4::float8[], $5::float8[], $6::jsonb[], $7::timestamptz[], $8::text[], $9::text[], $10::timestamptz[], $11::timestamptz[])
                AS u(key, identity, lat, lon, weather_data, fetched_at, status, error, archived_at, original_updated_at)
            "#,
        )
        .bind(class.as_str())
        .bind(&cols.keys)
        .bind(&cols.identities)
        .bind(&cols.lats)
        .bind(&cols.lons)
        .bind(&cols.weather_data)
        .bind(&cols.fetched_at)
        .bind(&cols.statuses)
        .bind(&cols.errors)
        .bind(&archived_at)
        .bind(&original_updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to archive {class} snapshots"))?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "insert_history");

        Ok(result.rows_affected())
    }

    async fn delete_history_before(
        &self,
        class: LocationClass,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let start = Instant::now();
        let result =
            sqlx::query("DELETE FROM snapshot_history WHERE class = $1 AND archived_at < $2")
                .bind(class.as_str())
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to delete expired {class} history"))?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "delete_history_before");

        Ok(result.rows_affected())
    }

    async fn count_current(&self, class: LocationClass) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM snapshots WHERE class = $1")
            .bind(class.as_str())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to count current {class} snapshots"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn count_history(&self, class: LocationClass) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM snapshot_history WHERE class = $1")
                .bind(class.as_str())
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("failed to count {class} history"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}
