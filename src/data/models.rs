//! Domain models shared by the store adapters, providers and collector.

use chrono::{DateTime, Utc};
use custom_debug_derive::Debug as CustomDebug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three location categories collected by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LocationClass {
    City,
    Grid,
    Port,
}

impl LocationClass {
    /// All classes in collection order.
    pub const ALL: [LocationClass; 3] = [Self::City, Self::Grid, Self::Port];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Grid => "grid",
            Self::Port => "port",
        }
    }

    /// How a new snapshot set replaces the current state for this class.
    pub fn write_mode(self) -> WriteMode {
        match self {
            // The grid's location universe can change between runs
            Self::Grid => WriteMode::Replace,
            Self::City | Self::Port => WriteMode::Upsert,
        }
    }
}

impl fmt::Display for LocationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "city" => Ok(Self::City),
            "grid" => Ok(Self::Grid),
            "port" => Ok(Self::Port),
            other => Err(anyhow::anyhow!("unknown location class: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert-or-overwrite by identity; other identities are left untouched.
    Upsert,
    /// Delete every current snapshot of the class, then insert the new set.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Identity of a location within its class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum LocationId {
    City { name: String },
    Grid { lat: f64, lon: f64 },
    Port { slug: String },
}

impl LocationId {
    pub fn class(&self) -> LocationClass {
        match self {
            Self::City { .. } => LocationClass::City,
            Self::Grid { .. } => LocationClass::Grid,
            Self::Port { .. } => LocationClass::Port,
        }
    }

    /// Store key for this identity, unique within the class.
    ///
    /// Grid keys are rendered at fixed precision so float noise never splits
    /// one grid point into two identities.
    pub fn key(&self) -> String {
        match self {
            Self::City { name } => name.clone(),
            // Adding 0.0 folds -0.0 into 0.0
            Self::Grid { lat, lon } => format!("{:.4},{:.4}", lat + 0.0, lon + 0.0),
            Self::Port { slug } => slug.clone(),
        }
    }

    /// Rebuild an identity from its stored parts.
    pub fn from_parts(class: LocationClass, key: String, coordinates: Coordinates) -> Self {
        match class {
            LocationClass::City => Self::City { name: key },
            LocationClass::Grid => Self::Grid {
                lat: coordinates.lat,
                lon: coordinates.lon,
            },
            LocationClass::Port => Self::Port { slug: key },
        }
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class(), self.key())
    }
}

/// Reference location, owned by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub coordinates: Coordinates,
    /// Human-readable name where the identity isn't one (ports).
    pub label: Option<String>,
}

impl Location {
    pub fn city(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: LocationId::City { name: name.into() },
            coordinates: Coordinates::new(lat, lon),
            label: None,
        }
    }

    pub fn grid(lat: f64, lon: f64) -> Self {
        Self {
            id: LocationId::Grid { lat, lon },
            coordinates: Coordinates::new(lat, lon),
            label: None,
        }
    }

    pub fn port(slug: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: LocationId::Port { slug: slug.into() },
            coordinates: Coordinates::new(lat, lon),
            label: Some(name.into()),
        }
    }

    pub fn class(&self) -> LocationClass {
        self.id.class()
    }

    pub fn key(&self) -> String {
        self.id.key()
    }
}

/// Outcome of a per-item fetch, recorded on port snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    /// The provider answered with a non-2xx status.
    Failed(String),
    /// The request never produced a usable answer (transport, timeout, parse).
    Error(String),
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(_) => "failed",
            Self::Error(_) => "error",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failed(e) | Self::Error(e) => Some(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Rebuild from the `status`/`error` column pair.
    pub fn from_columns(status: &str, error: Option<String>) -> Option<Self> {
        match status {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed(error.unwrap_or_default())),
            "error" => Some(Self::Error(error.unwrap_or_default())),
            _ => None,
        }
    }
}

/// A weather observation for one location.
///
/// Replaced wholesale on each collection run, never merged field-by-field.
#[derive(CustomDebug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: LocationId,
    pub coordinates: Coordinates,
    /// Provider-opaque payload; `None` when a per-item fetch failed.
    #[debug(skip)]
    pub weather_data: Option<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
    #[debug(skip_if = Option::is_none)]
    pub status: Option<FetchStatus>,
}

impl Snapshot {
    pub fn class(&self) -> LocationClass {
        self.id.class()
    }

    pub fn key(&self) -> String {
        self.id.key()
    }
}

/// A snapshot as currently held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    /// Store-assigned identifier, never carried into history.
    pub row_id: i64,
    pub snapshot: Snapshot,
    /// When the store last wrote this snapshot.
    pub updated_at: DateTime<Utc>,
}

/// Immutable copy of a superseded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub snapshot: Snapshot,
    pub archived_at: DateTime<Utc>,
    pub original_updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Archive a stored snapshot, dropping its store identifier.
    ///
    /// `archived_at` never precedes the snapshot's own write time, which keeps
    /// archival times non-decreasing per identity even if the clock steps back.
    pub fn archive(stored: StoredSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            archived_at: now.max(stored.updated_at),
            original_updated_at: stored.updated_at,
            snapshot: stored.snapshot,
        }
    }
}
