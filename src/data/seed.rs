//! Reference location lists and first-run seeding.

use crate::data::models::{Location, LocationClass};
use crate::data::store::WeatherStore;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

/// Built-in cities: (name, lat, lon).
const CITIES: &[(&str, f64, f64)] = &[
    ("New York", 40.7128, -74.0060),
    ("Los Angeles", 34.0522, -118.2437),
    ("Chicago", 41.8781, -87.6298),
    ("Houston", 29.7604, -95.3698),
    ("Phoenix", 33.4484, -112.0740),
    ("Philadelphia", 39.9526, -75.1652),
    ("San Antonio", 29.4241, -98.4936),
    ("San Diego", 32.7157, -117.1611),
    ("Dallas", 32.7767, -96.7970),
    ("Denver", 39.7392, -104.9903),
    ("Seattle", 47.6062, -122.3321),
    ("Boston", 42.3601, -71.0589),
    ("Miami", 25.7617, -80.1918),
    ("Atlanta", 33.7490, -84.3880),
    ("Minneapolis", 44.9778, -93.2650),
    ("New Orleans", 29.9511, -90.0715),
    ("Salt Lake City", 40.7608, -111.8910),
    ("Portland", 45.5152, -122.6784),
    ("Kansas City", 39.0997, -94.5786),
    ("Anchorage", 61.2181, -149.9003),
];

/// Built-in ports: (slug, name, lat, lon).
const PORTS: &[(&str, &str, f64, f64)] = &[
    ("port-of-los-angeles", "Port of Los Angeles", 33.7361, -118.2639),
    ("port-of-long-beach", "Port of Long Beach", 33.7540, -118.2165),
    ("port-of-new-york-new-jersey", "Port of New York and New Jersey", 40.6681, -74.0451),
    ("port-of-savannah", "Port of Savannah", 32.0835, -81.0998),
    ("port-of-houston", "Port Houston", 29.7355, -95.2656),
    ("port-of-seattle", "Port of Seattle", 47.6021, -122.3393),
    ("port-of-oakland", "Port of Oakland", 37.7956, -122.2790),
    ("port-of-charleston", "Port of Charleston", 32.7833, -79.9236),
    ("port-of-virginia", "Port of Virginia", 36.8588, -76.3290),
    ("port-of-miami", "PortMiami", 25.7781, -80.1794),
    ("port-of-new-orleans", "Port of New Orleans", 29.9340, -90.0590),
    ("port-of-anchorage", "Port of Alaska", 61.2385, -149.8870),
];

/// Inclusive lat/lon rectangle covered by the grid class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl FromStr for GridBounds {
    type Err = anyhow::Error;

    /// Parses `min_lat,min_lon,max_lat,max_lon`.
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid grid bounds '{s}'"))?;

        let [min_lat, min_lon, max_lat, max_lon] = parts[..] else {
            bail!("grid bounds need 4 values (min_lat,min_lon,max_lat,max_lon), got {}", parts.len());
        };
        if min_lat > max_lat || min_lon > max_lon {
            bail!("grid bounds are inverted: '{s}'");
        }
        if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
            bail!("grid latitude out of range: '{s}'");
        }
        if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
            bail!("grid longitude out of range: '{s}'");
        }

        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }
}

impl<'de> Deserialize<'de> for GridBounds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct SeedSettings {
    pub grid_bounds: GridBounds,
    /// Grid spacing in degrees.
    pub grid_step: f64,
}

pub fn default_cities() -> Vec<Location> {
    CITIES
        .iter()
        .map(|&(name, lat, lon)| Location::city(name, lat, lon))
        .collect()
}

pub fn default_ports() -> Vec<Location> {
    PORTS
        .iter()
        .map(|&(slug, name, lat, lon)| Location::port(slug, name, lat, lon))
        .collect()
}

/// Most grid points a bounds/step pair may generate.
pub const MAX_GRID_POINTS: usize = 100_000;

/// `(rows, cols)` of the grid over `bounds`, both edges inclusive.
///
/// A non-positive or non-finite step yields an empty grid. Fails when the grid
/// would exceed [`MAX_GRID_POINTS`].
pub fn grid_dimensions(bounds: GridBounds, step: f64) -> Result<(usize, usize)> {
    if step <= 0.0 || !step.is_finite() {
        return Ok((0, 0));
    }

    let steps = |span: f64| (span / step + 1e-9).floor() + 1.0;
    let rows = steps(bounds.max_lat - bounds.min_lat);
    let cols = steps(bounds.max_lon - bounds.min_lon);
    if rows * cols > MAX_GRID_POINTS as f64 {
        bail!(
            "grid step {step} over {bounds:?} yields {:.0} points, more than {MAX_GRID_POINTS}",
            rows * cols
        );
    }
    Ok((rows as usize, cols as usize))
}

/// Row-major grid points over `bounds`, both edges inclusive.
///
/// Points are computed from integer offsets so float error never accumulates
/// across a row.
pub fn grid_points(bounds: GridBounds, step: f64) -> Result<Vec<Location>> {
    let (rows, cols) = grid_dimensions(bounds, step)?;
    let round = |v: f64| (v * 10_000.0).round() / 10_000.0;

    let mut points = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        let lat = round(bounds.min_lat + i as f64 * step);
        for j in 0..cols {
            let lon = round(bounds.min_lon + j as f64 * step);
            points.push(Location::grid(lat, lon));
        }
    }
    Ok(points)
}

fn seed_set(class: LocationClass, settings: &SeedSettings) -> Result<Vec<Location>> {
    Ok(match class {
        LocationClass::City => default_cities(),
        LocationClass::Grid => grid_points(settings.grid_bounds, settings.grid_step)?,
        LocationClass::Port => default_ports(),
    })
}

/// Load the reference locations for `class`, seeding them on first run.
pub async fn load_or_seed(
    store: &dyn WeatherStore,
    class: LocationClass,
    settings: &SeedSettings,
) -> Result<Vec<Location>> {
    let locations = store.load_locations(class).await?;
    if !locations.is_empty() {
        return Ok(locations);
    }

    let seed = seed_set(class, settings)?;
    let inserted = store.seed_locations(class, &seed).await?;
    info!(class = %class, inserted, "Seeded reference locations");

    store.load_locations(class).await
}
