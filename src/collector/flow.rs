//! One class's collection flow: load locations, fetch, archive and write.

use crate::collector::CollectError;
use crate::collector::archive::ArchiveWriter;
use crate::collector::batch::{BatchFetcher, BatchSettings};
use crate::collector::per_item::{PortFetcher, PortSettings};
use crate::data::models::{Location, LocationClass, Snapshot};
use crate::data::seed::{SeedSettings, load_or_seed};
use crate::data::store::WeatherStore;
use crate::provider::{CurrentConditionsApi, PortWeatherApi};
use crate::utils::fmt_ratio;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub batch: BatchSettings,
    pub port: PortSettings,
    pub seed: SeedSettings,
}

/// Counts from one completed flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowCounts {
    pub locations: usize,
    /// Snapshots produced by the fetch step (ports count failed items too).
    pub fetched: usize,
    pub archived: u64,
    pub written: u64,
    /// Keys of locations that produced no snapshot.
    pub dropped: Vec<String>,
}

pub struct Collector<'a> {
    store: &'a dyn WeatherStore,
    conditions_api: &'a dyn CurrentConditionsApi,
    port_api: &'a dyn PortWeatherApi,
    settings: &'a CollectorSettings,
}

impl<'a> Collector<'a> {
    pub fn new(
        store: &'a dyn WeatherStore,
        conditions_api: &'a dyn CurrentConditionsApi,
        port_api: &'a dyn PortWeatherApi,
        settings: &'a CollectorSettings,
    ) -> Self {
        Self {
            store,
            conditions_api,
            port_api,
            settings,
        }
    }

    /// Run the full flow for `class` once.
    pub async fn collect(&self, class: LocationClass) -> Result<FlowCounts, CollectError> {
        let locations = load_or_seed(self.store, class, &self.settings.seed)
            .await
            .map_err(|source| CollectError::Metadata { class, source })?;
        if locations.is_empty() {
            return Err(CollectError::NoLocations(class));
        }

        info!(class = %class, locations = locations.len(), "Collecting");

        let (snapshots, dropped) = match class {
            LocationClass::City | LocationClass::Grid => self.fetch_batched(class, &locations).await?,
            LocationClass::Port => (self.fetch_ports(&locations).await?, Vec::new()),
        };

        let fetched = snapshots.len();
        let counts = ArchiveWriter::new(self.store, class).write(snapshots).await?;

        Ok(FlowCounts {
            locations: locations.len(),
            fetched,
            archived: counts.archived,
            written: counts.written,
            dropped,
        })
    }

    async fn fetch_batched(
        &self,
        class: LocationClass,
        locations: &[Location],
    ) -> Result<(Vec<Snapshot>, Vec<String>), CollectError> {
        let outcome = BatchFetcher::new(self.conditions_api, &self.settings.batch)
            .fetch_all(class, locations)
            .await;

        if outcome.results.is_empty() {
            return Err(CollectError::NoResults {
                class,
                attempted: locations.len(),
            });
        }

        let dropped: Vec<String> = outcome.dropped.iter().map(|id| id.key()).collect();
        if !dropped.is_empty() {
            warn!(
                class = %class,
                fetched = fmt_ratio(outcome.results.len(), locations.len()),
                failed_batches = outcome.failed_batches,
                dropped = ?dropped,
                "Fetch shortfall, continuing with partial results"
            );
        }

        let snapshots = outcome
            .results
            .into_iter()
            .map(|fetched| Snapshot {
                id: fetched.location.id,
                coordinates: fetched.location.coordinates,
                weather_data: Some(fetched.conditions.into_weather_data()),
                fetched_at: fetched.fetched_at,
                status: None,
            })
            .collect();

        Ok((snapshots, dropped))
    }

    async fn fetch_ports(&self, locations: &[Location]) -> Result<Vec<Snapshot>, CollectError> {
        let outcome = PortFetcher::new(self.port_api, &self.settings.port)
            .fetch_all(locations)
            .await;

        if !outcome.any_succeeded() {
            return Err(CollectError::NoResults {
                class: LocationClass::Port,
                attempted: locations.len(),
            });
        }
        if outcome.failed > 0 {
            warn!(
                succeeded = fmt_ratio(outcome.succeeded, locations.len()),
                failed = outcome.failed,
                "Some ports failed, writing tagged snapshots"
            );
        }
        Ok(outcome.snapshots)
    }
}
