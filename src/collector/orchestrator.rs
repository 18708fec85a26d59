//! Sequential run over the location classes with class-level retry.

use crate::collector::flow::{Collector, CollectorSettings, FlowCounts};
use crate::collector::freshness;
use crate::data::models::LocationClass;
use crate::data::store::WeatherStore;
use crate::provider::{CurrentConditionsApi, PortWeatherApi};
use crate::utils::fmt_duration;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Attempts per class flow, including the first.
    pub class_attempts: u32,
    /// Fixed delay between attempts of one class.
    pub class_retry_delay: Duration,
    /// Pause between consecutive classes.
    pub class_pause: Duration,
    pub city_max_age: chrono::Duration,
    pub grid_max_age: chrono::Duration,
    pub port_max_age: chrono::Duration,
}

impl OrchestratorSettings {
    pub fn max_age(&self, class: LocationClass) -> chrono::Duration {
        match class {
            LocationClass::City => self.city_max_age,
            LocationClass::Grid => self.grid_max_age,
            LocationClass::Port => self.port_max_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassStatus {
    /// Data was still fresh; nothing was fetched.
    Skipped,
    Succeeded,
    Failed { error: String },
}

impl ClassStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Structured result of one class's run.
#[derive(Debug, Clone)]
pub struct ClassOutcome {
    pub class: LocationClass,
    pub status: ClassStatus,
    pub attempts: u32,
    pub locations: usize,
    pub fetched: usize,
    pub archived: u64,
    pub written: u64,
    pub dropped: Vec<String>,
    pub duration: Duration,
}

impl ClassOutcome {
    fn new(class: LocationClass, status: ClassStatus, attempts: u32, duration: Duration) -> Self {
        Self {
            class,
            status,
            attempts,
            locations: 0,
            fetched: 0,
            archived: 0,
            written: 0,
            dropped: Vec::new(),
            duration,
        }
    }

    fn with_counts(mut self, counts: FlowCounts) -> Self {
        self.locations = counts.locations;
        self.fetched = counts.fetched;
        self.archived = counts.archived;
        self.written = counts.written;
        self.dropped = counts.dropped;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<ClassOutcome>,
    pub duration: Duration,
}

impl RunSummary {
    /// True only if every class ended skipped or succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    pub fn outcome(&self, class: LocationClass) -> Option<&ClassOutcome> {
        self.outcomes.iter().find(|o| o.class == class)
    }

    /// Emit one event per class plus a totals line.
    pub fn log(&self) {
        for o in &self.outcomes {
            match &o.status {
                ClassStatus::Failed { error } => error!(
                    class = %o.class,
                    status = o.status.as_str(),
                    attempts = o.attempts,
                    duration = fmt_duration(o.duration),
                    error = %error,
                    "Class summary"
                ),
                _ => info!(
                    class = %o.class,
                    status = o.status.as_str(),
                    attempts = o.attempts,
                    locations = o.locations,
                    fetched = o.fetched,
                    archived = o.archived,
                    written = o.written,
                    dropped = o.dropped.len(),
                    duration = fmt_duration(o.duration),
                    "Class summary"
                ),
            }
        }

        let failed = self.outcomes.iter().filter(|o| !o.status.is_success()).count();
        info!(
            classes = self.outcomes.len(),
            failed,
            archived = self.outcomes.iter().map(|o| o.archived).sum::<u64>(),
            written = self.outcomes.iter().map(|o| o.written).sum::<u64>(),
            success = self.is_success(),
            duration = fmt_duration(self.duration),
            "Run summary"
        );
    }
}

pub struct Orchestrator<'a> {
    store: &'a dyn WeatherStore,
    collector: Collector<'a>,
    settings: &'a OrchestratorSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn WeatherStore,
        conditions_api: &'a dyn CurrentConditionsApi,
        port_api: &'a dyn PortWeatherApi,
        collector_settings: &'a CollectorSettings,
        settings: &'a OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            collector: Collector::new(store, conditions_api, port_api, collector_settings),
            settings,
        }
    }

    /// Run city, grid and port in order.
    pub async fn run_all(&self) -> RunSummary {
        self.run_classes(&LocationClass::ALL).await
    }

    /// Run the given classes strictly one after another.
    pub async fn run_classes(&self, classes: &[LocationClass]) -> RunSummary {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(classes.len());

        for (index, &class) in classes.iter().enumerate() {
            outcomes.push(self.run_class(class).await);
            if index + 1 < classes.len() {
                time::sleep(self.settings.class_pause).await;
            }
        }

        RunSummary {
            outcomes,
            duration: start.elapsed(),
        }
    }

    /// Gate on freshness, then run the class flow with bounded retry.
    pub async fn run_class(&self, class: LocationClass) -> ClassOutcome {
        let start = Instant::now();
        let max_age = self.settings.max_age(class);

        match freshness::check(self.store, class, max_age).await {
            Ok(f) if f.fresh => {
                info!(
                    class = %class,
                    latest = ?f.latest,
                    max_age_hours = max_age.num_hours(),
                    "Data is fresh, skipping"
                );
                return ClassOutcome::new(class, ClassStatus::Skipped, 0, start.elapsed());
            }
            Ok(f) => info!(class = %class, latest = ?f.latest, "Data is stale, collecting"),
            Err(e) => warn!(class = %class, error = ?e, "Freshness check failed, treating as stale"),
        }

        let attempts = self.settings.class_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.collector.collect(class).await {
                Ok(counts) => {
                    return ClassOutcome::new(class, ClassStatus::Succeeded, attempt, start.elapsed())
                        .with_counts(counts);
                }
                Err(e) => e,
            };

            let retryable = err.is_retryable();
            let message = format!("{:#}", anyhow::Error::from(err));
            error!(class = %class, attempt, attempts, retryable, error = %message, "Class flow failed");

            if !retryable || attempt >= attempts {
                let status = ClassStatus::Failed { error: message };
                return ClassOutcome::new(class, status, attempt, start.elapsed());
            }

            time::sleep(self.settings.class_retry_delay).await;
            attempt += 1;
        }
    }
}
