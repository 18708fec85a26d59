use crate::cli::Command;
use crate::collector::freshness;
use crate::collector::{Orchestrator, RetentionCleaner};
use crate::config::Config;
use crate::data::models::LocationClass;
use crate::data::{MemoryStore, PgStore, WeatherStore};
use crate::provider::{OpenMeteoClient, PortClient};
use crate::utils::fmt_duration;
use anyhow::Context;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

/// Main application struct owning the process-lifetime store handle.
pub struct App {
    config: Config,
    store: Box<dyn WeatherStore>,
}

impl App {
    /// Open the store once; every command reuses it until [`App::shutdown`].
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let store: Box<dyn WeatherStore> = if config.uses_memory_store() {
            warn!("Using in-memory store, nothing will be persisted");
            Box::new(MemoryStore::new())
        } else {
            Box::new(PgStore::connect(&config.database_url).await?)
        };

        Ok(App { config, store })
    }

    pub fn store(&self) -> &dyn WeatherStore {
        self.store.as_ref()
    }

    /// Run one command to completion and map its outcome to an exit code.
    pub async fn execute(&self, command: &Command) -> ExitCode {
        let result = match command {
            Command::Run => self.collect(&LocationClass::ALL).await,
            Command::Collect { class } => self.collect(&[*class]).await,
            Command::Cleanup { days } => Ok(self.cleanup(days.unwrap_or(self.config.retention_days)).await),
            Command::Status => self.status().await.map(|()| true),
        };

        match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                error!(error = ?e, command = ?command, "Command failed");
                ExitCode::FAILURE
            }
        }
    }

    async fn collect(&self, classes: &[LocationClass]) -> anyhow::Result<bool> {
        let conditions_api =
            OpenMeteoClient::new(&self.config.weather_api_url, self.config.current_fields())
                .context("Failed to create current-conditions client")?;
        let port_api = PortClient::new(&self.config.port_api_url, self.config.port_request_timeout)
            .context("Failed to create port client")?;

        let collector_settings = self.config.collector_settings();
        let settings = self.config.orchestrator_settings();
        let orchestrator = Orchestrator::new(
            self.store(),
            &conditions_api,
            &port_api,
            &collector_settings,
            &settings,
        );

        let summary = orchestrator.run_classes(classes).await;
        summary.log();
        Ok(summary.is_success())
    }

    async fn cleanup(&self, days_to_keep: u32) -> bool {
        RetentionCleaner::new(self.store())
            .cleanup(days_to_keep)
            .await
            .is_success()
    }

    async fn status(&self) -> anyhow::Result<()> {
        let settings = self.config.orchestrator_settings();
        for class in LocationClass::ALL {
            let max_age = settings.max_age(class);
            let f = freshness::check(self.store(), class, max_age).await?;
            let current = self.store.count_current(class).await?;
            let history = self.store.count_history(class).await?;
            info!(
                class = %class,
                latest = ?f.latest,
                fresh = f.fresh,
                max_age_hours = max_age.num_hours(),
                current,
                history,
                "Class status"
            );
        }
        Ok(())
    }

    /// Close the store. Called once, after the command finished or was aborted.
    pub async fn shutdown(self) {
        let start = Instant::now();
        self.store.close().await;
        info!(duration = fmt_duration(start.elapsed()), "Store closed");
    }
}
