//! The ingestion-and-archival pipeline.

pub mod archive;
pub mod batch;
pub mod flow;
pub mod freshness;
pub mod orchestrator;
pub mod per_item;
pub mod retention;

use crate::data::models::LocationClass;

pub use archive::{ArchiveWriter, WriteCounts};
pub use batch::{BackoffPolicy, BatchFetchOutcome, BatchFetcher, BatchSettings};
pub use flow::{Collector, CollectorSettings, FlowCounts};
pub use orchestrator::{ClassOutcome, ClassStatus, Orchestrator, OrchestratorSettings, RunSummary};
pub use per_item::{PortFetchOutcome, PortFetcher, PortSettings};
pub use retention::{CleanupReport, RetentionCleaner};

/// Why a class's collection flow failed.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// No reference locations exist for the class, even after seeding.
    #[error("no {0} locations to process")]
    NoLocations(LocationClass),
    /// The provider produced nothing usable for any location.
    #[error("no {class} results fetched from {attempted} locations")]
    NoResults {
        class: LocationClass,
        attempted: usize,
    },
    #[error("failed to load {class} locations")]
    Metadata {
        class: LocationClass,
        #[source]
        source: anyhow::Error,
    },
    /// Archiving the superseded snapshots failed; nothing new was written.
    #[error("failed to archive current {class} snapshots")]
    Archive {
        class: LocationClass,
        #[source]
        source: anyhow::Error,
    },
    /// Archival completed but writing the new snapshots failed.
    #[error("failed to write new {class} snapshots")]
    Write {
        class: LocationClass,
        #[source]
        source: anyhow::Error,
    },
}

impl CollectError {
    /// Whether rerunning the whole class flow can help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoLocations(_))
    }
}
