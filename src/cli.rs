use crate::data::models::LocationClass;
use clap::{Parser, Subcommand};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_SHORT"), ")");

/// Weather snapshot collector with an append-only history archive.
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect every class (city, grid, port) in order
    Run,
    /// Collect a single class
    Collect {
        #[arg(value_enum)]
        class: LocationClass,
    },
    /// Delete history records older than the retention window
    Cleanup {
        /// Days of history to keep (defaults to RETENTION_DAYS)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Report freshness and record counts per class
    Status,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output for local development
    Pretty,
    /// Structured output for log aggregation
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
