use clap::Parser;
use std::process::ExitCode;
use tracing::{info, warn};
use wxarchive::app::App;
use wxarchive::cli::Args;
use wxarchive::config::Config;
use wxarchive::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = Config::load().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        command = ?args.command,
        "starting wxarchive"
    );

    let app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    let code = tokio::select! {
        code = app.execute(&args.command) => code,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting current command");
            ExitCode::FAILURE
        }
    };

    app.shutdown().await;
    code
}
