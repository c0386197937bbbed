//! Tripwire run-task service.
//!
//! Main entry point for the server. Loads configuration, initializes
//! tracing and serves run-task requests until a shutdown signal arrives.

use anyhow::{Context, Result};
use tracing::info;
use tripwire_api::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Initialize tracing with structured logging
    init_tracing(&config);

    info!("Starting Tripwire run-task service");
    info!(
        server_addr = %format!("{}:{}", config.host, config.port),
        app_env = ?config.app_env,
        scanner = %config.scanner_program,
        scratch_dir = %config.scratch_dir.display(),
        "Configuration loaded"
    );
    if config.uses_development_secret() {
        tracing::warn!("HMAC_KEY is not set; using the development signing secret");
    }

    let addr = config.parse_server_addr()?;
    let state = AppState::from_config(&config).context("Failed to build application state")?;

    info!(addr = %addr, "Tripwire is ready to receive run tasks");
    tripwire_api::start_server(state, addr).await.context("Server failed")?;

    info!("Tripwire shutdown complete");
    Ok(())
}

/// Initializes tracing from `RUST_LOG`, falling back to the configured level.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},tripwire=debug,tower_http=debug", config.rust_log)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
