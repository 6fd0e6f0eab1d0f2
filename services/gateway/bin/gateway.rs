//! Main Entrypoint for the Parley Gateway
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the provider registry and resolving the shared providers.
//! 3. Starting the transcript report worker.
//! 4. Constructing the Axum router.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use parley_core::ProviderRegistry;
use parley_gateway::{
    config::Config,
    report::{HttpReportSink, LogReportSink, ReportSink},
    router::{WS_PATH, create_router},
    state::AppState,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = ?e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let report_sink: Arc<dyn ReportSink> = match &config.report_url {
        Some(url) => {
            info!(%url, "Reporting transcripts over HTTP.");
            Arc::new(HttpReportSink::new(url.clone()))
        }
        None => Arc::new(LogReportSink),
    };
    let bind_address = config.bind_address;
    let app_state = AppState::new(config, ProviderRegistry::with_builtins(), report_sink)
        .context("Failed to initialize providers")?;

    // --- 4. Create Router ---
    let app = create_router(Arc::new(app_state));

    // --- 5. Start Server ---
    info!(%bind_address, path = WS_PATH, "Service configured. Starting server...");
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
