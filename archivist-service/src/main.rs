use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod db;
mod enrichment;
mod error;
mod extraction;
mod llm;
mod queue;
mod service;
mod storage;

use crate::config::AppConfig;
use crate::db::Database;
use crate::service::ArchivistService;

// Re-export config crate types to avoid namespace collision
use ::config::{Config as ConfigBuilder, Environment, File};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting archivist service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let app_config: AppConfig = ConfigBuilder::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("ARCHIVIST")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    info!(
        host = %app_config.server.host,
        port = app_config.server.port,
        workers = app_config.processing.workers,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&app_config.storage.data_dir)?;

    let db_path = app_config.storage.data_dir.join("archivist.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let server_config = app_config.server.clone();
    let service = Arc::new(ArchivistService::new(app_config, db)?);

    // Start the worker pool, then requeue whatever a previous process left
    // non-terminal, then start the periodic stale-job sweep.
    let workers = ArchivistService::start_worker_pool(service.clone());
    service.recover_abandoned().await;
    let sweep = ArchivistService::start_recovery_sweep(service.clone());

    let app = api::router(service.clone());

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting work and let in-flight documents drain.
    service.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
    let _ = sweep.await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("archivist_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
