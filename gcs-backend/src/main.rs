use clap::Parser;
use gcs_backend::broadcast::Broadcaster;
use gcs_backend::config::{Config, StoreBackend};
use gcs_backend::generator::ReadingGenerator;
use gcs_backend::pipeline::TelemetryPipeline;
use gcs_backend::store::{MemoryStore, PgStore, SharedStore, TimeoutStore};
use gcs_backend::{build_app, cors_layer, metrics, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config.validate()?;

    info!("Starting CanSat GCS backend");
    info!("HTTP server: {}", config.http_addr);
    info!("Telemetry interval: {:?}", config.interval());
    info!("Allowed client origin: {}", config.client_url);

    metrics::init_metrics()?;
    let cors = cors_layer(&config.client_url)?;

    let store: SharedStore = match config.store {
        StoreBackend::Postgres => {
            info!("Database: {}", config.redacted_database_url());
            let pg = PgStore::connect(
                &config.database_url,
                config.db_max_connections,
                config.store_timeout(),
            )
            .await
            .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
            Arc::new(TimeoutStore::new(pg, config.store_timeout()))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, telemetry will not survive a restart");
            Arc::new(TimeoutStore::new(MemoryStore::new(), config.store_timeout()))
        }
    };

    let broadcaster = Broadcaster::new(config.subscriber_buffer);
    let pipeline = TelemetryPipeline::new(
        ReadingGenerator::new(config.generator()),
        Arc::clone(&store),
        Arc::clone(&broadcaster),
    );
    let pipeline_handle = pipeline.start(config.interval());

    let app = build_app(AppState::new(store, broadcaster), cors);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .inspect_err(|e| error!("Failed to bind to {}: {}", config.http_addr, e))?;

    info!("HTTP server listening on {}", config.http_addr);

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => error!("HTTP server terminated"),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP server task failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    pipeline_handle.stop().await;
    shutdown.cancel();
    if !server_handle.is_finished() {
        if let Err(e) = server_handle.await {
            error!("HTTP server task failed during shutdown: {}", e);
        }
    }

    Ok(())
}
