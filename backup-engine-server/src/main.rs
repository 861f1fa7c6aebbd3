mod adapters;
mod config;
mod db;
mod error;
mod routes;
mod services;
mod sources;
mod state;

use crate::config::AppConfig;
use crate::db::connection::create_pool;
use crate::db::migrate::migrate;
use crate::services::backup_scheduler::BackupScheduler;
use crate::sources::SqliteStore;
use crate::state::AppState;
use backup_engine::utils::logger;
use backup_engine::BackupEngine;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(path) = args.config {
        config.engine_config = Some(path);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    logger::init(&config.log_level)?;
    tracing::info!("Starting backup engine server on port {}", config.port);

    let engine_config = config.load_engine_config()?;

    // Initialize database
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = create_pool(&db_path)?;
    migrate(&pool)?;

    // Build the engine around the clinic database
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let engine = BackupEngine::new(engine_config.clone(), store.clone(), store)?;
    for destination in &engine_config.destinations {
        match adapters::build(destination) {
            Some(adapter) => engine.register_destination(destination.clone(), adapter).await,
            None => tracing::warn!(
                destination_id = %destination.id,
                kind = %destination.kind,
                "Unsupported destination kind, skipping"
            ),
        }
    }
    engine.init().await;

    let state = Arc::new(AppState::new(pool, engine.clone()));
    let cancel = CancellationToken::new();

    // Initialize cron scheduler
    let scheduler = match BackupScheduler::new(engine.clone()).await {
        Ok(s) => {
            if let Err(e) = s.schedule_ticks(&config.tick_cron).await {
                tracing::warn!("Failed to schedule engine ticks: {}", e);
            }
            if let Err(e) = s.start().await {
                tracing::warn!("Failed to start scheduler: {}", e);
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();

    // Stop scheduler
    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    // Let in-flight jobs stop cooperatively
    engine.shutdown().await;

    // Close database
    db::connection::close_pool(&state.db);
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
}
