use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recast_core::encoder::{Encoder, FfmpegEncoder};
use recast_core::probe::{FfprobeProbe, MediaProbe};
use recast_core::transfer::{FsTransfer, Transfer};
use recast_core::{
    load_config, validate_config, CommandShutdown, HostShutdown, JobStore, LiveSettings,
    PipelineScheduler, SettingsProvider, ShutdownMonitor, SqliteJobStore,
};
use recast_server::api::create_router;
use recast_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("RECAST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Configuration loaded (hash {})", &config_hash[..16]);
    info!("Remote root: {:?}", config.storage.remote_root);
    info!("Work dir: {:?}", config.storage.work_dir);
    info!("Database path: {:?}", config.database.path);

    std::fs::create_dir_all(&config.storage.work_dir).with_context(|| {
        format!("Failed to create work dir {:?}", config.storage.work_dir)
    })?;

    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to open job store")?,
    );
    info!("Job store initialized");

    let transfer: Arc<dyn Transfer> = Arc::new(FsTransfer::new(
        config.storage.remote_root.clone(),
        config.transfer.clone(),
    ));
    let encoder: Arc<dyn Encoder> = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
    let probe: Arc<dyn MediaProbe> = Arc::new(FfprobeProbe::new(
        config.encoder.ffprobe_path.clone(),
        config.storage.remote_root.clone(),
    ));
    let settings = Arc::new(LiveSettings::new(config.pipeline.clone()));

    let scheduler = Arc::new(PipelineScheduler::new(
        Arc::clone(&store),
        transfer,
        encoder,
        probe,
        Arc::clone(&settings) as Arc<dyn SettingsProvider>,
        config.scheduler.clone(),
        config.storage.work_dir.clone(),
    ));
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;
    info!("Pipeline scheduler started");

    let host: Arc<dyn HostShutdown> =
        Arc::new(CommandShutdown::new(config.shutdown.command.clone()));
    let monitor = ShutdownMonitor::new(
        Arc::clone(&store),
        Arc::clone(&settings) as Arc<dyn SettingsProvider>,
        host,
        config.shutdown.clone(),
        scheduler.events(),
    );
    let (monitor_stop_tx, monitor_stop_rx) = broadcast::channel(1);
    let monitor_handle = monitor.spawn(monitor_stop_rx);

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&scheduler),
        settings,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = monitor_stop_tx.send(());
    let _ = monitor_handle.await;
    scheduler.stop().await;
    info!("Pipeline scheduler stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
