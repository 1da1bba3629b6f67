use std::sync::Arc;

use axum::middleware;
use gateway::{api, archiver, config::Config, manager::Manager, storage::ObjectStore, watchdog};
use telemetry::{trace_http_request, TracingConfig};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tracing_config = TracingConfig::new("gateway").with_version(env!("CARGO_PKG_VERSION"));
    if let Err(e) = telemetry::init_distributed_tracing(tracing_config) {
        warn!("failed to initialize distributed tracing: {e}, falling back to structured logging");
        let log_config = telemetry::LogConfig::new("gateway").with_version(env!("CARGO_PKG_VERSION"));
        telemetry::init_structured_logging(log_config);
    }

    let config = match std::env::var("GATEWAY_CONFIG_FILE") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };
    let bind_addr = config.bind_addr()?;
    let tz = config.timezone()?;

    std::fs::create_dir_all(&config.storage.live_dir)?;
    std::fs::create_dir_all(&config.storage.record_dir)?;

    let catalog = gateway::Catalog::open(config.storage.record_dir.join("catalog.db"))?;
    let archive_cron = config.archive_cron.clone();
    let manager = Manager::new(catalog, config.clone());
    manager.init().await?;

    let object_store = Arc::new(ObjectStore::connect(&manager.config().storage).await);
    if manager.config().storage.remote {
        object_store.ensure_bucket().await;
    }

    let shutdown_token = manager.shutdown_token();

    // Initialization order (spec §4.5, must be exact): the archival
    // scheduler starts before the watchdog loop.
    let archiver = archiver::Archiver::new(
        manager.clone(),
        object_store.clone(),
        tz,
        shutdown_token.clone(),
    );
    let archiver_handle = tokio::spawn(archiver.run(archive_cron));
    let watchdog_handle = tokio::spawn(watchdog::run(manager.clone(), shutdown_token.clone()));

    let state = api::AppState::new(manager.clone(), object_store);
    let app = api::router(state).layer(ServiceBuilder::new().layer(middleware::from_fn(trace_http_request)));

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    watchdog_handle.await.ok();
    archiver_handle.await.ok();
    telemetry::shutdown_tracing();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
