//! VoterSpheres Server - Main entry point

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voterspheres_common::logging::{init_logging, LogConfig};
use voterspheres_ingest::PagedApiSource;

use voterspheres_server::{api, app::App, config::Config, ingest::ResyncScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("voterspheres-server")
        .filter_directives("voterspheres_server=debug,tower_http=debug,sqlx=warn,fred=info")
        .build()
        .with_env_overrides()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting VoterSpheres server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let app = App::connect(config).await?;
    let mut background = Vec::new();

    background.push(app.engine().start());

    if app.config.jobs.pregen_enabled {
        background.push(app.pregenerator().start(app.config.jobs.pregen_delay));
    } else {
        info!("Pre-generation is disabled (PREGEN_ENABLED=false)");
    }

    match (&app.config.ingest.api, app.config.ingest.resync.enabled) {
        (Some(api_config), true) => {
            let source = PagedApiSource::new(api_config.clone())?;
            let scheduler = ResyncScheduler::new(
                Arc::new(app.coordinator()),
                Arc::new(source),
                app.config.ingest.resync.clone(),
            );
            background.push(scheduler.start());
        }
        (None, true) => warn!("INGEST_RESYNC_ENABLED is set but INGEST_API_BASE is not; resync not started"),
        _ => info!("Resync is disabled (INGEST_RESYNC_ENABLED=false)"),
    }

    let router = api::create_router(app.feature_state(), &app.config.cors);
    api::serve(&app.config, router, shutdown_signal(app.cancel.clone())).await?;

    // In case serve returned without a signal
    app.cancel.cancel();

    let timeout = Duration::from_secs(app.config.server.shutdown_timeout_secs);
    let drain = futures::future::join_all(background);
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!(
            timeout_secs = timeout.as_secs(),
            "Background tasks did not stop in time"
        );
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels background work
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
        _ = cancel.cancelled() => {},
    }

    cancel.cancel();
}
