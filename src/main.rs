use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{net::TcpListener, signal, time};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plant_monitor_service::{
    api::{self, AppState},
    archive::{ArchiveService, LocalArchiveStore, SharedArchiveStore},
    config::Config,
    db,
    pipeline::PipelineService,
    plant_api::PlantApiClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let archive: SharedArchiveStore = Arc::new(LocalArchiveStore::new(&config.archive_dir));
    let client = PlantApiClient::new(&config);

    // Extract -> transform -> load, once per poll interval
    {
        let service = PipelineService::new(pool.clone(), client, config.plant_ids.clone());
        let interval = Duration::from_secs(config.poll_interval_secs);

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            info!(interval_secs = interval.as_secs(), "Pipeline loop started");

            loop {
                ticker.tick().await;
                if let Err(e) = service.run_once().await {
                    tracing::error!(error = %e, "Pipeline cycle failed");
                }
            }
        });
    }

    // Move expired readings from the live store into the archive
    {
        let service = ArchiveService::new(
            pool.clone(),
            archive.clone(),
            config.current_window(),
            config.archive_interval_secs,
        );
        tokio::spawn(service.run());
    }

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    let state = AppState {
        pool,
        archive,
        window: config.current_window(),
    };

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
