mod config;
mod seed;

use std::net::SocketAddr;
use std::sync::Arc;

use agora_api::blobs::DiskBlobStore;
use agora_api::{AppStateInner, router};
use agora_core::Hub;
use agora_db::{Database, Journal};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "agora_server=debug,agora_api=debug,agora_core=debug,agora_db=info,tower_http=debug"
                        .into()
                }),
        )
        .init();

    let config = Config::from_env()?;

    // Replay the journal into memory, then keep journaling new events
    let (hub, journal_task) = match &config.db_path {
        Some(path) => {
            let db = Arc::new(Database::open(path)?);
            let snapshot = db.load_snapshot()?;
            let (journal, task) = Journal::spawn(db);
            let hub = Hub::with_sink(Arc::new(journal));
            let stats = hub.restore(snapshot);
            info!(
                "Restored {} channels, {} messages, {} reactions ({} skipped)",
                stats.channels, stats.messages, stats.reactions, stats.skipped
            );
            (Arc::new(hub), Some(task))
        }
        None => {
            warn!("AGORA_DB_PATH is empty, nothing will be persisted");
            (Arc::new(Hub::new()), None)
        }
    };

    if config.seed_channels {
        seed::default_channels(&hub)?;
    }

    let blobs = DiskBlobStore::new(config.upload_dir.clone(), config.public_url.clone()).await?;
    let state = Arc::new(AppStateInner {
        hub: hub.clone(),
        blobs: Arc::new(blobs),
        jwt_secret: config.jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Agora server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Last handle to the hub goes, closing the journal queue
    drop(hub);
    if let Some(task) = journal_task {
        task.finish().await;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
