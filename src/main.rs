use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod content_type;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::blob_store::BlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting blobstore with config: {:?}", cfg);

    // --- Ensure the catalog's parent directory exists ---
    if let Some(parent) = cfg
        .sqlite_file_path()
        .and_then(|path| path.parent())
        .filter(|parent| !parent.as_os_str().is_empty() && !parent.exists())
    {
        fs::create_dir_all(parent)?;
        tracing::info!("Created missing directory {:?}", parent);
    }

    // --- Connect to the catalog; refusing to serve if the probe fails ---
    let store = BlobStore::connect(&cfg.store_config()).await?;

    // --- Serve, then release the pool whatever happened ---
    let served = serve(&cfg, store.clone()).await;
    store.close().await;
    tracing::info!("Catalog connection closed.");

    served
}

/// Bind the listener and run the HTTP server until Ctrl-C.
async fn serve(cfg: &config::AppConfig, store: BlobStore) -> Result<()> {
    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_body_bytes)
        .layer(TraceLayer::new_for_http())
        .with_state(store);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}
