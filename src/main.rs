use anyhow::Result;
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    blob_store::BlobStore, edit_client::EditClient, fusion_service::FusionService,
    model_client::ModelClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Config (loads .env before anything reads the environment) ---
    let cfg = config::AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting hairfusion-relay with config: {:?}", cfg);
    if cfg.edit_api_key.is_none() {
        tracing::warn!("AILAB_API_KEY is not set; edit endpoints will fail");
    }
    if cfg.model_api_key.is_none() {
        tracing::warn!("MESHY_API_KEY is not set; 3D endpoints will fail");
    }

    // --- Ensure storage directories exist so the static mounts resolve ---
    for dir in [&cfg.media_root, &cfg.outputs_root] {
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
            tracing::info!("Created storage directory at {}", dir.display());
        }
    }

    let addr = cfg.addr();

    // --- Initialize core service ---
    let http = reqwest::Client::builder().build()?;
    let service = FusionService::new(
        BlobStore::new(cfg.media_root.clone()),
        BlobStore::new(cfg.outputs_root.clone()),
        EditClient::new(
            http.clone(),
            cfg.edit_api_key,
            cfg.edit_base_url,
            cfg.poll,
        ),
        ModelClient::new(http.clone(), cfg.model_api_key, cfg.model_base_url),
        http,
    );

    // --- Build router ---
    let app = routes::routes::build_app(service, cfg.frontend_dir.as_deref(), cfg.max_upload_bytes);

    // --- Start server ---
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
    axum::serve(listener, app).await?;

    Ok(())
}
