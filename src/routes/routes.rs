//! Defines routes for the hairstyle relay.
//!
//! ## Structure
//! - **Fusion endpoints** (`/fusion`)
//!   - `POST /fusion/hair`              — edit a portrait, store the result
//!   - `POST /fusion/full`              — edit, then start a 3D task
//!   - `POST /fusion/meshify`           — start a 3D task from `image_url`
//!   - `GET  /fusion/meshify/{task_id}` — 3D task status snapshot
//!   - `GET  /fusion/mesh-view`         — relay a remote `.glb`
//!   - `POST /fusion/ailab-pro-test`    — raw edit submit for diagnosis
//!
//! - **Probes**: `GET /health`, `GET /readyz`
//!
//! - **Static**: `/uploads/*` and `/outputs/*` serve the storage roots, so the
//!   paths returned by the fusion endpoints can be opened by the browser;
//!   `/frontend/*` serves the bundled UI when one is configured.

use crate::{
    handlers::{
        fusion_handlers::{
            edit_probe, full_pipeline, hair_fusion, mesh_view, meshify_create, meshify_result,
        },
        health_handlers::{health, readyz},
    },
    services::fusion_service::FusionService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    response::Redirect,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// API routes carrying `FusionService` as shared state.
pub fn routes() -> Router<FusionService> {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/fusion/hair", post(hair_fusion))
        .route("/fusion/full", post(full_pipeline))
        .route("/fusion/meshify", post(meshify_create))
        .route("/fusion/meshify/{task_id}", get(meshify_result))
        .route("/fusion/mesh-view", get(mesh_view))
        .route("/fusion/ailab-pro-test", post(edit_probe))
}

/// Full application: API routes, static mounts, and the HTTP layers.
pub fn build_app(
    service: FusionService,
    frontend_dir: Option<&Path>,
    max_upload_bytes: usize,
) -> Router {
    let uploads = ServeDir::new(service.uploads.root());
    let outputs = ServeDir::new(service.outputs.root());

    let mut app = routes()
        .with_state(service)
        .nest_service("/uploads", uploads)
        .nest_service("/outputs", outputs);

    if let Some(dir) = frontend_dir {
        app = app
            .nest_service("/frontend", ServeDir::new(dir).append_index_html_on_directories(true))
            .route("/", get(|| async { Redirect::temporary("/frontend/index.html") }));
    }

    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
