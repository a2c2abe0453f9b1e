//! Health & readiness handlers.
//!
//! - GET /health  -> liveness plus which upstream credentials are present
//! - GET /readyz  -> readiness that checks both storage roots are writable

use crate::services::fusion_service::FusionService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /health`
///
/// Never performs I/O. Reports whether each upstream has an API key so a
/// misconfigured deployment is visible without submitting a job.
pub async fn health(State(service): State<FusionService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            edit_configured: service.edit_configured(),
            model_configured: service.model_configured(),
        }),
    )
}

/// `GET /readyz`
///
/// Performs a write/read/delete round trip in the uploads and outputs roots.
/// HTTP 200 when both pass, HTTP 503 otherwise.
pub async fn readyz(State(service): State<FusionService>) -> impl IntoResponse {
    let uploads = probe_dir(service.uploads.root()).await;
    let outputs = probe_dir(service.outputs.root()).await;
    let overall_ok = uploads.ok && outputs.ok;

    let mut checks = HashMap::new();
    checks.insert("uploads", uploads);
    checks.insert("outputs", outputs);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Temp-file round trip; the probe file is the only thing this service ever deletes.
async fn probe_dir(dir: &Path) -> CheckStatus {
    if let Err(e) = fs::create_dir_all(dir).await {
        return CheckStatus::failed(format!("could not create {}: {}", dir.display(), e));
    }

    let tmp_path = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }

    let check = match fs::read(&tmp_path).await {
        Ok(bytes) if bytes == b"readyz" => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(_) => CheckStatus::failed("file content mismatch".to_string()),
        Err(e) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    };

    match fs::remove_file(&tmp_path).await {
        Err(e) if check.ok => CheckStatus {
            ok: true,
            error: Some(format!("could not remove tmp file: {}", e)),
        },
        _ => check,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    edit_configured: bool,
    model_configured: bool,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
