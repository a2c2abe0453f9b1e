use crate::services::{
    fusion_service::{PipelineError, PipelineStage},
    task_error::TaskError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::fmt;

/// Upstream diagnostics carried into the error body.
#[derive(Debug, Default)]
pub struct UpstreamDetail {
    pub status: Option<u16>,
    pub body: Option<String>,
}

/// The single error shape every handler returns.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub stage: Option<PipelineStage>,
    pub upstream: UpstreamDetail,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            stage: None,
            upstream: UpstreamDetail::default(),
        }
    }

    /// Shortcut for a 400 caused by a bad request body.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", msg)
    }

    fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.message = format!("{} stage failed: {}", stage, self.message);
        self.stage = Some(stage);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("error".into(), json!(self.message));
        body.insert("status".into(), json!(self.status.as_u16()));
        body.insert("kind".into(), json!(self.kind));
        if let Some(stage) = self.stage {
            body.insert("stage".into(), json!(stage.to_string()));
        }
        if let Some(status) = self.upstream.status {
            body.insert("upstream_status".into(), json!(status));
        }
        if let Some(upstream_body) = self.upstream.body {
            body.insert("upstream_body".into(), json!(upstream_body));
        }

        if self.status.is_server_error() {
            tracing::warn!("request failed: {}", self.message);
        }

        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        let message = err.to_string();
        match err {
            TaskError::Configuration { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "configuration", message)
            }
            TaskError::Upstream { status, body, .. } => AppError {
                upstream: UpstreamDetail { status, body },
                ..AppError::new(StatusCode::BAD_GATEWAY, "upstream", message)
            },
            TaskError::Timeout { .. } => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
            }
            TaskError::Validation(_) => AppError::validation(message),
            TaskError::Io(_) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", message),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::from(err.source).with_stage(err.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (TaskError::Configuration { service: "AILab" }, StatusCode::INTERNAL_SERVER_ERROR),
            (
                TaskError::Timeout {
                    service: "AILab",
                    task_id: "t".into(),
                    attempts: 20,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (TaskError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (TaskError::status("Meshy", "create", 429, "slow down"), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status, expected);
        }
    }

    #[test]
    fn pipeline_error_names_stage_and_keeps_upstream_detail() {
        let err = AppError::from(PipelineError {
            stage: PipelineStage::Model,
            source: TaskError::status("Meshy", "create", 400, "bad image"),
        });
        assert_eq!(err.stage, Some(PipelineStage::Model));
        assert_eq!(err.upstream.status, Some(400));
        assert_eq!(err.upstream.body.as_deref(), Some("bad image"));
        assert!(err.message.starts_with("model stage failed"));
    }
}
