//! Error taxonomy shared by the upstream task clients.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{service} API key is not configured")]
    Configuration { service: &'static str },
    #[error("{service} upstream error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },
    #[error("{service} task `{task_id}` did not finish after {attempts} status checks")]
    Timeout {
        service: &'static str,
        task_id: String,
        attempts: u32,
    },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type TaskResult<T> = Result<T, TaskError>;

impl TaskError {
    /// Upstream replied with a non-success status; keep status and body for diagnosis.
    pub fn status(service: &'static str, what: &str, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        TaskError::Upstream {
            service,
            message: format!("{} returned {}: {}", what, status, body),
            status: Some(status),
            body: Some(body),
        }
    }

    /// Upstream replied successfully but the payload is unusable.
    pub fn payload(service: &'static str, message: impl Into<String>, body: impl Into<String>) -> Self {
        TaskError::Upstream {
            service,
            message: message.into(),
            status: None,
            body: Some(body.into()),
        }
    }

    /// The request never produced a usable response (connect, timeout, decode).
    pub fn transport(service: &'static str, what: &str, err: reqwest::Error) -> Self {
        TaskError::Upstream {
            service,
            message: format!("{} request failed: {}", what, err),
            status: err.status().map(|s| s.as_u16()),
            body: None,
        }
    }
}
