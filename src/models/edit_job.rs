//! Hairstyle edit jobs: the request a client submits and the upstream
//! reply shapes we read back while the job runs.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for one hairstyle edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditRequest {
    /// Upstream style identifier (e.g. "BuzzCut", "ShortNeatBob").
    pub hair_style: String,

    /// Optional hair color; blank values are not sent upstream.
    pub color: Option<String>,

    /// Output size hint; `None` or `0` is not sent upstream.
    pub image_size: Option<u32>,
}

impl EditRequest {
    pub const DEFAULT_IMAGE_SIZE: u32 = 1;

    pub fn new(hair_style: impl Into<String>) -> Self {
        Self {
            hair_style: hair_style.into(),
            color: None,
            image_size: Some(Self::DEFAULT_IMAGE_SIZE),
        }
    }

    /// Color as it should be forwarded, if at all.
    pub fn color_field(&self) -> Option<&str> {
        self.color.as_deref().filter(|c| !c.is_empty())
    }

    /// Size hint as it should be forwarded, if at all.
    pub fn image_size_field(&self) -> Option<String> {
        self.image_size.filter(|s| *s != 0).map(|s| s.to_string())
    }
}

/// A finished edit: where the upstream put the image, and its bytes.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub image_url: String,
    pub bytes: Bytes,
}

/// Reply to the async submit call.
#[derive(Debug, Deserialize)]
pub struct EditSubmitReply {
    #[serde(default)]
    pub task_id: Option<Value>,
}

impl EditSubmitReply {
    /// Task id as text; numeric ids are accepted, blank ones are not.
    pub fn task_id(&self) -> Option<String> {
        let id = match self.task_id.as_ref()? {
            Value::String(id) => id.trim().to_string(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

/// Reply to one status query. `data` is only looked at once the task has
/// succeeded, so pending replies may carry anything there.
#[derive(Debug, Deserialize)]
pub struct EditPollReply {
    #[serde(default)]
    pub task_status: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl EditPollReply {
    pub fn status(&self) -> EditTaskStatus {
        let code = match self.task_status.as_ref() {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        EditTaskStatus::from_code(code)
    }

    /// First result image URL, when the upstream supplied a usable one.
    pub fn first_image(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .get("images")?
            .as_array()?
            .first()?
            .as_str()
            .filter(|url| !url.is_empty())
    }
}

/// Lifecycle of an upstream edit task as reported by `task_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTaskStatus {
    Queued,
    Processing,
    Succeeded,
    Failed(i64),
}

impl EditTaskStatus {
    pub const SUCCESS_CODE: i64 = 2;

    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            None | Some(0) => EditTaskStatus::Queued,
            Some(1) => EditTaskStatus::Processing,
            Some(Self::SUCCESS_CODE) => EditTaskStatus::Succeeded,
            Some(other) => EditTaskStatus::Failed(other),
        }
    }
}

/// Raw outcome of a diagnostic submit, returned as-is to the caller.
#[derive(Debug, Serialize)]
pub struct EditProbe {
    pub request_url: String,
    pub status_code: u16,
    pub response: Value,
}
