//! src/services/edit_client.rs
//!
//! EditClient — drives an asynchronous hairstyle edit on the AILab API:
//! submit the portrait, poll the task on a fixed cadence, then download the
//! finished image. One client is shared by all requests; each call owns its
//! own task id so there is nothing to coordinate between them.

use crate::{
    models::edit_job::{EditOutcome, EditPollReply, EditProbe, EditRequest, EditSubmitReply, EditTaskStatus},
    services::task_error::{TaskError, TaskResult},
};
use bytes::Bytes;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SERVICE: &str = "AILab";

const SUBMIT_PATH: &str = "/api/portrait/effects/hairstyle-editor-pro";
const QUERY_PATH: &str = "/api/common/query-async-task-result";
const API_KEY_HEADER: &str = "ailabapi-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SUBMIT_FILE_NAME: &str = "upload.jpg";
const PROBE_FILE_NAME: &str = "input.jpg";

/// Fixed-cadence polling: no backoff, no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 20,
        }
    }
}

pub struct EditClient {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
    poll: PollPolicy,
}

impl EditClient {
    pub fn new(
        http: Client,
        api_key: Option<SecretString>,
        base_url: impl Into<String>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> TaskResult<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or(TaskError::Configuration { service: SERVICE })
    }

    fn submit_url(&self) -> String {
        format!("{}{}", self.base_url, SUBMIT_PATH)
    }

    fn query_url(&self) -> String {
        format!("{}{}", self.base_url, QUERY_PATH)
    }

    /// Multipart body for the async submit call.
    fn submit_form(image: &[u8], req: &EditRequest, file_name: &'static str) -> TaskResult<Form> {
        let image_part = Part::bytes(image.to_vec())
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| TaskError::transport(SERVICE, "submit", e))?;

        let mut form = Form::new()
            .text("task_type", "async")
            .text("hair_style", req.hair_style.clone())
            .part("image", image_part);
        if let Some(color) = req.color_field() {
            form = form.text("color", color.to_string());
        }
        if let Some(size) = req.image_size_field() {
            form = form.text("image_size", size);
        }
        Ok(form)
    }

    /// Start an edit task and return the upstream task id.
    pub async fn submit_edit_job(&self, image: &[u8], req: &EditRequest) -> TaskResult<String> {
        let api_key = self.api_key()?;
        let form = Self::submit_form(image, req, SUBMIT_FILE_NAME)?;

        let resp = self
            .http
            .post(self.submit_url())
            .header(API_KEY_HEADER, api_key)
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "submit", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "submit", e))?;
        debug!("[{} submit] status: {} body: {}", SERVICE, status, body);

        if !status.is_success() {
            return Err(TaskError::status(SERVICE, "submit", status.as_u16(), body));
        }

        let task_id = serde_json::from_str::<EditSubmitReply>(&body)
            .ok()
            .and_then(|reply| reply.task_id());

        match task_id {
            Some(id) => {
                info!("{} edit task {} submitted (style {})", SERVICE, id, req.hair_style);
                Ok(id)
            }
            None => Err(TaskError::payload(
                SERVICE,
                format!("submit reply has no task_id: {}", body),
                body,
            )),
        }
    }

    /// Poll `task_id` until the upstream reports success, then fetch the image.
    ///
    /// Queries at most `max_attempts` times, sleeping `interval` between
    /// queries. Queued/processing codes keep the loop going; any other
    /// non-success code ends it with an upstream error.
    pub async fn poll_edit_job(&self, task_id: &str) -> TaskResult<EditOutcome> {
        let api_key = self.api_key()?;

        for attempt in 1..=self.poll.max_attempts {
            let resp = self
                .http
                .get(self.query_url())
                .header(API_KEY_HEADER, api_key)
                .query(&[("task_id", task_id)])
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(|e| TaskError::transport(SERVICE, "status query", e))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| TaskError::transport(SERVICE, "status query", e))?;

            if !status.is_success() {
                return Err(TaskError::status(SERVICE, "status query", status.as_u16(), body));
            }

            let reply: EditPollReply = serde_json::from_str(&body).map_err(|e| {
                TaskError::payload(SERVICE, format!("unreadable status reply: {}", e), body.clone())
            })?;

            match reply.status() {
                EditTaskStatus::Succeeded => {
                    let image_url = reply.first_image().ok_or_else(|| {
                        TaskError::payload(
                            SERVICE,
                            format!("task {} succeeded without an image url: {}", task_id, body),
                            body.clone(),
                        )
                    })?;
                    info!("{} edit task {} finished after {} checks", SERVICE, task_id, attempt);
                    let bytes = self.download(image_url).await?;
                    return Ok(EditOutcome {
                        image_url: image_url.to_string(),
                        bytes,
                    });
                }
                EditTaskStatus::Failed(code) => {
                    warn!("{} edit task {} reported status {}", SERVICE, task_id, code);
                    return Err(TaskError::payload(
                        SERVICE,
                        format!("task {} reported failure status {}", task_id, code),
                        body,
                    ));
                }
                running => {
                    debug!(
                        "{} edit task {} still {:?} (check {}/{})",
                        SERVICE, task_id, running, attempt, self.poll.max_attempts
                    );
                }
            }

            if attempt < self.poll.max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        warn!("{} edit task {} timed out", SERVICE, task_id);
        Err(TaskError::Timeout {
            service: SERVICE,
            task_id: task_id.to_string(),
            attempts: self.poll.max_attempts,
        })
    }

    async fn download(&self, url: &str) -> TaskResult<Bytes> {
        let resp = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "image download", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TaskError::status(SERVICE, "image download", status.as_u16(), body));
        }

        resp.bytes()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "image download", e))
    }

    /// Submit without interpreting the reply; used to inspect what the
    /// upstream says about a given image and style.
    pub async fn probe_edit_submit(&self, image: &[u8], req: &EditRequest) -> TaskResult<EditProbe> {
        let api_key = self.api_key()?;
        let form = Self::submit_form(image, req, PROBE_FILE_NAME)?;
        let request_url = self.submit_url();

        let resp = self
            .http
            .post(&request_url)
            .header(API_KEY_HEADER, api_key)
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "probe", e))?;

        let status_code = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "probe", e))?;
        let response = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(EditProbe {
            request_url,
            status_code,
            response,
        })
    }
}
