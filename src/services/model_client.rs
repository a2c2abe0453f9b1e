//! src/services/model_client.rs
//!
//! ModelClient — creates and inspects image-to-3D tasks on the Meshy API.
//! Tasks are never polled to completion here; callers re-query status.

use crate::{
    models::model_job::{ModelTaskSnapshot, extract_task_id},
    services::task_error::{TaskError, TaskResult},
};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

pub const SERVICE: &str = "Meshy";

const TASKS_PATH: &str = "/openapi/v1/image-to-3d";
const CREATE_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ModelClient {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl ModelClient {
    pub fn new(http: Client, api_key: Option<SecretString>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn bearer(&self) -> TaskResult<String> {
        self.api_key
            .as_ref()
            .map(|key| format!("Bearer {}", key.expose_secret()))
            .ok_or(TaskError::Configuration { service: SERVICE })
    }

    /// Create a task from an image URL or data URI; returns the task id.
    pub async fn submit_model_job(&self, image_url: &str) -> TaskResult<String> {
        let bearer = self.bearer()?;
        let payload = json!({
            "image_url": image_url,
            "should_remesh": true,
            "should_texture": true,
            "enable_pbr": true,
        });

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, TASKS_PATH))
            .header(reqwest::header::AUTHORIZATION, bearer)
            .json(&payload)
            .timeout(CREATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "create", e))?;

        let (status, body, data) = read_reply(resp, "create").await?;
        debug!("[{} create] status: {} resp: {}", SERVICE, status, data);

        if status >= 400 {
            return Err(TaskError::status(SERVICE, "create", status, body));
        }

        match extract_task_id(&data) {
            Some(task_id) => {
                info!("{} task {} created", SERVICE, task_id);
                Ok(task_id)
            }
            None => Err(TaskError::payload(
                SERVICE,
                format!("no task id in create reply: {}", data),
                body,
            )),
        }
    }

    /// Query a task once.
    pub async fn get_model_job(&self, task_id: &str) -> TaskResult<ModelTaskSnapshot> {
        let bearer = self.bearer()?;

        let resp = self
            .http
            .get(format!(
                "{}{}/{}",
                self.base_url,
                TASKS_PATH,
                urlencoding::encode(task_id)
            ))
            .header(reqwest::header::AUTHORIZATION, bearer)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::transport(SERVICE, "status", e))?;

        let (status, body, data) = read_reply(resp, "status").await?;
        debug!("[{} get] task_id: {} status: {} resp: {}", SERVICE, task_id, status, data);

        if status >= 400 {
            return Err(TaskError::status(SERVICE, "status", status, body));
        }

        Ok(ModelTaskSnapshot::from_payload(data))
    }
}

/// Status, raw body, and the body as JSON (`{"raw_text": ...}` when it is not JSON).
async fn read_reply(resp: Response, what: &str) -> TaskResult<(u16, String, Value)> {
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .map_err(|e| TaskError::transport(SERVICE, what, e))?;
    let data = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| json!({ "raw_text": body }));
    Ok((status, body, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ModelClient {
        ModelClient::new(
            Client::new(),
            Some(SecretString::from("mesh-key".to_string())),
            server.uri(),
        )
    }

    async fn mount_create(server: &MockServer, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .and(header("authorization", "Bearer mesh-key"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_requires_api_key() {
        let server = MockServer::start().await;
        let client = ModelClient::new(Client::new(), None, server.uri());
        let err = client.submit_model_job("https://x/a.png").await.unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));
    }

    #[tokio::test]
    async fn create_sends_generation_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .and(body_partial_json(json!({
                "image_url": "https://x/a.png",
                "should_remesh": true,
                "should_texture": true,
                "enable_pbr": true
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"result": "job-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).submit_model_job("https://x/a.png").await.unwrap();
        assert_eq!(id, "job-42");
    }

    #[tokio::test]
    async fn create_reads_nested_and_top_level_ids() {
        let server = MockServer::start().await;
        mount_create(&server, 200, json!({"code": 0, "result": {"task_id": "nested"}})).await;
        assert_eq!(client(&server).submit_model_job("u").await.unwrap(), "nested");

        let server = MockServer::start().await;
        mount_create(&server, 200, json!({"taskId": "top"})).await;
        assert_eq!(client(&server).submit_model_job("u").await.unwrap(), "top");
    }

    #[tokio::test]
    async fn create_without_id_is_upstream_error() {
        let server = MockServer::start().await;
        mount_create(&server, 200, json!({"code": 0, "message": "queued"})).await;

        let err = client(&server).submit_model_job("u").await.unwrap_err();
        match err {
            TaskError::Upstream { message, .. } => assert!(message.contains("queued")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_error_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid image"))
            .mount(&server)
            .await;

        let err = client(&server).submit_model_job("u").await.unwrap_err();
        match err {
            TaskError::Upstream { status, body, .. } => {
                assert_eq!(status, Some(400));
                assert_eq!(body.as_deref(), Some("invalid image"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn status_is_lowercased_with_glb_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/job-42", TASKS_PATH)))
            .and(header("authorization", "Bearer mesh-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "job-42",
                "status": "SUCCEEDED",
                "progress": 100,
                "model_urls": {"glb": "https://x/y.glb"}
            })))
            .mount(&server)
            .await;

        let snap = client(&server).get_model_job("job-42").await.unwrap();
        assert_eq!(snap.status, "succeeded");
        assert_eq!(snap.glb_url.as_deref(), Some("https://x/y.glb"));
        assert_eq!(snap.task["progress"], 100);
    }

    #[tokio::test]
    async fn status_error_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/missing", TASKS_PATH)))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client(&server).get_model_job("missing").await.unwrap_err();
        assert!(matches!(err, TaskError::Upstream { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn status_task_id_stays_in_the_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/abc%3Fx%3D1", TASKS_PATH)))
            .and(query_param_is_missing("x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
            .expect(1)
            .mount(&server)
            .await;

        let snap = client(&server).get_model_job("abc?x=1").await.unwrap();
        assert_eq!(snap.status, "pending");
    }
}
