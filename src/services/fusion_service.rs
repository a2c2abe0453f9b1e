//! src/services/fusion_service.rs
//!
//! FusionService — sequences the two upstream jobs for one request:
//! persist the upload, run the hairstyle edit to completion, persist the
//! edited image, then (for the full pipeline) hand it to the 3D service.
//! The 3D task is only created here; callers poll it separately.

use crate::{
    models::{
        edit_job::{EditProbe, EditRequest},
        location::{ResultLocation, data_uri},
        model_job::ModelTaskSnapshot,
    },
    services::{
        blob_store::BlobStore,
        edit_client::EditClient,
        model_client::ModelClient,
        proxy::{ProxiedBinary, proxy_binary},
        task_error::{TaskError, TaskResult},
    },
};
use reqwest::Client;
use std::{fmt, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

const SOURCE_PREFIX: &str = "source";
const SOURCE_EXTENSION: &str = ".jpg";
const FUSED_PREFIX: &str = "fused";
const FUSED_EXTENSION: &str = ".png";
const FUSED_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Upload,
    Edit,
    Model,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Upload => "upload",
            PipelineStage::Edit => "edit",
            PipelineStage::Model => "model",
        };
        f.write_str(name)
    }
}

/// A pipeline failure names exactly one stage.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: TaskError,
}

impl PipelineError {
    fn at(stage: PipelineStage) -> impl FnOnce(TaskError) -> Self {
        move |source| PipelineError { stage, source }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Output of the edit stage.
#[derive(Debug, Clone)]
pub struct EditedImage {
    pub source_path: PathBuf,
    pub fused: ResultLocation,
}

/// Output of the full pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub source_path: PathBuf,
    pub fused: ResultLocation,
    pub task_id: String,
}

/// Request-scoped orchestration over shared, immutable clients.
#[derive(Clone)]
pub struct FusionService {
    pub uploads: BlobStore,
    pub outputs: BlobStore,
    edit: Arc<EditClient>,
    model: Arc<ModelClient>,
    http: Client,
}

impl FusionService {
    pub fn new(
        uploads: BlobStore,
        outputs: BlobStore,
        edit: EditClient,
        model: ModelClient,
        http: Client,
    ) -> Self {
        Self {
            uploads,
            outputs,
            edit: Arc::new(edit),
            model: Arc::new(model),
            http,
        }
    }

    pub fn edit_configured(&self) -> bool {
        self.edit.is_configured()
    }

    pub fn model_configured(&self) -> bool {
        self.model.is_configured()
    }

    /// Persist the upload, then edit it and persist the result.
    ///
    /// The upload is stored before any upstream call so it survives a
    /// failed edit.
    pub async fn run_edit(&self, image: &[u8], req: &EditRequest) -> PipelineResult<EditedImage> {
        ensure_not_empty(image).map_err(PipelineError::at(PipelineStage::Upload))?;

        let source_path = self
            .uploads
            .save(SOURCE_PREFIX, image, SOURCE_EXTENSION)
            .await
            .map_err(|e| PipelineError::at(PipelineStage::Upload)(e.into()))?;

        let fused = self
            .edit_and_store(image, req)
            .await
            .map_err(PipelineError::at(PipelineStage::Edit))?;

        Ok(EditedImage { source_path, fused })
    }

    async fn edit_and_store(&self, image: &[u8], req: &EditRequest) -> TaskResult<ResultLocation> {
        let task_id = self.edit.submit_edit_job(image, req).await?;
        let outcome = self.edit.poll_edit_job(&task_id).await?;
        let path = self
            .outputs
            .save(FUSED_PREFIX, &outcome.bytes, FUSED_EXTENSION)
            .await?;
        info!(
            "edit task {} result {} stored at {}",
            task_id,
            outcome.image_url,
            path.display()
        );
        Ok(ResultLocation::Local(path))
    }

    /// Edit, then create the 3D task from the edited image.
    pub async fn run_full_pipeline(
        &self,
        image: &[u8],
        req: &EditRequest,
    ) -> PipelineResult<PipelineOutcome> {
        let EditedImage { source_path, fused } = self.run_edit(image, req).await?;

        let task_id = self.submit_model_from(&fused).await.map_err(|e| {
            warn!("3D stage failed; edited image kept at {}", fused.display());
            PipelineError::at(PipelineStage::Model)(e)
        })?;

        Ok(PipelineOutcome {
            source_path,
            fused,
            task_id,
        })
    }

    async fn submit_model_from(&self, location: &ResultLocation) -> TaskResult<String> {
        let input = self.model_input(location).await?;
        self.model.submit_model_job(&input).await
    }

    /// URLs pass through; local files become a PNG data URI of their bytes.
    pub async fn model_input(&self, location: &ResultLocation) -> TaskResult<String> {
        match location {
            ResultLocation::Remote(url) => Ok(url.clone()),
            ResultLocation::Local(path) => {
                let bytes = fs::read(path).await?;
                Ok(data_uri(FUSED_MIME, &bytes))
            }
        }
    }

    pub async fn create_model_job(&self, image_url: &str) -> TaskResult<String> {
        if image_url.trim().is_empty() {
            return Err(TaskError::Validation("image_url is empty".into()));
        }
        self.model.submit_model_job(image_url).await
    }

    pub async fn model_job_status(&self, task_id: &str) -> TaskResult<ModelTaskSnapshot> {
        self.model.get_model_job(task_id).await
    }

    pub async fn probe_edit(&self, image: &[u8], req: &EditRequest) -> TaskResult<EditProbe> {
        ensure_not_empty(image)?;
        self.edit.probe_edit_submit(image, req).await
    }

    pub async fn proxy(&self, remote_url: &str) -> TaskResult<ProxiedBinary> {
        proxy_binary(&self.http, remote_url).await
    }
}

fn ensure_not_empty(image: &[u8]) -> TaskResult<()> {
    if image.is_empty() {
        return Err(TaskError::Validation("uploaded image is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::edit_client::PollPolicy;
    use base64::{Engine as _, engine::general_purpose};
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const EDIT_SUBMIT: &str = "/api/portrait/effects/hairstyle-editor-pro";
    pub(crate) const EDIT_QUERY: &str = "/api/common/query-async-task-result";
    pub(crate) const MODEL_TASKS: &str = "/openapi/v1/image-to-3d";

    /// Service wired to a mock upstream, with storage roots under `dir`.
    pub(crate) fn service(server: &MockServer, dir: &TempDir) -> FusionService {
        let http = Client::new();
        FusionService::new(
            BlobStore::new(dir.path().join("uploads")),
            BlobStore::new(dir.path().join("outputs")),
            EditClient::new(
                http.clone(),
                Some(SecretString::from("edit-key".to_string())),
                server.uri(),
                PollPolicy {
                    interval: Duration::from_millis(5),
                    max_attempts: 20,
                },
            ),
            ModelClient::new(
                http.clone(),
                Some(SecretString::from("model-key".to_string())),
                server.uri(),
            ),
            http,
        )
    }

    /// Submit returns `abc`; first poll is still running, second succeeds.
    pub(crate) async fn mount_successful_edit(server: &MockServer, image: &[u8]) {
        Mock::given(method("POST"))
            .and(path(EDIT_SUBMIT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "abc"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(EDIT_QUERY))
            .and(query_param("task_id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_status": 1})))
            .up_to_n_times(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(EDIT_QUERY))
            .and(query_param("task_id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "task_status": 2,
                "data": {"images": [format!("{}/cdn/abc.png", server.uri())]}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cdn/abc.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(image.to_vec()))
            .mount(server)
            .await;
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn edit_persists_upload_and_result() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_successful_edit(&server, b"FUSED").await;

        let edited = service(&server, &dir)
            .run_edit(b"photo.jpg bytes", &EditRequest::new("bob"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&edited.source_path).unwrap(), b"photo.jpg bytes");
        match &edited.fused {
            ResultLocation::Local(p) => {
                assert!(p.starts_with(dir.path().join("outputs")));
                assert_eq!(std::fs::read(p).unwrap(), b"FUSED");
            }
            other => panic!("expected a local result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let err = service(&server, &dir)
            .run_edit(b"", &EditRequest::new("bob"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::Upload);
        assert!(matches!(err.source, TaskError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(files_in(&dir.path().join("uploads")), 0);
    }

    #[tokio::test]
    async fn failed_edit_keeps_upload_and_skips_model_stage() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path(EDIT_SUBMIT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error_code": 1})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MODEL_TASKS))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = service(&server, &dir)
            .run_full_pipeline(b"img", &EditRequest::new("bob"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::Edit);
        assert!(err.to_string().contains("error_code"));
        assert_eq!(files_in(&dir.path().join("uploads")), 1);
    }

    #[tokio::test]
    async fn full_pipeline_sends_edited_bytes_as_data_uri() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_successful_edit(&server, b"FUSED-PNG").await;
        let expected_input = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(b"FUSED-PNG")
        );
        Mock::given(method("POST"))
            .and(path(MODEL_TASKS))
            .and(body_partial_json(json!({"image_url": expected_input})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "job-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = service(&server, &dir)
            .run_full_pipeline(b"img", &EditRequest::new("bob"))
            .await
            .unwrap();

        assert_eq!(outcome.task_id, "job-42");
        assert!(matches!(outcome.fused, ResultLocation::Local(_)));
        assert!(outcome.source_path.exists());
    }

    #[tokio::test]
    async fn model_failure_is_reported_as_model_stage() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_successful_edit(&server, b"FUSED").await;
        Mock::given(method("POST"))
            .and(path(MODEL_TASKS))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = service(&server, &dir)
            .run_full_pipeline(b"img", &EditRequest::new("bob"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::Model);
        assert!(matches!(err.source, TaskError::Upstream { status: Some(503), .. }));
        assert_eq!(files_in(&dir.path().join("outputs")), 1);
    }

    #[tokio::test]
    async fn model_input_passes_urls_through_and_encodes_files() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let svc = service(&server, &dir);

        let url = ResultLocation::Remote("https://cdn.example/fused.png".into());
        assert_eq!(svc.model_input(&url).await.unwrap(), "https://cdn.example/fused.png");

        let bytes = [0x89u8, b'P', b'N', b'G', 0, 255];
        let path = svc.outputs.save("fused", &bytes, ".png").await.unwrap();
        let uri = svc.model_input(&ResultLocation::Local(path)).await.unwrap();
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(general_purpose::STANDARD.decode(payload).unwrap(), bytes);
    }

    #[tokio::test]
    async fn create_model_job_rejects_blank_url() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let err = service(&server, &dir).create_model_job("  ").await.unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }
}
