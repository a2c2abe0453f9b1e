//! HTTP handlers for the hairstyle and image-to-3D relay.
//! Form parsing and response shaping live here; everything that talks to an
//! upstream or touches disk is delegated to `FusionService`.

use crate::{
    errors::AppError,
    models::{edit_job::{EditProbe, EditRequest}, model_job::ModelTaskSnapshot},
    services::fusion_service::FusionService,
};
use axum::{
    Form, Json,
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Form body for `POST /fusion/meshify`.
#[derive(Debug, Deserialize)]
pub struct MeshifyForm {
    pub image_url: Option<String>,
}

/// Query for `GET /fusion/mesh-view`.
#[derive(Debug, Deserialize)]
pub struct MeshViewQuery {
    pub glb_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HairFusionResponse {
    pub status: String,
    pub source_image_url: String,
    pub fused_image_url: String,
    pub used_image_source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskCreatedResponse {
    pub status: String,
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FullPipelineResponse {
    pub status: String,
    pub task_id: String,
    pub source_image_url: String,
    pub fused_image_url: String,
}

/// Portrait upload plus edit parameters, as sent by the browser.
struct FusionUpload {
    image: Bytes,
    request: EditRequest,
}

/// Read `file`, `hair_style`, `color` and `image_size` from a multipart body.
async fn read_fusion_upload(mut multipart: Multipart) -> Result<FusionUpload, AppError> {
    let mut image = None;
    let mut hair_style = None;
    let mut color = None;
    let mut image_size = Some(EditRequest::DEFAULT_IMAGE_SIZE);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let unreadable = |e: MultipartError| AppError::validation(format!("could not read field `{}`: {}", name, e));

        match name.as_str() {
            "file" => image = Some(field.bytes().await.map_err(unreadable)?),
            "hair_style" => hair_style = Some(field.text().await.map_err(unreadable)?),
            "color" => {
                let value = field.text().await.map_err(unreadable)?;
                color = (!value.is_empty()).then_some(value);
            }
            "image_size" => {
                let value = field.text().await.map_err(unreadable)?;
                let value = value.trim();
                if !value.is_empty() {
                    image_size = Some(value.parse::<u32>().map_err(|_| {
                        AppError::validation(format!("image_size must be an integer, got `{}`", value))
                    })?);
                }
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::validation("missing `file` field"))?;
    if image.is_empty() {
        return Err(AppError::validation("uploaded image is empty"));
    }
    let hair_style = hair_style
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::validation("missing `hair_style` field"))?;

    Ok(FusionUpload {
        image,
        request: EditRequest {
            color,
            image_size,
            ..EditRequest::new(hair_style)
        },
    })
}

/// `POST /fusion/hair` — edit the portrait and keep the result on disk.
pub async fn hair_fusion(
    State(service): State<FusionService>,
    multipart: Multipart,
) -> Result<Json<HairFusionResponse>, AppError> {
    let upload = read_fusion_upload(multipart).await?;
    let edited = service.run_edit(&upload.image, &upload.request).await?;

    Ok(Json(HairFusionResponse {
        status: "ok".into(),
        source_image_url: edited.source_path.display().to_string(),
        fused_image_url: edited.fused.display(),
        used_image_source: "fused".into(),
    }))
}

/// `POST /fusion/full` — edit, then start the 3D task from the edited image.
pub async fn full_pipeline(
    State(service): State<FusionService>,
    multipart: Multipart,
) -> Result<Json<FullPipelineResponse>, AppError> {
    let upload = read_fusion_upload(multipart).await?;
    let outcome = service.run_full_pipeline(&upload.image, &upload.request).await?;
    info!("full pipeline created 3D task {}", outcome.task_id);

    Ok(Json(FullPipelineResponse {
        status: "task_created".into(),
        task_id: outcome.task_id,
        source_image_url: outcome.source_path.display().to_string(),
        fused_image_url: outcome.fused.display(),
    }))
}

/// Read `image_url` from either an urlencoded or a multipart form body.
async fn read_meshify_form(request: Request) -> Result<MeshifyForm, AppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(form) = Form::<MeshifyForm>::from_request(request, &())
            .await
            .map_err(|e| AppError::new(e.status(), "validation", e.body_text()))?;
        return Ok(form);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::new(e.status(), "validation", e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("image_url") {
            let image_url = field
                .text()
                .await
                .map_err(|e| AppError::validation(format!("could not read field `image_url`: {}", e)))?;
            return Ok(MeshifyForm {
                image_url: Some(image_url),
            });
        }
    }
    Ok(MeshifyForm { image_url: None })
}

/// `POST /fusion/meshify` — start a 3D task from an image URL or data URI.
pub async fn meshify_create(
    State(service): State<FusionService>,
    request: Request,
) -> Result<Json<TaskCreatedResponse>, AppError> {
    let image_url = read_meshify_form(request)
        .await?
        .image_url
        .ok_or_else(|| AppError::validation("missing `image_url` field"))?;
    let task_id = service.create_model_job(&image_url).await?;

    Ok(Json(TaskCreatedResponse {
        status: "task_created".into(),
        task_id,
    }))
}

/// `GET /fusion/meshify/{task_id}` — one status snapshot of a 3D task.
pub async fn meshify_result(
    State(service): State<FusionService>,
    Path(task_id): Path<String>,
) -> Result<Json<ModelTaskSnapshot>, AppError> {
    Ok(Json(service.model_job_status(&task_id).await?))
}

/// `GET /fusion/mesh-view?glb_url=` — relay a remote model file.
pub async fn mesh_view(
    State(service): State<FusionService>,
    Query(q): Query<MeshViewQuery>,
) -> Result<Response, AppError> {
    let glb_url = q
        .glb_url
        .ok_or_else(|| AppError::validation("missing `glb_url` query parameter"))?;
    let proxied = service.proxy(&glb_url).await?;

    let mut response = Response::new(Body::from(proxied.bytes));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&proxied.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}

/// `POST /fusion/ailab-pro-test` — submit once and show the raw upstream reply.
pub async fn edit_probe(
    State(service): State<FusionService>,
    multipart: Multipart,
) -> Result<Json<EditProbe>, AppError> {
    let upload = read_fusion_upload(multipart).await?;
    Ok(Json(service.probe_edit(&upload.image, &upload.request).await?))
}
