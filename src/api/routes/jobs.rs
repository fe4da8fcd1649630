//! Job handlers.

use super::{attachment, parse_job_id};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{ArtifactKind, CreateJobRequest};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /jobs - Create a job
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = crate::types::CreateJobRequest,
    responses(
        (status = 201, description = "Job created and started", body = crate::types::JobCreated),
        (status = 400, description = "Invalid catalog URL or page range", body = crate::error::ApiError),
        (status = 429, description = "Rate limit exceeded", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = body?;
    let created = state
        .downloader
        .create_job(&request.catalog_url, request.start_page, request.end_page)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /jobs/:id - Job status
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status and result", body = crate::types::JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.downloader.job(id).await?))
}

/// GET /jobs/:id/download.zip - Job archive
#[utoipa::path(
    get,
    path = "/jobs/{id}/download.zip",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "ZIP archive of the downloaded pages", content_type = "application/zip"),
        (status = 404, description = "Job not found or archive not produced", body = crate::error::ApiError),
        (status = 409, description = "Job still running or failed", body = crate::error::ApiError)
    )
)]
pub async fn download_job_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_job_id(&id)?;
    let artifact = state.downloader.job_artifact(id, ArtifactKind::Archive).await?;
    Ok(attachment(artifact))
}

/// GET /jobs/:id/download.pdf - Job document
#[utoipa::path(
    get,
    path = "/jobs/{id}/download.pdf",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "PDF with one page per image", content_type = "application/pdf"),
        (status = 404, description = "Job not found or document not produced", body = crate::error::ApiError),
        (status = 409, description = "Job still running or failed", body = crate::error::ApiError)
    )
)]
pub async fn download_job_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_job_id(&id)?;
    let artifact = state.downloader.job_artifact(id, ArtifactKind::Document).await?;
    Ok(attachment(artifact))
}
