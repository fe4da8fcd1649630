//! Batch handlers.

use super::{attachment, parse_batch_id};
use crate::api::AppState;
use crate::error::Result;
use crate::types::CreateBatchRequest;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /batches - Create a batch
#[utoipa::path(
    post,
    path = "/batches",
    tag = "batches",
    request_body = crate::types::CreateBatchRequest,
    responses(
        (status = 201, description = "Batch created, one job per range", body = crate::types::BatchCreated),
        (status = 400, description = "Invalid catalog URL or ranges", body = crate::error::ApiError),
        (status = 429, description = "Rate limit exceeded", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_batch(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateBatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = body?;
    let created = state
        .downloader
        .create_batch(&request.catalog_url, &request.ranges)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /batches/:id - Batch status
#[utoipa::path(
    get,
    path = "/batches/{id}",
    tag = "batches",
    params(
        ("id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Batch status with its jobs in range order", body = crate::types::BatchInfo),
        (status = 404, description = "Batch not found", body = crate::error::ApiError)
    )
)]
pub async fn get_batch(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let id = parse_batch_id(&id)?;
    Ok(Json(state.downloader.batch(id).await?))
}

/// GET /batches/:id/download.pdf - Combined document
#[utoipa::path(
    get,
    path = "/batches/{id}/download.pdf",
    tag = "batches",
    params(
        ("id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Combined PDF of every completed job, in range order", content_type = "application/pdf"),
        (status = 404, description = "Batch not found or no document produced", body = crate::error::ApiError),
        (status = 409, description = "Batch still running", body = crate::error::ApiError)
    )
)]
pub async fn download_batch_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_batch_id(&id)?;
    let artifact = state.downloader.batch_document(id).await?;
    Ok(attachment(artifact))
}
