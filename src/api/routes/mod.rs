//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Job creation, status and downloads
//! - [`batches`] — Batch creation, status and the combined document
//! - [`system`] — Health, capabilities, OpenAPI

use crate::error::{Error, JobError, Result};
use crate::types::{Artifact, BatchId, JobId};
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

mod batches;
mod jobs;
mod system;

pub use batches::*;
pub use jobs::*;
pub use system::*;

/// Parse a job id from the path; anything that is not a UUID names no job
fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse().map_err(|_| {
        Error::Job(JobError::NotFound {
            id: raw.to_string(),
        })
    })
}

/// Parse a batch id from the path; anything that is not a UUID names no batch
fn parse_batch_id(raw: &str) -> Result<BatchId> {
    raw.parse().map_err(|_| {
        Error::Job(JobError::BatchNotFound {
            id: raw.to_string(),
        })
    })
}

/// Serve artifact bytes as an attachment
fn attachment(artifact: Artifact) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    let mut response = (StatusCode::OK, artifact.bytes).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.kind.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
