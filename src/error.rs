//! Error types for nara-dl
//!
//! This module provides the error taxonomy for the library, including:
//! - Domain-specific error types (Job, Fetch, Database, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::ArtifactKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for nara-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nara-dl
///
/// Each variant includes enough context to diagnose the failure and to map it
/// onto an HTTP response without string matching.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "jobs.max_pages_per_request")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Malformed or out-of-bound creation input; nothing was created
    #[error("validation error: {0}")]
    Validation(String),

    /// Admission denied by the rate gate
    #[error("rate limit exceeded ({rule}), retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller may retry
        retry_after_secs: u64,
        /// The rule that denied the request (e.g., "create_job:5/3600s")
        rule: String,
    },

    /// Job or batch lookup and artifact errors
    #[error("{0}")]
    Job(#[from] JobError),

    /// Catalog fetch error that escaped a job (e.g., during validation)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Producing an archive or document failed
    #[error("artifact error: {0}")]
    Artifact(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic not-found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a domain type
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Job and batch errors surfaced to callers
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: String,
    },

    /// Batch not found
    #[error("batch {id} not found")]
    BatchNotFound {
        /// The batch ID that was not found
        id: String,
    },

    /// The owner is still running; the artifact may appear later
    #[error("{artifact} for {id} is not ready yet")]
    ArtifactNotReady {
        /// Job or batch ID
        id: String,
        /// Which artifact was requested
        artifact: ArtifactKind,
    },

    /// The owning job failed, so the artifact will never be produced
    #[error("{artifact} for {id} is unavailable because the job failed")]
    OwnerFailed {
        /// Job ID
        id: String,
        /// Which artifact was requested
        artifact: ArtifactKind,
    },

    /// The owner finished but the artifact was not produced (no files, composer disabled)
    #[error("{artifact} for {id} was not produced")]
    ArtifactUnavailable {
        /// Job or batch ID
        id: String,
        /// Which artifact was requested
        artifact: ArtifactKind,
    },
}

/// Errors reported by a [`PageFetcher`](crate::fetcher::PageFetcher)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The catalog identifier itself is invalid or unreachable; fatal for the job
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Temporary upstream failure (timeout, 5xx, connection reset); worth retrying
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Permanent failure for a single page; recorded and skipped
    #[error("{0}")]
    Page(String),
}

impl FetchError {
    /// Whether this error ends the whole job rather than a single page
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::InvalidCatalog(_))
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "rate_limited",
///     "message": "rate limit exceeded (create_job:5/3600s), retry after 1200s",
///     "details": {
///       "retry_after_seconds": 1200
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,
            Error::Job(JobError::BatchNotFound { .. }) => 404,
            Error::Job(JobError::ArtifactUnavailable { .. }) => 404,

            // 409 Conflict - Resource not in a state that allows the operation
            Error::Job(JobError::ArtifactNotReady { .. }) => 409,
            Error::Job(JobError::OwnerFailed { .. }) => 409,

            // 429 Too Many Requests
            Error::RateLimited { .. } => 429,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Artifact(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - External service errors
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Validation(_) => "validation_error",
            Error::RateLimited { .. } => "rate_limited",
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::BatchNotFound { .. } => "batch_not_found",
                JobError::ArtifactNotReady { .. } => "artifact_not_ready",
                JobError::OwnerFailed { .. } => "job_failed",
                JobError::ArtifactUnavailable { .. } => "artifact_unavailable",
            },
            Error::Fetch(_) => "fetch_error",
            Error::Artifact(_) => "artifact_error",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::RateLimited {
                retry_after_secs,
                rule,
            } => Some(serde_json::json!({
                "retry_after_seconds": retry_after_secs,
                "rule": rule,
            })),
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::BatchNotFound { id }) => Some(serde_json::json!({
                "batch_id": id,
            })),
            Error::Job(
                JobError::ArtifactNotReady { id, artifact }
                | JobError::OwnerFailed { id, artifact }
                | JobError::ArtifactUnavailable { id, artifact },
            ) => Some(serde_json::json!({
                "id": id,
                "artifact": artifact,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}
