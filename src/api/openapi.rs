//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the nara-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the nara-dl REST API
///
/// Served as JSON at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "nara-dl REST API",
        version = "0.1.0",
        description = "Background page-range downloads from the National Archives catalog, with batches and combined documents",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5001", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::create_job,
        crate::api::routes::get_job,
        crate::api::routes::download_job_archive,
        crate::api::routes::download_job_document,

        // Batches
        crate::api::routes::create_batch,
        crate::api::routes::get_batch,
        crate::api::routes::download_batch_document,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_capabilities,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobStatus,
        crate::types::BatchStatus,
        crate::types::PageRange,
        crate::types::ArtifactKind,
        crate::types::JobResult,
        crate::types::JobInfo,
        crate::types::BatchInfo,
        crate::types::CreateJobRequest,
        crate::types::CreateBatchRequest,
        crate::types::JobCreated,
        crate::types::BatchJobCreated,
        crate::types::BatchCreated,
        crate::types::Capabilities,

        // Retention sweep reports
        crate::reclaimer::SweepReport,
        crate::reclaimer::ReclaimTarget,
        crate::reclaimer::ReclaimKind,

        // Config types from config.rs
        crate::config::Config,
        crate::config::StorageConfig,
        crate::config::JobsConfig,
        crate::config::RetryConfig,
        crate::config::CatalogConfig,
        crate::config::ReclaimConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,
        crate::config::RateLimitConfig,
        crate::config::RateLimitBackend,
        crate::config::QuotaRule,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Download one page range of a catalog record"),
        (name = "batches", description = "Batches - Several ranges of one record, combined into one document"),
        (name = "system", description = "System endpoints - Health checks, capabilities, OpenAPI spec"),
    )
)]
pub struct ApiDoc;
