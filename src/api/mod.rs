//! REST API server module
//!
//! Exposes job and batch creation, status polling and artifact downloads
//! over HTTP. With rate limiting enabled, every request passes the rate gate
//! before it is routed.

use crate::rate_gate::RateGate;
use crate::{CatalogDownloader, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /jobs` - Create a job over one page range
/// - `GET /jobs/:id` - Job status and result
/// - `GET /jobs/:id/download.zip` - Page images as a ZIP archive
/// - `GET /jobs/:id/download.pdf` - Page images as one PDF
///
/// ## Batches
/// - `POST /batches` - Create a batch, one job per range
/// - `GET /batches/:id` - Batch status with its jobs in range order
/// - `GET /batches/:id/download.pdf` - Combined PDF of the completed jobs
///
/// ## System
/// - `GET /health` - Health check (never rate limited)
/// - `GET /capabilities` - Limits and features
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(downloader: Arc<CatalogDownloader>, config: Arc<Config>) -> Router {
    let db = downloader.db.clone();
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Jobs
        .route("/jobs", post(routes::create_job))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/download.zip", get(routes::download_job_archive))
        .route("/jobs/:id/download.pdf", get(routes::download_job_document))
        // Batches
        .route("/batches", post(routes::create_batch))
        .route("/batches/:id", get(routes::get_batch))
        .route("/batches/:id/download.pdf", get(routes::download_batch_document))
        // System
        .route("/health", get(routes::health_check))
        .route("/capabilities", get(routes::get_capabilities))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state);

    // The last layer applied is the outermost:
    //   Request → Trace → CORS → Rate gate → Handler
    let router = if config.server.api.rate_limit.enabled {
        let gate = Arc::new(RateGate::from_config(
            config.server.api.rate_limit.clone(),
            db,
        ));
        router.layer(middleware::from_fn_with_state(
            gate,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        router
    };

    let router = if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until [`CatalogDownloader::shutdown`] is called, then stops
/// accepting connections and lets in-flight requests finish.
///
/// # Example
///
/// ```no_run
/// use nara_dl::{CatalogDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(CatalogDownloader::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// nara_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    downloader: Arc<CatalogDownloader>,
    config: Arc<Config>,
) -> Result<()> {
    let bind_address = config.server.api.bind_address;
    let shutdown = downloader.executor_state.services_token.child_token();

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    // ConnectInfo<SocketAddr> is required by the rate gate middleware
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
