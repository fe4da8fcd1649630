//! # nara-dl
//!
//! Background page-range downloads from the National Archives catalog.
//!
//! A client submits a catalog record and one or more page ranges. Each range
//! becomes a job that fetches its pages in the background and packs them
//! into a ZIP archive and a PDF. Several ranges submitted together form a
//! batch, whose completed jobs are merged into one combined PDF in range
//! order. Job and batch state lives in SQLite and can be polled at any time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nara_dl::{CatalogDownloader, Config, PageRange};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = CatalogDownloader::new(Config::default()).await?;
//!
//!     let batch = downloader
//!         .create_batch(
//!             "https://catalog.archives.gov/id/178788901",
//!             &[PageRange::new(1, 20), PageRange::new(400, 420)],
//!         )
//!         .await?;
//!
//!     for job in &batch.jobs {
//!         let info = downloader.wait_for_job(job.job_id, Duration::from_secs(600)).await?;
//!         println!("{}: {:?} ({}/{})", info.id, info.status, info.pages_done, info.pages_total);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Archive and document production
pub mod artifacts;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Job execution and batch coordination (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Catalog record lookup and page fetching
pub mod fetcher;
/// Per-client admission quotas
pub mod rate_gate;
/// Time-based deletion of finished work
pub mod reclaimer;
/// Retry logic with exponential backoff
pub mod retry;
/// On-disk layout of page images and artifacts
pub mod storage;
/// Core types
pub mod types;

// Re-export commonly used types
pub use artifacts::{ArchiveWriter, DocumentComposer, PdfComposer, ZipArchiveWriter};
pub use config::{Config, QuotaRule, RateLimitBackend};
pub use db::Database;
pub use downloader::CatalogDownloader;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, FetchError, JobError, Result, ToHttpStatus,
};
pub use fetcher::{Catalog, NaraFetcher, PageFetcher};
pub use rate_gate::{CounterStore, OperationClass, RateGate};
pub use reclaimer::{Reclaimer, SweepReport};
pub use types::{
    Artifact, ArtifactKind, BatchCreated, BatchId, BatchInfo, BatchStatus, Capabilities,
    JobCreated, JobId, JobInfo, JobResult, JobStatus, PageRange,
};

/// Run the downloader until a termination signal arrives, then shut it down.
///
/// Starts the reclaimer first. On Unix both SIGTERM and SIGINT are honoured;
/// elsewhere Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use nara_dl::{CatalogDownloader, Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = Arc::new(CatalogDownloader::new(Config::default()).await?);
///     downloader.spawn_api_server();
///
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: std::sync::Arc<CatalogDownloader>) -> Result<()> {
    let reclaimer = downloader.spawn_reclaimer();

    wait_for_signal().await;
    downloader.shutdown().await?;

    if let Err(e) = reclaimer.await {
        tracing::warn!(error = %e, "Reclaimer task ended abnormally");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
        _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
