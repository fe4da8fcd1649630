//! Core downloader implementation split into focused submodules.
//!
//! The `CatalogDownloader` struct and its methods are organized by domain:
//! - [`job_executor`] - Job admission and the per-job page loop
//! - [`batch_coordinator`] - Batch admission, status and combined-document assembly
//! - [`downloads`] - Serving finished archives and documents
//! - [`lifecycle`] - Startup recovery and shutdown coordination
//! - [`services`] - Background service starters (reclaimer, API server)

mod batch_coordinator;
mod downloads;
mod job_executor;
mod lifecycle;
mod services;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::artifacts::{ArchiveWriter, DocumentComposer, PdfComposer, ZipArchiveWriter};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetcher::{NaraFetcher, PageFetcher};
use crate::storage::Storage;
use crate::types::{Capabilities, JobId, PageRange};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Running-job and admission state
#[derive(Clone)]
pub(crate) struct ExecutorState {
    /// Cancellation tokens of jobs whose executor task is alive
    pub(crate) active_jobs: Arc<tokio::sync::Mutex<HashMap<JobId, CancellationToken>>>,
    /// Flag cleared during shutdown so no new jobs or batches are admitted
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown to stop background services
    pub(crate) services_token: CancellationToken,
}

impl ExecutorState {
    fn new() -> Self {
        Self {
            active_jobs: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            services_token: CancellationToken::new(),
        }
    }
}

/// Pluggable collaborators of the executor
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) archiver: Arc<dyn ArchiveWriter>,
    /// `None` disables per-job and combined documents
    pub(crate) composer: Option<Arc<dyn DocumentComposer>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns job execution, batch coordination and the on-disk layout. Every job
/// runs as its own tokio task; state lives in SQLite so status reads never
/// touch executor memory.
#[derive(Clone)]
pub struct CatalogDownloader {
    /// Database instance for persistence
    pub db: Arc<Database>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// On-disk layout under the data directory
    pub(crate) storage: Storage,
    /// Fetcher, archiver and composer
    pub(crate) collaborators: Collaborators,
    /// Running jobs and admission flag
    pub(crate) executor_state: ExecutorState,
}

impl CatalogDownloader {
    /// Create a new CatalogDownloader instance
    ///
    /// Opens the database, wires up the production collaborators and runs
    /// startup recovery before returning.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.storage.database_path).await?;
        let fetcher: Arc<dyn PageFetcher> = Arc::new(NaraFetcher::new(config.catalog.clone())?);
        let archiver: Arc<dyn ArchiveWriter> = Arc::new(ZipArchiveWriter);
        let composer: Option<Arc<dyn DocumentComposer>> = if config.jobs.compose_documents {
            Some(Arc::new(PdfComposer))
        } else {
            tracing::info!("Document composition disabled, jobs will produce archives only");
            None
        };

        Self::with_collaborators(config, db, fetcher, archiver, composer).await
    }

    /// Create a CatalogDownloader with caller-supplied collaborators
    ///
    /// Used by tests and embedders that fetch from somewhere other than the
    /// National Archives catalog. Startup recovery runs here as well, and the
    /// heartbeat task is started.
    pub async fn with_collaborators(
        config: Config,
        db: Database,
        fetcher: Arc<dyn PageFetcher>,
        archiver: Arc<dyn ArchiveWriter>,
        composer: Option<Arc<dyn DocumentComposer>>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.data_dir()).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create data directory '{}': {}",
                    config.data_dir().display(),
                    e
                ),
            ))
        })?;

        let downloader = Self {
            db: Arc::new(db),
            storage: Storage::new(config.data_dir().clone()),
            config: Arc::new(config),
            collaborators: Collaborators {
                fetcher,
                archiver,
                composer,
            },
            executor_state: ExecutorState::new(),
        };

        downloader.recover().await?;
        downloader.spawn_heartbeat();

        tracing::info!(
            data_dir = %downloader.storage.root().display(),
            fetcher = downloader.collaborators.fetcher.name(),
            "Catalog downloader ready"
        );

        Ok(downloader)
    }

    /// Get a reference to the current configuration
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Limits and features clients can rely on
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            max_pages_per_request: self.config.jobs.max_pages_per_request,
            max_ranges_per_batch: self.config.jobs.max_ranges_per_batch,
            documents: self.collaborators.composer.is_some(),
            fetcher: self.collaborators.fetcher.name().to_string(),
        }
    }

    /// Whether new jobs and batches are being admitted
    pub fn is_accepting(&self) -> bool {
        self.executor_state.accepting_new.load(Ordering::SeqCst)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    /// Check a request against the page and range limits and the catalog identifier
    ///
    /// Runs before anything is persisted; a rejected request leaves no trace.
    pub(crate) fn validate_request(&self, catalog_id: &str, ranges: &[PageRange]) -> Result<()> {
        let limits = &self.config.jobs;

        if ranges.is_empty() {
            return Err(Error::Validation("at least one page range is required".into()));
        }
        if ranges.len() > limits.max_ranges_per_batch {
            return Err(Error::Validation(format!(
                "too many ranges: {} (maximum {})",
                ranges.len(),
                limits.max_ranges_per_batch
            )));
        }

        let mut total: u64 = 0;
        for range in ranges {
            if range.start_page < 1 {
                return Err(Error::Validation(format!(
                    "invalid range {range}: pages start at 1"
                )));
            }
            if range.end_page < range.start_page {
                return Err(Error::Validation(format!(
                    "invalid range {range}: end page is before start page"
                )));
            }
            total += u64::from(range.page_count());
        }
        if total > u64::from(limits.max_pages_per_request) {
            return Err(Error::Validation(format!(
                "too many pages requested: {} (maximum {})",
                total, limits.max_pages_per_request
            )));
        }

        self.collaborators
            .fetcher
            .validate(catalog_id)
            .map_err(Error::Validation)
    }
}
