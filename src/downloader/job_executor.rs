//! Job admission and execution.
//!
//! A job walks its page range in ascending order. Each page ends in exactly
//! one of: downloaded, skipped (already on disk or missing upstream) or
//! failed (recorded in the job result, the job carries on). Only an invalid
//! catalog or a full or read-only disk ends the job early.

use crate::artifacts::run_blocking;
use crate::db::{JobRow, NewJob};
use crate::error::{Error, JobError, Result};
use crate::fetcher::Catalog;
use crate::retry::fetch_with_retry;
use crate::storage::{is_storage_exhausted, page_file_name};
use crate::types::{ArtifactKind, BatchId, JobCreated, JobId, JobInfo, JobResult, PageRange};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::CatalogDownloader;

/// Message stored on every job interrupted by a restart
pub(crate) const INTERRUPTED_BY_RESTART: &str =
    "interrupted: service restarted before the job finished";

/// What the executor needs to run one job
#[derive(Debug, Clone)]
pub(crate) struct JobPlan {
    pub(crate) id: JobId,
    pub(crate) catalog_id: String,
    pub(crate) range: PageRange,
    pub(crate) batch_id: Option<BatchId>,
}

impl From<&NewJob> for JobPlan {
    fn from(job: &NewJob) -> Self {
        Self {
            id: job.id,
            catalog_id: job.catalog_id.clone(),
            range: PageRange::new(job.start_page, job.end_page),
            batch_id: job.batch_id,
        }
    }
}

/// How an execution attempt ended
#[derive(Debug, PartialEq, Eq)]
enum ExecutionEnd {
    /// Result and artifacts are recorded
    Completed,
    /// The job must be marked failed with this cause
    Failed(String),
    /// Stopped by shutdown; the row keeps its last persisted progress
    Interrupted,
    /// Another party already moved the job out of `queued`
    NotStarted,
    /// The row was settled by someone else mid-run, e.g. an orphan sweep
    Lost,
}

impl CatalogDownloader {
    /// Create a standalone job and start executing it
    ///
    /// Validation runs first; nothing is persisted when it fails.
    pub async fn create_job(
        &self,
        catalog_id: &str,
        start_page: u32,
        end_page: u32,
    ) -> Result<JobCreated> {
        self.ensure_accepting()?;
        let range = PageRange::new(start_page, end_page);
        self.validate_request(catalog_id, &[range])?;

        let job = NewJob {
            id: JobId::new(),
            catalog_id: catalog_id.trim().to_string(),
            start_page,
            end_page,
            batch_id: None,
            batch_index: None,
        };
        self.db.insert_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            catalog_id = %job.catalog_id,
            range = %range,
            "Job created"
        );

        self.spawn_job(JobPlan::from(&job)).await;
        Ok(JobCreated::new(job.id))
    }

    /// Current persisted state of a job
    pub async fn job(&self, id: JobId) -> Result<JobInfo> {
        self.job_row(id).await?.try_into()
    }

    pub(crate) async fn job_row(&self, id: JobId) -> Result<JobRow> {
        self.db.get_job(id).await?.ok_or_else(|| {
            Error::Job(JobError::NotFound {
                id: id.to_string(),
            })
        })
    }

    /// Poll until a job reaches a terminal state or `timeout` elapses
    pub async fn wait_for_job(&self, id: JobId, timeout: Duration) -> Result<JobInfo> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let info = self.job(id).await?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Other(format!(
                    "timed out waiting for job {id} to finish"
                )));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Register a cancellation token for the job and run it on its own task
    ///
    /// The token is registered before the task starts, so shutdown always
    /// sees every job it has to wait for.
    pub(crate) async fn spawn_job(&self, plan: JobPlan) {
        let token = self.executor_state.services_token.child_token();
        self.executor_state
            .active_jobs
            .lock()
            .await
            .insert(plan.id, token.clone());

        let downloader = self.clone();
        tokio::spawn(async move {
            let id = plan.id;
            downloader.run_job(plan, token).await;
            downloader.executor_state.active_jobs.lock().await.remove(&id);
        });
    }

    async fn run_job(&self, plan: JobPlan, cancel: CancellationToken) {
        let end = match self.execute_job(&plan, &cancel).await {
            Ok(end) => end,
            Err(e) => {
                tracing::error!(job_id = %plan.id, error = %e, "Job execution error");
                ExecutionEnd::Failed(e.to_string())
            }
        };

        let end = match end {
            ExecutionEnd::Failed(cause) => {
                tracing::warn!(job_id = %plan.id, error = %cause, "Job failed");
                match self.db.fail_job(plan.id, &cause).await {
                    Ok(false) => ExecutionEnd::Lost,
                    Ok(true) => {
                        self.journal(plan.id, &format!("Job failed: {cause}")).await;
                        ExecutionEnd::Failed(cause)
                    }
                    Err(e) => {
                        tracing::error!(job_id = %plan.id, error = %e, "Failed to record job failure");
                        ExecutionEnd::Failed(cause)
                    }
                }
            }
            other => other,
        };

        match end {
            ExecutionEnd::Completed => {
                tracing::info!(job_id = %plan.id, "Job completed");
                self.journal(plan.id, "Job completed").await;
            }
            ExecutionEnd::Failed(_) => {}
            ExecutionEnd::Lost => {
                tracing::warn!(
                    job_id = %plan.id,
                    "Job was settled elsewhere while running, discarding this run's outcome"
                );
                return;
            }
            ExecutionEnd::Interrupted => {
                tracing::info!(job_id = %plan.id, "Job interrupted by shutdown");
                return;
            }
            ExecutionEnd::NotStarted => {
                tracing::debug!(job_id = %plan.id, "Job was no longer queued, not running it");
                return;
            }
        }

        if let Some(batch_id) = plan.batch_id {
            if let Err(e) = self.on_batch_job_finished(batch_id).await {
                tracing::error!(
                    batch_id = %batch_id,
                    job_id = %plan.id,
                    error = %e,
                    "Failed to update batch after job finished"
                );
            }
        }
    }

    async fn execute_job(&self, plan: &JobPlan, cancel: &CancellationToken) -> Result<ExecutionEnd> {
        if !self.db.mark_job_running(plan.id).await? {
            return Ok(ExecutionEnd::NotStarted);
        }
        self.storage.prepare_job(plan.id).await?;
        self.journal(
            plan.id,
            &format!("Job started: {} pages {}", plan.catalog_id, plan.range),
        )
        .await;

        let retry = &self.config.jobs.retry;
        let fetcher = &self.collaborators.fetcher;

        let catalog = match fetch_with_retry(retry, || fetcher.resolve(&plan.catalog_id)).await {
            Ok(catalog) => catalog,
            Err(e) => return Ok(ExecutionEnd::Failed(e.to_string())),
        };
        tracing::debug!(
            job_id = %plan.id,
            record = %catalog.id,
            total_pages = catalog.total_pages,
            "Catalog record resolved"
        );
        self.db
            .update_job_message(
                plan.id,
                &format!("Found {} images in record", catalog.total_pages),
            )
            .await?;

        let mut result = JobResult {
            total_available: catalog.total_pages,
            ..JobResult::default()
        };
        let delay = Duration::from_millis(self.config.jobs.page_delay_ms);
        let mut pages_done: u32 = 0;

        for page in plan.range.pages() {
            if cancel.is_cancelled() {
                return Ok(ExecutionEnd::Interrupted);
            }

            let (message, fetched) = match self.process_page(plan.id, &catalog, page, &mut result).await? {
                PageOutcome::Done { message, fetched } => (message, fetched),
                PageOutcome::Fatal(cause) => return Ok(ExecutionEnd::Failed(cause)),
            };

            pages_done += 1;
            if !self
                .db
                .update_job_progress(plan.id, pages_done, &message)
                .await?
            {
                return Ok(ExecutionEnd::Lost);
            }
            self.journal(plan.id, &message).await;

            if fetched && !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(ExecutionEnd::Interrupted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let (archive_available, document_available) = self.produce_job_artifacts(plan.id).await?;
        if !self
            .db
            .complete_job(plan.id, &result, archive_available, document_available)
            .await?
        {
            return Ok(ExecutionEnd::Lost);
        }

        tracing::debug!(
            job_id = %plan.id,
            downloaded = result.downloaded,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Job pages processed"
        );
        Ok(ExecutionEnd::Completed)
    }

    async fn process_page(
        &self,
        id: JobId,
        catalog: &Catalog,
        page: u32,
        result: &mut JobResult,
    ) -> Result<PageOutcome> {
        let name = page_file_name(page);

        if page > catalog.total_pages {
            result.skipped += 1;
            return Ok(PageOutcome::skipped(format!(
                "Page {page} not available upstream"
            )));
        }
        if self.storage.has_page(id, page).await {
            result.skipped += 1;
            return Ok(PageOutcome::skipped(format!("Skipped existing {name}")));
        }

        let retry = &self.config.jobs.retry;
        let fetcher = &self.collaborators.fetcher;
        let message = match fetch_with_retry(retry, || fetcher.fetch_page(catalog, page)).await {
            Ok(Some(bytes)) => match self.storage.write_page(id, page, &bytes).await {
                Ok(_) => {
                    result.downloaded += 1;
                    format!("Downloaded {name}")
                }
                Err(e) if is_storage_exhausted(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %id, page, error = %e, "Failed to store page");
                    result.errors.push(format!("Failed to store page {page}: {e}"));
                    result.skipped += 1;
                    format!("Failed to store page {page}")
                }
            },
            Ok(None) => {
                result.skipped += 1;
                format!("Page {page} not available upstream")
            }
            Err(e) if e.is_fatal() => return Ok(PageOutcome::Fatal(e.to_string())),
            Err(e) => {
                tracing::warn!(job_id = %id, page, error = %e, "Page download failed");
                result.errors.push(e.to_string());
                result.skipped += 1;
                format!("Failed to download page {page}")
            }
        };

        Ok(PageOutcome::Done {
            message,
            fetched: true,
        })
    }

    /// Build the per-job archive and, when enabled, the document
    ///
    /// Returns `(archive_available, document_available)`. An archive failure
    /// is an error and fails the job; a document failure only clears its flag.
    async fn produce_job_artifacts(&self, id: JobId) -> Result<(bool, bool)> {
        let images = self.storage.list_images(id).await?;
        if images.is_empty() {
            tracing::info!(job_id = %id, "No pages on disk, skipping archive and document");
            return Ok((false, false));
        }

        self.db.update_job_message(id, "Creating ZIP archive...").await?;
        self.journal(id, "Creating ZIP archive...").await;
        let archiver = self.collaborators.archiver.clone();
        let archive_path = self.storage.job_artifact_path(id, ArtifactKind::Archive);
        let archive_images = images.clone();
        run_blocking(move || archiver.write_archive(&archive_images, &archive_path)).await?;

        let Some(composer) = self.collaborators.composer.clone() else {
            return Ok((true, false));
        };

        self.db.update_job_message(id, "Creating PDF...").await?;
        self.journal(id, "Creating PDF...").await;
        let document_path = self.storage.job_artifact_path(id, ArtifactKind::Document);
        let document = match run_blocking(move || composer.compose(&images, &document_path)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to create document, archive only");
                self.journal(id, &format!("PDF creation failed: {e}")).await;
                false
            }
        };

        Ok((true, document))
    }

    /// Append to the job's activity log; a failed write is only logged
    async fn journal(&self, id: JobId, message: &str) {
        if let Err(e) = self.storage.append_log(id, message).await {
            tracing::debug!(job_id = %id, error = %e, "Failed to append to job log");
        }
    }
}

enum PageOutcome {
    Done { message: String, fetched: bool },
    Fatal(String),
}

impl PageOutcome {
    fn skipped(message: String) -> Self {
        PageOutcome::Done {
            message,
            fetched: false,
        }
    }
}
