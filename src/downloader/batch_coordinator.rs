//! Batch admission, status aggregation and combined-document assembly.
//!
//! A batch is a set of jobs over one catalog, one job per requested range.
//! Its status is never stored; it is derived from its jobs on every read.
//! When the last job turns terminal the combined document is assembled
//! exactly once, guarded by a compare-and-set claim in the database.

use crate::artifacts::run_blocking;
use crate::db::{BatchRow, JobRow, NewBatch, NewJob};
use crate::error::{Error, JobError, Result};
use crate::types::{
    BatchCreated, BatchId, BatchInfo, BatchStatus, JobId, JobInfo, JobStatus, PageRange,
};

use super::CatalogDownloader;
use super::job_executor::JobPlan;

impl CatalogDownloader {
    /// Create a batch of jobs, one per range, and start executing them
    ///
    /// The batch and all of its jobs are inserted in one transaction after
    /// validation, so a rejected request creates nothing.
    pub async fn create_batch(&self, catalog_id: &str, ranges: &[PageRange]) -> Result<BatchCreated> {
        self.ensure_accepting()?;
        self.validate_request(catalog_id, ranges)?;

        let catalog_id = catalog_id.trim().to_string();
        let batch = NewBatch {
            id: BatchId::new(),
            catalog_id: catalog_id.clone(),
        };
        let jobs: Vec<NewJob> = ranges
            .iter()
            .enumerate()
            .map(|(index, range)| NewJob {
                id: JobId::new(),
                catalog_id: catalog_id.clone(),
                start_page: range.start_page,
                end_page: range.end_page,
                batch_id: Some(batch.id),
                batch_index: Some(index as u32),
            })
            .collect();

        self.db.insert_batch(&batch, &jobs).await?;

        tracing::info!(
            batch_id = %batch.id,
            catalog_id = %catalog_id,
            ranges = jobs.len(),
            "Batch created"
        );

        for job in &jobs {
            self.spawn_job(JobPlan::from(job)).await;
        }

        let job_ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        Ok(BatchCreated::new(batch.id, &job_ids))
    }

    /// Current state of a batch with its jobs in range order
    pub async fn batch(&self, id: BatchId) -> Result<BatchInfo> {
        let row = self.batch_row(id).await?;
        let job_rows = self.db.list_batch_jobs(id).await?;
        let status = BatchStatus::from_jobs(job_rows.iter().map(JobRow::status));

        let jobs = job_rows
            .into_iter()
            .map(JobInfo::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchInfo {
            id: row.batch_id()?,
            catalog_id: row.catalog_id,
            status,
            jobs,
            combined_document_available: row.combined_document_available,
            created_at: crate::db::timestamp(row.created_at),
            completed_at: row.completed_at.map(crate::db::timestamp),
        })
    }

    pub(crate) async fn batch_row(&self, id: BatchId) -> Result<BatchRow> {
        self.db.get_batch(id).await?.ok_or_else(|| {
            Error::Job(JobError::BatchNotFound {
                id: id.to_string(),
            })
        })
    }

    /// Called whenever one of the batch's jobs becomes terminal
    ///
    /// Several jobs may finish at the same moment; all of them observe the
    /// batch, but only the one that wins the assembly claim builds the
    /// combined document.
    pub(crate) async fn on_batch_job_finished(&self, batch_id: BatchId) -> Result<()> {
        let jobs = self.db.list_batch_jobs(batch_id).await?;
        let status = BatchStatus::from_jobs(jobs.iter().map(JobRow::status));
        if !status.is_terminal() {
            return Ok(());
        }

        if !self.db.claim_batch_assembly(batch_id).await? {
            tracing::debug!(batch_id = %batch_id, "Batch assembly already claimed");
            return Ok(());
        }

        self.assemble_batch(batch_id, &jobs).await
    }

    /// Build the combined document from completed jobs, in range order
    ///
    /// Caller must hold the assembly claim. The batch is marked finished
    /// whether or not a document came out of it.
    pub(crate) async fn assemble_batch(&self, batch_id: BatchId, jobs: &[JobRow]) -> Result<()> {
        let document_available = match self.compose_combined_document(batch_id, jobs).await {
            Ok(produced) => produced,
            Err(e) => {
                tracing::warn!(batch_id = %batch_id, error = %e, "Failed to create combined document");
                false
            }
        };

        self.db
            .finish_batch_assembly(batch_id, document_available)
            .await?;

        tracing::info!(
            batch_id = %batch_id,
            combined_document = document_available,
            "Batch finished"
        );
        Ok(())
    }

    async fn compose_combined_document(&self, batch_id: BatchId, jobs: &[JobRow]) -> Result<bool> {
        let Some(composer) = self.collaborators.composer.clone() else {
            return Ok(false);
        };

        let mut images = Vec::new();
        for job in jobs.iter().filter(|job| job.status() == JobStatus::Completed) {
            images.extend(self.storage.list_images(job.job_id()?).await?);
        }
        if images.is_empty() {
            tracing::info!(batch_id = %batch_id, "No completed pages, skipping combined document");
            return Ok(false);
        }

        self.storage.prepare_batch(batch_id).await?;
        let dest = self.storage.combined_document_path(batch_id);
        tracing::debug!(batch_id = %batch_id, pages = images.len(), "Composing combined document");
        run_blocking(move || composer.compose(&images, &dest)).await?;

        Ok(true)
    }
}
