//! Serving finished archives and documents.

use crate::error::{Error, JobError, Result};
use crate::db::JobRow;
use crate::types::{Artifact, ArtifactKind, BatchId, BatchStatus, JobId, JobStatus};

use super::CatalogDownloader;

impl CatalogDownloader {
    /// Bytes of a job's archive or document
    ///
    /// Errors distinguish a job that is still running, a job that failed and
    /// a completed job that never produced the requested artifact.
    pub async fn job_artifact(&self, id: JobId, kind: ArtifactKind) -> Result<Artifact> {
        if kind == ArtifactKind::CombinedDocument {
            return Err(Error::Validation(
                "combined documents belong to batches, not jobs".into(),
            ));
        }

        let row = self.job_row(id).await?;
        let produced = match kind {
            ArtifactKind::Archive => row.archive_available,
            _ => row.document_available,
        };
        check_job_artifact(&row, id, kind, produced)?;

        let bytes = self
            .storage
            .read_artifact(&self.storage.job_artifact_path(id, kind))
            .await?;

        Ok(Artifact {
            kind,
            filename: format!("nara-{}.{}", id.short(), kind.extension()),
            bytes,
        })
    }

    /// Bytes of a batch's combined document
    pub async fn batch_document(&self, id: BatchId) -> Result<Artifact> {
        let kind = ArtifactKind::CombinedDocument;
        let row = self.batch_row(id).await?;

        if !row.combined_document_available {
            let jobs = self.db.list_batch_jobs(id).await?;
            let status = BatchStatus::from_jobs(jobs.iter().map(JobRow::status));
            // Terminal jobs with an unfinished assembly mean the document is still being built
            let error = if !status.is_terminal() || row.completed_at.is_none() {
                JobError::ArtifactNotReady {
                    id: id.to_string(),
                    artifact: kind,
                }
            } else {
                JobError::ArtifactUnavailable {
                    id: id.to_string(),
                    artifact: kind,
                }
            };
            return Err(Error::Job(error));
        }

        let bytes = self
            .storage
            .read_artifact(&self.storage.combined_document_path(id))
            .await?;

        Ok(Artifact {
            kind,
            filename: format!("nara-{}.{}", id.short(), kind.extension()),
            bytes,
        })
    }
}

fn check_job_artifact(row: &JobRow, id: JobId, kind: ArtifactKind, produced: bool) -> Result<()> {
    let id = id.to_string();
    let error = match row.status() {
        JobStatus::Queued | JobStatus::Running => JobError::ArtifactNotReady { id, artifact: kind },
        JobStatus::Failed => JobError::OwnerFailed { id, artifact: kind },
        JobStatus::Completed if !produced => JobError::ArtifactUnavailable { id, artifact: kind },
        JobStatus::Completed => return Ok(()),
    };
    Err(Error::Job(error))
}
