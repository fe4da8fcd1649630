//! Job record CRUD and state transitions.
//!
//! Every transition is a conditional UPDATE: progress only moves forward and
//! only one terminal transition can ever match a row.

use crate::error::DatabaseError;
use crate::types::{BatchId, JobId, JobResult, JobStatus};
use crate::{Error, Result};

use super::{Database, JobRow, NewJob};

const JOB_COLUMNS: &str = r#"
    id, catalog_id, start_page, end_page, status, pages_done, pages_total,
    message, result_json, error, archive_available, document_available,
    batch_id, batch_index, created_at, started_at, completed_at, heartbeat_at
"#;

const UNFINISHED: [i32; 2] = [0, 1];

impl Database {
    /// Insert a new job in the `queued` state
    pub async fn insert_job(&self, job: &NewJob) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let pages_total = i64::from(job.end_page) - i64::from(job.start_page) + 1;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, catalog_id, start_page, end_page, status, pages_done,
                pages_total, message, batch_id, batch_index, created_at, heartbeat_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, 'Queued', ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.catalog_id)
        .bind(i64::from(job.start_page))
        .bind(i64::from(job.end_page))
        .bind(JobStatus::Queued.to_i32())
        .bind(pages_total)
        .bind(job.batch_id.map(|id| id.to_string()))
        .bind(job.batch_index.map(i64::from))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get job: {}",
                    e
                )))
            })?;

        Ok(row)
    }

    /// List the jobs of a batch in range order
    pub async fn list_batch_jobs(&self, batch_id: BatchId) -> Result<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE batch_id = ? ORDER BY batch_index ASC"
        ))
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list batch jobs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List jobs that do not belong to a batch, oldest first
    pub async fn list_standalone_jobs(&self) -> Result<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE batch_id IS NULL ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list standalone jobs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Move a queued job to `running`
    ///
    /// Returns false if the job was not queued (already started, finished or gone).
    pub async fn mark_job_running(&self, id: JobId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, started_at = ?, heartbeat_at = ?,
                message = 'Fetching catalog record...'
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::Running.to_i32())
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .bind(JobStatus::Queued.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job running: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Record progress for a running job and refresh its heartbeat
    ///
    /// `pages_done` never decreases: an update carrying a smaller value than
    /// the stored one is ignored together with its message. Returns false if
    /// nothing was updated, which for a forward update means the job is no
    /// longer running.
    pub async fn update_job_progress(
        &self,
        id: JobId,
        pages_done: u32,
        message: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let outcome = sqlx::query(
            r#"
            UPDATE jobs
            SET pages_done = ?, message = ?, heartbeat_at = ?
            WHERE id = ? AND status = ? AND pages_done <= ?
            "#,
        )
        .bind(i64::from(pages_done))
        .bind(message)
        .bind(now)
        .bind(id.to_string())
        .bind(JobStatus::Running.to_i32())
        .bind(i64::from(pages_done))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job progress: {}",
                e
            )))
        })?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Replace the status message of an unfinished job
    pub async fn update_job_message(&self, id: JobId, message: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET message = ? WHERE id = ? AND status IN (?, ?)")
            .bind(message)
            .bind(id.to_string())
            .bind(UNFINISHED[0])
            .bind(UNFINISHED[1])
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update job message: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Transition an unfinished job to `completed`
    ///
    /// Result, artifact flags and `completed_at` are written in the same
    /// statement. Returns false if the job had already reached a terminal state.
    pub async fn complete_job(
        &self,
        id: JobId,
        result: &JobResult,
        archive_available: bool,
        document_available: bool,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result_json = serde_json::to_string(result)?;

        let outcome = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, message = 'Job completed', result_json = ?,
                archive_available = ?, document_available = ?, completed_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(JobStatus::Completed.to_i32())
        .bind(result_json)
        .bind(archive_available)
        .bind(document_available)
        .bind(now)
        .bind(id.to_string())
        .bind(UNFINISHED[0])
        .bind(UNFINISHED[1])
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete job: {}",
                e
            )))
        })?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Transition an unfinished job to `failed`
    ///
    /// `pages_done` is left as it was. Returns false if the job had already
    /// reached a terminal state.
    pub async fn fail_job(&self, id: JobId, error: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let outcome = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, message = ?, error = ?, completed_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(JobStatus::Failed.to_i32())
        .bind(format!("Job failed: {error}"))
        .bind(error)
        .bind(now)
        .bind(id.to_string())
        .bind(UNFINISHED[0])
        .bind(UNFINISHED[1])
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fail job: {}",
                e
            )))
        })?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Refresh the heartbeat of the given unfinished jobs
    ///
    /// Returns the number of jobs touched.
    pub async fn touch_jobs(&self, ids: &[JobId], now: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new("UPDATE jobs SET heartbeat_at = ");
        query_builder.push_bind(now);
        query_builder.push(" WHERE status IN (");
        query_builder.push_bind(UNFINISHED[0]);
        query_builder.push(", ");
        query_builder.push_bind(UNFINISHED[1]);
        query_builder.push(") AND id IN (");
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let result = query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to touch jobs: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Drop the heartbeat of unfinished jobs whose executor stopped on purpose
    ///
    /// Released jobs are orphaned immediately instead of after the heartbeat
    /// timeout, so the next instance to look fails them at once.
    pub async fn release_jobs(&self, ids: &[JobId]) -> Result<u64> {
        let mut released = 0;
        for id in ids {
            let result = sqlx::query(
                "UPDATE jobs SET heartbeat_at = NULL WHERE id = ? AND status IN (?, ?)",
            )
            .bind(id.to_string())
            .bind(UNFINISHED[0])
            .bind(UNFINISHED[1])
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to release job: {}",
                    e
                )))
            })?;
            released += result.rows_affected();
        }

        Ok(released)
    }

    /// Fail every orphaned queued or running job, returning the affected IDs
    ///
    /// A job is orphaned when its heartbeat was released or is older than
    /// `stale_before`. Jobs that a live instance keeps touching are left alone,
    /// even when several instances share this database.
    pub async fn fail_orphaned_jobs(&self, error: &str, stale_before: i64) -> Result<Vec<JobId>> {
        let now = chrono::Utc::now().timestamp();

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = ?, message = ?, error = ?, completed_at = ?
            WHERE status IN (?, ?)
              AND (heartbeat_at IS NULL OR heartbeat_at < ?)
            RETURNING id
            "#,
        )
        .bind(JobStatus::Failed.to_i32())
        .bind(format!("Job failed: {error}"))
        .bind(error)
        .bind(now)
        .bind(UNFINISHED[0])
        .bind(UNFINISHED[1])
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fail orphaned jobs: {}",
                e
            )))
        })?;

        ids.iter().map(|id| super::parse_id(id)).collect()
    }

    /// Delete a job record
    pub async fn delete_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all job records
    pub async fn count_jobs(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count jobs: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
