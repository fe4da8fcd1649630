//! Batch records and the run-once assembly claim.

use crate::error::DatabaseError;
use crate::types::{BatchId, JobStatus};
use crate::{Error, Result};

use super::{BatchRow, Database, NewBatch, NewJob};

const BATCH_COLUMNS: &str = "id, catalog_id, created_at, completed_at, assembly_claimed, \
                             assembly_claimed_at, combined_document_available";

impl Database {
    /// Insert a batch together with its jobs, atomically
    ///
    /// Either the batch and every job exist afterwards, or none of them do.
    pub async fn insert_batch(&self, batch: &NewBatch, jobs: &[NewJob]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query("INSERT INTO batches (id, catalog_id, created_at) VALUES (?, ?, ?)")
            .bind(batch.id.to_string())
            .bind(&batch.catalog_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert batch: {}",
                    e
                )))
            })?;

        for job in jobs {
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
            .bind(batch.id.to_string())
            .bind(job.batch_index.map(i64::from))
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert batch job: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit batch: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, id: BatchId) -> Result<Option<BatchRow>> {
        let row =
            sqlx::query_as::<_, BatchRow>(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get batch: {}",
                        e
                    )))
                })?;

        Ok(row)
    }

    /// List all batches, oldest first
    pub async fn list_batches(&self) -> Result<Vec<BatchRow>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list batches: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List batches whose combined document has not been settled yet
    ///
    /// Includes batches whose assembly was claimed but never finished, which
    /// only happens when the process stopped mid-assembly.
    pub async fn list_unfinished_batches(&self) -> Result<Vec<BatchRow>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE completed_at IS NULL ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list unfinished batches: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Atomically claim combined-document assembly for a batch
    ///
    /// Compare-and-set on `assembly_claimed`: exactly one caller ever gets `true`.
    pub async fn claim_batch_assembly(&self, id: BatchId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE batches SET assembly_claimed = 1, assembly_claimed_at = ?
            WHERE id = ? AND assembly_claimed = 0
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim batch assembly: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim assembly of an unfinished batch nobody is assembling
    ///
    /// Succeeds when the batch was never claimed, or when its claim dates from
    /// before `stale_before` and the claimant evidently died mid-assembly.
    /// Concurrent callers race on the same compare-and-set, so at most one wins.
    pub async fn claim_abandoned_assembly(&self, id: BatchId, stale_before: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE batches SET assembly_claimed = 1, assembly_claimed_at = ?
            WHERE id = ? AND completed_at IS NULL
              AND (assembly_claimed = 0
                   OR assembly_claimed_at IS NULL
                   OR assembly_claimed_at < ?)
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim abandoned assembly: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the end of assembly and whether a combined document was produced
    pub async fn finish_batch_assembly(
        &self,
        id: BatchId,
        combined_document_available: bool,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE batches
            SET completed_at = ?, combined_document_available = ?
            WHERE id = ? AND assembly_claimed = 1 AND completed_at IS NULL
            "#,
        )
        .bind(now)
        .bind(combined_document_available)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finish batch assembly: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete a batch; its jobs are removed by the foreign-key cascade
    pub async fn delete_batch(&self, id: BatchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM batches WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete batch: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
