//! Database layer for nara-dl
//!
//! Handles SQLite persistence for job and batch metadata and for the shared
//! rate-limit counters.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job records, progress and terminal transitions
//! - [`batches`] — Batch records and the run-once assembly claim
//! - [`rate_limits`] — Fixed-window counters shared between instances

use crate::error::DatabaseError;
use crate::types::{BatchId, JobId, JobInfo, JobResult, JobStatus};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod batches;
mod jobs;
mod migrations;
mod rate_limits;

/// New job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Pre-generated job identifier
    pub id: JobId,
    /// Catalog identifier as submitted
    pub catalog_id: String,
    /// First requested page
    pub start_page: u32,
    /// Last requested page, inclusive
    pub end_page: u32,
    /// Owning batch, if any
    pub batch_id: Option<BatchId>,
    /// Zero-based range position within the batch
    pub batch_index: Option<u32>,
}

/// New batch to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewBatch {
    /// Pre-generated batch identifier
    pub id: BatchId,
    /// Catalog identifier shared by the batch's jobs
    pub catalog_id: String,
}

/// Job record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Job UUID as text
    pub id: String,
    /// Catalog identifier as submitted
    pub catalog_id: String,
    /// First requested page
    pub start_page: i64,
    /// Last requested page, inclusive
    pub end_page: i64,
    /// Status code (see [`JobStatus::from_i32`])
    pub status: i32,
    /// Pages processed so far
    pub pages_done: i64,
    /// Pages requested
    pub pages_total: i64,
    /// Latest progress line
    pub message: String,
    /// JSON-encoded [`JobResult`], set on completion
    pub result_json: Option<String>,
    /// Failure cause, set on failure
    pub error: Option<String>,
    /// ZIP archive produced
    pub archive_available: bool,
    /// PDF document produced
    pub document_available: bool,
    /// Owning batch UUID as text
    pub batch_id: Option<String>,
    /// Zero-based range position within the batch
    pub batch_index: Option<i64>,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Unix timestamp when execution started
    pub started_at: Option<i64>,
    /// Unix timestamp of the terminal transition
    pub completed_at: Option<i64>,
    /// Last sign of life from the executing instance; NULL once released
    pub heartbeat_at: Option<i64>,
}

impl JobRow {
    /// Decoded status
    pub fn status(&self) -> JobStatus {
        JobStatus::from_i32(self.status)
    }

    /// Decoded identifier
    pub fn job_id(&self) -> Result<JobId> {
        parse_id(&self.id)
    }
}

impl TryFrom<JobRow> for JobInfo {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let result = match row.result_json.as_deref() {
            Some(json) => Some(serde_json::from_str::<JobResult>(json).map_err(|e| {
                Error::Database(DatabaseError::Corrupt(format!(
                    "job {} has an unreadable result: {}",
                    row.id, e
                )))
            })?),
            None => None,
        };
        let batch_id = row.batch_id.as_deref().map(parse_id).transpose()?;

        Ok(JobInfo {
            id: parse_id(&row.id)?,
            catalog_id: row.catalog_id,
            start_page: row.start_page as u32,
            end_page: row.end_page as u32,
            status: JobStatus::from_i32(row.status),
            pages_done: row.pages_done as u32,
            pages_total: row.pages_total as u32,
            message: row.message,
            result,
            error: row.error,
            archive_available: row.archive_available,
            document_available: row.document_available,
            batch_id,
            batch_index: row.batch_index.map(|i| i as u32),
            created_at: timestamp(row.created_at),
            started_at: row.started_at.map(timestamp),
            completed_at: row.completed_at.map(timestamp),
        })
    }
}

/// Batch record from database
#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    /// Batch UUID as text
    pub id: String,
    /// Catalog identifier shared by the batch's jobs
    pub catalog_id: String,
    /// Unix timestamp when the batch was created
    pub created_at: i64,
    /// Unix timestamp when the assembly claim was taken (all jobs terminal)
    pub completed_at: Option<i64>,
    /// Whether an observer has claimed combined-document assembly
    pub assembly_claimed: bool,
    /// Unix timestamp of the latest assembly claim
    pub assembly_claimed_at: Option<i64>,
    /// Combined PDF produced
    pub combined_document_available: bool,
}

impl BatchRow {
    /// Decoded identifier
    pub fn batch_id(&self) -> Result<BatchId> {
        parse_id(&self.id)
    }
}

fn parse_id<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    raw.parse().map_err(|e| {
        Error::Database(DatabaseError::Corrupt(format!(
            "invalid identifier {raw:?}: {e}"
        )))
    })
}

/// Convert stored unix seconds into a UTC timestamp
pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for nara-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
