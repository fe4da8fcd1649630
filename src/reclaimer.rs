//! Retention sweeps for jobs, batches and their files
//!
//! The reclaimer is the only component that destroys data. A sweep finds
//! jobs and batches whose retention has run out and removes their files
//! first, then their records, so a half-finished deletion is retried on the
//! next sweep instead of leaving orphaned files behind.
//!
//! # Eligibility
//!
//! - A standalone job is eligible when it is terminal and finished more than
//!   `ttl` ago, or when it never finished and was created more than
//!   `max(ttl, stale_after)` ago.
//! - Jobs owned by a batch are never reclaimed on their own. A batch is
//!   eligible once every one of its jobs is terminal and the batch finished
//!   more than `ttl` ago.
//!
//! Dry runs report exactly what a real sweep at the same instant would delete.

use crate::db::{BatchRow, Database, JobRow};
use crate::error::Result;
use crate::storage::Storage;
use crate::types::{BatchStatus, JobStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// What a reclaim target is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimKind {
    /// A standalone job
    Job,
    /// A batch together with all of its jobs
    Batch,
}

/// One job or batch selected by a sweep
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReclaimTarget {
    /// Job or batch
    pub kind: ReclaimKind,
    /// Job or batch identifier
    pub id: Uuid,
    /// Seconds since the timestamp the eligibility rule looked at
    pub age_secs: u64,
}

/// Outcome of one sweep
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct SweepReport {
    /// Nothing was deleted
    pub dry_run: bool,
    /// Targets that met the retention rules
    pub eligible: Vec<ReclaimTarget>,
    /// Targets actually removed (always empty for a dry run)
    pub deleted: Vec<ReclaimTarget>,
    /// Failures; the affected targets are kept for the next sweep
    pub errors: Vec<String>,
}

/// Finds and removes expired jobs and batches
#[derive(Clone)]
pub struct Reclaimer {
    db: Arc<Database>,
    storage: Storage,
    stale_after: Duration,
}

impl Reclaimer {
    /// Creates a reclaimer over the given metadata store and file storage
    pub fn new(db: Arc<Database>, storage: Storage, stale_after: Duration) -> Self {
        Self {
            db,
            storage,
            stale_after,
        }
    }

    /// Sweep as of now
    pub async fn sweep(&self, ttl: Duration, dry_run: bool) -> Result<SweepReport> {
        self.sweep_at(chrono::Utc::now().timestamp(), ttl, dry_run)
            .await
    }

    /// Sweep as of the given unix time
    pub async fn sweep_at(&self, now: i64, ttl: Duration, dry_run: bool) -> Result<SweepReport> {
        let mut report = SweepReport {
            dry_run,
            ..SweepReport::default()
        };

        for job in self.db.list_standalone_jobs().await? {
            if let Some(target) = self.job_target(&job, now, ttl) {
                report.eligible.push(target.clone());
                if !dry_run {
                    self.delete_job(&job, target, &mut report).await;
                }
            }
        }

        for batch in self.db.list_batches().await? {
            let jobs = self.db.list_batch_jobs(batch.batch_id()?).await?;
            if let Some(target) = batch_target(&batch, &jobs, now, ttl) {
                report.eligible.push(target.clone());
                if !dry_run {
                    self.delete_batch(&batch, &jobs, target, &mut report).await;
                }
            }
        }

        if !dry_run {
            match self.db.prune_counters(now).await {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "Pruned expired rate-limit counters"),
                Err(e) => report.errors.push(format!("failed to prune counters: {e}")),
            }
        }

        info!(
            dry_run,
            eligible = report.eligible.len(),
            deleted = report.deleted.len(),
            errors = report.errors.len(),
            "Reclaim sweep finished"
        );
        Ok(report)
    }

    fn job_target(&self, job: &JobRow, now: i64, ttl: Duration) -> Option<ReclaimTarget> {
        let (since, retention) = if job.status().is_terminal() {
            (job.completed_at.unwrap_or(job.created_at), ttl)
        } else {
            (job.created_at, ttl.max(self.stale_after))
        };

        let age_secs = age(now, since);
        if age_secs <= retention.as_secs() {
            return None;
        }

        let id = job.job_id().ok()?.0;
        Some(ReclaimTarget {
            kind: ReclaimKind::Job,
            id,
            age_secs,
        })
    }

    async fn delete_job(&self, job: &JobRow, target: ReclaimTarget, report: &mut SweepReport) {
        let Ok(id) = job.job_id() else {
            report.errors.push(format!("job {}: unreadable id", job.id));
            return;
        };

        if let Err(e) = self.storage.remove_job(id).await {
            warn!(job_id = %id, error = %e, "Failed to remove job files, keeping record");
            report.errors.push(format!("job {id}: {e}"));
            return;
        }
        match self.db.delete_job(id).await {
            Ok(_) => {
                debug!(job_id = %id, age_secs = target.age_secs, "Reclaimed job");
                report.deleted.push(target);
            }
            Err(e) => report.errors.push(format!("job {id}: {e}")),
        }
    }

    async fn delete_batch(
        &self,
        batch: &BatchRow,
        jobs: &[JobRow],
        target: ReclaimTarget,
        report: &mut SweepReport,
    ) {
        let Ok(batch_id) = batch.batch_id() else {
            report.errors.push(format!("batch {}: unreadable id", batch.id));
            return;
        };

        for job in jobs {
            let removed = match job.job_id() {
                Ok(id) => self.storage.remove_job(id).await,
                Err(e) => Err(e),
            };
            if let Err(e) = removed {
                warn!(batch_id = %batch_id, job_id = %job.id, error = %e, "Failed to remove job files, keeping batch");
                report.errors.push(format!("batch {batch_id}: job {}: {e}", job.id));
                return;
            }
        }
        if let Err(e) = self.storage.remove_batch(batch_id).await {
            warn!(batch_id = %batch_id, error = %e, "Failed to remove batch files, keeping batch");
            report.errors.push(format!("batch {batch_id}: {e}"));
            return;
        }

        match self.db.delete_batch(batch_id).await {
            Ok(_) => {
                debug!(batch_id = %batch_id, jobs = jobs.len(), "Reclaimed batch");
                report.deleted.push(target);
            }
            Err(e) => report.errors.push(format!("batch {batch_id}: {e}")),
        }
    }

    /// Sweep every `interval` until `shutdown` is cancelled
    ///
    /// The first sweep runs immediately. Sweep errors are logged and the
    /// loop carries on.
    pub async fn run(self, ttl: Duration, interval: Duration, shutdown: CancellationToken) {
        info!(
            ttl_secs = ttl.as_secs(),
            interval_secs = interval.as_secs(),
            "Reclaimer started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reclaimer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(ttl, false).await {
                        warn!(error = %e, "Reclaim sweep failed");
                    }
                }
            }
        }
    }
}

fn batch_target(batch: &BatchRow, jobs: &[JobRow], now: i64, ttl: Duration) -> Option<ReclaimTarget> {
    if !BatchStatus::from_jobs(jobs.iter().map(JobRow::status)).is_terminal() {
        return None;
    }

    let since = batch
        .completed_at
        .or_else(|| jobs.iter().filter_map(|job| job.completed_at).max())
        .unwrap_or(batch.created_at);

    let age_secs = age(now, since);
    if age_secs <= ttl.as_secs() {
        return None;
    }

    Some(ReclaimTarget {
        kind: ReclaimKind::Batch,
        id: batch.batch_id().ok()?.0,
        age_secs,
    })
}

fn age(now: i64, since: i64) -> u64 {
    u64::try_from(now.saturating_sub(since)).unwrap_or(0)
}
