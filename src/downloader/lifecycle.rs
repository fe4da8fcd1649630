//! Startup recovery and shutdown coordination.

use crate::db::JobRow;
use crate::error::Result;
use crate::types::{BatchStatus, JobId};
use std::sync::atomic::Ordering;

use super::CatalogDownloader;
use super::job_executor::INTERRUPTED_BY_RESTART;

impl CatalogDownloader {
    /// Settle state left behind by a previous process
    ///
    /// Unfinished jobs whose heartbeat was released or has gone stale belong to
    /// no live executor and are failed. Jobs another instance sharing this
    /// database keeps renewing are left running. Batches that became terminal
    /// this way, or whose assembly was abandoned, are then assembled.
    pub(crate) async fn recover(&self) -> Result<()> {
        let failed = self.settle_orphans().await?;
        if failed == 0 {
            tracing::debug!("No interrupted jobs to recover");
        }
        Ok(())
    }

    /// Fail orphaned jobs and assemble batches nobody is assembling
    ///
    /// Returns the number of jobs failed.
    async fn settle_orphans(&self) -> Result<usize> {
        let stale_before =
            chrono::Utc::now().timestamp() - self.config.jobs.heartbeat_timeout.as_secs() as i64;

        let failed = self
            .db
            .fail_orphaned_jobs(INTERRUPTED_BY_RESTART, stale_before)
            .await?;
        if !failed.is_empty() {
            tracing::warn!(
                count = failed.len(),
                "Marked {} interrupted job(s) as failed",
                failed.len()
            );
        }

        for batch in self.db.list_unfinished_batches().await? {
            let batch_id = batch.batch_id()?;
            let jobs = self.db.list_batch_jobs(batch_id).await?;
            if !BatchStatus::from_jobs(jobs.iter().map(JobRow::status)).is_terminal() {
                continue;
            }

            // Unclaimed, or claimed by an instance that stopped renewing the claim
            if !self
                .db
                .claim_abandoned_assembly(batch_id, stale_before)
                .await?
            {
                continue;
            }

            tracing::info!(batch_id = %batch_id, "Assembling abandoned batch");
            self.assemble_batch(batch_id, &jobs).await?;
        }

        Ok(failed.len())
    }

    /// Start the heartbeat task
    ///
    /// Every `jobs.heartbeat_interval()` the jobs this process is executing
    /// have their heartbeat renewed, then orphans left by other processes are
    /// settled. Stops on [`shutdown`](Self::shutdown).
    pub(crate) fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.executor_state.services_token.child_token();
        let interval = self.config.jobs.heartbeat_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Heartbeat stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = downloader.heartbeat().await {
                            tracing::warn!(error = %e, "Heartbeat failed");
                        }
                    }
                }
            }
        })
    }

    async fn heartbeat(&self) -> Result<()> {
        let ids: Vec<JobId> = self
            .executor_state
            .active_jobs
            .lock()
            .await
            .keys()
            .copied()
            .collect();
        let touched = self
            .db
            .touch_jobs(&ids, chrono::Utc::now().timestamp())
            .await?;
        tracing::trace!(active = ids.len(), touched, "Heartbeat renewed");

        self.settle_orphans().await?;
        Ok(())
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops admitting new jobs and batches
    /// 2. Stops background services (reclaimer, API server)
    /// 3. Cancels running jobs; each stops before its next page and keeps its
    ///    last persisted progress
    /// 4. Waits for job tasks to exit with a timeout (30 seconds)
    /// 5. Releases the heartbeat of every job it cancelled
    ///
    /// Released jobs are failed by the next instance that settles orphans,
    /// without waiting for the heartbeat timeout.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.executor_state
            .accepting_new
            .store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.executor_state.services_token.cancel();
        let cancelled = self.cancel_all_jobs().await;

        let shutdown_timeout = std::time::Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => tracing::warn!("Timeout waiting for jobs to stop, proceeding with shutdown"),
        }

        let released = self.db.release_jobs(&cancelled).await?;
        tracing::debug!(released, "Released heartbeats of interrupted jobs");

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn cancel_all_jobs(&self) -> Vec<JobId> {
        let active = self.executor_state.active_jobs.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling running jobs");

        for (id, token) in active.iter() {
            tracing::debug!(job_id = %id, "Signaling cancellation");
            token.cancel();
        }
        active.keys().copied().collect()
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.executor_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to stop");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
