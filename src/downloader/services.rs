//! Background service starters: reclaimer and REST API server.

use crate::error::Result;
use crate::reclaimer::{Reclaimer, SweepReport};
use std::sync::Arc;
use std::time::Duration;

use super::CatalogDownloader;

impl CatalogDownloader {
    /// Reclaimer over this downloader's database and storage
    pub fn reclaimer(&self) -> Reclaimer {
        Reclaimer::new(
            self.db.clone(),
            self.storage.clone(),
            self.config.reclaim.stale_after,
        )
    }

    /// Run one retention sweep now
    ///
    /// With `dry_run` the report lists what would be deleted and nothing is.
    pub async fn sweep(&self, ttl: Duration, dry_run: bool) -> Result<SweepReport> {
        self.reclaimer().sweep(ttl, dry_run).await
    }

    /// Start the periodic reclaimer background task
    ///
    /// Sweeps with the configured ttl every `reclaim.interval` until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn spawn_reclaimer(&self) -> tokio::task::JoinHandle<()> {
        let reclaim = &self.config.reclaim;

        if !reclaim.enabled {
            tracing::info!("Reclaimer disabled, skipping retention sweeps");
            return tokio::spawn(async {});
        }

        let reclaimer = self.reclaimer();
        let shutdown = self.executor_state.services_token.child_token();
        let (ttl, interval) = (reclaim.ttl, reclaim.interval);

        tokio::spawn(async move { reclaimer.run(ttl, interval, shutdown).await })
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server stops when [`shutdown`](Self::shutdown) is called.
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
