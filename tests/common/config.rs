//! Downloaders wired to a wiremock catalog

use std::path::Path;
use std::time::Duration;
use nara_dl::{CatalogDownloader, Config, JobId, JobInfo};
use tempfile::TempDir;
use wiremock::MockServer;

/// Config rooted in `dir` talking to `server`, tuned for fast tests
pub fn test_config(dir: &Path, server: &MockServer) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.join("data");
    config.storage.database_path = dir.join("nara-dl.db");
    config.catalog.base_url = server.uri();
    config.jobs.page_delay_ms = 0;
    config.jobs.retry.initial_delay = Duration::from_millis(1);
    config.jobs.retry.max_delay = Duration::from_millis(5);
    config.jobs.retry.jitter = false;
    config.reclaim.enabled = false;
    config
}

/// Production downloader over a wiremock catalog
///
/// Keep the returned TempDir alive for the duration of the test.
pub async fn create_downloader(server: &MockServer) -> (CatalogDownloader, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let downloader = CatalogDownloader::new(test_config(dir.path(), server))
        .await
        .expect("create downloader");
    (downloader, dir)
}

/// Wait for a job to finish, failing the test after 20 seconds
pub async fn finished(downloader: &CatalogDownloader, id: JobId) -> JobInfo {
    downloader
        .wait_for_job(id, Duration::from_secs(20))
        .await
        .expect("job finishes")
}
