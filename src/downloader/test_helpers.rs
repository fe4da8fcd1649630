//! Shared test helpers for creating CatalogDownloader instances in tests.

use crate::artifacts::{ArchiveWriter, DocumentComposer, PdfComposer, ZipArchiveWriter};
use crate::config::Config;
use crate::db::Database;
use crate::downloader::CatalogDownloader;
use crate::error::FetchError;
use crate::fetcher::{Catalog, PageFetcher};
use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Catalog identifier accepted by [`MockFetcher`]
pub(crate) const CATALOG: &str = "https://catalog.archives.gov/id/178788901";

/// Small JPEG whose colour encodes the page number
pub(crate) fn page_jpeg(page: u32) -> Vec<u8> {
    let shade = (page % 256) as u8;
    let img = ImageBuffer::from_pixel(3, 2, Rgb([shade, 128, 255 - shade]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
    bytes.into_inner()
}

/// In-memory [`PageFetcher`] with scripted failures
#[derive(Default)]
pub(crate) struct MockFetcher {
    /// Pages the record has
    pub(crate) total_pages: u32,
    /// `resolve` reports the record as invalid
    pub(crate) invalid_record: bool,
    /// Fetching this page reports the whole catalog as invalid
    pub(crate) fatal_page: Option<u32>,
    /// Pages that fail permanently
    pub(crate) failing_pages: HashSet<u32>,
    /// Pages answered with an HTML error body instead of an image
    pub(crate) garbage_pages: HashSet<u32>,
    /// Pages that fail transiently this many times before succeeding
    pub(crate) flaky_failures: u32,
    /// Sleep before answering each page request
    pub(crate) page_latency: Option<Duration>,
    /// Number of `fetch_page` calls
    pub(crate) fetch_calls: AtomicU32,
}

impl MockFetcher {
    pub(crate) fn with_pages(total_pages: u32) -> Self {
        Self {
            total_pages,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate(&self, catalog_id: &str) -> Result<(), String> {
        if catalog_id.contains("/id/") {
            Ok(())
        } else {
            Err("could not extract a record ID (expected /id/<number>)".into())
        }
    }

    async fn resolve(&self, catalog_id: &str) -> Result<Catalog, FetchError> {
        if self.invalid_record {
            return Err(FetchError::InvalidCatalog(format!(
                "no record found for {catalog_id}"
            )));
        }
        Ok(Catalog {
            id: "178788901".into(),
            total_pages: self.total_pages,
            locators: (1..=self.total_pages)
                .map(|page| Some(format!("mock://{page}")))
                .collect(),
        })
    }

    async fn fetch_page(&self, catalog: &Catalog, page: u32) -> Result<Option<Vec<u8>>, FetchError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.page_latency {
            tokio::time::sleep(latency).await;
        }

        if self.fatal_page == Some(page) {
            return Err(FetchError::InvalidCatalog(format!(
                "record {} withdrawn at page {page}",
                catalog.id
            )));
        }
        if self.failing_pages.contains(&page) {
            return Err(FetchError::Page(format!(
                "Failed to download page {page}: HTTP 403 Forbidden"
            )));
        }
        if call <= self.flaky_failures {
            return Err(FetchError::Transient(format!(
                "Failed to download page {page}: HTTP 503 Service Unavailable"
            )));
        }
        if page > catalog.total_pages {
            return Ok(None);
        }
        if self.garbage_pages.contains(&page) {
            return Ok(Some(b"<html>Service Unavailable</html>".to_vec()));
        }
        Ok(Some(page_jpeg(page)))
    }
}

/// Config rooted in `dir` with no politeness delay and fast retries
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.join("data");
    config.storage.database_path = dir.join("test.db");
    config.jobs.page_delay_ms = 0;
    config.jobs.retry.initial_delay = Duration::from_millis(1);
    config.jobs.retry.max_delay = Duration::from_millis(5);
    config.jobs.retry.jitter = false;
    config.reclaim.enabled = false;
    config
}

/// Build a downloader over `config` with the given fetcher
pub(crate) async fn downloader_with(
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    compose_documents: bool,
) -> CatalogDownloader {
    let db = Database::new(&config.storage.database_path).await.unwrap();
    let archiver: Arc<dyn ArchiveWriter> = Arc::new(ZipArchiveWriter);
    let composer: Option<Arc<dyn DocumentComposer>> = if compose_documents {
        Some(Arc::new(PdfComposer))
    } else {
        None
    };

    CatalogDownloader::with_collaborators(config, db, fetcher, archiver, composer)
        .await
        .unwrap()
}

/// Helper to create a test CatalogDownloader backed by a mock fetcher.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    fetcher: Arc<MockFetcher>,
) -> (CatalogDownloader, TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = downloader_with(test_config(temp_dir.path()), fetcher, true).await;
    (downloader, temp_dir)
}

/// Job wait used throughout the tests
pub(crate) const WAIT: Duration = Duration::from_secs(10);
