//! Page fetching from the upstream catalog
//!
//! A [`PageFetcher`] turns a catalog identifier into a [`Catalog`] (how many
//! pages exist and where to get them) and then fetches single pages. The job
//! executor only ever talks to this trait; [`NaraFetcher`] is the production
//! implementation for catalog.archives.gov.

use crate::error::FetchError;
use async_trait::async_trait;

mod nara;

pub use nara::NaraFetcher;

/// A resolved catalog record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Upstream record identifier (e.g. the NARA NAID)
    pub id: String,
    /// Number of pages the record has
    pub total_pages: u32,
    /// Per-page download locator, index 0 is page 1; `None` when the record
    /// lists the page without a usable location
    pub locators: Vec<Option<String>>,
}

impl Catalog {
    /// Locator of a 1-based page, `None` if the page is out of range
    pub fn locator(&self, page: u32) -> Option<&Option<String>> {
        let index = usize::try_from(page.checked_sub(1)?).ok()?;
        self.locators.get(index)
    }
}

/// Retrieves page images from a remote catalog
///
/// Error contract:
/// - [`FetchError::InvalidCatalog`] means the identifier itself is unusable;
///   the job fails.
/// - [`FetchError::Transient`] is retried with backoff.
/// - [`FetchError::Page`] is recorded against that page and the job continues.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Short name shown in capabilities and logs
    fn name(&self) -> &str;

    /// Cheap syntactic check of a catalog identifier, done before a job is created
    fn validate(&self, catalog_id: &str) -> Result<(), String>;

    /// Look up the catalog record
    async fn resolve(&self, catalog_id: &str) -> Result<Catalog, FetchError>;

    /// Fetch one page; `Ok(None)` when the page does not exist upstream
    async fn fetch_page(&self, catalog: &Catalog, page: u32) -> Result<Option<Vec<u8>>, FetchError>;
}
