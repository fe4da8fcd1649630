//! National Archives catalog fetcher

use super::{Catalog, PageFetcher};
use crate::config::CatalogConfig;
use crate::error::{Error, FetchError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// [`PageFetcher`] for catalog.archives.gov
///
/// Catalog identifiers are record URLs such as
/// `https://catalog.archives.gov/id/178788901`. The record is looked up
/// through the catalog's search proxy and each page is downloaded from the
/// `objectUrl` of the matching digital object.
pub struct NaraFetcher {
    client: reqwest::Client,
    config: CatalogConfig,
    naid_pattern: Regex,
}

impl NaraFetcher {
    /// Build a fetcher with its own HTTP client
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        let naid_pattern = Regex::new(r"/id/(\d+)")
            .map_err(|e| Error::Other(format!("invalid NAID pattern: {e}")))?;

        Ok(Self {
            client,
            config,
            naid_pattern,
        })
    }

    /// Extract the numeric NAID from a record URL on the allowed host
    pub fn extract_naid(&self, catalog_id: &str) -> std::result::Result<String, String> {
        let url = Url::parse(catalog_id.trim()).map_err(|e| format!("invalid catalog URL: {e}"))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme: {}", url.scheme()));
        }
        let host = url.host_str().unwrap_or_default();
        if !host.eq_ignore_ascii_case(&self.config.allowed_host) {
            return Err(format!(
                "URL must point at {}, got {host:?}",
                self.config.allowed_host
            ));
        }

        self.naid_pattern
            .captures(url.path())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| "could not extract a record ID (expected /id/<number>)".to_string())
    }

    fn search_url(&self, naid: &str) -> String {
        format!(
            "{}/proxy/records/search?naId={}",
            self.config.base_url.trim_end_matches('/'),
            naid
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    body: SearchBody,
}

#[derive(Debug, Default, Deserialize)]
struct SearchBody {
    #[serde(default)]
    hits: HitList,
}

#[derive(Debug, Default, Deserialize)]
struct HitList {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    record: Record,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default, rename = "digitalObjects")]
    digital_objects: Vec<DigitalObject>,
}

#[derive(Debug, Deserialize)]
struct DigitalObject {
    #[serde(default, rename = "objectUrl")]
    object_url: Option<String>,
}

fn transport_error(context: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        FetchError::Transient(format!("{context}: {e}"))
    } else {
        FetchError::Page(format!("{context}: {e}"))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl PageFetcher for NaraFetcher {
    fn name(&self) -> &str {
        "nara"
    }

    fn validate(&self, catalog_id: &str) -> std::result::Result<(), String> {
        self.extract_naid(catalog_id).map(|_| ())
    }

    async fn resolve(&self, catalog_id: &str) -> std::result::Result<Catalog, FetchError> {
        let naid = self
            .extract_naid(catalog_id)
            .map_err(FetchError::InvalidCatalog)?;

        debug!(naid = %naid, "fetching catalog record");
        let response = self
            .client
            .get(self.search_url(&naid))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| match transport_error("failed to fetch record", e) {
                FetchError::Page(msg) => FetchError::InvalidCatalog(msg),
                other => other,
            })?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(FetchError::Transient(format!(
                "catalog lookup returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(FetchError::InvalidCatalog(format!(
                "catalog lookup returned HTTP {status}"
            )));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::InvalidCatalog(format!("unreadable catalog response: {e}"))
            } else {
                FetchError::Transient(format!("failed to read catalog response: {e}"))
            }
        })?;

        let record = body
            .body
            .hits
            .hits
            .into_iter()
            .next()
            .map(|hit| hit.source.record)
            .ok_or_else(|| FetchError::InvalidCatalog(format!("no record found for {naid}")))?;

        let locators: Vec<Option<String>> = record
            .digital_objects
            .into_iter()
            .map(|object| object.object_url.filter(|url| !url.is_empty()))
            .collect();

        Ok(Catalog {
            id: naid,
            total_pages: u32::try_from(locators.len()).unwrap_or(u32::MAX),
            locators,
        })
    }

    async fn fetch_page(
        &self,
        catalog: &Catalog,
        page: u32,
    ) -> std::result::Result<Option<Vec<u8>>, FetchError> {
        let url = match catalog.locator(page) {
            None => return Ok(None),
            Some(None) => return Err(FetchError::Page(format!("No URL for page {page}"))),
            Some(Some(url)) => url,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&format!("Failed to download page {page}"), e))?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(FetchError::Transient(format!(
                "Failed to download page {page}: HTTP {status}"
            )));
        }
        if status != StatusCode::OK {
            return Err(FetchError::Page(format!(
                "Failed to download page {page}: HTTP {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&format!("Failed to download page {page}"), e))?;

        Ok(Some(bytes.to_vec()))
    }
}
