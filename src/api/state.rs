//! Application state for the API server

use crate::{CatalogDownloader, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The downloader serving jobs and batches
    pub downloader: Arc<CatalogDownloader>,

    /// Configuration the server was started with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<CatalogDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
