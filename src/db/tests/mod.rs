mod batches;
mod jobs;

use crate::db::{Database, NewJob};
use crate::types::{BatchId, JobId};
use tempfile::NamedTempFile;

/// Open a fresh database backed by a temp file
///
/// The temp file must outlive the database, so both are returned.
async fn open_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn new_job(start_page: u32, end_page: u32) -> NewJob {
    NewJob {
        id: JobId::new(),
        catalog_id: "https://catalog.archives.gov/id/12345".to_string(),
        start_page,
        end_page,
        batch_id: None,
        batch_index: None,
    }
}

fn batch_job(batch_id: BatchId, index: u32, start_page: u32, end_page: u32) -> NewJob {
    NewJob {
        batch_id: Some(batch_id),
        batch_index: Some(index),
        ..new_job(start_page, end_page)
    }
}
