//! On-disk layout of job images and artifacts
//!
//! ```text
//! <data_dir>/jobs/<job_id>/images/0001.jpg
//! <data_dir>/jobs/<job_id>/archive.zip
//! <data_dir>/jobs/<job_id>/document.pdf
//! <data_dir>/jobs/<job_id>/logs.txt
//! <data_dir>/batches/<batch_id>/combined.pdf
//! ```
//!
//! Only metadata lives in the database; everything byte-sized lives here,
//! addressed by job or batch identifier.

use crate::error::{Error, Result};
use crate::types::{ArtifactKind, BatchId, JobId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Per-job and per-batch file storage rooted at the configured data directory
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a store rooted at `root`; nothing is created until first use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything belonging to a job
    pub fn job_dir(&self, id: JobId) -> PathBuf {
        self.root.join("jobs").join(id.to_string())
    }

    /// Directory holding a job's downloaded page images
    pub fn images_dir(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join("images")
    }

    /// Path of one page image
    pub fn page_path(&self, id: JobId, page: u32) -> PathBuf {
        self.images_dir(id).join(page_file_name(page))
    }

    /// Directory holding a batch's combined artifact
    pub fn batch_dir(&self, id: BatchId) -> PathBuf {
        self.root.join("batches").join(id.to_string())
    }

    /// Path of a per-job artifact
    pub fn job_artifact_path(&self, id: JobId, kind: ArtifactKind) -> PathBuf {
        let name = match kind {
            ArtifactKind::Archive => "archive.zip",
            ArtifactKind::Document | ArtifactKind::CombinedDocument => "document.pdf",
        };
        self.job_dir(id).join(name)
    }

    /// Path of a job's human-readable activity log
    pub fn job_log_path(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join("logs.txt")
    }

    /// Path of a batch's combined document
    pub fn combined_document_path(&self, id: BatchId) -> PathBuf {
        self.batch_dir(id).join("combined.pdf")
    }

    /// Create the job's image directory
    pub async fn prepare_job(&self, id: JobId) -> Result<()> {
        fs::create_dir_all(self.images_dir(id)).await?;
        Ok(())
    }

    /// Create the batch directory
    pub async fn prepare_batch(&self, id: BatchId) -> Result<()> {
        fs::create_dir_all(self.batch_dir(id)).await?;
        Ok(())
    }

    /// Whether a page image is already stored
    pub async fn has_page(&self, id: JobId, page: u32) -> bool {
        fs::try_exists(self.page_path(id, page))
            .await
            .unwrap_or(false)
    }

    /// Store a page image
    ///
    /// Written to a temporary name first, so a crash never leaves a truncated
    /// image under the final name.
    pub async fn write_page(&self, id: JobId, page: u32, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.page_path(id, page);
        write_atomically(&path, bytes).await?;
        Ok(path)
    }

    /// Append one timestamped line to the job's activity log
    ///
    /// The job directory must exist; a removed job is not brought back.
    pub async fn append_log(&self, id: JobId, message: &str) -> Result<()> {
        let line = format!(
            "[{}] {message}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.job_log_path(id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Stored page images of a job in ascending page order
    pub async fn list_images(&self, id: JobId) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(self.images_dir(id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(page) = page_number(&path) {
                pages.push((page, path));
            }
        }
        pages.sort_by_key(|(page, _)| *page);

        Ok(pages.into_iter().map(|(_, path)| path).collect())
    }

    /// Read an artifact produced earlier
    pub async fn read_artifact(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("artifact file {} is missing", path.display()))
            } else {
                e.into()
            }
        })
    }

    /// Remove everything stored for a job; a missing directory is not an error
    pub async fn remove_job(&self, id: JobId) -> Result<()> {
        remove_dir_if_present(&self.job_dir(id)).await
    }

    /// Remove everything stored for a batch; a missing directory is not an error
    pub async fn remove_batch(&self, id: BatchId) -> Result<()> {
        remove_dir_if_present(&self.batch_dir(id)).await
    }
}

/// Whether a storage failure leaves no point in trying further pages
pub fn is_storage_exhausted(error: &Error) -> bool {
    matches!(
        error,
        Error::Io(e) if matches!(e.kind(), ErrorKind::StorageFull | ErrorKind::ReadOnlyFilesystem)
    )
}

/// File name of a page image, e.g. `0007.jpg`
pub fn page_file_name(page: u32) -> String {
    format!("{page:04}.jpg")
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension()? != "jpg" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Sibling path used while a file is being written
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, bytes).await?;
    fs::rename(&partial, path).await?;
    Ok(())
}

async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(?path, "removed directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
