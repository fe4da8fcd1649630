//! Archive and document production
//!
//! Both collaborators take an ordered list of image files and a destination
//! path. They are synchronous, CPU- and disk-bound, and are run on the
//! blocking thread pool via [`run_blocking`]. Output is written next to the
//! destination first and renamed into place, so a half-written artifact is
//! never visible under its final name.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

mod pdf;
mod zip;

pub use self::pdf::PdfComposer;
pub use self::zip::ZipArchiveWriter;

/// Packs downloaded images into a single archive
pub trait ArchiveWriter: Send + Sync {
    /// Write `images`, in the given order, into an archive at `dest`
    fn write_archive(&self, images: &[PathBuf], dest: &Path) -> Result<()>;
}

/// Concatenates images into one paginated document
pub trait DocumentComposer: Send + Sync {
    /// Compose `images`, one page each in the given order, into a document at `dest`
    fn compose(&self, images: &[PathBuf], dest: &Path) -> Result<()>;
}

/// Run a blocking artifact operation off the async runtime
pub async fn run_blocking<F>(operation: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| Error::Artifact(format!("artifact task panicked: {e}")))?
}

/// Create `dest` by writing to a sibling temp file and renaming it into place
pub(crate) fn write_via_temp<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(std::fs::File) -> Result<()>,
{
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = crate::storage::partial_path(dest);
    let file = std::fs::File::create(&partial)?;

    match write(file) {
        Ok(()) => {
            std::fs::rename(&partial, dest)?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            Err(e)
        }
    }
}
