//! ZIP archive writer

use super::{ArchiveWriter, write_via_temp};
use crate::error::{Error, Result};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// Writes a deflated ZIP containing each image under its own file name
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveWriter;

impl ArchiveWriter for ZipArchiveWriter {
    fn write_archive(&self, images: &[PathBuf], dest: &Path) -> Result<()> {
        write_via_temp(dest, |file| {
            let mut writer = zip::ZipWriter::new(BufWriter::new(file));
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

            for image in images {
                let name = image
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::Artifact(format!("image path has no file name: {}", image.display()))
                    })?;
                let bytes = std::fs::read(image)?;

                writer
                    .start_file(name, options)
                    .map_err(|e| Error::Artifact(format!("failed to add {name} to archive: {e}")))?;
                writer.write_all(&bytes)?;
            }

            let mut inner = writer
                .finish()
                .map_err(|e| Error::Artifact(format!("failed to finish archive: {e}")))?;
            inner.flush()?;
            Ok(())
        })
    }
}
