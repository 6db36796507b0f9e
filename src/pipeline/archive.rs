//! Streaming archive writer
//!
//! Wraps a [`zip::ZipWriter`] so each entry is written from a blocking thread
//! while the async pipeline keeps fetching. Entries go into the file in the
//! order they are added.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip writer for one archive file
pub struct ArchiveWriter {
    path: PathBuf,
    zip: Option<ZipWriter<File>>,
    entries: usize,
}

impl ArchiveWriter {
    /// Create a new archive at `path`
    ///
    /// A leftover file at `path` (from an attempt that could not clean up)
    /// is removed first; the archive itself is always created fresh.
    pub async fn create(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let file_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            match std::fs::remove_file(&file_path) {
                Ok(()) => debug!(path = %file_path.display(), "removed stale partial archive"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            File::options()
                .write(true)
                .create_new(true)
                .open(&file_path)
        })
        .await
        .map_err(|e| Error::TaskPanicked(e.to_string()))?
        .map_err(|e| Error::Archive {
            path: path.clone(),
            message: format!("failed to create archive: {}", e),
        })?;

        Ok(Self {
            path,
            zip: Some(ZipWriter::new(file)),
            entries: 0,
        })
    }

    /// Path being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Set the archive comment (written with the central directory on finish)
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let path = self.path.clone();
        self.writer(&path)?.set_comment(comment);
        Ok(())
    }

    /// Append one entry
    ///
    /// Already-compressed page images are stored; text records are deflated.
    pub async fn add_entry(&mut self, name: String, bytes: Vec<u8>) -> Result<()> {
        let path = self.path.clone();
        let mut zip = self.zip.take().ok_or_else(|| unavailable(&path))?;

        let method = if name.ends_with(".xml") || name.ends_with(".json") {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };

        let (zip, result) = tokio::task::spawn_blocking(move || {
            let options = FileOptions::default().compression_method(method);
            let result = zip
                .start_file(name.as_str(), options)
                .map_err(|e| e.to_string())
                .and_then(|()| zip.write_all(&bytes).map_err(|e| e.to_string()));
            (zip, result)
        })
        .await
        .map_err(|e| Error::TaskPanicked(e.to_string()))?;

        self.zip = Some(zip);
        result.map_err(|message| Error::Archive { path, message })?;
        self.entries += 1;
        Ok(())
    }

    /// Write the central directory and flush the file to disk
    pub async fn finish(mut self) -> Result<PathBuf> {
        let path = self.path.clone();
        let mut zip = self.zip.take().ok_or_else(|| unavailable(&path))?;

        tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
            let file = zip.finish().map_err(|e| e.to_string())?;
            file.sync_all().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| Error::TaskPanicked(e.to_string()))?
        .map_err(|message| Error::Archive {
            path: path.clone(),
            message,
        })?;

        Ok(path)
    }

    /// Drop the writer and delete whatever was written
    pub async fn discard(mut self) {
        drop(self.zip.take());
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed partial archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial archive")
            }
        }
    }

    fn writer(&mut self, path: &Path) -> Result<&mut ZipWriter<File>> {
        self.zip.as_mut().ok_or_else(|| unavailable(path))
    }
}

fn unavailable(path: &Path) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        message: "archive writer is no longer usable".into(),
    }
}
