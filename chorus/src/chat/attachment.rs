use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{ChorusError, Result};

/// An uploaded file parked on disk for the duration of one request.
///
/// The backing temp file is removed exactly once: by [`cleanup`] on the
/// normal path, or on drop if the request ends early (validation failure,
/// client disconnect, panic).
///
/// [`cleanup`]: UploadedAttachment::cleanup
#[derive(Debug)]
pub struct UploadedAttachment {
    file: NamedTempFile,
    content_type: String,
    file_name: Option<String>,
    size: u64,
}

impl UploadedAttachment {
    /// Create an empty temp file in `dir`.
    pub async fn create(
        dir: &Path,
        content_type: impl Into<String>,
        file_name: Option<String>,
    ) -> Result<Self> {
        let dir = dir.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("chorus-upload-")
                .tempfile_in(dir)
        })
        .await
        .map_err(|e| ChorusError::Internal(format!("Upload task failed: {e}")))??;

        Ok(Self {
            file,
            content_type: content_type.into(),
            file_name,
            size: 0,
        })
    }

    /// Create and fill a temp file in one go.
    pub async fn from_bytes(
        dir: &Path,
        content_type: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Self> {
        let mut attachment = Self::create(dir, content_type, None).await?;
        attachment.append(bytes).await?;
        Ok(attachment)
    }

    pub async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let mut writer = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.file.path())
            .await?;
        writer.write_all(chunk).await?;
        writer.flush().await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// MIME type declared by the client; not yet validated.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.file.path()).await?)
    }

    /// Delete the backing file. Consumes the attachment so it cannot run twice.
    pub fn cleanup(self) -> io::Result<PathBuf> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        Ok(path)
    }
}
