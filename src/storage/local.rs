//! Local filesystem storage

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Uploaded files stored flat in one directory, named by stored id
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    base_path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the upload directory if needed
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a stored id to its path, rejecting anything that could escape
    /// the upload directory
    fn file_path(&self, stored_id: &str) -> Result<PathBuf> {
        let invalid = stored_id.is_empty()
            || stored_id == "."
            || stored_id == ".."
            || stored_id.contains(['/', '\\', '\0']);

        if invalid {
            return Err(AppError::validation(format!(
                "Invalid file name: {}",
                stored_id
            )));
        }

        Ok(self.base_path.join(stored_id))
    }

    /// Write a file only if none exists under that id
    ///
    /// Returns `false`, leaving the existing file untouched, when the id is
    /// taken.
    pub async fn create(&self, stored_id: &str, data: &[u8]) -> Result<bool> {
        let path = self.file_path(stored_id)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        file.write_all(data).await?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), size = data.len(), "Created file");
        Ok(true)
    }

    /// Read a file; a missing file is `NotFound`
    pub async fn read(&self, stored_id: &str) -> Result<Vec<u8>> {
        let path = self.file_path(stored_id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("File not found"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, stored_id: &str) -> bool {
        match self.file_path(stored_id) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Append bytes to an existing file, returning the new size
    pub async fn append(&self, stored_id: &str, data: &[u8]) -> Result<u64> {
        let path = self.file_path(stored_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(AppError::not_found("File not found"));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;

        let size = tokio::fs::metadata(&path).await?.len();
        Ok(size)
    }

    /// Delete a file, returning whether it existed
    pub async fn delete(&self, stored_id: &str) -> Result<bool> {
        let path = self.file_path(stored_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove loose files with one of the given extensions
    pub async fn remove_with_extensions(&self, extensions: &[&str]) -> Result<usize> {
        if !tokio::fs::try_exists(&self.base_path).await? {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
                .unwrap_or(false);

            if matches {
                tokio::fs::remove_file(&path).await?;
                count += 1;
            }
        }

        Ok(count)
    }
}
