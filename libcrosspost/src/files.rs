//! Submission file storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CrosspostError, Result};
use crate::types::{FileRecord, PostFile, Submission};

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a stored file's bytes
    async fn load(&self, record: &FileRecord) -> Result<PostFile>;

    /// Delete a submission's files and previews; missing files are ignored
    async fn remove_submission_files(&self, submission: &Submission) -> Result<()>;
}

/// Files on local disk
///
/// Relative record locations resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore {
    root: Option<PathBuf>,
}

impl LocalFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, location: &Path) -> PathBuf {
        match &self.root {
            Some(root) if location.is_relative() => root.join(location),
            _ => location.to_path_buf(),
        }
    }

    async fn remove_if_exists(&self, location: &Path) -> Result<()> {
        let path = self.resolve(location);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn load(&self, record: &FileRecord) -> Result<PostFile> {
        let path = self.resolve(&record.location);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CrosspostError::NotFound(format!("File {} at {}", record.name, path.display()))
            } else {
                CrosspostError::Io(e)
            }
        })?;
        Ok(PostFile::new(record.clone(), data))
    }

    async fn remove_submission_files(&self, submission: &Submission) -> Result<()> {
        debug!("Removing files for submission {}", submission.id);
        for file in submission.primary.iter().chain(submission.additional.iter()) {
            self.remove_if_exists(&file.location).await?;
            if let Some(preview) = &file.preview {
                self.remove_if_exists(preview).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, location: PathBuf) -> FileRecord {
        FileRecord::new(name, "image/png", 3, location)
    }

    #[tokio::test]
    async fn test_load_reads_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();

        let file = LocalFileStore::new().load(&record("a.png", path)).await.unwrap();
        assert_eq!(&file.data[..], b"png");
        assert_eq!(file.record.name, "a.png");
    }

    #[tokio::test]
    async fn test_load_relative_to_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.png"), b"xyz").unwrap();

        let store = LocalFileStore::with_root(dir.path());
        let file = store.load(&record("b.png", PathBuf::from("b.png"))).await.unwrap();
        assert_eq!(&file.data[..], b"xyz");
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let result = LocalFileStore::new()
            .load(&record("gone.png", PathBuf::from("/nonexistent/gone.png")))
            .await;
        assert!(matches!(result, Err(CrosspostError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_submission_files() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("p.png");
        let preview = dir.path().join("p.thumb.png");
        let extra = dir.path().join("e.png");
        for path in [&primary, &preview, &extra] {
            std::fs::write(path, b"x").unwrap();
        }

        let mut primary_record = record("p.png", primary.clone());
        primary_record.preview = Some(preview.clone());
        let mut submission = Submission::file("t", "d", primary_record);
        submission.additional = vec![
            record("e.png", extra.clone()),
            record("missing.png", dir.path().join("missing.png")),
        ];

        LocalFileStore::new()
            .remove_submission_files(&submission)
            .await
            .unwrap();

        assert!(!primary.exists());
        assert!(!preview.exists());
        assert!(!extra.exists());
    }
}
