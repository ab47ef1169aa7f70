//! Submission manifests
//!
//! A manifest is a TOML file describing one submission:
//!
//! ```toml
//! title = "New sketch"
//! description = "Ink on paper"
//! rating = "general"
//! tags = ["sketch", "ink"]
//!
//! [[files]]
//! path = "sketch.png"
//!
//! [defaults]
//! visibility = "unlisted"
//!
//! [[parts]]
//! account_id = "masto"
//! [parts.options]
//! spoiler_text = "eye contact"
//! ```
//!
//! Relative file paths resolve against the manifest's directory. A
//! manifest without files is a notification.

use std::path::{Path, PathBuf};

use libcrosspost::types::{
    FileRecord, PartOptions, SubmissionKind, SubmissionPart, SubmissionRating,
};
use libcrosspost::{CrosspostError, Result, Submission};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub kind: Option<SubmissionKind>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rating: SubmissionRating,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub defaults: PartOptions,
    #[serde(default)]
    pub parts: Vec<SubmissionPart>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    pub path: PathBuf,
    /// Guessed from the extension when absent
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub ignored_accounts: Vec<String>,
}

/// MIME type for common extensions, `application/octet-stream` otherwise
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        _ => "application/octet-stream",
    }
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CrosspostError::InvalidInput(format!("Invalid manifest: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CrosspostError::InvalidInput(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Build the submission, reading file sizes from disk
    pub fn into_submission(self, base_dir: &Path) -> Result<Submission> {
        let kind = self.kind.unwrap_or(if self.files.is_empty() {
            SubmissionKind::Notification
        } else {
            SubmissionKind::File
        });

        let records = self
            .files
            .into_iter()
            .map(|file| file.into_record(base_dir))
            .collect::<Result<Vec<_>>>()?;

        let mut submission = match kind {
            SubmissionKind::Notification => {
                if !records.is_empty() {
                    return Err(CrosspostError::InvalidInput(
                        "Notification manifests cannot list files".to_string(),
                    ));
                }
                Submission::notification(&self.title, &self.description)
            }
            SubmissionKind::File => {
                let mut records = records.into_iter();
                let primary = records.next().ok_or_else(|| {
                    CrosspostError::InvalidInput("File manifest lists no files".to_string())
                })?;
                let mut submission = Submission::file(&self.title, &self.description, primary);
                submission.additional = records.collect();
                submission
            }
        };

        submission.rating = self.rating;
        submission.tags = self.tags;
        submission.defaults = self.defaults;
        submission.parts = self.parts;
        Ok(submission)
    }
}

impl ManifestFile {
    fn into_record(self, base_dir: &Path) -> Result<FileRecord> {
        let location = if self.path.is_relative() {
            base_dir.join(&self.path)
        } else {
            self.path.clone()
        };
        let size = std::fs::metadata(&location)
            .map_err(|e| {
                CrosspostError::InvalidInput(format!("Cannot read {}: {}", location.display(), e))
            })?
            .len();

        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mime = self
            .mime_type
            .unwrap_or_else(|| guess_mime(&self.path).to_string());

        let mut record = FileRecord::new(&name, &mime, size, location)
            .with_dimensions(self.width, self.height);
        record.ignored_accounts = self.ignored_accounts;
        Ok(record)
    }
}
