//! Validation rules shared by platform validators
//!
//! Validators are pure: they read the submission, the two parts and
//! whatever capability data the adapter already cached. Problems block
//! posting to that account; warnings are only reported.

use crate::scaling;
use crate::types::{FileRecord, SubmissionPart, ValidationParts};

const BYTES_PER_MB: u64 = 1024 * 1024;

pub fn mb_to_bytes(mb: u64) -> u64 {
    mb * BYTES_PER_MB
}

/// Bytes as megabytes, rounded to two decimals for messages
pub fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / BYTES_PER_MB as f64;
    (mb * 100.0).round() / 100.0
}

/// Whether the file's MIME subtype or extension is in `accepted`
pub fn supports_file_type(file: &FileRecord, accepted: &[&str]) -> bool {
    let subtype = file
        .mime_type
        .rsplit_once('/')
        .map(|(_, sub)| sub.to_ascii_lowercase());
    let extension = file.extension();

    accepted
        .iter()
        .any(|ext| subtype.as_deref() == Some(*ext) || extension.as_deref() == Some(*ext))
}

/// Description the account will post: its own override, else the default
pub fn merged_description(part: &SubmissionPart, default: &SubmissionPart) -> String {
    part.options
        .description
        .clone()
        .or_else(|| default.options.description.clone())
        .unwrap_or_default()
}

/// Format and size checks applied to every file an account receives
pub struct FileRules<'a> {
    /// Name used in size-limit problems ("Mastodon limits ...")
    pub platform: &'a str,
    pub accepted: &'a [&'a str],
    pub autoscale: bool,
}

impl FileRules<'_> {
    /// Check each file; `max_size` gives the byte limit for a file
    pub fn check<'f, F>(
        &self,
        files: impl IntoIterator<Item = &'f FileRecord>,
        max_size: F,
    ) -> ValidationParts
    where
        F: Fn(&FileRecord) -> u64,
    {
        let mut parts = ValidationParts::default();

        for file in files {
            if !supports_file_type(file, self.accepted) {
                parts.problems.push(format!(
                    "Does not support file format: ({}) {}.",
                    file.name, file.mime_type
                ));
            }

            let limit = max_size(file);
            if file.size > limit {
                let mb = bytes_to_mb(limit);
                if self.autoscale && scaling::is_scalable(file.file_type, &file.mime_type) {
                    parts
                        .warnings
                        .push(format!("{} will be scaled down to {}MB", file.name, mb));
                } else {
                    parts.problems.push(format!(
                        "{} limits {} to {}MB",
                        self.platform, file.mime_type, mb
                    ));
                }
            }
        }

        parts
    }
}
