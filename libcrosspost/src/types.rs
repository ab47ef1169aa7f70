//! Core types for Crosspost

use std::path::PathBuf;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlatformError;

/// Account id used for the part every account falls back to
pub const DEFAULT_PART_ID: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    File,
    Notification,
}

/// Content-sensitivity classification of a submission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionRating {
    #[default]
    General,
    Mature,
    Adult,
    Extreme,
}

impl SubmissionRating {
    /// Whether platforms should flag the post as sensitive
    pub fn is_sensitive(&self) -> bool {
        !matches!(self, SubmissionRating::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Mature => "mature",
            Self::Adult => "adult",
            Self::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Text,
    #[default]
    Unknown,
}

impl FileType {
    /// Classify a MIME string (e.g., "image/png")
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        match mime.split('/').next().unwrap_or_default() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            _ => Self::Unknown,
        }
    }
}

/// Metadata for a stored submission file
///
/// The file store owns the bytes; this record is what validation reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: String,
    /// Original file name, including extension
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub file_type: FileType,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub location: PathBuf,
    #[serde(default)]
    pub preview: Option<PathBuf>,
    /// Accounts that should not receive this file
    #[serde(default)]
    pub ignored_accounts: Vec<String>,
}

impl FileRecord {
    pub fn new(name: &str, mime_type: &str, size: u64, location: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            file_type: FileType::from_mime(mime_type),
            size,
            width: 0,
            height: 0,
            location,
            preview: None,
            ignored_accounts: Vec::new(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Lowercased extension taken from the file name
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

/// A file record together with its bytes, ready for upload
#[derive(Debug, Clone)]
pub struct PostFile {
    pub record: FileRecord,
    pub data: Bytes,
}

impl PostFile {
    pub fn new(record: FileRecord, data: impl Into<Bytes>) -> Self {
        Self {
            record,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagData {
    /// Append these tags to the default part's tags instead of replacing them
    #[serde(default = "default_true")]
    pub extend_default: bool,
    #[serde(default)]
    pub value: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Options a part may override; `None` means "inherit"
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartOptions {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<TagData>,
    #[serde(default)]
    pub rating: Option<SubmissionRating>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Content-warning text
    #[serde(default)]
    pub spoiler_text: Option<String>,
    #[serde(default)]
    pub use_title: Option<bool>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub autoscale: Option<bool>,
    #[serde(default)]
    pub content_blur: Option<bool>,
    /// Ids of files excluded for this account
    #[serde(default)]
    pub ignored_files: Vec<String>,
}

/// Account-scoped override of the default posting options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionPart {
    pub account_id: String,
    #[serde(default)]
    pub options: PartOptions,
}

impl SubmissionPart {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            options: PartOptions::default(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.account_id == DEFAULT_PART_ID
    }

    pub fn tag_values(&self) -> &[String] {
        self.options
            .tags
            .as_ref()
            .map(|t| t.value.as_slice())
            .unwrap_or_default()
    }

    pub fn autoscale(&self, default: &SubmissionPart) -> bool {
        self.options
            .autoscale
            .or(default.options.autoscale)
            .unwrap_or(true)
    }

    pub fn visibility(&self, default: &SubmissionPart) -> Visibility {
        self.options
            .visibility
            .or(default.options.visibility)
            .unwrap_or_default()
    }
}

/// One logical submission, posted to many accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default = "new_id")]
    pub id: String,
    pub kind: SubmissionKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rating: SubmissionRating,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub primary: Option<FileRecord>,
    #[serde(default)]
    pub additional: Vec<FileRecord>,
    /// Option values shared by every account unless a part overrides them
    #[serde(default)]
    pub defaults: PartOptions,
    #[serde(default)]
    pub parts: Vec<SubmissionPart>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Submission {
    pub fn notification(title: &str, description: &str) -> Self {
        Self {
            id: new_id(),
            kind: SubmissionKind::Notification,
            title: title.to_string(),
            description: description.to_string(),
            rating: SubmissionRating::General,
            tags: Vec::new(),
            primary: None,
            additional: Vec::new(),
            defaults: PartOptions::default(),
            parts: Vec::new(),
        }
    }

    pub fn file(title: &str, description: &str, primary: FileRecord) -> Self {
        Self {
            kind: SubmissionKind::File,
            primary: Some(primary),
            ..Self::notification(title, description)
        }
    }

    /// The global default part, with submission-level fields filled in
    pub fn default_part(&self) -> SubmissionPart {
        let mut options = self.defaults.clone();
        if options.description.is_none() {
            options.description = Some(self.description.clone());
        }
        if options.tags.is_none() {
            options.tags = Some(TagData {
                extend_default: false,
                value: self.tags.clone(),
            });
        }
        if options.rating.is_none() {
            options.rating = Some(self.rating);
        }
        SubmissionPart {
            account_id: DEFAULT_PART_ID.to_string(),
            options,
        }
    }

    /// The part for an account, or an empty one that inherits everything
    pub fn part_for(&self, account_id: &str) -> SubmissionPart {
        self.parts
            .iter()
            .find(|p| p.account_id == account_id)
            .cloned()
            .unwrap_or_else(|| SubmissionPart::new(account_id))
    }

    /// Primary file plus the additional files this account has not ignored
    pub fn files_for(&self, part: &SubmissionPart) -> Vec<&FileRecord> {
        let ignored = |f: &FileRecord| {
            f.ignored_accounts.contains(&part.account_id)
                || part.options.ignored_files.contains(&f.id)
        };
        self.primary
            .iter()
            .chain(self.additional.iter().filter(|f| !ignored(f)))
            .collect()
    }
}

/// Options after merging an account part over the default part
#[derive(Debug, Clone, PartialEq)]
pub struct PostOptions {
    pub description: String,
    pub tags: Vec<String>,
    pub rating: SubmissionRating,
    pub visibility: Visibility,
    pub spoiler_text: Option<String>,
    pub use_title: bool,
    pub alt_text: Option<String>,
    pub autoscale: bool,
    pub content_blur: bool,
}

impl PostOptions {
    /// Merge `part` over `default`; the part's value wins when present
    pub fn merge(part: &SubmissionPart, default: &SubmissionPart) -> Self {
        let p = &part.options;
        let d = &default.options;

        let tags = match &p.tags {
            Some(own) if own.extend_default => {
                let mut tags = default.tag_values().to_vec();
                for tag in &own.value {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
                tags
            }
            Some(own) => own.value.clone(),
            None => default.tag_values().to_vec(),
        };

        Self {
            description: p
                .description
                .clone()
                .or_else(|| d.description.clone())
                .unwrap_or_default(),
            tags,
            rating: p.rating.or(d.rating).unwrap_or_default(),
            visibility: part.visibility(default),
            spoiler_text: p
                .spoiler_text
                .clone()
                .or_else(|| d.spoiler_text.clone())
                .filter(|s| !s.trim().is_empty()),
            use_title: p.use_title.or(d.use_title).unwrap_or(true),
            alt_text: p.alt_text.clone().or_else(|| d.alt_text.clone()),
            autoscale: part.autoscale(default),
            content_blur: p.content_blur.or(d.content_blur).unwrap_or(false),
        }
    }
}

/// Blocking problems and advisory warnings for one account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationParts {
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationParts {
    pub fn is_blocking(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn extend(&mut self, other: ValidationParts) {
        self.problems.extend(other.problems);
        self.warnings.extend(other.warnings);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub logged_in: bool,
    pub username: Option<String>,
}

impl LoginResponse {
    pub fn logged_out() -> Self {
        Self {
            logged_in: false,
            username: None,
        }
    }

    pub fn logged_in(username: Option<String>) -> Self {
        Self {
            logged_in: true,
            username,
        }
    }
}

/// Limits handed to the image scaler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingOptions {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Maximum size in bytes
    pub max_size: Option<u64>,
}

/// Opaque credential bundle, interpreted only by the owning platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountData(pub serde_json::Map<String, serde_json::Value>);

impl AccountData {
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Deserialize into a platform-specific credential struct
    pub fn parse<T: DeserializeOwned>(&self) -> std::result::Result<T, PlatformError> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone())).map_err(|e| {
            PlatformError::Authentication(format!("Invalid account data: {}", e))
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub platform: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub data: AccountData,
}

/// Everything a platform needs to post a notification
#[derive(Debug, Clone)]
pub struct PostData {
    pub submission_id: String,
    pub account_id: String,
    pub title: String,
    /// Description after the platform's pre-parse step
    pub description: String,
    pub tags: Vec<String>,
    pub rating: SubmissionRating,
    pub options: PostOptions,
}

/// Post data plus the files, already loaded and scaled
#[derive(Debug, Clone)]
pub struct FilePostData {
    pub post: PostData,
    pub primary: PostFile,
    pub additional: Vec<PostFile>,
}

impl FilePostData {
    pub fn files(&self) -> impl Iterator<Item = &PostFile> {
        std::iter::once(&self.primary).chain(self.additional.iter())
    }
}

/// What a platform returns when a post went through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostSuccess {
    /// URL of the (first) created post
    pub source: Option<String>,
    pub additional_info: Option<serde_json::Value>,
}

impl PostSuccess {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            additional_info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Outcome of posting one submission to one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostResponse {
    pub account_id: String,
    pub platform: String,
    pub status: PostStatus,
    pub source: Option<String>,
    pub message: Option<String>,
    pub additional_info: Option<serde_json::Value>,
    pub chunk_number: Option<usize>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub finished_at: i64,
}

impl PostResponse {
    pub fn new(account_id: &str, platform: &str, status: PostStatus) -> Self {
        Self {
            account_id: account_id.to_string(),
            platform: platform.to_string(),
            status,
            source: None,
            message: None,
            additional_info: None,
            chunk_number: None,
            warnings: Vec::new(),
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failed(account_id: &str, platform: &str, message: impl Into<String>) -> Self {
        let mut response = Self::new(account_id, platform, PostStatus::Failed);
        response.message = Some(message.into());
        response
    }

    pub fn success(&self) -> bool {
        self.status == PostStatus::Succeeded
    }
}

/// Progress of one (submission, account) pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PostState {
    Pending,
    Validating,
    Uploading { file: usize },
    Posting { chunk: usize },
    Succeeded,
    Failed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> FileRecord {
        FileRecord::new(name, "image/png", 1024, PathBuf::from(format!("/tmp/{}", name)))
    }

    #[test]
    fn test_file_type_from_mime() {
        assert_eq!(FileType::from_mime("image/png"), FileType::Image);
        assert_eq!(FileType::from_mime("VIDEO/mp4"), FileType::Video);
        assert_eq!(FileType::from_mime("audio/mpeg"), FileType::Audio);
        assert_eq!(FileType::from_mime("text/plain"), FileType::Text);
        assert_eq!(FileType::from_mime("application/pdf"), FileType::Unknown);
    }

    #[test]
    fn test_extension() {
        assert_eq!(image("a.PNG").extension().as_deref(), Some("png"));
        assert_eq!(image("archive.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(image("noext").extension(), None);
        assert_eq!(image("trailing.").extension(), None);
    }

    #[test]
    fn test_rating_sensitivity() {
        assert!(!SubmissionRating::General.is_sensitive());
        assert!(SubmissionRating::Mature.is_sensitive());
        assert!(SubmissionRating::Adult.is_sensitive());
        assert!(SubmissionRating::Extreme.is_sensitive());
    }

    #[test]
    fn test_merge_part_wins_when_present() {
        let mut submission = Submission::notification("Title", "Default description");
        submission.tags = vec!["art".to_string()];
        submission.defaults.visibility = Some(Visibility::Unlisted);

        let mut part = SubmissionPart::new("acct");
        part.options.description = Some("Account description".to_string());
        part.options.spoiler_text = Some("cw".to_string());

        let options = PostOptions::merge(&part, &submission.default_part());
        assert_eq!(options.description, "Account description");
        assert_eq!(options.visibility, Visibility::Unlisted);
        assert_eq!(options.spoiler_text.as_deref(), Some("cw"));
        assert_eq!(options.tags, vec!["art"]);
        assert!(options.use_title);
        assert!(options.autoscale);
    }

    #[test]
    fn test_merge_falls_back_to_default() {
        let submission = Submission::notification("Title", "Default description");
        let part = SubmissionPart::new("acct");

        let options = PostOptions::merge(&part, &submission.default_part());
        assert_eq!(options.description, "Default description");
        assert_eq!(options.visibility, Visibility::Public);
        assert_eq!(options.spoiler_text, None);
    }

    #[test]
    fn test_merge_tags_extend_or_replace() {
        let mut submission = Submission::notification("t", "d");
        submission.tags = vec!["a".to_string(), "b".to_string()];
        let default = submission.default_part();

        let mut part = SubmissionPart::new("acct");
        part.options.tags = Some(TagData {
            extend_default: true,
            value: vec!["b".to_string(), "c".to_string()],
        });
        assert_eq!(PostOptions::merge(&part, &default).tags, vec!["a", "b", "c"]);

        part.options.tags = Some(TagData {
            extend_default: false,
            value: vec!["c".to_string()],
        });
        assert_eq!(PostOptions::merge(&part, &default).tags, vec!["c"]);
    }

    #[test]
    fn test_blank_spoiler_is_dropped() {
        let submission = Submission::notification("t", "d");
        let mut part = SubmissionPart::new("acct");
        part.options.spoiler_text = Some("   ".to_string());
        assert_eq!(PostOptions::merge(&part, &submission.default_part()).spoiler_text, None);
    }

    #[test]
    fn test_files_for_skips_ignored() {
        let mut ignored_by_account = image("b.png");
        ignored_by_account.ignored_accounts.push("acct".to_string());
        let ignored_by_part = image("c.png");
        let kept = image("d.png");

        let mut submission = Submission::file("t", "d", image("a.png"));
        submission.additional = vec![ignored_by_account, ignored_by_part.clone(), kept];

        let mut part = SubmissionPart::new("acct");
        part.options.ignored_files.push(ignored_by_part.id.clone());

        let names: Vec<&str> = submission
            .files_for(&part)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.png", "d.png"]);

        let other = SubmissionPart::new("other");
        let names: Vec<&str> = submission
            .files_for(&other)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png", "d.png"]);
    }

    #[test]
    fn test_account_data_parse() {
        #[derive(Deserialize)]
        struct Creds {
            token: String,
        }

        let data = AccountData::from_value(serde_json::json!({"token": "abc", "extra": 1}));
        let creds: Creds = data.parse().unwrap();
        assert_eq!(creds.token, "abc");
        assert_eq!(data.get_str("token"), Some("abc"));

        let empty = AccountData::default();
        assert!(matches!(
            empty.parse::<Creds>(),
            Err(PlatformError::Authentication(_))
        ));
    }

    #[test]
    fn test_post_state_serialization() {
        let json = serde_json::to_value(PostState::Posting { chunk: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "posting", "chunk": 2}));
    }
}
