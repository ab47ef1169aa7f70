//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(PlatformError::Authentication(_)) => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::NotFound(_) => 1,
            CrosspostError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Submission cancelled")]
    Cancelled,
}

/// Failure of one account's posting protocol
///
/// Carries the classified error plus whatever the platform had already
/// accepted before the failure. Chunks that were posted are never rolled
/// back, so `source_url` may point at a partial thread.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct PostFailure {
    pub error: PlatformError,
    /// Zero-based index of the chunk whose post was rejected
    pub chunk_number: Option<usize>,
    /// URL of the first post that was created before the failure
    pub source_url: Option<String>,
    /// Raw platform payload for diagnostics
    pub additional_info: Option<serde_json::Value>,
}

impl PostFailure {
    pub fn at_chunk(mut self, chunk: usize) -> Self {
        self.chunk_number = Some(chunk);
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source_url = source;
        self
    }

    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, PlatformError::Cancelled)
    }
}

impl From<PlatformError> for PostFailure {
    fn from(error: PlatformError) -> Self {
        Self {
            error,
            chunk_number: None,
            source_url: None,
            additional_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Empty manifest".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = CrosspostError::Platform(PlatformError::Authentication(
            "Missing token".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        assert_eq!(
            CrosspostError::Platform(PlatformError::Upload("x".to_string())).exit_code(),
            1
        );
        assert_eq!(CrosspostError::NotFound("template 1".to_string()).exit_code(), 1);
        assert_eq!(
            CrosspostError::Config(ConfigError::MissingField("accounts".to_string())).exit_code(),
            1
        );
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosspostError::Platform(PlatformError::Posting(
            "Mastodon rejected status".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Posting failed: Mastodon rejected status"
        );

        let error = CrosspostError::NotFound("Description template abc".to_string());
        assert_eq!(error.to_string(), "Not found: Description template abc");

        let error = ConfigError::InvalidValue {
            field: "posting.media_poll_attempts".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for posting.media_poll_attempts: must be at least 1"
        );
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let failure = PostFailure::from(PlatformError::Cancelled);
        assert!(failure.is_cancelled());
        assert_eq!(failure.to_string(), "Submission cancelled");

        let failure = PostFailure::from(PlatformError::Network("reset".to_string()));
        assert!(!failure.is_cancelled());
    }

    #[test]
    fn test_post_failure_builders() {
        let failure = PostFailure::from(PlatformError::Posting("422".to_string()))
            .at_chunk(2)
            .with_source(Some("https://example.social/@a/1".to_string()))
            .with_info(serde_json::json!({"error": "Validation failed"}));

        assert_eq!(failure.chunk_number, Some(2));
        assert_eq!(failure.source_url.as_deref(), Some("https://example.social/@a/1"));
        assert_eq!(failure.additional_info.unwrap()["error"], "Validation failed");
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::RateLimit("slow down".to_string());
        assert_eq!(original.clone(), original);
    }
}
