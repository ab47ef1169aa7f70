//! Mastodon platform implementation
//!
//! Talks to the instance REST API with a bearer token. Instance limits
//! (status length, attachments per status, media size) come from
//! `/api/v1/instance` and are cached per account at login.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::capabilities::CapabilityStore;
use crate::config::PostingConfig;
use crate::error::{PlatformError, PostFailure};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, MultipartField};
use crate::platforms::{Platform, PostContext};
use crate::poster::{self, PollOutcome, PollPolicy, PostedStatus, ThreadPoster};
use crate::text;
use crate::types::{
    Account, AccountData, FilePostData, FileRecord, FileType, LoginResponse, PostData, PostFile,
    PostSuccess, ScalingOptions, Submission, SubmissionPart, ValidationParts, Visibility,
};
use crate::validation::{self, FileRules};

/// Capability key holding the raw `/api/v1/instance` document
pub const INSTANCE_INFO_KEY: &str = "instance_info";

pub const DEFAULT_MAX_CHARACTERS: usize = 500;
pub const DEFAULT_MAX_ATTACHMENTS: usize = 4;
/// Largest dimension the server accepts, in pixels
pub const MAX_DIMENSION: u32 = 4000;

const DEFAULT_IMAGE_LIMIT_MB: u64 = 50;
const DEFAULT_SCALING_LIMIT_MB: u64 = 300;

const ACCEPTED_EXTENSIONS: &[&str] = &[
    "png", "jpeg", "jpg", "gif", "swf", "flv", "mp4", "doc", "rtf", "txt", "mp3",
];

#[derive(Debug, Clone, Default, Deserialize)]
struct InstanceInfo {
    #[serde(default)]
    configuration: Option<InstanceConfiguration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InstanceConfiguration {
    #[serde(default)]
    statuses: Option<StatusLimits>,
    #[serde(default)]
    media_attachments: Option<MediaLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StatusLimits {
    max_characters: Option<usize>,
    max_media_attachments: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MediaLimits {
    image_size_limit: Option<u64>,
    video_size_limit: Option<u64>,
}

/// Limits for one account, with defaults filled in
///
/// Built from the cached `/api/v1/instance` document. A zero attachment
/// count is treated as unreported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceLimits {
    /// Longest status body, in characters
    pub max_characters: usize,
    /// Media per status; longer media lists become a reply thread
    pub max_attachments: usize,
    /// Image upload limit in bytes, if the instance reports one
    pub image_size_limit: Option<u64>,
    /// Video upload limit in bytes, if the instance reports one
    pub video_size_limit: Option<u64>,
}

impl From<Option<InstanceInfo>> for InstanceLimits {
    fn from(info: Option<InstanceInfo>) -> Self {
        let configuration = info.and_then(|i| i.configuration).unwrap_or_default();
        let statuses = configuration.statuses.unwrap_or_default();
        let media = configuration.media_attachments.unwrap_or_default();
        Self {
            max_characters: statuses.max_characters.unwrap_or(DEFAULT_MAX_CHARACTERS),
            max_attachments: statuses
                .max_media_attachments
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_ATTACHMENTS),
            image_size_limit: media.image_size_limit,
            video_size_limit: media.video_size_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MastodonAccountData {
    website: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

struct MastodonCredentials {
    website: String,
    token: SecretString,
}

impl MastodonCredentials {
    fn from_account(data: &AccountData) -> Result<Self, PlatformError> {
        let parsed: MastodonAccountData = data.parse()?;
        let token = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PlatformError::Authentication("Missing Mastodon token".to_string()))?;
        Ok(Self {
            website: parsed.website.trim_end_matches('/').to_string(),
            token: SecretString::from(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.website, path)
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(self.url(path))
            .header("Accept", "*/*")
            .bearer(&self.token)
    }

    fn post(&self, path: &str) -> HttpRequest {
        HttpRequest::post(self.url(path))
            .header("Accept", "*/*")
            .bearer(&self.token)
    }
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Map a non-2xx Mastodon response to a failure
fn map_status_error(response: &HttpResponse, context: &str) -> PostFailure {
    let body = response.json_value();
    let detail = body
        .get("error")
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| response.text());

    let error = match response.status {
        401 | 403 => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                Suggestion: Verify your access token is valid and has not been revoked.",
            context, detail
        )),
        422 => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}. \
                Suggestion: Check that your content meets the instance's requirements.",
            context, detail
        )),
        429 => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}. \
                Suggestion: Wait a few minutes before posting again.",
            context, detail
        )),
        500..=599 => PlatformError::Network(format!(
            "Mastodon server error ({}): HTTP {}: {}. \
                Suggestion: The instance may be experiencing issues.",
            context, response.status, detail
        )),
        status => PlatformError::Posting(format!(
            "Mastodon HTTP error ({}): HTTP {}: {}",
            context, status, detail
        )),
    };

    let failure = PostFailure::from(error);
    if body.is_null() {
        failure
    } else {
        failure.with_info(body)
    }
}

/// Transport failures while uploading or polling media are upload failures
fn upload_error(error: PlatformError) -> PlatformError {
    match error {
        PlatformError::Upload(_) | PlatformError::Cancelled => error,
        other => PlatformError::Upload(other.to_string()),
    }
}

/// Mastodon platform implementation
///
/// Posts statuses with media through the instance REST API. All HTTP goes
/// through the injected transport, and instance limits are read from the
/// capability store that `check_login_status` fills.
pub struct MastodonPlatform {
    transport: Arc<dyn HttpTransport>,
    capabilities: Arc<CapabilityStore>,
    poll: PollPolicy,
}

impl MastodonPlatform {
    /// Create a new Mastodon platform
    ///
    /// # Arguments
    ///
    /// * `transport` - HTTP transport for every instance request
    /// * `capabilities` - Store where instance limits are cached per account
    /// * `posting` - Posting settings; media polling reads its interval,
    ///   attempt count and unconfirmed-media policy from here
    ///
    /// # Returns
    ///
    /// A platform that needs a login check per account before its cached
    /// limits apply
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        capabilities: Arc<CapabilityStore>,
        posting: PostingConfig,
    ) -> Self {
        Self {
            transport,
            capabilities,
            poll: PollPolicy::from(&posting),
        }
    }

    /// Cached instance limits for an account
    ///
    /// # Arguments
    ///
    /// * `account_id` - Account whose login cached the instance document
    ///
    /// # Returns
    ///
    /// The cached limits, with 500 characters and 4 attachments
    /// substituted for anything the instance did not report
    pub fn limits(&self, account_id: &str) -> InstanceLimits {
        InstanceLimits::from(
            self.capabilities
                .get_as::<InstanceInfo>(account_id, INSTANCE_INFO_KEY),
        )
    }

    async fn post_status(
        &self,
        ctx: &PostContext,
        data: &PostData,
        account: &AccountData,
        files: Vec<&PostFile>,
    ) -> Result<PostSuccess, PostFailure> {
        let credentials = MastodonCredentials::from_account(account)?;
        let limits = self.limits(&data.account_id);
        let body = poster::compose_status(
            data,
            &self.format_tags(&data.tags),
            limits.max_characters,
        );

        let thread = StatusThread {
            platform: self,
            credentials: &credentials,
            sensitive: data.rating.is_sensitive(),
            visibility: data.options.visibility,
            spoiler_text: data.options.spoiler_text.as_deref(),
        };

        poster::post_thread(
            ctx,
            &thread,
            files,
            &body,
            data.options.alt_text.as_deref(),
            limits.max_attachments,
        )
        .await
    }

    fn description_warnings(
        &self,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        let mut parts = ValidationParts::default();
        let description = self.parse_description(&self.preparse_description(
            &validation::merged_description(part, default_part),
        ));
        let max_chars = self.limits(&part.account_id).max_characters;

        if text::char_len(&description) > max_chars {
            parts.warnings.push(format!(
                "Max description length allowed is {} characters (for this Mastodon client).",
                max_chars
            ));
        }
        parts
    }
}

/// One posting run's view of the status API
struct StatusThread<'a> {
    platform: &'a MastodonPlatform,
    credentials: &'a MastodonCredentials,
    sensitive: bool,
    visibility: Visibility,
    spoiler_text: Option<&'a str>,
}

impl StatusThread<'_> {
    async fn media_ready(&self, media_id: &str) -> Result<bool, PlatformError> {
        let response = self
            .platform
            .transport
            .send(self.credentials.get(&format!("/api/v1/media/{}", media_id)))
            .await
            .map_err(upload_error)?;
        if !response.is_success() {
            debug!("Media {} poll returned HTTP {}", media_id, response.status);
            return Ok(false);
        }
        Ok(response
            .parse::<MediaAttachment>()
            .map(|m| m.url.is_some())
            .unwrap_or(false))
    }
}

#[async_trait]
impl ThreadPoster for StatusThread<'_> {
    async fn upload_media(
        &self,
        file: &PostFile,
        alt_text: Option<&str>,
    ) -> Result<String, PostFailure> {
        let mut fields = vec![MultipartField::File {
            name: "file".to_string(),
            file_name: file.record.name.clone(),
            mime_type: file.record.mime_type.clone(),
            data: file.data.clone(),
        }];
        if let Some(description) = alt_text.filter(|a| !a.is_empty()) {
            fields.push(MultipartField::Text {
                name: "description".to_string(),
                value: description.to_string(),
            });
        }

        let response = self
            .platform
            .transport
            .send(self.credentials.post("/api/v2/media").multipart(fields))
            .await
            .map_err(upload_error)?;
        if !response.is_success() {
            let failure = map_status_error(&response, "media upload");
            return Err(PostFailure {
                error: PlatformError::Upload(failure.error.to_string()),
                ..failure
            });
        }

        let body = response.json_value();
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(PostFailure::from(PlatformError::Upload(format!(
                "Mastodon rejected {}: {}",
                file.record.name, errors
            )))
            .with_info(body.clone()));
        }

        let media: MediaAttachment = response
            .parse()
            .map_err(|e| PlatformError::Upload(e.to_string()))?;

        if response.status == 202 || media.url.is_none() {
            debug!("Media {} is processing; polling", media.id);
            let what = format!("Media {}", media.id);
            let outcome = self
                .platform
                .poll
                .poll(&what, |_| self.media_ready(&media.id))
                .await?;
            if outcome == PollOutcome::Unconfirmed {
                warn!(
                    "Attaching unconfirmed media {} ({})",
                    media.id, file.record.name
                );
            }
        }

        Ok(media.id)
    }

    async fn post_chunk(
        &self,
        body: &str,
        media_ids: &[String],
        reply_to: Option<&str>,
    ) -> Result<PostedStatus, PostFailure> {
        let mut payload = json!({
            "status": body,
            "sensitive": self.sensitive,
            "visibility": self.visibility.as_str(),
            "media_ids": media_ids,
        });
        if let Some(reply_to) = reply_to {
            payload["in_reply_to_id"] = json!(reply_to);
        }
        if let Some(spoiler) = self.spoiler_text {
            payload["spoiler_text"] = json!(spoiler);
        }

        let response = self
            .platform
            .transport
            .send(self.credentials.post("/api/v1/statuses").json(payload))
            .await?;
        if !response.is_success() {
            return Err(map_status_error(&response, "post status"));
        }

        let status: Status = response.parse()?;
        Ok(PostedStatus {
            id: status.id,
            url: status.url,
        })
    }
}

#[async_trait]
impl Platform for MastodonPlatform {
    fn id(&self) -> &str {
        "mastodon"
    }

    fn display_name(&self) -> &str {
        "Mastodon"
    }

    fn accepted_extensions(&self) -> &[&'static str] {
        ACCEPTED_EXTENSIONS
    }

    async fn check_login_status(&self, account: &Account) -> Result<LoginResponse, PlatformError> {
        let Ok(parsed) = account.data.parse::<MastodonAccountData>() else {
            return Ok(LoginResponse::logged_out());
        };
        let Ok(credentials) = MastodonCredentials::from_account(&account.data) else {
            return Ok(LoginResponse::logged_out());
        };

        let response = self
            .transport
            .send(credentials.get("/api/v1/instance"))
            .await?;

        match response.status {
            401 | 403 => {
                info!("Mastodon rejected the token for account {}", account.id);
                Ok(LoginResponse::logged_out())
            }
            _ if response.is_success() => {
                self.capabilities
                    .put(&account.id, INSTANCE_INFO_KEY, response.json_value());
                Ok(LoginResponse::logged_in(parsed.username))
            }
            _ => Err(map_status_error(&response, "instance info").error),
        }
    }

    fn scaling_options(&self, file: &FileRecord, account_id: &str) -> ScalingOptions {
        let limits = self.limits(account_id);
        let cached = if file.file_type == FileType::Image {
            limits.image_size_limit
        } else {
            limits.video_size_limit
        };
        ScalingOptions {
            max_width: Some(MAX_DIMENSION),
            max_height: Some(MAX_DIMENSION),
            max_size: Some(cached.unwrap_or_else(|| validation::mb_to_bytes(DEFAULT_SCALING_LIMIT_MB))),
        }
    }

    async fn post_file_submission(
        &self,
        ctx: &PostContext,
        data: &FilePostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        self.post_status(ctx, &data.post, account, data.files().collect())
            .await
    }

    async fn post_notification_submission(
        &self,
        ctx: &PostContext,
        data: &PostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        self.post_status(ctx, data, account, Vec::new()).await
    }

    fn validate_file_submission(
        &self,
        submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        let mut parts = self.description_warnings(part, default_part);
        let autoscale = part.autoscale(default_part);
        let files = submission.files_for(part);

        let max_image_size = self
            .limits(&part.account_id)
            .image_size_limit
            .unwrap_or_else(|| validation::mb_to_bytes(DEFAULT_IMAGE_LIMIT_MB));
        let rules = FileRules {
            platform: self.display_name(),
            accepted: ACCEPTED_EXTENSIONS,
            autoscale,
        };
        parts.extend(rules.check(files.iter().copied(), |_| max_image_size));

        if autoscale {
            for file in files.iter().filter(|f| f.file_type == FileType::Image) {
                if file.width > MAX_DIMENSION || file.height > MAX_DIMENSION {
                    parts.warnings.push(format!(
                        "{} will be scaled down to a maximum size of {}x{}, while maintaining aspect ratio",
                        file.name, MAX_DIMENSION, MAX_DIMENSION
                    ));
                }
            }
        }

        let tagged = part.tag_values().len() > 1 || default_part.tag_values().len() > 1;
        if tagged && part.visibility(default_part) != Visibility::Public {
            parts.warnings.push(
                "This post won't be listed under any hashtag as it is not public. \
                 Only public posts can be searched by hashtag."
                    .to_string(),
            );
        }

        parts
    }

    fn validate_notification_submission(
        &self,
        _submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        self.description_warnings(part, default_part)
    }
}
