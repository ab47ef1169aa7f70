//! Twitter platform implementation
//!
//! OAuth signing happens in a proxy service; this adapter relays the
//! account's token pair and the whole post (files base64-encoded) in one
//! JSON request to `{proxy_url}/twitter/v2/post`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::TwitterConfig;
use crate::error::{PlatformError, PostFailure};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::platforms::{Platform, PostContext};
use crate::text;
use crate::types::{
    Account, AccountData, FilePostData, FileRecord, FileType, LoginResponse, PostData, PostFile,
    PostState, PostSuccess, ScalingOptions, Submission, SubmissionPart, ValidationParts,
};
use crate::validation::{self, FileRules};

/// Tweet length limit
pub const MAX_CHARACTERS: usize = 280;
/// Length Twitter counts for any link
pub const LINK_LENGTH: usize = 23;

const IMAGE_LIMIT_MB: u64 = 5;
const ANIMATED_LIMIT_MB: u64 = 15;

const ACCEPTED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp", "mp4", "mov"];

#[derive(Debug, Deserialize)]
struct TwitterAccountData {
    #[serde(default)]
    oauth_token: Option<String>,
    #[serde(default)]
    oauth_token_secret: Option<String>,
    #[serde(default)]
    screen_name: Option<String>,
}

struct TwitterCredentials {
    token: SecretString,
    secret: SecretString,
}

impl TwitterCredentials {
    fn from_account(data: &AccountData) -> Result<Self, PlatformError> {
        let parsed: TwitterAccountData = data.parse()?;
        match (parsed.oauth_token, parsed.oauth_token_secret) {
            (Some(token), Some(secret)) if !token.is_empty() => Ok(Self {
                token: SecretString::from(token),
                secret: SecretString::from(secret),
            }),
            _ => Err(PlatformError::Authentication(
                "Missing Twitter OAuth token pair".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ProxyData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyData {
    #[serde(default)]
    url: Option<String>,
}

/// Byte limit Twitter applies to a file of this type
fn size_limit(file: &FileRecord) -> u64 {
    let animated = file.mime_type.eq_ignore_ascii_case("image/gif");
    if animated || file.file_type == FileType::Video {
        validation::mb_to_bytes(ANIMATED_LIMIT_MB)
    } else {
        validation::mb_to_bytes(IMAGE_LIMIT_MB)
    }
}

fn encode_file(file: &PostFile) -> serde_json::Value {
    json!({
        "data": STANDARD.encode(&file.data),
        "filename": file.record.name,
        "contentType": file.record.mime_type,
    })
}

/// Twitter platform implementation
///
/// Every post is a single proxy request carrying all of its files, so the
/// platform never threads replies itself.
pub struct TwitterPlatform {
    transport: Arc<dyn HttpTransport>,
    config: TwitterConfig,
}

impl TwitterPlatform {
    /// Create a new Twitter platform
    ///
    /// # Arguments
    ///
    /// * `transport` - HTTP transport used to reach the proxy
    /// * `config` - Proxy location; `proxy_url` may carry a trailing slash
    ///
    /// # Returns
    ///
    /// A platform that posts through `{proxy_url}/twitter/v2/post`
    pub fn new(transport: Arc<dyn HttpTransport>, config: TwitterConfig) -> Self {
        Self { transport, config }
    }

    fn endpoint(&self) -> String {
        format!("{}/twitter/v2/post", self.config.proxy_url.trim_end_matches('/'))
    }

    async fn relay(
        &self,
        ctx: &PostContext,
        mut form: serde_json::Value,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        let credentials = TwitterCredentials::from_account(account)?;
        form["token"] = json!(credentials.token.expose_secret());
        form["secret"] = json!(credentials.secret.expose_secret());

        ctx.check_cancelled()?;
        ctx.report(PostState::Posting { chunk: 0 });

        let response = self
            .transport
            .send(HttpRequest::post(self.endpoint()).json(form))
            .await?;
        debug!("Twitter proxy answered HTTP {}", response.status);
        interpret_response(&response)
    }

    fn description_warnings(
        &self,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        let mut parts = ValidationParts::default();
        let description = text::plaintext(
            &self.preparse_description(&validation::merged_description(part, default_part)),
            Some(LINK_LENGTH),
        );
        let length = text::char_len(&description);
        if length > MAX_CHARACTERS {
            parts.warnings.push(format!(
                "Approximated description may surpass {} character limit ({})",
                MAX_CHARACTERS, length
            ));
        }
        parts
    }
}

fn interpret_response(response: &HttpResponse) -> Result<PostSuccess, PostFailure> {
    let body = response.json_value();
    let parsed: Option<ProxyResponse> = serde_json::from_value(body.clone()).ok();

    match parsed {
        Some(ProxyResponse {
            success: true,
            data,
            ..
        }) if response.is_success() => {
            let source = data.and_then(|d| d.url);
            info!("Posted to Twitter: {}", source.as_deref().unwrap_or("(no url)"));
            Ok(PostSuccess {
                source,
                additional_info: None,
            })
        }
        Some(ProxyResponse {
            error: Some(message),
            ..
        }) => {
            let error = match response.status {
                401 | 403 => PlatformError::Authentication(message),
                429 => PlatformError::RateLimit(message),
                _ => PlatformError::Posting(message),
            };
            Err(PostFailure::from(error).with_info(body))
        }
        _ => {
            let message = format!("Twitter proxy returned HTTP {}: {}", response.status, response.text());
            let error = match response.status {
                401 | 403 => PlatformError::Authentication(message),
                429 => PlatformError::RateLimit(message),
                500..=599 => PlatformError::Network(message),
                _ => PlatformError::Posting(message),
            };
            let failure = PostFailure::from(error);
            Err(if body.is_null() {
                failure
            } else {
                failure.with_info(body)
            })
        }
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn id(&self) -> &str {
        "twitter"
    }

    fn display_name(&self) -> &str {
        "Twitter"
    }

    fn accepted_extensions(&self) -> &[&'static str] {
        ACCEPTED_EXTENSIONS
    }

    async fn check_login_status(&self, account: &Account) -> Result<LoginResponse, PlatformError> {
        let parsed: TwitterAccountData = match account.data.parse() {
            Ok(parsed) => parsed,
            Err(_) => return Ok(LoginResponse::logged_out()),
        };
        match parsed.oauth_token {
            Some(token) if !token.is_empty() => Ok(LoginResponse::logged_in(parsed.screen_name)),
            _ => Ok(LoginResponse::logged_out()),
        }
    }

    fn scaling_options(&self, _file: &FileRecord, _account_id: &str) -> ScalingOptions {
        ScalingOptions {
            max_size: Some(validation::mb_to_bytes(IMAGE_LIMIT_MB)),
            ..ScalingOptions::default()
        }
    }

    async fn post_file_submission(
        &self,
        ctx: &PostContext,
        data: &FilePostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        let post = &data.post;
        let files: Vec<serde_json::Value> = data.files().map(encode_file).collect();
        let form = json!({
            "title": "",
            "description": post.description,
            "tags": post.tags,
            "files": files,
            "rating": post.rating.as_str(),
            "options": {
                "contentBlur": post.options.content_blur,
            },
        });
        self.relay(ctx, form, account).await
    }

    async fn post_notification_submission(
        &self,
        ctx: &PostContext,
        data: &PostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        let form = json!({
            "title": "",
            "description": data.description,
            "tags": data.tags,
            "rating": data.rating.as_str(),
            "options": {},
        });
        self.relay(ctx, form, account).await
    }

    fn validate_file_submission(
        &self,
        submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        let mut parts = self.description_warnings(part, default_part);
        let rules = FileRules {
            platform: self.display_name(),
            accepted: ACCEPTED_EXTENSIONS,
            autoscale: part.autoscale(default_part),
        };
        parts.extend(rules.check(submission.files_for(part), size_limit));
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

    fn preparse_description(&self, text: &str) -> String {
        text::replace_username_shortcut(text, "tw", "@$1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::http::mock::MockTransport;
    use crate::types::{PostOptions, SubmissionRating};
    use std::path::PathBuf;

    fn platform(transport: Arc<MockTransport>) -> TwitterPlatform {
        TwitterPlatform::new(
            transport,
            TwitterConfig {
                proxy_url: "https://proxy.example/".to_string(),
            },
        )
    }

    fn account_data() -> AccountData {
        AccountData::from_value(json!({
            "oauth_token": "tok",
            "oauth_token_secret": "sec",
            "screen_name": "artist"
        }))
    }

    fn post_data(description: &str) -> PostData {
        let submission = Submission::notification("Title", description);
        let mut part = SubmissionPart::new("tw");
        part.options.content_blur = Some(true);
        PostData {
            submission_id: submission.id.clone(),
            account_id: "tw".to_string(),
            title: "Title".to_string(),
            description: description.to_string(),
            tags: vec!["art".to_string()],
            rating: SubmissionRating::Adult,
            options: PostOptions::merge(&part, &submission.default_part()),
        }
    }

    fn ctx() -> PostContext {
        PostContext::new("sub", "tw", CancellationToken::new())
    }

    fn record(name: &str, mime: &str, size: u64) -> FileRecord {
        FileRecord::new(name, mime, size, PathBuf::from(format!("/tmp/{}", name)))
    }

    #[tokio::test]
    async fn test_login_from_account_data() {
        let platform = platform(Arc::new(MockTransport::unreachable()));
        let mut account = Account {
            id: "tw".to_string(),
            platform: "twitter".to_string(),
            alias: None,
            data: account_data(),
        };
        assert_eq!(
            platform.check_login_status(&account).await.unwrap(),
            LoginResponse::logged_in(Some("artist".to_string()))
        );

        account.data = AccountData::default();
        assert!(!platform.check_login_status(&account).await.unwrap().logged_in);
    }

    #[test]
    fn test_username_shortcut() {
        let platform = platform(Arc::new(MockTransport::unreachable()));
        assert_eq!(
            platform.preparse_description("art by {tw:someone}"),
            "art by @someone"
        );
    }

    #[test]
    fn test_scaling_options() {
        let platform = platform(Arc::new(MockTransport::unreachable()));
        let options = platform.scaling_options(&record("a.png", "image/png", 1), "tw");
        assert_eq!(options.max_size, Some(5 * 1024 * 1024));
        assert_eq!(options.max_width, None);
    }

    #[tokio::test]
    async fn test_file_post_relays_everything() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(HttpResponse::json(
                200,
                json!({"success": true, "data": {"url": "https://twitter.com/artist/status/1"}}),
            ))
        }));
        let platform = platform(Arc::clone(&transport));
        let data = FilePostData {
            post: post_data("hello"),
            primary: PostFile::new(record("a.png", "image/png", 3), b"abc".to_vec()),
            additional: vec![PostFile::new(record("b.gif", "image/gif", 1), b"g".to_vec())],
        };

        let success = platform
            .post_file_submission(&ctx(), &data, &account_data())
            .await
            .unwrap();
        assert_eq!(
            success.source.as_deref(),
            Some("https://twitter.com/artist/status/1")
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://proxy.example/twitter/v2/post");
        let body = requests[0].json_body().unwrap();
        assert_eq!(body["token"], "tok");
        assert_eq!(body["secret"], "sec");
        assert_eq!(body["title"], "");
        assert_eq!(body["description"], "hello");
        assert_eq!(body["tags"], json!(["art"]));
        assert_eq!(body["rating"], "adult");
        assert_eq!(body["options"]["contentBlur"], true);
        assert_eq!(body["files"][0]["data"], "YWJj");
        assert_eq!(body["files"][0]["filename"], "a.png");
        assert_eq!(body["files"][1]["contentType"], "image/gif");
    }

    #[tokio::test]
    async fn test_proxy_error_is_failure() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(HttpResponse::json(
                200,
                json!({"success": false, "error": "Status is a duplicate."}),
            ))
        }));
        let platform = platform(transport);

        let failure = platform
            .post_notification_submission(&ctx(), &post_data("hello"), &account_data())
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            PlatformError::Posting("Status is a duplicate.".to_string())
        );
        assert_eq!(failure.additional_info.unwrap()["success"], false);
    }

    #[tokio::test]
    async fn test_proxy_unreachable_status_mapping() {
        let transport = Arc::new(MockTransport::new(|_| Ok(HttpResponse::new(503, "down"))));
        let platform = platform(transport);

        let failure = platform
            .post_notification_submission(&ctx(), &post_data("hello"), &account_data())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PlatformError::Network(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_relay() {
        let transport = Arc::new(MockTransport::unreachable());
        let platform = platform(Arc::clone(&transport));
        let token = CancellationToken::new();
        token.cancel();

        let failure = platform
            .post_notification_submission(
                &PostContext::new("sub", "tw", token),
                &post_data("hello"),
                &account_data(),
            )
            .await
            .unwrap_err();
        assert!(failure.is_cancelled());
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_description_length_counts_links() {
        let platform = platform(Arc::new(MockTransport::unreachable()));
        let submission = Submission::notification("t", "d");
        let mut part = SubmissionPart::new("tw");

        let long_link = format!("https://example.com/{}", "a".repeat(400));
        part.options.description = Some(format!("see {}", long_link));
        let parts =
            platform.validate_notification_submission(&submission, &part, &submission.default_part());
        assert!(parts.warnings.is_empty());

        part.options.description = Some("x".repeat(300));
        let parts =
            platform.validate_notification_submission(&submission, &part, &submission.default_part());
        assert_eq!(
            parts.warnings,
            vec!["Approximated description may surpass 280 character limit (300)"]
        );
    }

    #[test]
    fn test_file_size_limits() {
        let platform = platform(Arc::new(MockTransport::unreachable()));
        let mb = validation::mb_to_bytes;

        let mut submission = Submission::file("t", "d", record("big.png", "image/png", mb(6)));
        submission.additional = vec![
            record("anim.gif", "image/gif", mb(10)),
            record("clip.mp4", "video/mp4", mb(16)),
            record("doc.pdf", "application/pdf", 1),
        ];
        let part = SubmissionPart::new("tw");

        let parts = platform.validate_file_submission(&submission, &part, &submission.default_part());
        assert_eq!(parts.warnings, vec!["big.png will be scaled down to 5MB"]);
        assert_eq!(
            parts.problems,
            vec![
                "Twitter limits video/mp4 to 15MB".to_string(),
                "Does not support file format: (doc.pdf) application/pdf.".to_string(),
            ]
        );
    }
}
