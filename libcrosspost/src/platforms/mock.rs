//! Mock platform implementation for testing
//!
//! Simulates successes, failures, rejected chunks, panics and latency
//! without credentials or network access. Posting goes through the shared
//! thread driver, so chunking, reply chaining and cancellation behave as
//! they do for real platforms.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::cancellation::CancellationToken;
use crate::error::{PlatformError, PostFailure};
use crate::platforms::{Platform, PostContext};
use crate::poster::{self, PostedStatus, ThreadPoster};
use crate::types::{
    Account, AccountData, FilePostData, FileRecord, LoginResponse, PostData, PostFile,
    PostSuccess, ScalingOptions, Submission, SubmissionPart, ValidationParts,
};

/// How posting calls behave
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    Succeed,
    /// Fail before any upload
    Fail(PlatformError),
    /// Reject the chunk with this index
    FailAtChunk(usize, PlatformError),
    /// Panic inside the posting call
    Panic(String),
}

/// A status the mock "created"
#[derive(Debug, Clone, PartialEq)]
pub struct PostedChunk {
    pub body: String,
    pub media_ids: Vec<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub id: String,
    pub behavior: MockBehavior,
    /// Delay before each upload and chunk post
    pub delay: Duration,
    pub max_attachments: usize,
    pub max_characters: usize,
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
    pub logged_in: bool,
    pub scaling: ScalingOptions,
    /// Cancel this token right after the given chunk is posted
    pub cancel_after_chunk: Option<(usize, CancellationToken)>,
    /// Cancel this token right after the given file is uploaded
    pub cancel_after_upload: Option<(usize, CancellationToken)>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            id: "mock".to_string(),
            behavior: MockBehavior::Succeed,
            delay: Duration::ZERO,
            max_attachments: 4,
            max_characters: 500,
            problems: Vec::new(),
            warnings: Vec::new(),
            logged_in: true,
            scaling: ScalingOptions::default(),
            cancel_after_chunk: None,
            cancel_after_upload: None,
        }
    }
}

/// Mock platform for testing
#[derive(Debug)]
pub struct MockPlatform {
    config: MockConfig,
    post_calls: Mutex<usize>,
    uploads: Mutex<Vec<String>>,
    posted: Mutex<Vec<PostedChunk>>,
}

impl MockPlatform {
    pub fn new(id: &str) -> Self {
        Self::from_config(MockConfig {
            id: id.to_string(),
            ..MockConfig::default()
        })
    }

    pub fn from_config(config: MockConfig) -> Self {
        Self {
            config,
            post_calls: Mutex::new(0),
            uploads: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
        }
    }

    /// A mock platform whose posting always fails with `error`
    pub fn post_failure(id: &str, error: PlatformError) -> Self {
        Self::new(id).with_behavior(MockBehavior::Fail(error))
    }

    /// A mock platform that panics while posting
    pub fn panicking(id: &str) -> Self {
        Self::new(id).with_behavior(MockBehavior::Panic(format!("{} exploded", id)))
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.config.behavior = behavior;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn with_max_attachments(mut self, max: usize) -> Self {
        self.config.max_attachments = max;
        self
    }

    pub fn with_problems(mut self, problems: &[&str]) -> Self {
        self.config.problems = problems.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_warnings(mut self, warnings: &[&str]) -> Self {
        self.config.warnings = warnings.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingOptions) -> Self {
        self.config.scaling = scaling;
        self
    }

    pub fn logged_out(mut self) -> Self {
        self.config.logged_in = false;
        self
    }

    pub fn cancel_after_chunk(mut self, chunk: usize, token: CancellationToken) -> Self {
        self.config.cancel_after_chunk = Some((chunk, token));
        self
    }

    pub fn cancel_after_upload(mut self, upload: usize, token: CancellationToken) -> Self {
        self.config.cancel_after_upload = Some((upload, token));
        self
    }

    /// Number of post_* calls received
    pub fn post_call_count(&self) -> usize {
        *self.post_calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Names of uploaded files, in order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn posted_chunks(&self) -> Vec<PostedChunk> {
        self.posted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn simulate(
        &self,
        ctx: &PostContext,
        data: &PostData,
        files: Vec<&PostFile>,
    ) -> Result<PostSuccess, PostFailure> {
        *self.post_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        match &self.config.behavior {
            MockBehavior::Fail(error) => return Err(error.clone().into()),
            MockBehavior::Panic(message) => panic!("{}", message),
            _ => {}
        }

        let tags = self.format_tags(&data.tags);
        let body = poster::compose_status(data, &tags, self.config.max_characters);
        poster::post_thread(
            ctx,
            self,
            files,
            &body,
            data.options.alt_text.as_deref(),
            self.config.max_attachments,
        )
        .await
    }

    fn url_for(&self, index: usize) -> String {
        format!("https://{}.example/posts/{}", self.config.id, index)
    }
}

#[async_trait]
impl ThreadPoster for MockPlatform {
    async fn upload_media(
        &self,
        file: &PostFile,
        _alt_text: Option<&str>,
    ) -> Result<String, PostFailure> {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        let index = {
            let mut uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
            uploads.push(file.record.name.clone());
            uploads.len() - 1
        };
        if let Some((upload, token)) = &self.config.cancel_after_upload {
            if *upload == index {
                token.cancel();
            }
        }
        Ok(format!("media-{}", index))
    }

    async fn post_chunk(
        &self,
        body: &str,
        media_ids: &[String],
        reply_to: Option<&str>,
    ) -> Result<PostedStatus, PostFailure> {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let index = {
            let mut posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
            posted.push(PostedChunk {
                body: body.to_string(),
                media_ids: media_ids.to_vec(),
                reply_to: reply_to.map(str::to_string),
            });
            posted.len() - 1
        };

        if let MockBehavior::FailAtChunk(chunk, error) = &self.config.behavior {
            if *chunk == index {
                return Err(error.clone().into());
            }
        }
        if let Some((chunk, token)) = &self.config.cancel_after_chunk {
            if *chunk == index {
                token.cancel();
            }
        }

        Ok(PostedStatus {
            id: format!("status-{}", index),
            url: Some(self.url_for(index)),
        })
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn display_name(&self) -> &str {
        &self.config.id
    }

    fn accepted_extensions(&self) -> &[&'static str] {
        &["png", "jpg", "jpeg", "gif", "txt"]
    }

    async fn check_login_status(&self, _account: &Account) -> Result<LoginResponse, PlatformError> {
        if self.config.logged_in {
            Ok(LoginResponse::logged_in(Some(format!("{}-user", self.config.id))))
        } else {
            Ok(LoginResponse::logged_out())
        }
    }

    fn scaling_options(&self, _file: &FileRecord, _account_id: &str) -> ScalingOptions {
        self.config.scaling
    }

    async fn post_file_submission(
        &self,
        ctx: &PostContext,
        data: &FilePostData,
        _account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        self.simulate(ctx, &data.post, data.files().collect()).await
    }

    async fn post_notification_submission(
        &self,
        ctx: &PostContext,
        data: &PostData,
        _account: &AccountData,
    ) -> Result<PostSuccess, PostFailure> {
        self.simulate(ctx, data, Vec::new()).await
    }

    fn validate_file_submission(
        &self,
        _submission: &Submission,
        _part: &SubmissionPart,
        _default_part: &SubmissionPart,
    ) -> ValidationParts {
        ValidationParts {
            problems: self.config.problems.clone(),
            warnings: self.config.warnings.clone(),
        }
    }

    fn validate_notification_submission(
        &self,
        submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts {
        self.validate_file_submission(submission, part, default_part)
    }
}
