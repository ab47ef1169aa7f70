//! Platform abstraction and implementations
//!
//! Every platform implements [`Platform`]: login checks, capability
//! discovery, validation, scaling policy, tag formatting and the
//! upload/post protocol. The orchestrator only ever talks to this trait,
//! resolving implementations through a [`PlatformRegistry`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::capabilities::CapabilityStore;
//! use libcrosspost::config::Config;
//! use libcrosspost::http::ReqwestTransport;
//! use libcrosspost::platforms::PlatformRegistry;
//!
//! # async fn example() -> libcrosspost::error::Result<()> {
//! let config = Config::load()?;
//! let transport = Arc::new(ReqwestTransport::new(&config.http)?);
//! let registry = PlatformRegistry::with_defaults(
//!     transport,
//!     Arc::new(CapabilityStore::new()),
//!     &config,
//! );
//!
//! for account in config.accounts()? {
//!     if let Some(platform) = registry.get(&account.platform) {
//!         let status = platform.check_login_status(&account).await?;
//!         println!("{}: logged in = {}", account.id, status.logged_in);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::capabilities::CapabilityStore;
use crate::config::Config;
use crate::error::{PlatformError, PostFailure};
use crate::http::HttpTransport;
use crate::service::events::{Event, EventBus};
use crate::text;
use crate::types::{
    Account, AccountData, FilePostData, FileRecord, LoginResponse, PostData, PostState,
    PostSuccess, ScalingOptions, Submission, SubmissionPart, ValidationParts,
};

pub mod mastodon;
pub mod twitter;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Per-run context handed to posting operations
///
/// Carries the run's cancellation token and reports progress for one
/// (submission, account) pair.
#[derive(Debug, Clone)]
pub struct PostContext {
    pub submission_id: String,
    pub account_id: String,
    pub token: CancellationToken,
    events: Option<EventBus>,
}

impl PostContext {
    pub fn new(submission_id: &str, account_id: &str, token: CancellationToken) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            account_id: account_id.to_string(),
            token,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Cancellation checkpoint
    pub fn check_cancelled(&self) -> Result<(), PlatformError> {
        self.token.check()
    }

    /// Report a state change for this pipeline
    pub fn report(&self, state: PostState) {
        debug!(
            "Submission {} / account {}: {:?}",
            self.submission_id, self.account_id, state
        );
        if let Some(events) = &self.events {
            events.emit(Event::PostingProgress {
                submission_id: self.submission_id.clone(),
                account_id: self.account_id.clone(),
                state,
            });
        }
    }
}

/// Platform trait for uniform posting across social platforms
///
/// Implementations share no mutable state with each other. HTTP
/// transport, the capability store and configuration are injected at
/// construction.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier accounts refer to (e.g., "mastodon")
    fn id(&self) -> &str;

    /// Human-readable name used in messages
    fn display_name(&self) -> &str;

    /// File extensions (and MIME subtypes) the platform accepts
    fn accepted_extensions(&self) -> &[&'static str];

    /// Whether files beyond the primary one may be posted
    fn accepts_additional_files(&self) -> bool {
        true
    }

    /// Whether posts may carry an advertisement footer
    fn enable_advertisement(&self) -> bool {
        false
    }

    /// Check whether the account's credentials are usable
    ///
    /// May refresh the capability store for the account. Missing
    /// credentials or an authentication rejection return
    /// `logged_in = false` rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Network` (or another non-authentication
    /// variant) when the platform could not be reached or answered
    /// unexpectedly.
    async fn check_login_status(&self, account: &Account) -> Result<LoginResponse, PlatformError>;

    /// Limits the image scaler should apply to `file` for this account
    ///
    /// A pure function of cached capability data; falls back to
    /// platform defaults when nothing is cached.
    fn scaling_options(&self, file: &FileRecord, account_id: &str) -> ScalingOptions;

    /// Post a file submission
    ///
    /// # Errors
    ///
    /// Returns a [`PostFailure`] whose `error` is `PlatformError::Cancelled`
    /// when a cancellation checkpoint fired, and carries `chunk_number` and
    /// `source` when part of a thread was already created.
    async fn post_file_submission(
        &self,
        ctx: &PostContext,
        data: &FilePostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure>;

    /// Post a text-only notification
    async fn post_notification_submission(
        &self,
        ctx: &PostContext,
        data: &PostData,
        account: &AccountData,
    ) -> Result<PostSuccess, PostFailure>;

    fn validate_file_submission(
        &self,
        submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts;

    fn validate_notification_submission(
        &self,
        submission: &Submission,
        part: &SubmissionPart,
        default_part: &SubmissionPart,
    ) -> ValidationParts;

    /// Sanitize raw tags into the platform's hashtag syntax
    fn format_tags(&self, tags: &[String]) -> Vec<String> {
        text::format_hashtags(tags)
    }

    /// Append formatted tags to `body` without exceeding `max_chars`
    fn append_tags(&self, tags: &[String], body: &str, max_chars: usize) -> String {
        text::append_tags(tags, body, max_chars)
    }

    /// Rewrite platform-specific shortcuts before the description is parsed
    fn preparse_description(&self, text: &str) -> String {
        text.to_string()
    }

    /// Render a description into what the platform will display
    fn parse_description(&self, description: &str) -> String {
        text::plaintext(description, None)
    }
}

/// Platforms keyed by id
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in platform, sharing one transport and store
    pub fn with_defaults(
        transport: Arc<dyn HttpTransport>,
        capabilities: Arc<CapabilityStore>,
        config: &Config,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(mastodon::MastodonPlatform::new(
            Arc::clone(&transport),
            Arc::clone(&capabilities),
            config.posting.clone(),
        )));
        registry.register(Arc::new(twitter::TwitterPlatform::new(
            transport,
            config.twitter.clone(),
        )));
        registry
    }

    /// Add a platform, replacing any previous one with the same id
    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        self.platforms.insert(platform.id().to_string(), platform);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Platform>> {
        self.platforms.get(id).cloned()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.platforms.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.ids())
            .finish()
    }
}
