//! Posting service: drives one submission to many accounts
//!
//! Each account runs its own pipeline:
//! `Pending -> Validating -> Uploading -> Posting(chunk) -> Succeeded | Failed | Cancelled`.
//! Pipelines are independent: nothing one account does, including
//! panicking, changes another account's result.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::events::{Event, EventBus};
use super::validation::validate_for;
use crate::cancellation::CancellationToken;
use crate::config::PostingConfig;
use crate::error::{PlatformError, PostFailure};
use crate::files::FileStore;
use crate::platforms::{Platform, PlatformRegistry, PostContext};
use crate::scaling::{self, ImageScaler};
use crate::types::{
    Account, FilePostData, PostData, PostFile, PostOptions, PostResponse, PostState, PostStatus,
    PostSuccess, Submission, SubmissionKind, SubmissionPart,
};

/// Posting service
///
/// Cheap to clone; clones share the registry, stores and event bus.
#[derive(Clone)]
pub struct PostingService {
    registry: Arc<PlatformRegistry>,
    files: Arc<dyn FileStore>,
    scaler: Arc<dyn ImageScaler>,
    config: PostingConfig,
    event_bus: EventBus,
}

/// Outcome of one posting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRun {
    pub submission_id: String,
    /// One response per requested account, in request order
    pub results: Vec<PostResponse>,
}

impl PostRun {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(PostResponse::success)
    }

    pub fn any_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == PostStatus::Cancelled)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl PostingService {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        files: Arc<dyn FileStore>,
        scaler: Arc<dyn ImageScaler>,
        config: PostingConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            files,
            scaler,
            config,
            event_bus,
        }
    }

    /// Post `submission` to every account
    ///
    /// At most `max_concurrent_accounts` pipelines run at once. The same
    /// `token` is shared by all of them; cancelling it stops each pipeline
    /// at its next checkpoint.
    pub async fn post(
        &self,
        submission: Arc<Submission>,
        accounts: &[Account],
        token: CancellationToken,
    ) -> PostRun {
        info!(
            "Posting submission {} to {} account(s)",
            submission.id,
            accounts.len()
        );
        self.event_bus.emit(Event::PostingStarted {
            submission_id: submission.id.clone(),
            accounts: accounts.iter().map(|a| a.id.clone()).collect(),
        });

        let limit = self.config.max_concurrent_accounts.max(1);
        let results: Vec<PostResponse> = stream::iter(accounts)
            .map(|account| {
                let submission = Arc::clone(&submission);
                let token = token.clone();
                async move {
                    let pipeline = self.post_account(&submission, account, &token);
                    match AssertUnwindSafe(pipeline).catch_unwind().await {
                        Ok(response) => response,
                        Err(panic) => self.degrade_panic(&submission, account, panic.as_ref()),
                    }
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success()).count();
        info!(
            "Submission {} finished: {}/{} succeeded",
            submission.id,
            succeeded,
            results.len()
        );
        self.event_bus.emit(Event::PostingCompleted {
            submission_id: submission.id.clone(),
            results: results.clone(),
        });

        PostRun {
            submission_id: submission.id.clone(),
            results,
        }
    }

    fn degrade_panic(
        &self,
        submission: &Submission,
        account: &Account,
        panic: &(dyn Any + Send),
    ) -> PostResponse {
        let message = format!("Posting panicked: {}", panic_message(panic));
        error!("Account {}: {}", account.id, message);
        self.context(submission, account, &CancellationToken::new())
            .report(PostState::Failed);
        self.event_bus.emit(Event::PostFailed {
            submission_id: submission.id.clone(),
            account_id: account.id.clone(),
            message: message.clone(),
            chunk_number: None,
        });
        PostResponse::failed(&account.id, &account.platform, message)
    }

    fn context(
        &self,
        submission: &Submission,
        account: &Account,
        token: &CancellationToken,
    ) -> PostContext {
        PostContext::new(&submission.id, &account.id, token.clone())
            .with_events(self.event_bus.clone())
    }

    /// One account's pipeline; never fails, always yields a response
    async fn post_account(
        &self,
        submission: &Submission,
        account: &Account,
        token: &CancellationToken,
    ) -> PostResponse {
        let ctx = self.context(submission, account, token);
        ctx.report(PostState::Pending);

        let Some(platform) = self.registry.get(&account.platform) else {
            let message = format!("Unknown platform '{}'", account.platform);
            return self.reject(&ctx, account, message, Vec::new());
        };

        ctx.report(PostState::Validating);
        let validation = validate_for(platform.as_ref(), submission, &account.id);
        for warning in &validation.warnings {
            warn!("{} ({}): {}", account.id, account.platform, warning);
        }
        if validation.is_blocking() {
            let message = validation.problems.join("; ");
            return self.reject(&ctx, account, message, validation.warnings);
        }
        let warnings = validation.warnings;

        if token.is_cancelled() {
            return self.finish(&ctx, account, Err(PlatformError::Cancelled.into()), warnings);
        }

        let part = submission.part_for(&account.id);
        let options = PostOptions::merge(&part, &submission.default_part());
        let description =
            platform.parse_description(&platform.preparse_description(&options.description));
        let post = PostData {
            submission_id: submission.id.clone(),
            account_id: account.id.clone(),
            title: submission.title.clone(),
            description,
            tags: options.tags.clone(),
            rating: options.rating,
            options,
        };

        let result = match submission.kind {
            SubmissionKind::Notification => {
                platform
                    .post_notification_submission(&ctx, &post, &account.data)
                    .await
            }
            SubmissionKind::File => {
                match self
                    .prepare_files(platform.as_ref(), &ctx, submission, &part, &post)
                    .await
                {
                    Ok(data) => {
                        platform
                            .post_file_submission(&ctx, &data, &account.data)
                            .await
                    }
                    Err(failure) => Err(failure),
                }
            }
        };

        self.finish(&ctx, account, result, warnings)
    }

    /// Load, and where allowed scale, every file the account receives
    async fn prepare_files(
        &self,
        platform: &dyn Platform,
        ctx: &PostContext,
        submission: &Submission,
        part: &SubmissionPart,
        post: &PostData,
    ) -> Result<FilePostData, PostFailure> {
        let mut records = submission.files_for(part);
        if !platform.accepts_additional_files() {
            records.truncate(1);
        }

        let mut files: Vec<PostFile> = Vec::with_capacity(records.len());
        for record in records {
            ctx.check_cancelled()?;
            let file = self
                .files
                .load(record)
                .await
                .map_err(|e| PlatformError::Upload(e.to_string()))?;

            let scalable = scaling::is_scalable(record.file_type, &record.mime_type);
            let file = if post.options.autoscale && scalable {
                let options = platform.scaling_options(record, &post.account_id);
                self.scaler.scale(file, &options).await?
            } else {
                file
            };
            files.push(file);
        }

        if files.is_empty() {
            return Err(PlatformError::Validation(
                "File submission has no primary file".to_string(),
            )
            .into());
        }
        let primary = files.remove(0);
        Ok(FilePostData {
            post: post.clone(),
            primary,
            additional: files,
        })
    }

    /// Fail an account before anything was sent to its platform
    fn reject(
        &self,
        ctx: &PostContext,
        account: &Account,
        message: String,
        warnings: Vec<String>,
    ) -> PostResponse {
        warn!("Not posting to {}: {}", account.id, message);
        ctx.report(PostState::Failed);
        self.event_bus.emit(Event::PostFailed {
            submission_id: ctx.submission_id.clone(),
            account_id: account.id.clone(),
            message: message.clone(),
            chunk_number: None,
        });
        let mut response = PostResponse::failed(&account.id, &account.platform, message);
        response.warnings = warnings;
        response
    }

    fn finish(
        &self,
        ctx: &PostContext,
        account: &Account,
        result: Result<PostSuccess, PostFailure>,
        warnings: Vec<String>,
    ) -> PostResponse {
        let mut response = match result {
            Ok(success) => {
                info!(
                    "Posted to {} ({}): {}",
                    account.id,
                    account.platform,
                    success.source.as_deref().unwrap_or("(no url)")
                );
                ctx.report(PostState::Succeeded);
                self.event_bus.emit(Event::PostSucceeded {
                    submission_id: ctx.submission_id.clone(),
                    account_id: account.id.clone(),
                    source: success.source.clone(),
                });
                let mut response =
                    PostResponse::new(&account.id, &account.platform, PostStatus::Succeeded);
                response.source = success.source;
                response.additional_info = success.additional_info;
                response
            }
            Err(failure) if failure.is_cancelled() => {
                info!("Posting to {} cancelled", account.id);
                ctx.report(PostState::Cancelled);
                self.event_bus.emit(Event::PostCancelled {
                    submission_id: ctx.submission_id.clone(),
                    account_id: account.id.clone(),
                });
                let mut response =
                    PostResponse::new(&account.id, &account.platform, PostStatus::Cancelled);
                response.message = Some(failure.error.to_string());
                response.source = failure.source_url;
                response.chunk_number = failure.chunk_number;
                response
            }
            Err(failure) => {
                warn!(
                    "Posting to {} ({}) failed: {}",
                    account.id, account.platform, failure
                );
                ctx.report(PostState::Failed);
                self.event_bus.emit(Event::PostFailed {
                    submission_id: ctx.submission_id.clone(),
                    account_id: account.id.clone(),
                    message: failure.to_string(),
                    chunk_number: failure.chunk_number,
                });
                let mut response =
                    PostResponse::failed(&account.id, &account.platform, failure.to_string());
                response.source = failure.source_url;
                response.chunk_number = failure.chunk_number;
                response.additional_info = failure.additional_info;
                response
            }
        };
        response.warnings = warnings;
        response
    }
}
