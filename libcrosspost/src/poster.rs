//! Shared posting protocol for platforms that thread media
//!
//! Platforms that cap attachments per post get a thread instead: media
//! are uploaded one by one, split into chunks of the cap, and each chunk
//! is posted as a reply to the previous one. This module owns that loop
//! and its checkpoints; the platform only supplies the raw upload and post
//! calls through [`ThreadPoster`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{PostingConfig, UnconfirmedMediaPolicy};
use crate::error::{PlatformError, PostFailure};
use crate::platforms::PostContext;
use crate::text;
use crate::types::{PostData, PostFile, PostState, PostSuccess};

/// A status the platform created
#[derive(Debug, Clone, PartialEq)]
pub struct PostedStatus {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait ThreadPoster: Send + Sync {
    /// Upload one file and return the platform's media id
    async fn upload_media(
        &self,
        file: &PostFile,
        alt_text: Option<&str>,
    ) -> Result<String, PostFailure>;

    /// Create one status with `media_ids`, replying to `reply_to` if set
    async fn post_chunk(
        &self,
        body: &str,
        media_ids: &[String],
        reply_to: Option<&str>,
    ) -> Result<PostedStatus, PostFailure>;
}

/// Upload every file, then post the media as a reply chain
///
/// Checkpoints: before each upload and before each chunk. A failing chunk
/// stops the thread; chunks already posted stay up and the first one's
/// URL is kept as `source` on every outcome. Without media a single
/// status is posted.
pub async fn post_thread<'a, P, I>(
    ctx: &PostContext,
    poster: &P,
    files: I,
    body: &str,
    alt_text: Option<&str>,
    max_attachments: usize,
) -> Result<PostSuccess, PostFailure>
where
    P: ThreadPoster + ?Sized,
    I: IntoIterator<Item = &'a PostFile>,
{
    let mut media_ids = Vec::new();
    for (index, file) in files.into_iter().enumerate() {
        ctx.check_cancelled()?;
        ctx.report(PostState::Uploading { file: index });
        let media_id = poster.upload_media(file, alt_text).await?;
        debug!("Uploaded {} as media {}", file.record.name, media_id);
        media_ids.push(media_id);
    }

    let chunks = chunk_media(&media_ids, max_attachments);
    let mut source: Option<String> = None;
    let mut last_id: Option<String> = None;

    for (index, chunk) in chunks.iter().enumerate() {
        ctx.check_cancelled()
            .map_err(|e| PostFailure::from(e).with_source(source.clone()))?;
        ctx.report(PostState::Posting { chunk: index });

        match poster.post_chunk(body, chunk, last_id.as_deref()).await {
            Ok(status) => {
                if source.is_none() {
                    source = status.url.clone();
                }
                last_id = Some(status.id);
            }
            Err(failure) => {
                warn!(
                    "Chunk {} of {} rejected for account {}: {}",
                    index + 1,
                    chunks.len(),
                    ctx.account_id,
                    failure
                );
                return Err(failure.at_chunk(index).with_source(source));
            }
        }
    }

    info!(
        "Posted {} status(es) with {} media for account {}",
        chunks.len(),
        media_ids.len(),
        ctx.account_id
    );
    Ok(PostSuccess {
        source,
        additional_info: None,
    })
}

/// Split media ids into ordered chunks of at most `per_post`
///
/// No media still yields one (empty) chunk so a text status is posted.
pub fn chunk_media(media_ids: &[String], per_post: usize) -> Vec<&[String]> {
    if media_ids.is_empty() {
        return vec![&[]];
    }
    media_ids.chunks(per_post.max(1)).collect()
}

/// Status text: optional title line, description, then tags within budget
///
/// Title and description are cut to `max_chars` before tags are added, so
/// the result never exceeds `max_chars`.
pub fn compose_status(data: &PostData, formatted_tags: &[String], max_chars: usize) -> String {
    let head = if data.options.use_title && !data.title.is_empty() {
        format!("{}\n{}", data.title, data.description)
    } else {
        data.description.clone()
    };
    let head = text::truncate_chars(&head, max_chars);
    text::append_tags(formatted_tags, &head, max_chars)
}

/// Outcome of waiting for a platform to finish processing media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed,
    /// Attempts ran out and the policy said to carry on
    Unconfirmed,
}

/// Fixed-interval polling with an attempt budget
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
    pub on_exhausted: UnconfirmedMediaPolicy,
}

impl From<&PostingConfig> for PollPolicy {
    fn from(config: &PostingConfig) -> Self {
        Self {
            interval: config.media_poll_interval,
            attempts: config.media_poll_attempts,
            on_exhausted: config.unconfirmed_media,
        }
    }
}

impl PollPolicy {
    /// Wait `interval`, then run `check`, until it reports done
    ///
    /// `check` returning an error stops polling with that error.
    ///
    /// # Errors
    ///
    /// `PlatformError::Upload` when attempts run out under
    /// [`UnconfirmedMediaPolicy::Fail`].
    pub async fn poll<F, Fut>(&self, what: &str, mut check: F) -> Result<PollOutcome, PlatformError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, PlatformError>>,
    {
        for attempt in 1..=self.attempts {
            sleep(self.interval).await;
            if check(attempt).await? {
                debug!("{} confirmed after {} poll(s)", what, attempt);
                return Ok(PollOutcome::Confirmed);
            }
        }

        match self.on_exhausted {
            UnconfirmedMediaPolicy::Proceed => {
                warn!(
                    "{} still processing after {} poll(s); continuing",
                    what, self.attempts
                );
                Ok(PollOutcome::Unconfirmed)
            }
            UnconfirmedMediaPolicy::Fail => Err(PlatformError::Upload(format!(
                "{} was not processed after {} attempts",
                what, self.attempts
            ))),
        }
    }
}
