//! Service layer for Crosspost
//!
//! A testable API over the core that front ends (the CLI today) consume
//! without duplicating logic.
//!
//! `CrosspostService` is the entry point and hands out the sub-services:
//!
//! - `PostingService`: posts one submission to many accounts
//! - `ValidationService`: per-account problems and warnings
//! - `DescriptionTemplateService`: reusable description snippets
//! - `EventBus`: progress and change events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::cancellation::CancellationToken;
//! use libcrosspost::service::CrosspostService;
//! use libcrosspost::types::Submission;
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let service = CrosspostService::new()?;
//! let accounts = service.config().accounts()?;
//!
//! let submission = Arc::new(Submission::notification("Hello", "First post"));
//! let run = service
//!     .posting()
//!     .post(submission, &accounts, CancellationToken::new())
//!     .await;
//! println!("{} account(s) succeeded", run.results.iter().filter(|r| r.success()).count());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod posting;
pub mod templates;
pub mod validation;

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use self::events::{EventBus, EventReceiver};
use self::posting::{PostRun, PostingService};
use self::templates::{DescriptionTemplateService, InMemoryTemplateRepository};
use self::validation::{AccountValidation, ValidationService};
use crate::capabilities::CapabilityStore;
use crate::error::{CrosspostError, PlatformError, Result};
use crate::files::{FileStore, LocalFileStore};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::platforms::PlatformRegistry;
use crate::scaling::{ImageScaler, PassthroughScaler};
use crate::cancellation::CancellationToken;
use crate::types::{Account, LoginResponse, PostResponse, Submission};
use crate::Config;

/// Main service facade
///
/// Sub-services share one registry, capability store and event bus.
pub struct CrosspostService {
    config: Arc<Config>,
    registry: Arc<PlatformRegistry>,
    capabilities: Arc<CapabilityStore>,
    posting: PostingService,
    validation: ValidationService,
    templates: DescriptionTemplateService,
    event_bus: EventBus,
}

/// Login status of one account
#[derive(Debug, Clone)]
pub struct AccountLogin {
    pub account_id: String,
    pub platform: String,
    pub result: std::result::Result<LoginResponse, PlatformError>,
}

impl AccountLogin {
    pub fn logged_in(&self) -> bool {
        matches!(&self.result, Ok(login) if login.logged_in)
    }
}

impl CrosspostService {
    /// Create a service from the default configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the HTTP
    /// client cannot be built.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Create a service with the built-in platforms over a reqwest transport
    pub fn from_config(config: Config) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.http)?);
        let capabilities = Arc::new(CapabilityStore::new());
        let registry = PlatformRegistry::with_defaults(transport, Arc::clone(&capabilities), &config);

        Ok(Self::from_parts(
            config,
            registry,
            capabilities,
            Arc::new(LocalFileStore::new()),
            Arc::new(PassthroughScaler),
        ))
    }

    /// Assemble a service from explicit collaborators
    pub fn from_parts(
        config: Config,
        registry: PlatformRegistry,
        capabilities: Arc<CapabilityStore>,
        files: Arc<dyn FileStore>,
        scaler: Arc<dyn ImageScaler>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let event_bus = EventBus::new(100);

        let posting = PostingService::new(
            Arc::clone(&registry),
            files,
            scaler,
            config.posting.clone(),
            event_bus.clone(),
        );
        let validation = ValidationService::new(Arc::clone(&registry));
        let templates = DescriptionTemplateService::new(
            Arc::new(InMemoryTemplateRepository::new()),
            event_bus.clone(),
        );

        Self {
            config,
            registry,
            capabilities,
            posting,
            validation,
            templates,
            event_bus,
        }
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    pub fn templates(&self) -> &DescriptionTemplateService {
        &self.templates
    }

    pub fn capabilities(&self) -> &Arc<CapabilityStore> {
        &self.capabilities
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to service events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Check one account's login status, refreshing its cached capabilities
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown platform, and the platform's
    /// error when the check itself failed.
    pub async fn check_login(&self, account: &Account) -> Result<LoginResponse> {
        let platform = self.registry.get(&account.platform).ok_or_else(|| {
            CrosspostError::InvalidInput(format!("Unknown platform '{}'", account.platform))
        })?;
        let login = platform.check_login_status(account).await?;
        if login.logged_in {
            info!(
                "{} ({}) logged in as {}",
                account.id,
                account.platform,
                login.username.as_deref().unwrap_or("?")
            );
        } else {
            warn!("{} ({}) is not logged in", account.id, account.platform);
        }
        Ok(login)
    }

    /// Check every account concurrently, in order
    pub async fn login_all(&self, accounts: &[Account]) -> Vec<AccountLogin> {
        join_all(accounts.iter().map(|account| async move {
            let result = match self.registry.get(&account.platform) {
                Some(platform) => platform.check_login_status(account).await,
                None => Err(PlatformError::Authentication(format!(
                    "Unknown platform '{}'",
                    account.platform
                ))),
            };
                match &result {
                Ok(login) if !login.logged_in => {
                    warn!("{} ({}) is not logged in", account.id, account.platform)
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "Login check for {} ({}) failed: {}",
                    account.id, account.platform, e
                ),
            }
            AccountLogin {
                account_id: account.id.clone(),
                platform: account.platform.clone(),
                result,
            }
        }))
        .await
    }

    /// Refresh every account's capabilities, then validate against them
    ///
    /// Accounts that are not logged in are still validated, against the
    /// platform defaults.
    pub async fn login_and_validate(
        &self,
        submission: &Submission,
        accounts: &[Account],
    ) -> Vec<AccountValidation> {
        self.login_all(accounts).await;
        self.validation.validate(submission, accounts)
    }

    /// Check logins, then post to every account that is logged in
    ///
    /// Accounts whose login check fails or reports logged out get a
    /// `Failed` response without being posted to. Accounts on an
    /// unregistered platform go through the posting pipeline, which
    /// rejects them. Results keep request order.
    pub async fn login_and_post(
        &self,
        submission: Arc<Submission>,
        accounts: &[Account],
        token: CancellationToken,
    ) -> PostRun {
        let logins = self.login_all(accounts).await;

        let mut results: Vec<Option<PostResponse>> = Vec::with_capacity(accounts.len());
        let mut ready = Vec::new();
        for (account, login) in accounts.iter().zip(&logins) {
            let registered = self.registry.get(&account.platform).is_some();
            match &login.result {
                _ if !registered || login.logged_in() => {
                    ready.push(account.clone());
                    results.push(None);
                }
                Ok(_) => results.push(Some(PostResponse::failed(
                    &account.id,
                    &account.platform,
                    "Not logged in",
                ))),
                Err(e) => results.push(Some(PostResponse::failed(
                    &account.id,
                    &account.platform,
                    format!("Login check failed: {}", e),
                ))),
            }
        }

        let submission_id = submission.id.clone();
        let posted = if ready.is_empty() {
            Vec::new()
        } else {
            self.posting.post(submission, &ready, token).await.results
        };
        let mut posted = posted.into_iter();

        PostRun {
            submission_id,
            results: results
                .into_iter()
                .filter_map(|slot| slot.or_else(|| posted.next()))
                .collect(),
        }
    }
}
