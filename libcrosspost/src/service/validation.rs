//! Submission validation service
//!
//! Runs each target account's platform validator over a submission and
//! reports blocking problems and advisory warnings per account.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::platforms::{Platform, PlatformRegistry};
use crate::types::{Account, Submission, SubmissionKind, ValidationParts};

/// Service for validating a submission against its target accounts
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use libcrosspost::platforms::PlatformRegistry;
/// use libcrosspost::service::validation::ValidationService;
/// use libcrosspost::types::{Account, Submission};
///
/// # fn example(registry: PlatformRegistry, accounts: Vec<Account>) {
/// let service = ValidationService::new(Arc::new(registry));
/// let submission = Submission::notification("Title", "Hello!");
///
/// for result in service.validate(&submission, &accounts) {
///     if !result.is_valid() {
///         println!("{}: {:?}", result.account_id, result.problems);
///     }
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct ValidationService {
    registry: Arc<PlatformRegistry>,
}

/// Validation result for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValidation {
    pub account_id: String,
    pub platform: String,
    /// Blocking: the account will not be posted to
    pub problems: Vec<String>,
    /// Advisory only
    pub warnings: Vec<String>,
}

impl AccountValidation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Run the validator matching the submission kind
pub fn validate_for(
    platform: &dyn Platform,
    submission: &Submission,
    account_id: &str,
) -> ValidationParts {
    let part = submission.part_for(account_id);
    let default_part = submission.default_part();
    match submission.kind {
        SubmissionKind::File => {
            let mut parts = platform.validate_file_submission(submission, &part, &default_part);
            if submission.primary.is_none() {
                parts
                    .problems
                    .push("File submission has no primary file".to_string());
            }
            parts
        }
        SubmissionKind::Notification => {
            platform.validate_notification_submission(submission, &part, &default_part)
        }
    }
}

impl ValidationService {
    pub fn new(registry: Arc<PlatformRegistry>) -> Self {
        Self { registry }
    }

    /// Validate `submission` for every account, in order
    ///
    /// An account whose platform is not registered gets a problem.
    pub fn validate(&self, submission: &Submission, accounts: &[Account]) -> Vec<AccountValidation> {
        accounts
            .iter()
            .map(|account| self.validate_account(submission, account))
            .collect()
    }

    pub fn validate_account(&self, submission: &Submission, account: &Account) -> AccountValidation {
        let parts = match self.registry.get(&account.platform) {
            Some(platform) => validate_for(platform.as_ref(), submission, &account.id),
            None => ValidationParts {
                problems: vec![format!("Unknown platform '{}'", account.platform)],
                warnings: Vec::new(),
            },
        };

        debug!(
            "Validated submission {} for {}: {} problem(s), {} warning(s)",
            submission.id,
            account.id,
            parts.problems.len(),
            parts.warnings.len()
        );

        AccountValidation {
            account_id: account.id.clone(),
            platform: account.platform.clone(),
            problems: parts.problems,
            warnings: parts.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use crate::types::{AccountData, FileRecord};
    use std::path::PathBuf;

    fn account(id: &str, platform: &str) -> Account {
        Account {
            id: id.to_string(),
            platform: platform.to_string(),
            alias: None,
            data: AccountData::default(),
        }
    }

    fn service() -> ValidationService {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPlatform::new("ok")));
        registry.register(Arc::new(
            MockPlatform::new("strict")
                .with_problems(&["too big"])
                .with_warnings(&["heads up"]),
        ));
        ValidationService::new(Arc::new(registry))
    }

    #[test]
    fn test_results_follow_account_order() {
        let submission = Submission::notification("t", "d");
        let results = service().validate(
            &submission,
            &[account("b", "strict"), account("a", "ok")],
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].account_id, "b");
        assert!(!results[0].is_valid());
        assert_eq!(results[0].warnings, vec!["heads up"]);
        assert!(results[1].is_valid());
    }

    #[test]
    fn test_unknown_platform_is_problem() {
        let submission = Submission::notification("t", "d");
        let result = service().validate_account(&submission, &account("x", "myspace"));
        assert_eq!(result.problems, vec!["Unknown platform 'myspace'"]);
    }

    #[test]
    fn test_file_submission_without_primary() {
        let mut submission = Submission::file(
            "t",
            "d",
            FileRecord::new("a.png", "image/png", 1, PathBuf::from("/tmp/a.png")),
        );
        submission.primary = None;
        let result = service().validate_account(&submission, &account("a", "ok"));
        assert_eq!(result.problems, vec!["File submission has no primary file"]);
    }
}
