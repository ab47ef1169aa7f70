//! Crosspost - one submission, many social platforms
//!
//! This library provides the platform adapter contract, the posting
//! orchestrator and the validation engine behind the `crosspost` CLI.

pub mod cancellation;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod scaling;
pub mod service;
pub mod text;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use cancellation::CancellationToken;
pub use capabilities::CapabilityStore;
pub use config::Config;
pub use error::{CrosspostError, PlatformError, PostFailure, Result};
pub use platforms::{Platform, PlatformRegistry, PostContext};
pub use service::CrosspostService;
pub use types::{Account, PostResponse, PostStatus, Submission, ValidationParts};
