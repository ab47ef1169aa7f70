//! Cooperative cancellation for posting runs
//!
//! A token is shared by every account pipeline of one run. Pipelines check
//! it at fixed checkpoints (before each file upload and before each chunk
//! post); it never interrupts a request that is already in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PlatformError;

/// One-way cancellation flag
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(PlatformError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), PlatformError> {
        if self.is_cancelled() {
            Err(PlatformError::Cancelled)
        } else {
            Ok(())
        }
    }
}
