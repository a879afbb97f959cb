//! Caller-supplied cancellation and deadlines

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cancellation handle checked between traversal steps.
///
/// Clones share the cancelled flag, so a caller can keep one clone and
/// cancel work running on another task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires on its own
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`Error::Cancelled`] if the token has fired
    pub fn check(&self, during: &str) -> Result<()> {
        if self.is_cancelled() {
            tracing::debug!("Cancelled during {}", during);
            return Err(Error::Cancelled(during.to_string()));
        }
        Ok(())
    }
}
