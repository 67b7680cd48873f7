use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core_api::{CoreError, Stage};

/// Cooperative cancellation flag shared between the pipeline and whoever may
/// want to stop it (a Ctrl-C handler, a test).
///
/// Clones observe the same flag. Stages poll it at every I/O checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns a `Cancelled` error for `stage` once the flag has been raised.
    pub fn check(&self, stage: Stage) -> Result<(), CoreError> {
        if self.is_cancelled() {
            return Err(CoreError::cancelled(stage));
        }
        Ok(())
    }
}
