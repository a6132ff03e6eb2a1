use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use roast_vault_core::{LifecycleError, Phase};

/// Shared flag checked by export and import at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// # Errors
    /// Returns `Cancelled` for `phase` once [`Self::cancel`] has been called.
    pub fn check(&self, phase: Phase) -> Result<(), LifecycleError> {
        if self.is_cancelled() {
            return Err(LifecycleError::Cancelled { phase });
        }
        Ok(())
    }
}
