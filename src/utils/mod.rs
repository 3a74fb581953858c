pub mod configuration;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AssemblyError;

/// Cooperative cancellation handle shared between the caller and the
/// assembly phases. Checked between phases and between tip scans; a
/// cancelled run leaves the store consistent but partially processed, and
/// the caller must discard it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn checkpoint(&self) -> Result<(), AssemblyError> {
        if self.is_cancelled() {
            Err(AssemblyError::Cancelled)
        } else {
            Ok(())
        }
    }
}
