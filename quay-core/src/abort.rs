//! External abort signal for in-flight runs.
//!
//! An abort is not an error: the supervisor's wait loop checks the flag and
//! reports the distinct `Stopped` terminal status instead of flowing through
//! generic failure handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable one-way abort flag shared between the host and the supervisor.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abrupt stop of the in-flight run. Idempotent.
    pub fn request_abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
