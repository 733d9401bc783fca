//! Cooperative run cancellation.
//!
//! The CLI sets the flag from its Ctrl-C handler; the dispatcher checks it
//! before every admission. In-flight calls are left to finish or time out,
//! so counters stay consistent and the run ends with a partial summary.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancel flag for one engine run.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; admissions stop, in-flight calls drain.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
