//! Scripted in-memory backend for engine tests.
//!
//! Each path can be given a queue of outcomes; once the script runs out the
//! backend answers success. The mock records the order restore calls start
//! in and the highest number of calls it ever saw in flight at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use undel_core::backend::{BackendError, DeletedEntry, ErrorCategory, RestoreBackend};
use undel_core::control::CancelFlag;

#[derive(Default)]
pub struct MockBackend {
    entries: Vec<DeletedEntry>,
    scripts: Mutex<HashMap<String, VecDeque<Result<(), BackendError>>>>,
    calls: Mutex<Vec<String>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    call_delay: Duration,
    cancel_after: Option<(usize, Arc<CancelFlag>)>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(mut self, entries: Vec<DeletedEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Queue scripted outcomes for one path; consumed front to back.
    pub fn script(self, path: &str, outcomes: Vec<Result<(), BackendError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), outcomes.into());
        self
    }

    /// Script `n` identical failures for a path.
    pub fn script_failures(self, path: &str, category: ErrorCategory, message: &str, n: usize) -> Self {
        self.script(
            path,
            (0..n)
                .map(|_| Err(BackendError::new(category, message)))
                .collect(),
        )
    }

    /// Every restore call sleeps this long before answering.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Trip the cancel flag when the nth restore call starts.
    pub fn cancel_on_call(mut self, n: usize, flag: Arc<CancelFlag>) -> Self {
        self.cancel_after = Some((n, flag));
        self
    }

    /// Restore calls in the order they started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of restore calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestoreBackend for MockBackend {
    async fn list_deleted(&self) -> Result<Vec<DeletedEntry>, BackendError> {
        Ok(self.entries.clone())
    }

    async fn restore(&self, path: &str, _deletion_handle: &str) -> Result<(), BackendError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(path.to_string());
            calls.len()
        };
        if let Some((n, flag)) = &self.cancel_after {
            if call_number >= *n {
                flag.cancel();
            }
        }

        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.concurrent.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or(Ok(()))
    }
}
