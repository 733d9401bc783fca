//! Run metrics: cumulative counters and derived progress snapshots.
//!
//! Counters only ever increase; a snapshot is a pure read used by the
//! periodic reporter to compute rate, error rate and ETA.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Shared counters updated by the dispatcher and read by the reporter task.
#[derive(Debug)]
pub struct MetricsTracker {
    restored: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
    current_limit: AtomicUsize,
    pending: AtomicU64,
    in_flight: AtomicU64,
    start: Instant,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            restored: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            current_limit: AtomicUsize::new(0),
            pending: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    pub fn record_restored(&self) {
        self.restored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_current_limit(&self, limit: usize) {
        self.current_limit.store(limit, Ordering::Relaxed);
    }

    /// Update the queue gauges (pending includes tasks waiting out a retry
    /// backoff).
    pub fn set_queue_state(&self, pending: usize, in_flight: usize) {
        self.pending.store(pending as u64, Ordering::Relaxed);
        self.in_flight.store(in_flight as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            restored: self.restored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            current_limit: self.current_limit.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            elapsed: self.start.elapsed(),
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the run, derived entirely from the counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub restored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub attempts: u64,
    pub current_limit: usize,
    pub pending: u64,
    pub in_flight: u64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Tasks that reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.restored + self.skipped + self.failed
    }

    /// Terminal completions per second (0 if no time has passed).
    pub fn completion_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.completed() as f64 / secs
    }

    /// Fatal failures over dispatched attempts.
    pub fn error_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.failed as f64 / self.attempts as f64
    }

    /// Estimated seconds until the queue drains (`None` while the rate is
    /// zero or nothing remains to estimate from).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.pending + self.in_flight;
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.completion_rate();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }
}

/// Format seconds as `HH:MM:SS` for progress and summary lines.
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
