//! Adaptive concurrency controller.
//!
//! AIMD over the admission limit: throttling responses are direct
//! backpressure from the backend, so the limit halves on a throttled window
//! and creeps back up additively while windows stay clean. The controller is
//! owned by the dispatcher loop alone; nothing else mutates it.

/// AIMD parameters. All of these are policy knobs surfaced through the
/// config file rather than hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct AimdOptions {
    /// Lower bound on the admission limit.
    pub min_concurrency: usize,
    /// Upper bound on the admission limit.
    pub max_concurrency: usize,
    /// Starting limit, clamped into `[min, max]`.
    pub initial_concurrency: usize,
    /// Completed attempts per adjustment window.
    pub adjust_window: u32,
    /// Increase the limit when the window error rate is below this and no
    /// throttle was seen.
    pub low_error_rate: f64,
    /// Decrease the limit when the window error rate exceeds this.
    pub high_error_rate: f64,
    /// Additive step as a fraction of the current limit (minimum step 1).
    pub increase_fraction: f64,
    /// Multiplicative factor applied on decrease.
    pub decrease_factor: f64,
}

impl Default for AimdOptions {
    fn default() -> Self {
        Self {
            min_concurrency: 10,
            max_concurrency: 600,
            initial_concurrency: 100,
            adjust_window: 50,
            low_error_rate: 0.02,
            high_error_rate: 0.20,
            increase_fraction: 0.10,
            decrease_factor: 0.5,
        }
    }
}

/// Outcome of one adjustment evaluation, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitChange {
    Raised(usize),
    Lowered(usize),
}

/// Window counters plus the current admission limit.
#[derive(Debug)]
pub struct ConcurrencyController {
    opts: AimdOptions,
    limit: usize,
    window_successes: u32,
    window_errors: u32,
    window_throttles: u32,
}

impl ConcurrencyController {
    pub fn new(mut opts: AimdOptions) -> Self {
        opts.min_concurrency = opts.min_concurrency.max(1);
        opts.max_concurrency = opts.max_concurrency.max(opts.min_concurrency);
        let limit = opts
            .initial_concurrency
            .max(opts.min_concurrency)
            .min(opts.max_concurrency);
        Self {
            opts,
            limit,
            window_successes: 0,
            window_errors: 0,
            window_throttles: 0,
        }
    }

    /// Current admission limit. The dispatcher admits new tasks only while
    /// its in-flight count is below this; lowering it never revokes permits
    /// already granted.
    pub fn current_limit(&self) -> usize {
        self.limit
    }

    pub fn record_success(&mut self) {
        self.window_successes += 1;
    }

    pub fn record_error(&mut self) {
        self.window_errors += 1;
    }

    pub fn record_throttle(&mut self) {
        self.window_throttles += 1;
    }

    /// Re-evaluate the limit once a full window of attempts has completed.
    /// Returns the change, if any, so the caller can log it. Window counters
    /// reset on every evaluation.
    pub fn maybe_adjust(&mut self) -> Option<LimitChange> {
        let completed = self.window_successes + self.window_errors + self.window_throttles;
        if completed < self.opts.adjust_window {
            return None;
        }

        let error_rate = f64::from(self.window_errors) / f64::from(completed);
        let before = self.limit;

        if self.window_throttles > 0 || error_rate > self.opts.high_error_rate {
            self.limit = (self.limit as f64 * self.opts.decrease_factor) as usize;
        } else if error_rate < self.opts.low_error_rate {
            let step = ((self.limit as f64 * self.opts.increase_fraction) as usize).max(1);
            self.limit = self.limit.saturating_add(step);
        }
        self.limit = self
            .limit
            .max(self.opts.min_concurrency)
            .min(self.opts.max_concurrency);

        self.window_successes = 0;
        self.window_errors = 0;
        self.window_throttles = 0;

        match self.limit.cmp(&before) {
            std::cmp::Ordering::Greater => Some(LimitChange::Raised(self.limit)),
            std::cmp::Ordering::Less => Some(LimitChange::Lowered(self.limit)),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> AimdOptions {
        AimdOptions::default()
    }

    #[test]
    fn initial_limit_is_clamped() {
        let mut o = opts();
        o.initial_concurrency = 5000;
        assert_eq!(ConcurrencyController::new(o).current_limit(), 600);
        o.initial_concurrency = 1;
        assert_eq!(ConcurrencyController::new(o).current_limit(), 10);
    }

    #[test]
    fn clean_window_raises_additively() {
        let mut c = ConcurrencyController::new(opts());
        for _ in 0..50 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), Some(LimitChange::Raised(110)));
    }

    #[test]
    fn throttled_window_roughly_halves() {
        let mut c = ConcurrencyController::new(opts());
        // 30% throttled, rest successful.
        for _ in 0..15 {
            c.record_throttle();
        }
        for _ in 0..35 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), Some(LimitChange::Lowered(50)));

        // Throttling stops: additive recovery.
        for _ in 0..50 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), Some(LimitChange::Raised(55)));
    }

    #[test]
    fn single_throttle_is_enough_to_back_off() {
        let mut c = ConcurrencyController::new(opts());
        c.record_throttle();
        for _ in 0..49 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), Some(LimitChange::Lowered(50)));
    }

    #[test]
    fn high_error_rate_backs_off_without_throttles() {
        let mut c = ConcurrencyController::new(opts());
        for _ in 0..15 {
            c.record_error();
        }
        for _ in 0..35 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), Some(LimitChange::Lowered(50)));
    }

    #[test]
    fn moderate_error_rate_holds_steady() {
        let mut c = ConcurrencyController::new(opts());
        // 10% errors: above the raise threshold, below the lower threshold.
        for _ in 0..5 {
            c.record_error();
        }
        for _ in 0..45 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), None);
        assert_eq!(c.current_limit(), 100);
    }

    #[test]
    fn no_adjustment_before_window_fills() {
        let mut c = ConcurrencyController::new(opts());
        for _ in 0..49 {
            c.record_success();
        }
        assert_eq!(c.maybe_adjust(), None);
        c.record_success();
        assert!(c.maybe_adjust().is_some());
    }

    #[test]
    fn limit_stays_in_bounds_for_any_signal_sequence() {
        let o = opts();
        let mut c = ConcurrencyController::new(o);
        // Sustained throttling can never push below min...
        for _ in 0..20 {
            for _ in 0..50 {
                c.record_throttle();
            }
            c.maybe_adjust();
            assert!(c.current_limit() >= o.min_concurrency);
        }
        assert_eq!(c.current_limit(), o.min_concurrency);
        // ...and sustained health never above max.
        for _ in 0..200 {
            for _ in 0..50 {
                c.record_success();
            }
            c.maybe_adjust();
            assert!(c.current_limit() <= o.max_concurrency);
        }
        assert_eq!(c.current_limit(), o.max_concurrency);
    }

    #[test]
    fn window_counters_reset_after_evaluation() {
        let mut c = ConcurrencyController::new(opts());
        for _ in 0..15 {
            c.record_throttle();
        }
        for _ in 0..35 {
            c.record_success();
        }
        c.maybe_adjust();
        // A single extra success must not trigger another evaluation.
        c.record_success();
        assert_eq!(c.maybe_adjust(), None);
    }
}
