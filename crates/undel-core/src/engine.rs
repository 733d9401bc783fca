//! Restore dispatcher: admission loop and bounded worker pool.
//!
//! One coordinating loop owns the queue, the concurrency controller and all
//! task bookkeeping. Restore calls run as tokio tasks in a `JoinSet`,
//! admitted only while the in-flight count is below the controller's limit;
//! outcomes are routed through the classifier, which feeds the controller
//! and the metrics tracker. This is the only place the backend's restore
//! call is issued and the only place per-call elapsed time is measured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::backend::{BackendError, RestoreBackend};
use crate::control::CancelFlag;
use crate::controller::{AimdOptions, ConcurrencyController, LimitChange};
use crate::metrics::MetricsTracker;
use crate::queue::DepthQueue;
use crate::retry::{classify_outcome, Disposition, RetryPolicy};
use crate::task::{RestoreTask, TaskState};

/// Upper bound on one idle wait so cancellation stays responsive while the
/// dispatcher sleeps out a retry backoff with nothing in flight.
const IDLE_WAIT_CAP: Duration = Duration::from_millis(250);

/// Engine tuning, assembled from `UndelConfig` by the CLI.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub aimd: AimdOptions,
    pub retry: RetryPolicy,
    /// Timeout per restore call; a timed-out call classifies as transient.
    pub call_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            aimd: AimdOptions::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// One permanently failed task, with its last error for the summary.
#[derive(Debug, Clone)]
pub struct FailedTask {
    pub path: String,
    pub error: String,
}

/// Result of a completed (or cancelled) run. The run itself never fails;
/// per-task errors are contained and counted here.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total_tasks: u64,
    pub restored: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Dispatched attempts, including retries.
    pub attempts: u64,
    /// Tasks still pending when the run was cancelled.
    pub not_processed: u64,
    pub duration: Duration,
    pub cancelled: bool,
    pub failures: Vec<FailedTask>,
}

/// Drive every task to a terminal state (or until cancelled).
///
/// Admission follows non-decreasing depth order; completion order across
/// concurrent calls is unordered.
pub async fn run_restore(
    backend: Arc<dyn RestoreBackend>,
    tasks: Vec<RestoreTask>,
    opts: &EngineOptions,
    metrics: Arc<MetricsTracker>,
    cancel: Arc<CancelFlag>,
) -> RunSummary {
    let started = Instant::now();
    let total_tasks = tasks.len() as u64;

    let mut queue = DepthQueue::new();
    for task in tasks {
        queue.push(task);
    }

    let mut controller = ConcurrencyController::new(opts.aimd);
    metrics.set_current_limit(controller.current_limit());
    tracing::info!(
        tasks = total_tasks,
        limit = controller.current_limit(),
        "restore run starting"
    );

    let mut join_set: JoinSet<(Result<(), BackendError>, Duration)> = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, RestoreTask> = HashMap::new();
    // Retryable tasks waiting out their backoff before re-entering the queue.
    let mut delayed: Vec<(Instant, RestoreTask)> = Vec::new();

    let mut restored = 0u64;
    let mut skipped = 0u64;
    let mut failures: Vec<FailedTask> = Vec::new();

    loop {
        // Ripe backoffs re-enter the queue at their original depth priority.
        let now = Instant::now();
        let mut i = 0;
        while i < delayed.len() {
            if delayed[i].0 <= now {
                let (_, mut task) = delayed.swap_remove(i);
                task.state = TaskState::Pending;
                queue.push(task);
            } else {
                i += 1;
            }
        }

        if !cancel.is_cancelled() {
            while in_flight.len() < controller.current_limit() {
                let Some(mut task) = queue.pop_next() else {
                    break;
                };
                task.attempts += 1;
                task.state = TaskState::InFlight;
                metrics.record_dispatch();

                let backend = Arc::clone(&backend);
                let path = task.path.clone();
                let handle = task.deletion_handle.clone();
                let call_timeout = opts.call_timeout;
                let abort = join_set.spawn(async move {
                    let call_started = Instant::now();
                    let result = match tokio::time::timeout(
                        call_timeout,
                        backend.restore(&path, &handle),
                    )
                    .await
                    {
                        Ok(res) => res,
                        Err(_) => Err(BackendError::timeout(format!(
                            "restore call exceeded {:?}",
                            call_timeout
                        ))),
                    };
                    (result, call_started.elapsed())
                });
                in_flight.insert(abort.id(), task);
            }
        }

        metrics.set_queue_state(queue.len() + delayed.len(), in_flight.len());

        if in_flight.is_empty() {
            if cancel.is_cancelled() {
                break;
            }
            if queue.is_empty() {
                let Some(next_ripe) = delayed.iter().map(|(at, _)| *at).min() else {
                    break; // drained: no pending, no delayed, nothing in flight
                };
                let wait = next_ripe.min(Instant::now() + IDLE_WAIT_CAP);
                tokio::time::sleep_until(wait).await;
            }
            continue;
        }

        let (task, outcome) = match join_set.join_next_with_id().await {
            Some(Ok((id, (result, elapsed)))) => match in_flight.remove(&id) {
                Some(task) => {
                    tracing::trace!(path = %task.path, ?elapsed, "restore call finished");
                    (task, result)
                }
                None => {
                    tracing::error!(?id, "completion for unknown task; dropping");
                    continue;
                }
            },
            Some(Err(join_err)) => {
                // A panicked worker is fatal for that task only.
                let id = join_err.id();
                match in_flight.remove(&id) {
                    Some(task) => (
                        task,
                        Err(BackendError::other(format!("restore worker failed: {join_err}"))),
                    ),
                    None => {
                        tracing::error!(?id, "join error for unknown task: {join_err}");
                        continue;
                    }
                }
            }
            None => continue,
        };

        handle_outcome(
            task,
            outcome,
            opts,
            &mut controller,
            &mut queue,
            &mut delayed,
            &metrics,
            &mut restored,
            &mut skipped,
            &mut failures,
        );

        if let Some(change) = controller.maybe_adjust() {
            metrics.set_current_limit(controller.current_limit());
            match change {
                LimitChange::Raised(limit) => {
                    tracing::info!(limit, "raising concurrency (window clean)")
                }
                LimitChange::Lowered(limit) => {
                    tracing::info!(limit, "lowering concurrency (backend under pressure)")
                }
            }
        }
    }

    let cancelled = cancel.is_cancelled();
    let not_processed = (queue.len() + delayed.len()) as u64;
    metrics.set_queue_state(queue.len() + delayed.len(), 0);
    let summary = RunSummary {
        total_tasks,
        restored,
        skipped,
        failed: failures.len() as u64,
        attempts: metrics.snapshot().attempts,
        not_processed,
        duration: started.elapsed(),
        cancelled,
        failures,
    };
    tracing::info!(
        restored = summary.restored,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "restore run finished"
    );
    summary
}

#[allow(clippy::too_many_arguments)]
fn handle_outcome(
    mut task: RestoreTask,
    outcome: Result<(), BackendError>,
    opts: &EngineOptions,
    controller: &mut ConcurrencyController,
    queue: &mut DepthQueue,
    delayed: &mut Vec<(Instant, RestoreTask)>,
    metrics: &MetricsTracker,
    restored: &mut u64,
    skipped: &mut u64,
    failures: &mut Vec<FailedTask>,
) {
    match classify_outcome(task.attempts, &outcome, &opts.retry) {
        Disposition::Success => {
            task.state = TaskState::Succeeded;
            controller.record_success();
            metrics.record_restored();
            *restored += 1;
        }
        Disposition::BenignAlreadyRestored => {
            task.state = TaskState::SkippedAlreadyRestored;
            controller.record_success();
            metrics.record_skipped();
            *skipped += 1;
            tracing::debug!(path = %task.path, "already restored, skipping");
        }
        disposition @ (Disposition::RetryableThrottled | Disposition::RetryableTransient) => {
            if disposition == Disposition::RetryableThrottled {
                controller.record_throttle();
            } else {
                controller.record_error();
            }
            let message = match &outcome {
                Err(e) => e.message.clone(),
                Ok(()) => String::new(),
            };
            let delay = opts.retry.backoff(task.attempts);
            tracing::debug!(
                path = %task.path,
                attempt = task.attempts,
                error = %message,
                "retrying in {:?}",
                delay
            );
            task.last_error = Some(message);
            task.state = TaskState::FailedRetryable;
            if delay.is_zero() {
                task.state = TaskState::Pending;
                queue.push(task);
            } else {
                delayed.push((Instant::now() + delay, task));
            }
        }
        Disposition::Fatal => {
            controller.record_error();
            let message = match &outcome {
                Err(e) => e.message.clone(),
                Ok(()) => String::new(),
            };
            tracing::warn!(path = %task.path, attempts = task.attempts, "failed to restore: {}", message);
            task.last_error = Some(message.clone());
            task.state = TaskState::FailedFatal;
            metrics.record_failed();
            failures.push(FailedTask {
                path: task.path,
                error: message,
            });
        }
    }
}
