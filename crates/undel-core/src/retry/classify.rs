//! Classify restore outcomes into dispositions, and HTTP status / curl
//! errors into backend error categories.

use crate::backend::{BackendError, ErrorCategory};
use crate::retry::policy::RetryPolicy;

/// What to do with a task after one restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The object was restored.
    Success,
    /// The target already exists; treated as success, never retried.
    BenignAlreadyRestored,
    /// Backend signalled capacity exhaustion; requeue and back the
    /// concurrency limit off.
    RetryableThrottled,
    /// Timeout / network-class failure; requeue with bounded retries.
    RetryableTransient,
    /// Permanently failed (unrecognized error, or retries exhausted).
    Fatal,
}

/// Map one attempt's outcome to a disposition.
///
/// `attempts` is the task's dispatch count including this attempt; a
/// retryable failure becomes `Fatal` once it exceeds `policy.max_retries`.
pub fn classify_outcome(
    attempts: u32,
    outcome: &Result<(), BackendError>,
    policy: &RetryPolicy,
) -> Disposition {
    let err = match outcome {
        Ok(()) => return Disposition::Success,
        Err(e) => e,
    };
    match err.category {
        ErrorCategory::AlreadyExists => Disposition::BenignAlreadyRestored,
        ErrorCategory::Throttled => {
            if attempts > policy.max_retries {
                Disposition::Fatal
            } else {
                Disposition::RetryableThrottled
            }
        }
        ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Server => {
            if attempts > policy.max_retries {
                Disposition::Fatal
            } else {
                Disposition::RetryableTransient
            }
        }
        ErrorCategory::Other => Disposition::Fatal,
    }
}

/// Classify an HTTP response for the storage backend.
///
/// `error_code` is the service error token (`x-ms-error-code` header) when
/// present; it takes precedence over the bare status because the service
/// reports both `ServerBusy` and already-exists conditions under statuses
/// shared with other errors.
pub fn classify_http_status(code: u32, error_code: Option<&str>) -> ErrorCategory {
    if let Some(ec) = error_code {
        if ec.contains("AlreadyExists") {
            return ErrorCategory::AlreadyExists;
        }
        if ec == "ServerBusy" || ec == "ThrottlingError" {
            return ErrorCategory::Throttled;
        }
    }
    match code {
        409 => ErrorCategory::AlreadyExists,
        429 | 503 => ErrorCategory::Throttled,
        408 => ErrorCategory::Timeout,
        500..=599 => ErrorCategory::Server,
        _ => ErrorCategory::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorCategory {
    if e.is_operation_timedout() {
        return ErrorCategory::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorCategory::Connection;
    }
    ErrorCategory::Other
}
