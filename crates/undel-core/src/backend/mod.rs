//! Storage backend interface: deleted-path listing and the restore call.
//!
//! The engine only sees this trait and `BackendError`; the concrete Data
//! Lake REST client lives in [`dfs`].

pub mod dfs;

use async_trait::async_trait;
use thiserror::Error;

/// Coarse category of a backend failure, used by the retry classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The target path already exists (a prior restore succeeded).
    AlreadyExists,
    /// The backend asked us to slow down (rate limit / server busy).
    Throttled,
    /// The call timed out.
    Timeout,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// Server-side 5xx that is not a throttling signal.
    Server,
    /// Anything else (typically not retried).
    Other,
}

/// Failure of a single backend call, carrying its category for
/// classification and the raw message for reporting.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub category: ErrorCategory,
    pub message: String,
}

impl BackendError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Other, message)
    }
}

/// One soft-deleted object as reported by the listing operation.
#[derive(Debug, Clone)]
pub struct DeletedEntry {
    /// Hierarchical path within the container.
    pub path: String,
    /// Token disambiguating which deleted version to restore.
    pub deletion_handle: String,
}

/// Backend operations the engine needs. Implementations page the listing
/// internally; the engine consumes the complete set before starting.
#[async_trait]
pub trait RestoreBackend: Send + Sync {
    /// Enumerate every soft-deleted object in the container.
    async fn list_deleted(&self) -> Result<Vec<DeletedEntry>, BackendError>;

    /// Restore one soft-deleted object.
    async fn restore(&self, path: &str, deletion_handle: &str) -> Result<(), BackendError>;
}
