//! Restore task model: one soft-deleted object and its lifecycle state.

/// Lifecycle state of a restore task.
///
/// `Succeeded`, `SkippedAlreadyRestored` and `FailedFatal` are terminal; a
/// task in one of those states is never dispatched again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the queue (or waiting out a retry backoff).
    Pending,
    /// A restore call for this task is currently running.
    InFlight,
    /// The backend restored the object.
    Succeeded,
    /// The backend reported the target already exists; counted as success.
    SkippedAlreadyRestored,
    /// Last attempt failed but the task will be re-dispatched.
    FailedRetryable,
    /// Permanently failed; `last_error` holds the final error message.
    FailedFatal,
}

impl TaskState {
    /// True for states a task never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::SkippedAlreadyRestored | TaskState::FailedFatal
        )
    }
}

/// One soft-deleted object to restore.
#[derive(Debug, Clone)]
pub struct RestoreTask {
    /// Hierarchical path of the object within the container.
    pub path: String,
    /// Number of `/` separators in `path`; fixed at construction.
    pub depth: u32,
    /// Opaque token naming the specific deleted version to restore.
    pub deletion_handle: String,
    /// Restore attempts made so far; incremented once per dispatch.
    pub attempts: u32,
    pub state: TaskState,
    /// Message of the most recent failed attempt, kept for reporting.
    pub last_error: Option<String>,
}

impl RestoreTask {
    pub fn new(path: impl Into<String>, deletion_handle: impl Into<String>) -> Self {
        let path = path.into();
        let depth = path.matches('/').count() as u32;
        Self {
            path,
            depth,
            deletion_handle: deletion_handle.into(),
            attempts: 0,
            state: TaskState::Pending,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_separators() {
        assert_eq!(RestoreTask::new("file.txt", "d1").depth, 0);
        assert_eq!(RestoreTask::new("a/file.txt", "d1").depth, 1);
        assert_eq!(RestoreTask::new("a/b/c/file.txt", "d1").depth, 3);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::SkippedAlreadyRestored.is_terminal());
        assert!(TaskState::FailedFatal.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::InFlight.is_terminal());
        assert!(!TaskState::FailedRetryable.is_terminal());
    }

    #[test]
    fn new_task_starts_pending_with_zero_attempts() {
        let t = RestoreTask::new("a/b", "deletion-123");
        assert_eq!(t.state, TaskState::Pending);
        assert_eq!(t.attempts, 0);
        assert!(t.last_error.is_none());
    }
}
