//! Error types for revindex-import

/// Failure of a walk or of a full import run
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Lease on {0} was taken over by another owner")]
    LeaseLost(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("Origin request failed: {0:#}")]
    Origin(anyhow::Error),

    #[error("Store operation failed: {0:#}")]
    Store(anyhow::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One ref of a ref-update event that could not be indexed
#[derive(Debug)]
pub struct RefFailure {
    pub ref_name: String,
    pub error: IndexError,
}

/// Some refs of a ref-update event failed; commits of the other refs are
/// already persisted.
#[derive(Debug, thiserror::Error)]
#[error("{} ref(s) of {repository} failed to index", .failures.len())]
pub struct UpdateError {
    pub repository: String,
    pub failures: Vec<RefFailure>,

    /// Progress made by the refs that succeeded
    pub partial: crate::stats::UpdateStats,
}

/// Failure to handle an inbound notification message
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("Malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Notification names no repository: {0:?}")]
    InvalidRepoName(String),

    #[error(transparent)]
    Failed(#[from] UpdateError),
}

impl HandleError {
    /// Whether redelivering the same message may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, HandleError::Failed(_))
    }
}

/// Errors of the import queue
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Import queue is full, dropping {0}")]
    QueueFull(String),

    #[error("Import queue is closed")]
    Closed,
}
