//! Error types for backend storage operations.

/// Errors that can occur during backend storage operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The requested object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The object key that was requested.
        key: String,
    },

    /// A conditional write found the object in a different state than the
    /// caller expected (generation mismatch, or present when `IfAbsent`).
    #[error("write precondition failed for {key}")]
    PreconditionFailed {
        /// The object key that was written.
        key: String,
    },

    /// A local I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote store reported an error or was unreachable.
    #[error("backend error during {op}: {message}")]
    Remote {
        /// The operation that failed.
        op: &'static str,
        /// Error detail reported by the store.
        message: String,
    },
}

impl BackendError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Remote transport failures are retryable; missing objects and failed
    /// preconditions are facts about the store, not transient faults.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Remote { .. })
    }
}
