//! Tagged outcomes of the interception pipeline.

use shellcache_core::Error;

use crate::fetch::NetworkFailure;

/// Failure of a strategy or lifecycle step.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The network could not be reached and the strategy had no fallback.
    #[error("NETWORK_FAILURE: {0}")]
    Network(#[from] NetworkFailure),

    /// Network-first exhausted every fallback level.
    #[error("STORE_MISS: no cached copy of {url} after network failure ({cause})")]
    StoreMiss { url: String, cause: NetworkFailure },

    /// The cache store failed.
    #[error(transparent)]
    Store(#[from] Error),

    /// Strategy execution panicked.
    #[error("WORKER_PANIC: {0}")]
    Panicked(String),

    /// A lifecycle event arrived in a state that cannot accept it.
    #[error("LIFECYCLE_ERROR: cannot {event} while {state}")]
    InvalidTransition { event: &'static str, state: &'static str },
}

impl WorkerError {
    /// Outcomes a strategy is allowed to surface as-is.
    ///
    /// Everything else is unexpected and goes through the interceptor's
    /// offline-document fallback.
    pub fn is_expected(&self) -> bool {
        matches!(self, WorkerError::Network(_))
    }
}

impl From<WorkerError> for Error {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Network(failure) => Error::NetworkFailure(failure.to_string()),
            WorkerError::StoreMiss { .. } => Error::OfflineUnavailable(err.to_string()),
            WorkerError::Store(e) => e,
            WorkerError::Panicked(msg) => Error::OfflineUnavailable(msg),
            WorkerError::InvalidTransition { .. } => Error::Lifecycle(err.to_string()),
        }
    }
}
