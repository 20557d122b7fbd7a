//! Error types shared by the store, remote and engine seams.
//!
//! All errors are `Clone` so a single failure can be logged, reported to
//! every listener and returned to a caller.

use std::sync::Arc;

use thiserror::Error;

/// Boxed backend error preserved as a `#[source]`.
pub type BackendError = Arc<dyn std::error::Error + Send + Sync>;

/// Missing or invalid configuration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No remote endpoint was configured.
    #[error("remote base URL is not configured")]
    MissingBaseUrl,
    /// The endpoint could not be parsed.
    #[error("remote base URL {url:?} is invalid: {message}")]
    InvalidBaseUrl {
        /// Offending value.
        url: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The distance threshold was negative or not finite.
    #[error("refresh distance must be a finite, non-negative number of metres")]
    InvalidRefreshDistance,
}

/// Failure raised by a [`LocalStore`](crate::LocalStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The underlying database reported an error.
    #[error("store operation `{operation}` failed: {source}")]
    Backend {
        /// Operation that was running.
        operation: &'static str,
        /// Backend error.
        #[source]
        source: BackendError,
    },
    /// The database file could not be opened.
    #[error("failed to open store at {path}: {source}")]
    Open {
        /// Location of the database.
        path: std::path::PathBuf,
        /// Backend error.
        #[source]
        source: BackendError,
    },
    /// The database was written by an incompatible version.
    #[error("expected store schema version {expected} but found {found}")]
    SchemaMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
    /// Stored point metadata could not be decoded.
    #[error("point {local_id} has unreadable fields: {message}")]
    InvalidFields {
        /// Local identifier of the point.
        local_id: i64,
        /// Decoder diagnostic.
        message: String,
    },
    /// No point with this local identifier exists.
    #[error("point {local_id} does not exist")]
    UnknownPoint {
        /// Local identifier that was looked up.
        local_id: i64,
    },
    /// The point has not been inserted and has no local identifier.
    #[error("point has not been stored yet")]
    UnsavedPoint,
    /// No category with this identifier exists.
    #[error("category {id} does not exist")]
    UnknownCategory {
        /// Category identifier.
        id: i64,
    },
    /// No disability with this identifier exists.
    #[error("disability {id} does not exist")]
    UnknownDisability {
        /// Disability identifier.
        id: i64,
    },
    /// The store handle was closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Wrap a backend error raised during `operation`.
    pub fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            operation,
            source: Arc::new(source),
        }
    }
}

/// Failure raised while talking to the remote catalog or persisting its
/// results.
///
/// Transport and protocol failures share this single kind; use
/// [`PointsError::is_retriable`] to tell them apart.
#[derive(Debug, Clone, Error)]
pub enum PointsError {
    /// The remote could not be used because of missing configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The remote could not be reached.
    #[error("network error contacting {url}: {message}")]
    Transport {
        /// Endpoint being contacted.
        url: String,
        /// Transport diagnostic.
        message: String,
    },
    /// The request timed out.
    #[error("request to {url} timed out after {timeout_secs} s")]
    Timeout {
        /// Endpoint being contacted.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The remote answered with a non-success status.
    #[error("{url} answered with HTTP {status}: {message}")]
    Rejected {
        /// Endpoint being contacted.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response diagnostic.
        message: String,
    },
    /// The remote answered with an unusable payload.
    #[error("unusable response: {message}")]
    Protocol {
        /// Decoder diagnostic.
        message: String,
    },
    /// Writing remote results locally failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PointsError {
    /// Whether trying again later may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Configuration(_) | Self::Protocol { .. } | Self::Store(_) => false,
        }
    }
}

/// Failure raised by the [`SyncEngine`](crate::SyncEngine) itself.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A background thread could not be started.
    #[error("failed to start {thread} thread: {message}")]
    Spawn {
        /// Name of the thread.
        thread: &'static str,
        /// OS diagnostic.
        message: String,
    },
    /// Too many tasks are waiting for the worker.
    #[error("sync task queue is full ({capacity} tasks)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// The worker thread is no longer accepting tasks.
    #[error("sync worker is not running")]
    WorkerUnavailable,
    /// A foreground store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
