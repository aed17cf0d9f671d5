//! Harness error types.

use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendId;

/// A backend handle could not be established.
///
/// The backend is excluded from every scenario of the run; it is never fatal
/// on its own.
#[derive(Debug, Clone, Error)]
#[error("cannot connect to backend '{backend}': {message}")]
pub struct ConnectionError {
    pub backend: BackendId,
    pub message: String,
}

impl ConnectionError {
    pub fn new(backend: BackendId, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

/// A single operation execution failed.
///
/// Failed calls have no latency and never enter a sample.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The adapter does not understand this kind of descriptor.
    #[error("backend '{backend}' cannot execute {kind} operations")]
    UnsupportedDescriptor {
        backend: BackendId,
        kind: &'static str,
    },

    /// The descriptor is malformed for the adapter that received it.
    #[error("invalid operation descriptor: {0}")]
    InvalidDescriptor(String),

    /// The store rejected or failed the call.
    #[error("backend error: {0}")]
    Backend(String),

    /// The adapter gave up waiting for the store.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The compensating write for an earlier write failed.
    #[error("compensation failed: {0}")]
    Compensation(String),
}

/// Aggregation attempted on a sample with no successful measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("latency sample is empty")]
pub struct EmptySampleError;

/// Scenario registry validation and loading errors.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("duplicate scenario name: {0}")]
    DuplicateName(String),

    #[error("scenario '{0}' must run at least one iteration")]
    ZeroIterations(String),

    #[error("scenario '{0}' must use at least one worker")]
    ZeroConcurrency(String),

    #[error("scenario '{0}' must run for a non-zero duration")]
    ZeroDuration(String),

    #[error("scenario '{0}' has a zero batch size")]
    ZeroBatchSize(String),

    #[error("failed to parse scenario file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Every configured backend failed to connect.
    #[error("no backend could be initialized ({attempted} attempted)")]
    NoBackendAvailable { attempted: usize },

    /// A (backend, scenario) cell was written twice.
    #[error("result for backend '{backend}' scenario '{scenario}' already recorded")]
    DuplicateResult { backend: BackendId, scenario: String },

    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
