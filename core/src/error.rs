//! Enumerated error kinds shared across the engine.
//!
//! Every fallible engine operation returns [`EngineResult`]. The kinds map
//! one-to-one onto the failure policy: `invalid_input` is a caller fault and
//! never retried, `transient_dependency` and `timeout` are retryable at the
//! adapter level, `permanent_dependency` and `data_integrity` surface
//! immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Engine-wide error type with enumerated kinds.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller fault; 4xx-equivalent; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing document/entity; empty or 404-equivalent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Per-operation deadline exceeded.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Store/collaborator temporarily unavailable; retried with backoff.
    #[error("transient dependency failure: {0}")]
    TransientDependency(String),

    /// Authentication or schema error; surfaced immediately.
    #[error("permanent dependency failure: {0}")]
    PermanentDependency(String),

    /// Invariant violation detected; the operation is aborted before it can
    /// corrupt a store.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
}

/// Wire-level tag for an [`EngineError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Timeout,
    TransientDependency,
    PermanentDependency,
    DataIntegrity,
}

impl EngineError {
    /// The enumerated kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::TransientDependency(_) => ErrorKind::TransientDependency,
            EngineError::PermanentDependency(_) => ErrorKind::PermanentDependency,
            EngineError::DataIntegrity(_) => ErrorKind::DataIntegrity,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::TransientDependency(_) | EngineError::Timeout(_)
        )
    }
}

/// Result alias used across all engine crates.
pub type EngineResult<T> = Result<T, EngineError>;
