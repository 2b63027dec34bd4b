//! Error types for the model pool

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("reference count delta must be positive, got {0}")]
    InvalidRefCount(i64),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("collection was modified during enumeration (started at version {started}, now {current})")]
    EnumerationConflict { started: u64, current: u64 },

    #[error("identity mismatch: update source {found} does not target model {expected}")]
    IdentityMismatch { expected: String, found: String },

    #[error("identifier is not pooled and no factory is registered")]
    FactoryMissing,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("model update failed: {0}")]
    UpdateFailed(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
