//! Graphics error types.
//!
//! Only failures the caller can meaningfully react to live here: native API
//! failures and invalid input. Synchronization and lifecycle contract
//! violations (wrong queue, double free, unlocked references, exhausted
//! bindless tables) are assertions, not errors.

use thiserror::Error;

use crate::resources::ResourceKind;

/// Errors surfaced by the GPU core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Out of host or device memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// A native resource could not be created.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A native pipeline could not be created.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),
    /// The backend rejected a queue submission.
    #[error("queue submission failed: {0}")]
    SubmissionFailed(String),
    /// The backend does not implement a requested feature.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A handle did not resolve to a live resource.
    #[error("stale or unknown {0:?} handle")]
    InvalidHandle(ResourceKind),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::SubmissionFailed("queue timeout".to_string());
        assert_eq!(err.to_string(), "queue submission failed: queue timeout");

        let err = GraphicsError::InvalidHandle(ResourceKind::Image);
        assert_eq!(err.to_string(), "stale or unknown Image handle");
    }
}
