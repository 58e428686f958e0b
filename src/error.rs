use thiserror::Error;

/// Errors from registry configuration and admin operations.
///
/// Runtime resolution and recording never surface these; they degrade to the
/// first variant or an empty result list instead.
#[derive(Debug, Error)]
pub enum AbTestError {
    #[error("test not found: {0}")]
    NotFound(String),
    #[error("test already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid configuration for {test}: {reason}")]
    InvalidConfig { test: String, reason: String },
    #[error("invalid target page pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AbTestError {
    pub(crate) fn invalid_config(test: &str, reason: impl Into<String>) -> Self {
        AbTestError::InvalidConfig {
            test: test.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure modes of a [`SessionStorage`](crate::SessionStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session storage is unavailable")]
    Unavailable,
    #[error("storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}
