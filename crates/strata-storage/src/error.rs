//! Storage error taxonomy
//!
//! Validation problems are raised before any network call and are never
//! retried. `NotFound` is kept distinct from other backend failures so callers can
//! treat a missing object as "already gone".

use strata_core::AppError;
use thiserror::Error;

/// Caller-input problems with a pathname, URL, or encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid pathname: {0}")]
    InvalidPathname(String),

    #[error("Untrusted storage host: {0}")]
    UntrustedHost(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Suspicious pattern in pathname: {0}")]
    SuspiciousPattern(String),

    #[error("Pathname is empty")]
    EmptyPathname,

    #[error("Pathname does not start with a registered bucket prefix: {0}")]
    UnknownBucket(String),

    #[error("Invalid base64 content: {0}")]
    InvalidBase64(String),
}

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(e) => AppError::InvalidInput(e.to_string()),
            StorageError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}
