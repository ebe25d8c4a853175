use thiserror::Error;

/// Result type for storage and shortener operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by every [`Storage`](crate::Storage) backend.
///
/// Backends translate their own failure modes (I/O errors, driver error
/// codes, corrupt data) into one of these kinds so that callers never see a
/// vendor-specific representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation canceled: {0}")]
    Canceled(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}
