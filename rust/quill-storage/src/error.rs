use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuillStorageError {
    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// A stored value could not be decoded
    #[error("Failed to decode a stored value: {0}")]
    DecodeFailed(String),

    /// Stored bytes did not match the digest they were stored under
    #[error("Byte hash verification failed: {0}")]
    Verification(String),
}
