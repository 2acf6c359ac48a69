use quill_capability::AuthError;
use quill_common::{AuthorisationError, QuillError, ValidationError};
use quill_storage::QuillStorageError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Malformed input: an identifier, path, entry or payload
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No usable capability or keypair exists for the write
    #[error(transparent)]
    Authorisation(#[from] AuthorisationError),

    /// The entry or payload storage failed
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// The credential store failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Stored data contradicts itself
    #[error(transparent)]
    Invariant(#[from] QuillError),
}

impl From<QuillStorageError> for StoreError {
    fn from(error: QuillStorageError) -> Self {
        StoreError::Storage(format!("{error}"))
    }
}

pub(crate) fn storage_error<E: Into<QuillStorageError>>(error: E) -> StoreError {
    StoreError::from(error.into())
}
