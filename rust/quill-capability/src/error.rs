use quill_common::{AuthorisationError, ValidationError};
use quill_credentials::KeypairError;
use quill_storage::QuillStorageError;
use thiserror::Error;

/// Failures of the encrypted credential vault. Cloneable so that a failed key
/// derivation can be handed to every caller that waits on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The password does not open the vault's check record
    #[error("Wrong password for vault")]
    WrongPassword,

    /// Sealing a record failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// A record could not be opened
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The password could not be stretched into a key
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Random number generation failed
    #[error("RNG error: {0}")]
    Rng(String),

    /// The backing store failed
    #[error("Vault storage error: {0}")]
    Storage(String),
}

impl From<QuillStorageError> for VaultError {
    fn from(error: QuillStorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed input, or an attempt to widen a capability
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A keypair or capability needed for the operation is not held
    #[error(transparent)]
    Authorisation(#[from] AuthorisationError),

    /// The storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The credential vault failed
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<QuillStorageError> for AuthError {
    fn from(error: QuillStorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<KeypairError> for AuthError {
    fn from(error: KeypairError) -> Self {
        match error {
            KeypairError::Validation(error) => Self::Validation(error),
            KeypairError::Rng(error) => Self::Vault(VaultError::Rng(error.to_string())),
        }
    }
}
