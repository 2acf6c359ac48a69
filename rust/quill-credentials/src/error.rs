use quill_common::ValidationError;
use thiserror::Error;

/// Errors from generating or importing keypairs.
#[derive(Error, Debug, Clone)]
pub enum KeypairError {
    /// The shortname, key or encoding was malformed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Random number generation failed
    #[error("RNG error: {0}")]
    Rng(getrandom::Error),
}

impl From<getrandom::Error> for KeypairError {
    fn from(e: getrandom::Error) -> Self {
        Self::Rng(e)
    }
}
