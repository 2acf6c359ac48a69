use thiserror::Error;

/// Malformed caller input: an identifier, path, area, capability encoding or
/// an attempt to widen a delegated capability. These are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A shortname was outside its length bounds or charset
    #[error("Invalid shortname '{shortname}': {reason}")]
    InvalidShortname {
        /// The rejected shortname
        shortname: String,
        /// Why it was rejected
        reason: String,
    },

    /// Bytes or text could not be interpreted as an identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A share address used a sigil that disagrees with the communal bit of
    /// its key
    #[error("Sigil '{sigil}' does not match the kind of share '{address}'")]
    SigilMismatch {
        /// The sigil found in the address
        sigil: char,
        /// The offending address
        address: String,
    },

    /// A path violated its component count, component length, total length
    /// or charset bounds
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An area or time range was malformed
    #[error("Invalid area: {0}")]
    InvalidArea(String),

    /// A delegation tried to grant more than the delegator holds
    #[error("Restriction is not contained in the granted area: {0}")]
    AreaWidened(String),

    /// A delegation was attempted by something other than the current holder
    #[error("'{holder}' cannot delegate a capability received by '{receiver}'")]
    NotReceiver {
        /// The keypair offered for signing
        holder: String,
        /// The capability's actual receiver
        receiver: String,
    },

    /// An owned read capability over every subspace was handled without its
    /// subspace capability
    #[error("Owned read capability is missing its subspace capability")]
    MissingSubspaceCapability,

    /// A capability did not match the namespace kind or access mode expected
    /// of it
    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    /// Bytes could not be decoded
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A payload did not match the digest or length its entry claims
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// An operation needed a document that does not exist
    #[error("No document exists at {0}")]
    NoSuchDocument(String),
}

/// No usable capability or keypair exists for a requested action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorisationError {
    /// The keypair for an identity is not held
    #[error("No keypair is held for identity {0}")]
    MissingIdentityKeypair(String),

    /// The keypair for a share is not held
    #[error("No keypair is held for share {0}")]
    MissingShareKeypair(String),

    /// No stored capability covers the requested write
    #[error("No write capability covers {subspace} at {path} in {namespace}")]
    NoCapability {
        /// The share being written to
        namespace: String,
        /// The identity being written as
        subspace: String,
        /// The path being written
        path: String,
    },

    /// An authorisation token did not prove write permission for its entry
    #[error("Authorisation token does not authorise the entry: {0}")]
    InvalidToken(String),
}

/// The base error for invariant violations. Seeing one of these indicates a
/// bug or a misbehaving collaborator, not bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuillError {
    /// An internal invariant did not hold
    #[error("Invariant violated: {0}")]
    Invariant(String),
}
