use std::fmt::{Debug, Formatter};

use quill_common::{ByteReader, ValidationError, encode_base32};

/// The length in bytes of an Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// The raw signature bytes
    pub fn bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Decode a signature from the front of `reader`
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        Ok(Self(reader.read_array()?))
    }
}

impl From<[u8; SIGNATURE_LENGTH]> for Signature {
    fn from(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(signature: ed25519_dalek::Signature) -> Self {
        Self(signature.to_bytes())
    }
}

impl From<Signature> for ed25519_dalek::Signature {
    fn from(signature: Signature) -> Self {
        ed25519_dalek::Signature::from_bytes(&signature.0)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signature")
            .field(&encode_base32(&self.0))
            .finish()
    }
}
