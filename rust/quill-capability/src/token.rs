use quill_common::{ByteReader, ValidationError};
use quill_credentials::Signature;
use tracing::trace;

use crate::{AccessMode, Capability, Entry};

/// Proof that an entry was written with permission: a write capability and
/// its receiver's signature over the encoded entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorisationToken {
    /// The write capability exercised
    pub capability: Capability,
    /// The receiver's signature over [`Entry::encode`]
    pub signature: Signature,
}

impl AuthorisationToken {
    /// The token's byte encoding: the capability then the signature
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Append the token's byte encoding to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        self.capability.encode_into(out);
        out.extend_from_slice(self.signature.bytes());
    }

    /// Decode a token from the front of `reader`
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        Ok(Self {
            capability: Capability::decode_from(reader)?,
            signature: Signature::decode_from(reader)?,
        })
    }

    /// Decode a token that occupies all of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let token = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(token)
    }
}

/// Whether `token` proves that `entry` may be written: the capability is a
/// valid write capability for the entry's share whose granted area includes
/// the entry, and the signature verifies under the capability receiver's key.
pub fn is_authorised_write(entry: &Entry, token: &AuthorisationToken) -> bool {
    let capability = &token.capability;

    if capability.access_mode() != AccessMode::Write {
        trace!("Token capability does not grant writes");
        return false;
    }
    if capability.namespace() != &entry.namespace {
        trace!("Token capability is for {}", capability.namespace());
        return false;
    }
    if !entry.is_in(&capability.granted_area()) {
        trace!("Entry lies outside {}", capability.granted_area());
        return false;
    }
    if !capability.is_valid() {
        trace!("Token capability does not validate");
        return false;
    }

    capability
        .receiver()
        .verify(&entry.encode(), &token.signature)
}
