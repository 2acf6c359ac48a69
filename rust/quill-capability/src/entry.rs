use std::cmp::Ordering;

use quill_common::{BLAKE3_HASH_SIZE, Blake3Hash, ByteReader, Path, ValidationError};
use quill_credentials::{IdentityId, ShareId};

use crate::Area;

/// The metadata of a single write: where it lands, when it was made and the
/// payload it points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    /// The share written to
    pub namespace: ShareId,
    /// The identity written as
    pub subspace: IdentityId,
    /// The path written to
    pub path: Path,
    /// Microseconds since the Unix epoch
    pub timestamp: u64,
    /// The payload's length in bytes
    pub payload_length: u64,
    /// The payload's BLAKE3 digest
    pub payload_digest: Blake3Hash,
}

impl Entry {
    /// The canonical encoding, which authorisation tokens sign over
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.namespace.encode_into(&mut out);
        self.subspace.encode_into(&mut out);
        self.path.encode_ordered(&mut out);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.payload_length.to_be_bytes());
        out.extend_from_slice(self.payload_digest.bytes());
        out
    }

    /// Decode an entry produced by [`Entry::encode`]
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let namespace = ShareId::decode_from(reader)?;
        let subspace = IdentityId::decode_from(reader)?;
        let path = Path::decode_ordered(reader)?;
        let timestamp = reader.read_u64()?;
        let payload_length = reader.read_u64()?;
        let payload_digest = Blake3Hash::from(reader.read_array::<BLAKE3_HASH_SIZE>()?);
        Ok(Self {
            namespace,
            subspace,
            path,
            timestamp,
            payload_length,
            payload_digest,
        })
    }

    /// Decode an entry that occupies all of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let entry = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(entry)
    }

    /// Whether the entry lies within `area`
    pub fn is_in(&self, area: &Area) -> bool {
        area.includes(&self.subspace, &self.path, self.timestamp)
    }

    /// Compare recency: by timestamp, then payload digest, then payload
    /// length. Every peer ranks two entries the same way.
    pub fn recency(&self, other: &Entry) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.payload_digest.cmp(&other.payload_digest))
            .then_with(|| self.payload_length.cmp(&other.payload_length))
    }

    /// Whether this entry wins over `other` when they conflict
    pub fn is_newer_than(&self, other: &Entry) -> bool {
        self.recency(other) == Ordering::Greater
    }
}
