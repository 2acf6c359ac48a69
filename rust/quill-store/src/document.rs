use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use quill_capability::{AuthorisationToken, Entry};
use quill_common::{Blake3Hash, ByteReader, ConditionalSync, Path, ValidationError};
use quill_credentials::{IdentityId, ShareId};
use quill_storage::{PayloadStore, QuillStorageError};

use crate::StoreError;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub(crate) trait PayloadSource: ConditionalSync {
    async fn read_payload(&self, digest: &Blake3Hash)
    -> Result<Option<Vec<u8>>, QuillStorageError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Payloads> PayloadSource for Payloads
where
    Payloads: PayloadStore,
{
    async fn read_payload(
        &self,
        digest: &Blake3Hash,
    ) -> Result<Option<Vec<u8>>, QuillStorageError> {
        self.read(digest).await
    }
}

/// A handle on a document's payload. The bytes are read from the payload
/// store only when asked for.
#[derive(Clone)]
pub struct Payload {
    digest: Blake3Hash,
    length: u64,
    source: Arc<dyn PayloadSource>,
}

impl Payload {
    pub(crate) fn new(digest: Blake3Hash, length: u64, source: Arc<dyn PayloadSource>) -> Self {
        Self {
            digest,
            length,
            source,
        }
    }

    /// The payload's BLAKE3 digest
    pub fn digest(&self) -> &Blake3Hash {
        &self.digest
    }

    /// The payload's length in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Read the payload bytes, or `None` if they are not held locally (an
    /// entry may arrive before its payload)
    pub async fn bytes(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.source.read_payload(&self.digest).await?)
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("digest", &self.digest)
            .field("length", &self.length)
            .finish()
    }
}

/// An entry as stored: the entry and the token that authorised it.
pub(crate) struct Record {
    pub entry: Entry,
    pub token: AuthorisationToken,
}

impl Record {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.entry.encode();
        self.token.encode_into(&mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let entry = Entry::decode_from(&mut reader)?;
        let token = AuthorisationToken::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(Self { entry, token })
    }
}

/// The current write at one `(share, identity, path)` key, as presented to
/// readers.
#[derive(Clone)]
pub struct Document {
    entry: Entry,
    token: AuthorisationToken,
    payload: Payload,
}

impl Document {
    pub(crate) fn new(entry: Entry, token: AuthorisationToken, source: Arc<dyn PayloadSource>) -> Self {
        let payload = Payload::new(entry.payload_digest, entry.payload_length, source);
        Self {
            entry,
            token,
            payload,
        }
    }

    /// The share the document belongs to
    pub fn share(&self) -> &ShareId {
        &self.entry.namespace
    }

    /// The identity (subspace) the document was written as
    pub fn identity(&self) -> &IdentityId {
        &self.entry.subspace
    }

    /// Where the document lives within its identity's subspace
    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// When the document was written, in microseconds since the Unix epoch
    pub fn timestamp(&self) -> u64 {
        self.entry.timestamp
    }

    /// The payload's length in bytes
    pub fn size(&self) -> u64 {
        self.entry.payload_length
    }

    /// The payload's BLAKE3 digest
    pub fn digest(&self) -> &Blake3Hash {
        &self.entry.payload_digest
    }

    /// The identity whose capability authorised the write. This differs from
    /// [Document::identity] when the write was made with a delegated
    /// capability.
    pub fn signed_by(&self) -> &IdentityId {
        self.token.capability.receiver()
    }

    /// The payload handle
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The underlying entry
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The token that authorised the entry
    pub fn token(&self) -> &AuthorisationToken {
        &self.token
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.entry == other.entry && self.token == other.token
    }
}

impl Eq for Document {}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("identity", self.identity())
            .field("path", self.path())
            .field("timestamp", &self.timestamp())
            .field("size", &self.size())
            .field("digest", self.digest())
            .finish_non_exhaustive()
    }
}
