use async_trait::async_trait;
use quill_common::{Blake3Hash, ConditionalSync};

use crate::{MemoryStorageBackend, QuillStorageError, StorageBackend};

/// A [PayloadStore] holds payload bytes addressed by their BLAKE3 digest.
///
/// A blanket implementation is provided for every [StorageBackend] whose keys
/// are [Blake3Hash] digests and whose values are byte vectors.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait PayloadStore: Clone + ConditionalSync {
    /// Store `bytes`, returning their digest and length. Storing bytes that
    /// are already present is harmless.
    async fn store(&mut self, bytes: Vec<u8>) -> Result<(Blake3Hash, u64), QuillStorageError>;

    /// Retrieve the bytes stored under `digest`
    async fn read(&self, digest: &Blake3Hash) -> Result<Option<Vec<u8>>, QuillStorageError>;

    /// The length of the bytes stored under `digest`
    async fn length(&self, digest: &Blake3Hash) -> Result<Option<u64>, QuillStorageError>;

    /// Remove the bytes stored under `digest`, reporting whether any were
    /// present
    async fn erase(&mut self, digest: &Blake3Hash) -> Result<bool, QuillStorageError>;
}

/// Payloads held in memory
pub type MemoryPayloadStore = MemoryStorageBackend<Blake3Hash, Vec<u8>>;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<T> PayloadStore for T
where
    T: StorageBackend<Key = Blake3Hash, Value = Vec<u8>> + ConditionalSync,
{
    async fn store(&mut self, bytes: Vec<u8>) -> Result<(Blake3Hash, u64), QuillStorageError> {
        let digest = Blake3Hash::hash(&bytes);
        let length = bytes.len() as u64;
        self.set(digest, bytes).await.map_err(|error| error.into())?;
        Ok((digest, length))
    }

    async fn read(&self, digest: &Blake3Hash) -> Result<Option<Vec<u8>>, QuillStorageError> {
        let Some(bytes) = self.get(digest).await.map_err(|error| error.into())? else {
            return Ok(None);
        };

        if Blake3Hash::hash(&bytes) != *digest {
            return Err(QuillStorageError::Verification(format!(
                "payload stored under {digest} does not hash to it"
            )));
        }

        Ok(Some(bytes))
    }

    async fn length(&self, digest: &Blake3Hash) -> Result<Option<u64>, QuillStorageError> {
        Ok(self
            .get(digest)
            .await
            .map_err(|error| error.into())?
            .map(|bytes| bytes.len() as u64))
    }

    async fn erase(&mut self, digest: &Blake3Hash) -> Result<bool, QuillStorageError> {
        self.delete(digest).await.map_err(|error| error.into())
    }
}
