use std::array::TryFromSliceError;
use std::fmt::{Debug, Display, Formatter};

/// The size of a BLAKE3 hash in bytes.
///
/// BLAKE3 produces 256-bit (32-byte) hashes by default.
pub const BLAKE3_HASH_SIZE: usize = 32;

/// A BLAKE3 cryptographic hash.
///
/// This is the content digest that payloads are addressed by, and the hash
/// that names encrypted credential records. Digests are totally ordered by
/// their bytes, which is what breaks timestamp ties between entries.
///
/// # Examples
///
/// ```rust
/// use quill_common::Blake3Hash;
///
/// let hash = Blake3Hash::hash(b"hello world");
/// assert_eq!(hash, Blake3Hash::hash(b"hello world"));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Blake3Hash([u8; BLAKE3_HASH_SIZE]);

impl Blake3Hash {
    /// Computes the BLAKE3 hash of the given bytes.
    pub fn hash(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// Computes the BLAKE3 hash of a sequence of byte chunks as if they were
    /// one contiguous buffer.
    pub fn hash_iter<'a, I>(bytes: I) -> Self
    where
        I: Iterator<Item = &'a [u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for chunk in bytes {
            hasher.update(chunk);
        }
        Self(hasher.finalize().into())
    }

    /// The raw digest bytes
    pub fn bytes(&self) -> &[u8; BLAKE3_HASH_SIZE] {
        &self.0
    }

    /// The digest in lowercase, unpadded base32
    pub fn to_base32(&self) -> String {
        crate::encode_base32(&self.0)
    }
}

impl From<[u8; 32]> for Blake3Hash {
    fn from(value: [u8; 32]) -> Self {
        Blake3Hash(value)
    }
}

impl TryFrom<&[u8]> for Blake3Hash {
    type Error = TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Blake3Hash(value.try_into()?))
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Blake3Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl Debug for Blake3Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", &self.to_base32()[0..8])
    }
}

/// Encode bytes as lowercase RFC 4648 base32 without padding.
pub fn encode_base32(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, bytes)
}

/// Decode lowercase RFC 4648 base32 without padding. Returns `None` for
/// anything that is not canonical base32 in that alphabet.
pub fn decode_base32(text: &str) -> Option<Vec<u8>> {
    if text.bytes().any(|byte| byte.is_ascii_uppercase()) {
        return None;
    }
    base32::decode(base32::Alphabet::Rfc4648Lower { padding: false }, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_hashes_chunks_like_a_contiguous_buffer() {
        let whole = Blake3Hash::hash(b"hello world");
        let chunked = Blake3Hash::hash_iter([&b"hello "[..], &b"world"[..]].into_iter());
        assert_eq!(whole, chunked);
    }

    #[test]
    fn it_round_trips_base32() {
        let hash = Blake3Hash::hash(b"payload");
        let text = hash.to_base32();
        assert_eq!(decode_base32(&text), Some(hash.bytes().to_vec()));
        assert_eq!(decode_base32(&text.to_uppercase()), None);
    }
}
