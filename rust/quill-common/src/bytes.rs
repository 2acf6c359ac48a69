//! Helpers for the fixed-layout byte encodings used by identifiers,
//! capabilities and entries.

use crate::ValidationError;

/// A cursor over a borrowed byte slice that decodes big-endian integers and
/// fixed-size arrays, failing with [`ValidationError::InvalidEncoding`] when
/// the input runs short.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// How many bytes have been consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The bytes that have not been consumed yet
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }

    /// Whether every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    /// Consume exactly `length` bytes
    pub fn take(&mut self, length: usize) -> Result<&'a [u8], ValidationError> {
        let end = self
            .offset
            .checked_add(length)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ValidationError::InvalidEncoding(format!(
                    "expected {length} more bytes at offset {}, found {}",
                    self.offset,
                    self.bytes.len().saturating_sub(self.offset)
                ))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// Skip `length` bytes that were decoded elsewhere
    pub fn advance(&mut self, length: usize) -> Result<(), ValidationError> {
        self.take(length).map(|_| ())
    }

    /// Consume a fixed-size array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ValidationError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    /// Consume one byte
    pub fn read_u8(&mut self) -> Result<u8, ValidationError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Consume a big-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16, ValidationError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Consume a big-endian `u64`
    pub fn read_u64(&mut self) -> Result<u64, ValidationError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Fail unless every byte has been consumed
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidEncoding(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )))
        }
    }
}
