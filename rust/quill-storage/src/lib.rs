#![warn(missing_docs)]

//! Storage interfaces that the quill store and credential vault are built
//! upon.
//!
//! A [StorageBackend] is an ordered key-value store that can [StorageSource::scan]
//! a [KeyRange] lazily in either direction. A [PayloadStore] holds
//! content-addressed payload bytes keyed by their [quill_common::Blake3Hash];
//! every [StorageBackend] keyed by digests is a [PayloadStore] for free.
//!
//! Only in-memory drivers ship here ([MemoryStorageBackend],
//! [MemoryPayloadStore]). Persistent drivers implement the same traits.

mod error;
pub use error::*;

mod storage;
pub use storage::*;

mod payload;
pub use payload::*;
