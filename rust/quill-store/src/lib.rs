#![warn(missing_docs)]

//! A multi-writer document store for one quill share.
//!
//! Documents are addressed by the identity that wrote them and a [Path].
//! Each write is checked against the capabilities held in a
//! [quill_capability::Auth] credential store and recorded with the
//! [quill_capability::AuthorisationToken] that proves it, so that it can be
//! handed to other peers and verified there ([Store::ingest]).
//!
//! Conflicts are settled by last writer wins: the entry with the greater
//! timestamp stays, and equal timestamps are ordered by payload digest and
//! then payload length so that every peer keeps the same entry. A write at a
//! path also prunes the older documents of the same identity below that
//! path.
//!
//! ```no_run
//! # use quill_capability::{AccessMode, Auth, VaultConfig};
//! # use quill_common::Path;
//! # use quill_credentials::{IdentityKeypair, ShareKeypair};
//! # use quill_storage::{MemoryPayloadStore, MemoryStorageBackend};
//! # use quill_store::{SetOptions, Store};
//! # async fn example() -> anyhow::Result<()> {
//! let share = ShareKeypair::generate("gardens", true)?;
//! let suzy = IdentityKeypair::generate("suzy")?;
//!
//! let mut auth = Auth::new(
//!     MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default(),
//!     VaultConfig::new("gardens", "a long password"),
//! );
//! auth.add_identity_keypair(suzy.clone()).await?;
//! auth.mint_full(share.id(), suzy.id(), AccessMode::Write, true)
//!     .await?;
//!
//! let mut store = Store::new(
//!     share.id().clone(),
//!     MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default(),
//!     MemoryPayloadStore::default(),
//!     auth,
//! );
//! let outcome = store
//!     .set(
//!         suzy.id(),
//!         &Path::from_ascii(["blog", "hello"])?,
//!         b"Hello, world".to_vec(),
//!         SetOptions::default(),
//!     )
//!     .await?;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod key;

mod document;
pub use document::{Document, Payload};

mod outcome;
pub use outcome::*;

mod query;
pub use query::*;

mod event;
pub use event::*;

mod store;
pub use store::*;
