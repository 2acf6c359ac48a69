#![warn(missing_docs)]

//! Capabilities that authorise reads and writes to quill shares.
//!
//! A [Capability] grants an [AccessMode] over an [Area] of a share: a set of
//! subspaces (identities), a path prefix and a [TimeRange]. Capabilities are
//! rooted either in a communal share, where any identity may mint one over its
//! own subspace, or in an owned share, where the share's keypair signs the
//! root. Each holder may delegate a capability onwards, and delegation can
//! only narrow the granted area.
//!
//! Owned read capabilities over every subspace must travel with a
//! [SubspaceCapability]; the two are bundled in a [CapabilityPack].
//!
//! Writes are proven with an [AuthorisationToken]: a write capability plus
//! the receiver's signature over the encoded [Entry]. The [Auth] credential
//! store keeps keypairs and capabilities encrypted at rest in a [Vault] and
//! selects capabilities for new writes.

mod error;
pub use error::*;

mod time_range;
pub use time_range::*;

mod area;
pub use area::*;

mod delegation;
pub use delegation::*;

mod capability;
pub use capability::*;

mod subspace;
pub use subspace::*;

mod pack;
pub use pack::*;

mod entry;
pub use entry::*;

mod token;
pub use token::*;

mod vault;
pub use vault::*;

mod auth;
pub use auth::*;
