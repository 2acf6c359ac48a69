#![warn(missing_docs)]

//! Identifiers and key material for quill.
//!
//! Two classes of public-key identifier exist: an [`IdentityId`] names a
//! writer or reader, and a [`ShareId`] names a namespace. Both are a short
//! human-readable name plus a 32-byte Ed25519 public key, displayed as
//! `sigil || shortname || "." || base32(key)`:
//!
//! | Sigil | Class |
//! |-------|-------|
//! | `@` | identity |
//! | `+` | communal share |
//! | `-` | owned share |
//!
//! Whether a share is communal or owned is decided by the low bit of the
//! last key byte, fixed when its [`ShareKeypair`] is generated.

mod error;
pub use error::*;

mod identifier;
pub use identifier::*;

mod keypair;
pub use keypair::*;

mod signature;
pub use self::signature::*;
