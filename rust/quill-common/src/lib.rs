#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! across the other quill crates: the [`Path`] type that addresses documents
//! and scopes capabilities, the [`Blake3Hash`] payload digest, the error
//! taxonomy and a few cross-target compatibility shims.

mod sync;
pub use sync::*;

mod hash;
pub use hash::*;

mod error;
pub use error::*;

mod bytes;
pub use bytes::*;

pub mod path;
pub use path::Path;

pub mod time;
