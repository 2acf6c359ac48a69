use quill_common::Blake3Hash;

use crate::Document;

/// A change to a [crate::Store], delivered to every subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// A local write succeeded
    DocumentSet {
        /// The written document
        document: Document,
    },
    /// An entry from elsewhere was accepted
    EntryIngest {
        /// The accepted document
        document: Document,
    },
    /// A payload from elsewhere was stored
    PayloadIngest {
        /// The document whose payload arrived
        document: Document,
    },
    /// A document was replaced or pruned. Its path is the removed path.
    EntryRemoved {
        /// The document that was removed
        removed: Document,
        /// The newer document that caused the removal
        cause: Document,
    },
    /// The last document referencing a payload was removed, so the payload
    /// was erased
    PayloadRemoved {
        /// The erased payload's digest
        digest: Blake3Hash,
        /// The document that last referenced it
        removed: Document,
        /// The newer document that caused the removal
        cause: Document,
    },
}
