use quill_common::Path;

use crate::{Document, StoreError};

/// Knobs for a single [crate::Store::set]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// The write's timestamp in microseconds since the Unix epoch. Defaults
    /// to the current time.
    pub timestamp: Option<u64>,
    /// Allow the write to prune older documents below its path
    pub permit_pruning: bool,
}

impl SetOptions {
    /// Write at `timestamp` instead of the current time
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Allow or forbid pruning older documents below the written path
    pub fn with_pruning(mut self, permit_pruning: bool) -> Self {
        self.permit_pruning = permit_pruning;
        self
    }
}

/// Why a write changed nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoOpReason {
    /// A write at least as recent already exists at the same path, or at an
    /// ancestor path, of the same subspace
    ObsoleteFromSameSubspace,
}

/// Why a write was refused
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetFailure {
    /// The entry could not be built or authorised
    InvalidEntry(StoreError),
}

/// The result of a write. Every expected outcome is a value; only storage
/// and credential failures are errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// The document was written
    Success {
        /// The written document
        document: Document,
        /// The paths of the older documents below it that were removed
        pruned: Vec<Path>,
    },
    /// The write was already superseded
    NoOp(NoOpReason),
    /// The write would have removed these documents, and pruning was not
    /// permitted
    PruningPrevented {
        /// The documents that would have been pruned
        documents: Vec<Document>,
    },
    /// The write was refused
    Failure(SetFailure),
}

impl SetOutcome {
    /// The written document, if the write succeeded
    pub fn document(&self) -> Option<&Document> {
        match self {
            SetOutcome::Success { document, .. } => Some(document),
            _ => None,
        }
    }

    /// Whether the write succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, SetOutcome::Success { .. })
    }
}
