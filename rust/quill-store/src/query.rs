use quill_capability::Entry;
use quill_common::Path;
use quill_credentials::IdentityId;

/// The order in which documents are listed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DocumentOrder {
    /// By path, then timestamp, then identity
    #[default]
    Path,
    /// By timestamp, then identity, then path
    Timestamp,
    /// By identity, then path
    Identity,
}

/// Selects documents. The default query selects every document in path
/// order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Only documents at or below this path
    pub path_prefix: Option<Path>,
    /// Only documents written as this identity
    pub identity: Option<IdentityId>,
    /// Only documents written at or after this timestamp
    pub timestamp_gte: Option<u64>,
    /// Only documents written before this timestamp
    pub timestamp_lt: Option<u64>,
    /// Stop after this many documents
    pub limit: Option<usize>,
    /// Stop before the payload sizes of the listed documents would add up to
    /// more than this many bytes
    pub max_size: Option<u64>,
    /// The listing order
    pub order: DocumentOrder,
    /// List in descending order
    pub descending: bool,
}

impl DocumentQuery {
    /// Only select documents at or below `path_prefix`
    pub fn with_path_prefix(mut self, path_prefix: Path) -> Self {
        self.path_prefix = Some(path_prefix);
        self
    }

    /// Only select documents written as `identity`
    pub fn with_identity(mut self, identity: IdentityId) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Only select documents with timestamps in `[gte, lt)`
    pub fn with_timestamps(mut self, gte: Option<u64>, lt: Option<u64>) -> Self {
        self.timestamp_gte = gte;
        self.timestamp_lt = lt;
        self
    }

    /// List at most `limit` documents
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// List documents whose payloads add up to at most `max_size` bytes
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// List in `order`, descending if `descending`
    pub fn with_order(mut self, order: DocumentOrder, descending: bool) -> Self {
        self.order = order;
        self.descending = descending;
        self
    }

    pub(crate) fn matches(&self, entry: &Entry) -> bool {
        if let Some(path_prefix) = &self.path_prefix {
            if !path_prefix.is_prefix_of(&entry.path) {
                return false;
            }
        }
        if let Some(identity) = &self.identity {
            if identity != &entry.subspace {
                return false;
            }
        }
        if let Some(gte) = self.timestamp_gte {
            if entry.timestamp < gte {
                return false;
            }
        }
        if let Some(lt) = self.timestamp_lt {
            if entry.timestamp >= lt {
                return false;
            }
        }
        true
    }
}
