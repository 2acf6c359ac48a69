use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use quill_credentials::{IdentityId, Signature};

/// One step of a delegation chain: `grant` handed to `user`, signed by the
/// previous receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation<Grant> {
    /// What was granted
    pub grant: Grant,
    /// Who it was granted to
    pub user: IdentityId,
    /// The previous receiver's signature over the handover
    pub signature: Signature,
}

struct Link<Grant> {
    delegation: Delegation<Grant>,
    previous: Option<Arc<Link<Grant>>>,
}

/// An append-only chain of delegations. Appending yields a new chain that
/// shares every earlier step with the chain it was appended to; no chain is
/// ever modified.
pub struct DelegationChain<Grant> {
    head: Option<Arc<Link<Grant>>>,
    len: usize,
}

impl<Grant> DelegationChain<Grant> {
    /// The empty chain
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// The number of delegations
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been delegated
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The most recent delegation
    pub fn last(&self) -> Option<&Delegation<Grant>> {
        self.head.as_ref().map(|link| &link.delegation)
    }

    /// A new chain with `delegation` appended
    pub fn with(&self, delegation: Delegation<Grant>) -> Self {
        Self {
            head: Some(Arc::new(Link {
                delegation,
                previous: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The delegations, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Delegation<Grant>> {
        let mut steps = Vec::with_capacity(self.len);
        let mut link = self.head.as_deref();
        while let Some(current) = link {
            steps.push(&current.delegation);
            link = current.previous.as_deref();
        }
        steps.into_iter().rev()
    }
}

impl<Grant> Default for DelegationChain<Grant> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Grant> Clone for DelegationChain<Grant> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<Grant: PartialEq> PartialEq for DelegationChain<Grant> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<Grant: Eq> Eq for DelegationChain<Grant> {}

impl<Grant: Debug> Debug for DelegationChain<Grant> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
