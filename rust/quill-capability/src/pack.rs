use quill_common::{ByteReader, ValidationError};
use quill_credentials::{IdentityId, IdentityKeypair, ShareId};

use crate::{AccessMode, Area, AreaSubspace, Capability, Restriction, SubspaceCapability};

const TAG_READ: u8 = 0;
const TAG_READ_WITH_SUBSPACE: u8 = 1;
const TAG_WRITE: u8 = 2;

/// A capability in the shape it is stored, delegated and exchanged in. Owned
/// read capabilities over every subspace carry the [SubspaceCapability] they
/// need to be usable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityPack {
    /// A read capability
    Read {
        /// The read capability
        capability: Capability,
        /// The paired subspace capability, for owned reads over any subspace
        subspace: Option<SubspaceCapability>,
    },
    /// A write capability
    Write {
        /// The write capability
        capability: Capability,
    },
}

impl CapabilityPack {
    /// Wrap a capability, checking that its access mode suits the pack shape
    /// and that an owned read over any subspace has its subspace capability
    pub fn new(
        capability: Capability,
        subspace: Option<SubspaceCapability>,
    ) -> Result<Self, ValidationError> {
        match capability.access_mode() {
            AccessMode::Write => {
                if subspace.is_some() {
                    return Err(ValidationError::InvalidCapability(
                        "write capabilities do not carry a subspace capability".into(),
                    ));
                }
                Ok(CapabilityPack::Write { capability })
            }
            AccessMode::Read => {
                if needs_subspace_capability(&capability, &capability.granted_area())
                    && subspace.is_none()
                {
                    return Err(ValidationError::MissingSubspaceCapability);
                }
                Ok(CapabilityPack::Read {
                    capability,
                    subspace,
                })
            }
        }
    }

    /// The capability itself
    pub fn capability(&self) -> &Capability {
        match self {
            CapabilityPack::Read { capability, .. } | CapabilityPack::Write { capability } => {
                capability
            }
        }
    }

    /// The paired subspace capability, if any
    pub fn subspace_capability(&self) -> Option<&SubspaceCapability> {
        match self {
            CapabilityPack::Read { subspace, .. } => subspace.as_ref(),
            CapabilityPack::Write { .. } => None,
        }
    }

    /// The access the pack grants
    pub fn access_mode(&self) -> AccessMode {
        match self {
            CapabilityPack::Read { .. } => AccessMode::Read,
            CapabilityPack::Write { .. } => AccessMode::Write,
        }
    }

    /// The share the pack applies to
    pub fn namespace(&self) -> &ShareId {
        self.capability().namespace()
    }

    /// The identity currently holding the pack
    pub fn receiver(&self) -> &IdentityId {
        self.capability().receiver()
    }

    /// The area the current receiver may access
    pub fn granted_area(&self) -> Area {
        self.capability().granted_area()
    }

    /// How many times the capability has been delegated
    pub fn delegated_times(&self) -> usize {
        self.capability().delegated_times()
    }

    /// Hand the pack to `to`, narrowed by `restriction`, signing as `holder`.
    /// While the delegated area still covers every subspace, the subspace
    /// capability is delegated alongside; once it names a single subspace the
    /// subspace capability is dropped.
    pub fn delegate(
        &self,
        holder: &IdentityKeypair,
        to: &IdentityId,
        restriction: &Restriction,
    ) -> Result<CapabilityPack, ValidationError> {
        match self {
            CapabilityPack::Write { capability } => Ok(CapabilityPack::Write {
                capability: capability.delegate(holder, to, restriction)?,
            }),
            CapabilityPack::Read {
                capability,
                subspace,
            } => {
                let area = capability.granted_area().restrict(restriction)?;
                let subspace = if needs_subspace_capability(capability, &area) {
                    let Some(subspace) = subspace else {
                        return Err(ValidationError::MissingSubspaceCapability);
                    };
                    Some(subspace.delegate(holder, to)?)
                } else {
                    None
                };

                Ok(CapabilityPack::Read {
                    capability: capability.delegate(holder, to, restriction)?,
                    subspace,
                })
            }
        }
    }

    /// Verify the capability, its shape, and (for owned reads over any
    /// subspace) the paired subspace capability
    pub fn is_valid(&self) -> bool {
        match self {
            CapabilityPack::Write { capability } => {
                capability.access_mode() == AccessMode::Write && capability.is_valid()
            }
            CapabilityPack::Read {
                capability,
                subspace,
            } => {
                if capability.access_mode() != AccessMode::Read || !capability.is_valid() {
                    return false;
                }
                match subspace {
                    Some(subspace) => {
                        subspace.namespace() == capability.namespace()
                            && subspace.receiver() == capability.receiver()
                            && subspace.is_valid()
                    }
                    None => !needs_subspace_capability(capability, &capability.granted_area()),
                }
            }
        }
    }

    /// The pack's byte encoding: a shape tag, the capability, then the
    /// subspace capability if present
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            CapabilityPack::Read {
                capability,
                subspace: None,
            } => {
                out.push(TAG_READ);
                capability.encode_into(&mut out);
            }
            CapabilityPack::Read {
                capability,
                subspace: Some(subspace),
            } => {
                out.push(TAG_READ_WITH_SUBSPACE);
                capability.encode_into(&mut out);
                subspace.encode_into(&mut out);
            }
            CapabilityPack::Write { capability } => {
                out.push(TAG_WRITE);
                capability.encode_into(&mut out);
            }
        }
        out
    }

    /// Decode a pack produced by [`CapabilityPack::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let pack = match reader.read_u8()? {
            TAG_READ => CapabilityPack::Read {
                capability: Capability::decode_from(&mut reader)?,
                subspace: None,
            },
            TAG_READ_WITH_SUBSPACE => CapabilityPack::Read {
                capability: Capability::decode_from(&mut reader)?,
                subspace: Some(SubspaceCapability::decode_from(&mut reader)?),
            },
            TAG_WRITE => CapabilityPack::Write {
                capability: Capability::decode_from(&mut reader)?,
            },
            tag => {
                return Err(ValidationError::InvalidEncoding(format!(
                    "unknown capability pack tag {tag}"
                )));
            }
        };
        reader.finish()?;
        Ok(pack)
    }
}

fn needs_subspace_capability(capability: &Capability, area: &Area) -> bool {
    capability.access_mode() == AccessMode::Read
        && !capability.is_communal()
        && area.subspace == AreaSubspace::Any
}
