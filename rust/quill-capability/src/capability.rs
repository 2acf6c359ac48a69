use quill_common::{ByteReader, Path, ValidationError};
use quill_credentials::{IdentityId, IdentityKeypair, ShareId, ShareKeypair, Signature};

use crate::{Area, Delegation, DelegationChain, Restriction};

/// The most delegation steps a capability may carry; the encoding counts
/// them in a single byte
pub const MAX_DELEGATIONS: usize = u8::MAX as usize;

/// What a capability permits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccessMode {
    /// Reading documents
    Read = 0,
    /// Writing documents
    Write = 1,
}

impl AccessMode {
    fn decode(byte: u8) -> Result<Self, ValidationError> {
        match byte {
            0 => Ok(AccessMode::Read),
            1 => Ok(AccessMode::Write),
            other => Err(ValidationError::InvalidEncoding(format!(
                "unknown access mode {other}"
            ))),
        }
    }
}

/// How a capability's authority is established
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityRoot {
    /// The share is communal: any identity holds authority over its own
    /// subspace
    Communal,
    /// The share is owned: its keypair signed the root
    Owned {
        /// The share's signature over the access mode and first user
        initial_authorisation: Signature,
    },
}

/// An unforgeable grant of read or write access to an area of a share,
/// together with the chain of delegations that handed it to its current
/// receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    access_mode: AccessMode,
    namespace: ShareId,
    user: IdentityId,
    root: CapabilityRoot,
    chain: DelegationChain<Area>,
}

impl Capability {
    /// Mint a capability over `user`'s own subspace of a communal share
    pub fn new_communal(
        namespace: ShareId,
        user: IdentityId,
        access_mode: AccessMode,
    ) -> Result<Self, ValidationError> {
        if !namespace.is_communal() {
            return Err(ValidationError::InvalidCapability(format!(
                "{namespace} is owned, so capabilities must be signed by its keypair"
            )));
        }
        Ok(Self {
            access_mode,
            namespace,
            user,
            root: CapabilityRoot::Communal,
            chain: DelegationChain::new(),
        })
    }

    /// Mint a capability over the whole of an owned share, signed by the
    /// share's keypair
    pub fn new_owned(
        namespace: &ShareKeypair,
        user: IdentityId,
        access_mode: AccessMode,
    ) -> Result<Self, ValidationError> {
        if namespace.id().is_communal() {
            return Err(ValidationError::InvalidCapability(format!(
                "{} is communal and has no owner to sign capabilities",
                namespace.id()
            )));
        }
        let initial_authorisation = namespace.sign(&owned_root_message(access_mode, &user));
        Ok(Self {
            access_mode,
            namespace: namespace.id().clone(),
            user,
            root: CapabilityRoot::Owned {
                initial_authorisation,
            },
            chain: DelegationChain::new(),
        })
    }

    /// The access this capability grants
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// The share this capability applies to
    pub fn namespace(&self) -> &ShareId {
        &self.namespace
    }

    /// The identity the capability was first minted for
    pub fn user(&self) -> &IdentityId {
        &self.user
    }

    /// How the capability's authority is established
    pub fn root(&self) -> &CapabilityRoot {
        &self.root
    }

    /// The delegations since minting
    pub fn chain(&self) -> &DelegationChain<Area> {
        &self.chain
    }

    /// Whether the share is communal
    pub fn is_communal(&self) -> bool {
        matches!(self.root, CapabilityRoot::Communal)
    }

    /// The identity currently holding the capability
    pub fn receiver(&self) -> &IdentityId {
        self.chain
            .last()
            .map_or(&self.user, |delegation| &delegation.user)
    }

    /// The area the current receiver may access
    pub fn granted_area(&self) -> Area {
        self.chain
            .last()
            .map_or_else(|| self.root_area(), |delegation| delegation.grant.clone())
    }

    /// How many times the capability has been delegated
    pub fn delegated_times(&self) -> usize {
        self.chain.len()
    }

    /// Whether the position `(subspace, path, timestamp)` is within the
    /// granted area
    pub fn includes(&self, subspace: &IdentityId, path: &Path, timestamp: u64) -> bool {
        self.granted_area().includes(subspace, path, timestamp)
    }

    fn root_area(&self) -> Area {
        match self.root {
            CapabilityRoot::Communal => Area::subspace(self.user.clone()),
            CapabilityRoot::Owned { .. } => Area::full(),
        }
    }

    /// The bytes that the first handover signs over before the area and new
    /// user are appended
    fn root_handover(&self) -> Vec<u8> {
        match &self.root {
            CapabilityRoot::Communal => {
                let mut out = vec![self.access_mode as u8];
                self.namespace.encode_into(&mut out);
                self.user.encode_into(&mut out);
                out
            }
            CapabilityRoot::Owned {
                initial_authorisation,
            } => initial_authorisation.bytes().to_vec(),
        }
    }

    fn handover_message(previous: &[u8], area: &Area, user: &IdentityId) -> Vec<u8> {
        let mut message = previous.to_vec();
        area.encode_into(&mut message);
        user.encode_into(&mut message);
        message
    }

    /// Hand the capability to `to`, narrowed by `restriction`. `holder` must
    /// be the current receiver, and the chain may not grow past
    /// [MAX_DELEGATIONS]. The area is checked before anything is signed, and
    /// `self` is left as it was.
    pub fn delegate(
        &self,
        holder: &IdentityKeypair,
        to: &IdentityId,
        restriction: &Restriction,
    ) -> Result<Capability, ValidationError> {
        if holder.id() != self.receiver() {
            return Err(ValidationError::NotReceiver {
                holder: holder.id().to_string(),
                receiver: self.receiver().to_string(),
            });
        }
        check_chain_length(self.chain.len())?;

        let area = self.granted_area().restrict(restriction)?;

        let previous = match self.chain.last() {
            Some(delegation) => delegation.signature.bytes().to_vec(),
            None => self.root_handover(),
        };
        let signature = holder.sign(&Self::handover_message(&previous, &area, to));

        Ok(Capability {
            chain: self.chain.with(Delegation {
                grant: area,
                user: to.clone(),
                signature,
            }),
            ..self.clone()
        })
    }

    /// Verify the root signature and every delegation step. Never fails;
    /// any defect yields `false`.
    pub fn is_valid(&self) -> bool {
        match &self.root {
            CapabilityRoot::Communal if !self.namespace.is_communal() => return false,
            CapabilityRoot::Communal => (),
            CapabilityRoot::Owned {
                initial_authorisation,
            } => {
                if self.namespace.is_communal()
                    || !self.namespace.verify(
                        &owned_root_message(self.access_mode, &self.user),
                        initial_authorisation,
                    )
                {
                    return false;
                }
            }
        }

        let mut area = self.root_area();
        let mut receiver = &self.user;
        let mut previous = self.root_handover();

        for delegation in self.chain.iter() {
            if !area.includes_area(&delegation.grant) {
                return false;
            }
            let message = Self::handover_message(&previous, &delegation.grant, &delegation.user);
            if !receiver.verify(&message, &delegation.signature) {
                return false;
            }
            area = delegation.grant.clone();
            receiver = &delegation.user;
            previous = delegation.signature.bytes().to_vec();
        }

        true
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(match self.root {
            CapabilityRoot::Communal => 0,
            CapabilityRoot::Owned { .. } => 1,
        });
        out.push(self.access_mode as u8);
        self.namespace.encode_into(out);
        self.user.encode_into(out);
        if let CapabilityRoot::Owned {
            initial_authorisation,
        } = &self.root
        {
            out.extend_from_slice(initial_authorisation.bytes());
        }
        out.push(self.chain.len() as u8);
        for delegation in self.chain.iter() {
            delegation.grant.encode_into(out);
            delegation.user.encode_into(out);
            out.extend_from_slice(delegation.signature.bytes());
        }
    }

    /// The canonical byte encoding
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let kind = reader.read_u8()?;
        let access_mode = AccessMode::decode(reader.read_u8()?)?;
        let namespace = ShareId::decode_from(reader)?;
        let user = IdentityId::decode_from(reader)?;
        let root = match kind {
            0 => CapabilityRoot::Communal,
            1 => CapabilityRoot::Owned {
                initial_authorisation: Signature::decode_from(reader)?,
            },
            other => {
                return Err(ValidationError::InvalidEncoding(format!(
                    "unknown capability kind {other}"
                )));
            }
        };

        let mut chain = DelegationChain::new();
        for _ in 0..reader.read_u8()? {
            let grant = Area::decode_from(reader)?;
            let user = IdentityId::decode_from(reader)?;
            let signature = Signature::decode_from(reader)?;
            chain = chain.with(Delegation {
                grant,
                user,
                signature,
            });
        }

        Ok(Self {
            access_mode,
            namespace,
            user,
            root,
            chain,
        })
    }

    /// Decode a capability produced by [`Capability::encode`]. Decoding does
    /// not validate signatures; see [`Capability::is_valid`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let capability = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(capability)
    }
}

pub(crate) fn check_chain_length(len: usize) -> Result<(), ValidationError> {
    if len >= MAX_DELEGATIONS {
        return Err(ValidationError::InvalidCapability(format!(
            "already delegated {len} times, the most a capability can carry"
        )));
    }
    Ok(())
}

fn owned_root_message(access_mode: AccessMode, user: &IdentityId) -> Vec<u8> {
    let mut message = vec![access_mode as u8];
    user.encode_into(&mut message);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AreaSubspace, TimeRange};
    use anyhow::Result;

    fn identity(shortname: &str, seed: u8) -> Result<IdentityKeypair> {
        Ok(IdentityKeypair::from_seed(shortname, [seed; 32])?)
    }

    fn path(components: &[&str]) -> Result<Path> {
        Ok(Path::from_ascii(components)?)
    }

    #[test]
    fn it_grants_a_communal_minter_only_their_own_subspace() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let capability =
            Capability::new_communal(share.id().clone(), suzy.id().clone(), AccessMode::Write)?;

        assert!(capability.is_valid());
        assert_eq!(capability.granted_area(), Area::subspace(suzy.id().clone()));
        assert_eq!(capability.receiver(), suzy.id());
        assert_eq!(capability.delegated_times(), 0);

        let owned = ShareKeypair::from_seed("gardens", false, [9; 32])?;
        assert!(
            Capability::new_communal(owned.id().clone(), suzy.id().clone(), AccessMode::Write)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn it_grants_an_owned_minter_the_whole_share() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let capability = Capability::new_owned(&share, suzy.id().clone(), AccessMode::Read)?;

        assert!(capability.is_valid());
        assert_eq!(capability.granted_area(), Area::full());
        Ok(())
    }

    #[test]
    fn it_narrows_on_delegation() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let gary = identity("gary", 2)?;
        let mina = identity("mina", 3)?;

        let root = Capability::new_owned(&share, suzy.id().clone(), AccessMode::Write)?;
        let to_gary = root.delegate(
            &suzy,
            gary.id(),
            &Restriction::default().with_path_prefix(path(&["x"])?),
        )?;

        assert!(to_gary.is_valid());
        assert_eq!(to_gary.delegated_times(), 1);
        assert_eq!(to_gary.receiver(), gary.id());
        assert_eq!(root.delegated_times(), 0);

        assert!(matches!(
            to_gary.delegate(
                &gary,
                mina.id(),
                &Restriction::default().with_path_prefix(path(&["y"])?)
            ),
            Err(ValidationError::AreaWidened(_))
        ));

        let to_mina = to_gary.delegate(
            &gary,
            mina.id(),
            &Restriction::default()
                .with_path_prefix(path(&["x", "y"])?)
                .with_subspace(mina.id().clone())
                .with_times(TimeRange::closed(0, 1000)?),
        )?;
        assert!(to_mina.is_valid());
        assert_eq!(to_mina.delegated_times(), 2);
        assert_eq!(
            to_mina.granted_area().subspace,
            AreaSubspace::Id(mina.id().clone())
        );
        Ok(())
    }

    #[test]
    fn it_refuses_delegation_by_anyone_but_the_receiver() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let gary = identity("gary", 2)?;
        let capability =
            Capability::new_communal(share.id().clone(), suzy.id().clone(), AccessMode::Write)?;

        assert!(matches!(
            capability.delegate(&gary, gary.id(), &Restriction::default()),
            Err(ValidationError::NotReceiver { .. })
        ));
        Ok(())
    }

    #[test]
    fn it_detects_a_tampered_chain() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let gary = identity("gary", 2)?;
        let mallory = identity("malo", 4)?;

        let delegated = Capability::new_owned(&share, suzy.id().clone(), AccessMode::Write)?
            .delegate(
                &suzy,
                gary.id(),
                &Restriction::default().with_path_prefix(path(&["x"])?),
            )?;

        let Some(step) = delegated.chain().last() else {
            anyhow::bail!("expected a delegation step");
        };
        let widened = Capability {
            chain: DelegationChain::new().with(Delegation {
                grant: Area::full(),
                ..step.clone()
            }),
            ..delegated.clone()
        };
        assert!(!widened.is_valid());

        let forged_root = Capability {
            root: CapabilityRoot::Owned {
                initial_authorisation: mallory.sign(b"anything"),
            },
            ..delegated.clone()
        };
        assert!(!forged_root.is_valid());
        Ok(())
    }

    #[test]
    fn it_stops_delegating_when_the_chain_is_full() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;
        let suzy = identity("suzy", 1)?;

        let mut capability = Capability::new_owned(&share, suzy.id().clone(), AccessMode::Write)?;
        for _ in 0..MAX_DELEGATIONS {
            capability = capability.delegate(&suzy, suzy.id(), &Restriction::default())?;
        }
        assert_eq!(capability.delegated_times(), MAX_DELEGATIONS);
        assert!(capability.is_valid());

        let decoded = Capability::decode(&capability.encode())?;
        assert_eq!(decoded, capability);
        assert!(decoded.is_valid());

        assert!(matches!(
            capability.delegate(&suzy, suzy.id(), &Restriction::default()),
            Err(ValidationError::InvalidCapability(_))
        ));
        Ok(())
    }

    #[test]
    fn it_round_trips_the_capability_encoding() -> Result<()> {
        let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;
        let suzy = identity("suzy", 1)?;
        let gary = identity("gary", 2)?;
        let capability =
            Capability::new_communal(share.id().clone(), suzy.id().clone(), AccessMode::Read)?
                .delegate(
                    &suzy,
                    gary.id(),
                    &Restriction::default().with_times(TimeRange::open(10)),
                )?;

        let decoded = Capability::decode(&capability.encode())?;
        assert_eq!(decoded, capability);
        assert!(decoded.is_valid());
        Ok(())
    }
}
