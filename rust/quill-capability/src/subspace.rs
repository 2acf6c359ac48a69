use quill_common::{ByteReader, ValidationError};
use quill_credentials::{IdentityId, IdentityKeypair, ShareId, ShareKeypair, Signature};

use crate::capability::check_chain_length;
use crate::{Delegation, DelegationChain};

const SUBSPACE_ROOT_TAG: u8 = 0x02;

/// Proof that its receiver may enumerate every subspace of an owned share.
/// Owned read capabilities that grant access to any subspace are only usable
/// alongside one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubspaceCapability {
    namespace: ShareId,
    user: IdentityId,
    initial_authorisation: Signature,
    chain: DelegationChain<()>,
}

impl SubspaceCapability {
    /// Mint a subspace capability for `user`, signed by the share's keypair
    pub fn new(namespace: &ShareKeypair, user: IdentityId) -> Result<Self, ValidationError> {
        if namespace.id().is_communal() {
            return Err(ValidationError::InvalidCapability(format!(
                "subspace capabilities only exist for owned shares, and {} is communal",
                namespace.id()
            )));
        }
        let initial_authorisation = namespace.sign(&root_message(&user));
        Ok(Self {
            namespace: namespace.id().clone(),
            user,
            initial_authorisation,
            chain: DelegationChain::new(),
        })
    }

    /// The share this capability applies to
    pub fn namespace(&self) -> &ShareId {
        &self.namespace
    }

    /// The identity currently holding the capability
    pub fn receiver(&self) -> &IdentityId {
        self.chain
            .last()
            .map_or(&self.user, |delegation| &delegation.user)
    }

    /// How many times the capability has been delegated
    pub fn delegated_times(&self) -> usize {
        self.chain.len()
    }

    /// Hand the capability to `to`. `holder` must be the current receiver,
    /// and the chain may not grow past [crate::MAX_DELEGATIONS].
    pub fn delegate(
        &self,
        holder: &IdentityKeypair,
        to: &IdentityId,
    ) -> Result<SubspaceCapability, ValidationError> {
        if holder.id() != self.receiver() {
            return Err(ValidationError::NotReceiver {
                holder: holder.id().to_string(),
                receiver: self.receiver().to_string(),
            });
        }
        check_chain_length(self.chain.len())?;

        let signature = holder.sign(&handover_message(self.previous_signature(), to));
        Ok(SubspaceCapability {
            chain: self.chain.with(Delegation {
                grant: (),
                user: to.clone(),
                signature,
            }),
            ..self.clone()
        })
    }

    fn previous_signature(&self) -> &Signature {
        self.chain
            .last()
            .map_or(&self.initial_authorisation, |delegation| {
                &delegation.signature
            })
    }

    /// Verify the root signature and every delegation step
    pub fn is_valid(&self) -> bool {
        if self.namespace.is_communal()
            || !self
                .namespace
                .verify(&root_message(&self.user), &self.initial_authorisation)
        {
            return false;
        }

        let mut receiver = &self.user;
        let mut previous = &self.initial_authorisation;
        for delegation in self.chain.iter() {
            if !receiver.verify(
                &handover_message(previous, &delegation.user),
                &delegation.signature,
            ) {
                return false;
            }
            receiver = &delegation.user;
            previous = &delegation.signature;
        }

        true
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        self.namespace.encode_into(out);
        self.user.encode_into(out);
        out.extend_from_slice(self.initial_authorisation.bytes());
        out.push(self.chain.len() as u8);
        for delegation in self.chain.iter() {
            delegation.user.encode_into(out);
            out.extend_from_slice(delegation.signature.bytes());
        }
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let namespace = ShareId::decode_from(reader)?;
        let user = IdentityId::decode_from(reader)?;
        let initial_authorisation = Signature::decode_from(reader)?;

        let mut chain = DelegationChain::new();
        for _ in 0..reader.read_u8()? {
            let user = IdentityId::decode_from(reader)?;
            let signature = Signature::decode_from(reader)?;
            chain = chain.with(Delegation {
                grant: (),
                user,
                signature,
            });
        }

        Ok(Self {
            namespace,
            user,
            initial_authorisation,
            chain,
        })
    }
}

fn root_message(user: &IdentityId) -> Vec<u8> {
    let mut message = vec![SUBSPACE_ROOT_TAG];
    user.encode_into(&mut message);
    message
}

fn handover_message(previous: &Signature, user: &IdentityId) -> Vec<u8> {
    let mut message = previous.bytes().to_vec();
    user.encode_into(&mut message);
    message
}
