use async_stream::try_stream;
use futures_util::{Stream, StreamExt, pin_mut};
use quill_common::{AuthorisationError, ConditionalSync, Path, ValidationError};
use quill_credentials::{
    Identifier, IdentifierClass, IdentityId, IdentityKeypair, Keypair, ShareId, ShareKeypair,
};
use quill_storage::StorageSource;
use tracing::{debug, trace, warn};

use crate::{
    AccessMode, AuthError, AuthorisationToken, Capability, CapabilityPack, Entry, RecordKind,
    Restriction, SubspaceCapability, Vault, VaultConfig,
};

/// A position that a capability's granted area must include
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityTarget {
    /// The subspace written or read
    pub subspace: IdentityId,
    /// The path written or read
    pub path: Path,
    /// The timestamp written or read
    pub timestamp: u64,
}

/// Selects stored capabilities. An empty query selects everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityQuery {
    /// Only capabilities for this share
    pub namespace: Option<ShareId>,
    /// Only capabilities granting this access
    pub access_mode: Option<AccessMode>,
    /// Only capabilities whose granted area includes this position
    pub target: Option<CapabilityTarget>,
}

impl CapabilityQuery {
    /// Only select capabilities for `namespace`
    pub fn with_namespace(mut self, namespace: ShareId) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Only select capabilities granting `access_mode`
    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = Some(access_mode);
        self
    }

    /// Only select capabilities whose granted area includes the position
    pub fn including(mut self, subspace: IdentityId, path: Path, timestamp: u64) -> Self {
        self.target = Some(CapabilityTarget {
            subspace,
            path,
            timestamp,
        });
        self
    }

    fn kinds(&self) -> &'static [RecordKind] {
        match self.access_mode {
            None => &[RecordKind::ReadCapability, RecordKind::WriteCapability],
            Some(AccessMode::Read) => &[RecordKind::ReadCapability],
            Some(AccessMode::Write) => &[RecordKind::WriteCapability],
        }
    }

    fn matches(&self, pack: &CapabilityPack) -> bool {
        if let Some(namespace) = &self.namespace {
            if pack.namespace() != namespace {
                return false;
            }
        }
        match &self.target {
            Some(target) => {
                pack.granted_area()
                    .includes(&target.subspace, &target.path, target.timestamp)
            }
            None => true,
        }
    }
}

/// The credential store: keypairs and capabilities held encrypted in a
/// [Vault], and the selection of capabilities for new writes.
#[derive(Clone)]
pub struct Auth<Backend> {
    vault: Vault<Backend>,
}

fn kind_of(pack: &CapabilityPack) -> RecordKind {
    match pack.access_mode() {
        AccessMode::Read => RecordKind::ReadCapability,
        AccessMode::Write => RecordKind::WriteCapability,
    }
}

impl<Backend> Auth<Backend>
where
    Backend: StorageSource<Key = Vec<u8>, Value = Vec<u8>> + ConditionalSync,
{
    /// Open the credential store kept in `backend`
    pub fn new(backend: Backend, config: VaultConfig) -> Self {
        Self {
            vault: Vault::open(backend, config),
        }
    }

    /// Unlock the vault now, failing if the password is wrong
    pub async fn ready(&self) -> Result<(), AuthError> {
        Ok(self.vault.ready().await?)
    }

    fn keypairs<C: IdentifierClass>(
        &self,
        kind: RecordKind,
    ) -> impl Stream<Item = Result<Keypair<C>, AuthError>> {
        try_stream! {
            let records = self.vault.records(kind);
            pin_mut!(records);
            while let Some(record) = records.next().await {
                let (_, plaintext) = record?;
                match Keypair::<C>::decode(&plaintext) {
                    Ok(keypair) => yield keypair,
                    Err(error) => warn!("Skipping undecodable {kind} record: {error}"),
                }
            }
        }
    }

    async fn find_keypair<C: IdentifierClass>(
        &self,
        kind: RecordKind,
        id: &Identifier<C>,
    ) -> Result<Option<Keypair<C>>, AuthError> {
        let keypairs = self.keypairs::<C>(kind);
        pin_mut!(keypairs);
        while let Some(keypair) = keypairs.next().await {
            let keypair = keypair?;
            if keypair.id() == id {
                return Ok(Some(keypair));
            }
        }
        Ok(None)
    }

    /// Every stored identity keypair
    pub fn identity_keypairs(&self) -> impl Stream<Item = Result<IdentityKeypair, AuthError>> {
        self.keypairs(RecordKind::IdentityKeypair)
    }

    /// Every stored share keypair
    pub fn share_keypairs(&self) -> impl Stream<Item = Result<ShareKeypair, AuthError>> {
        self.keypairs(RecordKind::ShareKeypair)
    }

    /// The stored keypair for `id`, if held
    pub async fn identity_keypair(
        &self,
        id: &IdentityId,
    ) -> Result<Option<IdentityKeypair>, AuthError> {
        self.find_keypair(RecordKind::IdentityKeypair, id).await
    }

    /// The stored keypair for `id`, if held
    pub async fn share_keypair(&self, id: &ShareId) -> Result<Option<ShareKeypair>, AuthError> {
        self.find_keypair(RecordKind::ShareKeypair, id).await
    }

    /// Store an identity keypair. Storing one that is already held does
    /// nothing.
    pub async fn add_identity_keypair(&mut self, keypair: IdentityKeypair) -> Result<(), AuthError> {
        if self.identity_keypair(keypair.id()).await?.is_some() {
            return Ok(());
        }
        self.vault
            .put(RecordKind::IdentityKeypair, &keypair.encode())
            .await?;
        debug!("Stored identity keypair {}", keypair.id());
        Ok(())
    }

    /// Store a share keypair. Storing one that is already held does nothing.
    pub async fn add_share_keypair(&mut self, keypair: ShareKeypair) -> Result<(), AuthError> {
        if self.share_keypair(keypair.id()).await?.is_some() {
            return Ok(());
        }
        self.vault
            .put(RecordKind::ShareKeypair, &keypair.encode())
            .await?;
        debug!("Stored share keypair {}", keypair.id());
        Ok(())
    }

    /// Mint a capability over everything `for_identity` may be granted in
    /// `namespace`: its own subspace of a communal share, or the whole of an
    /// owned share (which requires the share keypair to be held). Owned read
    /// capabilities come with a subspace capability. With `persist` the pack
    /// is also stored.
    pub async fn mint_full(
        &mut self,
        namespace: &ShareId,
        for_identity: &IdentityId,
        access_mode: AccessMode,
        persist: bool,
    ) -> Result<CapabilityPack, AuthError> {
        let pack = if namespace.is_communal() {
            CapabilityPack::new(
                Capability::new_communal(namespace.clone(), for_identity.clone(), access_mode)?,
                None,
            )?
        } else {
            let Some(share_keypair) = self.share_keypair(namespace).await? else {
                return Err(AuthorisationError::MissingShareKeypair(namespace.to_string()).into());
            };
            let subspace = match access_mode {
                AccessMode::Read => Some(SubspaceCapability::new(
                    &share_keypair,
                    for_identity.clone(),
                )?),
                AccessMode::Write => None,
            };
            CapabilityPack::new(
                Capability::new_owned(&share_keypair, for_identity.clone(), access_mode)?,
                subspace,
            )?
        };

        if persist {
            self.store_capability(pack.clone()).await?;
        }

        Ok(pack)
    }

    /// Store a capability pack. Its receiver's identity keypair must be held,
    /// and the pack must validate. Storing a pack that is already held does
    /// nothing.
    pub async fn store_capability(&mut self, pack: CapabilityPack) -> Result<(), AuthError> {
        if self.identity_keypair(pack.receiver()).await?.is_none() {
            return Err(
                AuthorisationError::MissingIdentityKeypair(pack.receiver().to_string()).into(),
            );
        }
        if !pack.is_valid() {
            return Err(ValidationError::InvalidCapability(format!(
                "{:?} capability for {} does not validate",
                pack.access_mode(),
                pack.receiver()
            ))
            .into());
        }

        let kind = kind_of(&pack);
        let encoded = pack.encode();
        {
            let records = self.vault.records(kind);
            pin_mut!(records);
            while let Some(record) = records.next().await {
                let (_, plaintext) = record?;
                if plaintext == encoded {
                    return Ok(());
                }
            }
        }

        self.vault.put(kind, &encoded).await?;
        debug!(
            "Stored {kind} capability for {} in {}",
            pack.receiver(),
            pack.namespace()
        );
        Ok(())
    }

    /// Stream the stored capability packs selected by `query`, in storage key
    /// order
    pub fn capabilities(
        &self,
        query: CapabilityQuery,
    ) -> impl Stream<Item = Result<CapabilityPack, AuthError>> {
        try_stream! {
            for kind in query.kinds() {
                let records = self.vault.records(*kind);
                pin_mut!(records);
                while let Some(record) = records.next().await {
                    let (_, plaintext) = record?;
                    let pack = match CapabilityPack::decode(&plaintext) {
                        Ok(pack) => pack,
                        Err(error) => {
                            warn!("Skipping undecodable {kind} capability: {error}");
                            continue;
                        }
                    };
                    if query.matches(&pack) {
                        yield pack;
                    }
                }
            }
        }
    }

    /// Delegate `pack` to `to`, signing with the stored keypair of its current
    /// receiver
    pub async fn delegate(
        &self,
        pack: &CapabilityPack,
        to: &IdentityId,
        restriction: &Restriction,
    ) -> Result<CapabilityPack, AuthError> {
        let Some(holder) = self.identity_keypair(pack.receiver()).await? else {
            return Err(
                AuthorisationError::MissingIdentityKeypair(pack.receiver().to_string()).into(),
            );
        };
        Ok(pack.delegate(&holder, to, restriction)?)
    }

    /// Find a stored write capability that covers `entry` and whose receiver's
    /// keypair is held, and sign the entry with that keypair. The first match
    /// in storage key order wins, so the choice is stable for a given store.
    pub async fn best_authorisation(
        &self,
        entry: &Entry,
    ) -> Result<Option<AuthorisationToken>, AuthError> {
        let candidates = self.capabilities(
            CapabilityQuery::default()
                .with_namespace(entry.namespace.clone())
                .with_access_mode(AccessMode::Write)
                .including(entry.subspace.clone(), entry.path.clone(), entry.timestamp),
        );
        pin_mut!(candidates);

        while let Some(pack) = candidates.next().await {
            let pack = pack?;
            let Some(receiver) = self.identity_keypair(pack.receiver()).await? else {
                trace!("No keypair held for receiver {}", pack.receiver());
                continue;
            };
            trace!(
                "Authorising entry at {} with a capability delegated {} times",
                entry.path,
                pack.delegated_times()
            );
            return Ok(Some(AuthorisationToken {
                capability: pack.capability().clone(),
                signature: receiver.sign(&entry.encode()),
            }));
        }

        trace!(
            "No stored capability authorises {} at {}",
            entry.subspace, entry.path
        );
        Ok(None)
    }

    /// Delete every record of the vault. The password must be correct.
    pub async fn wipe(self) -> Result<(), AuthError> {
        Ok(self.vault.wipe().await?)
    }
}
