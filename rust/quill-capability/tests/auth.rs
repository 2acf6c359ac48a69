use anyhow::Result;
use futures_util::TryStreamExt;
use quill_capability::{
    AccessMode, Area, AreaSubspace, Auth, AuthError, CapabilityPack, CapabilityQuery, Entry,
    Restriction, VaultConfig, VaultError, is_authorised_write,
};
use quill_common::{AuthorisationError, Blake3Hash, Path};
use quill_credentials::{IdentityKeypair, ShareKeypair};
use quill_storage::MemoryStorageBackend;

type Backend = MemoryStorageBackend<Vec<u8>, Vec<u8>>;

fn config(password: &str) -> VaultConfig {
    VaultConfig::new("auth", password).with_kdf_iterations(16)
}

fn open(backend: &Backend) -> Auth<Backend> {
    Auth::new(backend.clone(), config("correct horse"))
}

fn entry_at(
    namespace: &ShareKeypair,
    subspace: &IdentityKeypair,
    path: &[&str],
    timestamp: u64,
) -> Result<Entry> {
    Ok(Entry {
        namespace: namespace.id().clone(),
        subspace: subspace.id().clone(),
        path: Path::from_ascii(path)?,
        timestamp,
        payload_length: 5,
        payload_digest: Blake3Hash::hash(b"hello"),
    })
}

#[tokio::test]
async fn it_stores_keypairs_once() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;

    auth.add_identity_keypair(suzy.clone()).await?;
    auth.add_identity_keypair(suzy.clone()).await?;
    auth.add_share_keypair(share.clone()).await?;

    let identities: Vec<_> = auth.identity_keypairs().try_collect().await?;
    assert_eq!(identities, vec![suzy.clone()]);
    assert_eq!(auth.identity_keypair(suzy.id()).await?, Some(suzy));
    assert_eq!(auth.share_keypair(share.id()).await?, Some(share));

    let gary = IdentityKeypair::from_seed("gary", [2; 32])?;
    assert_eq!(auth.identity_keypair(gary.id()).await?, None);
    Ok(())
}

#[tokio::test]
async fn it_mints_communal_capabilities_without_a_share_secret() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;
    auth.add_identity_keypair(suzy.clone()).await?;

    let pack = auth
        .mint_full(share.id(), suzy.id(), AccessMode::Write, true)
        .await?;
    assert!(pack.is_valid());
    assert_eq!(pack.granted_area(), Area::subspace(suzy.id().clone()));

    let stored: Vec<_> = auth
        .capabilities(CapabilityQuery::default().with_namespace(share.id().clone()))
        .try_collect()
        .await?;
    assert_eq!(stored, vec![pack.clone()]);

    auth.store_capability(pack).await?;
    let stored: Vec<CapabilityPack> = auth
        .capabilities(CapabilityQuery::default())
        .try_collect()
        .await?;
    assert_eq!(stored.len(), 1);
    Ok(())
}

#[tokio::test]
async fn it_requires_the_share_keypair_to_mint_owned_capabilities() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;
    auth.add_identity_keypair(suzy.clone()).await?;

    assert!(matches!(
        auth.mint_full(share.id(), suzy.id(), AccessMode::Write, false)
            .await,
        Err(AuthError::Authorisation(
            AuthorisationError::MissingShareKeypair(_)
        ))
    ));

    auth.add_share_keypair(share.clone()).await?;
    let read = auth
        .mint_full(share.id(), suzy.id(), AccessMode::Read, true)
        .await?;
    assert!(read.is_valid());
    assert_eq!(read.granted_area(), Area::full());
    assert!(read.subspace_capability().is_some());
    Ok(())
}

#[tokio::test]
async fn it_refuses_to_store_capabilities_for_identities_it_does_not_hold() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let gary = IdentityKeypair::from_seed("gary", [2; 32])?;
    let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;

    assert!(matches!(
        auth.mint_full(share.id(), gary.id(), AccessMode::Write, true)
            .await,
        Err(AuthError::Authorisation(
            AuthorisationError::MissingIdentityKeypair(_)
        ))
    ));

    let unpersisted = auth
        .mint_full(share.id(), gary.id(), AccessMode::Write, false)
        .await?;
    assert!(unpersisted.is_valid());
    Ok(())
}

#[tokio::test]
async fn it_filters_capabilities_by_namespace_mode_and_position() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let gardens = ShareKeypair::from_seed("gardens", true, [9; 32])?;
    let recipes = ShareKeypair::from_seed("recipes", true, [8; 32])?;
    auth.add_identity_keypair(suzy.clone()).await?;

    auth.mint_full(gardens.id(), suzy.id(), AccessMode::Write, true)
        .await?;
    auth.mint_full(gardens.id(), suzy.id(), AccessMode::Read, true)
        .await?;
    auth.mint_full(recipes.id(), suzy.id(), AccessMode::Write, true)
        .await?;

    let writes: Vec<_> = auth
        .capabilities(
            CapabilityQuery::default()
                .with_namespace(gardens.id().clone())
                .with_access_mode(AccessMode::Write),
        )
        .try_collect()
        .await?;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].access_mode(), AccessMode::Write);
    assert_eq!(writes[0].namespace(), gardens.id());

    let gary = IdentityKeypair::from_seed("gary", [2; 32])?;
    let elsewhere: Vec<_> = auth
        .capabilities(CapabilityQuery::default().including(
            gary.id().clone(),
            Path::empty(),
            0,
        ))
        .try_collect()
        .await?;
    assert!(elsewhere.is_empty());

    let everything: Vec<_> = auth
        .capabilities(CapabilityQuery::default())
        .try_collect()
        .await?;
    assert_eq!(everything.len(), 3);
    Ok(())
}

#[tokio::test]
async fn it_signs_entries_with_the_capability_receiver() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let gary = IdentityKeypair::from_seed("gary", [2; 32])?;
    let share = ShareKeypair::from_seed("gardens", false, [9; 32])?;

    auth.add_identity_keypair(suzy.clone()).await?;
    auth.add_share_keypair(share.clone()).await?;
    let root = auth
        .mint_full(share.id(), suzy.id(), AccessMode::Write, true)
        .await?;

    let entry = entry_at(&share, &suzy, &["blog", "first"], 10)?;
    let Some(token) = auth.best_authorisation(&entry).await? else {
        anyhow::bail!("expected an authorisation");
    };
    assert!(is_authorised_write(&entry, &token));
    assert_eq!(&token.capability, root.capability());

    let again = auth.best_authorisation(&entry).await?;
    assert_eq!(again, Some(token));

    // Gary may only write under /blog in his own subspace
    let for_gary = auth
        .delegate(
            &root,
            gary.id(),
            &Restriction::default()
                .with_subspace(gary.id().clone())
                .with_path_prefix(Path::from_ascii(["blog"])?),
        )
        .await?;
    assert_eq!(for_gary.delegated_times(), 1);
    assert_eq!(
        for_gary.granted_area().subspace,
        AreaSubspace::Id(gary.id().clone())
    );

    let mut garys_auth = Auth::new(Backend::default(), config("gary's password"));
    garys_auth.add_identity_keypair(gary.clone()).await?;
    garys_auth.store_capability(for_gary).await?;

    let inside = entry_at(&share, &gary, &["blog", "second"], 11)?;
    let Some(token) = garys_auth.best_authorisation(&inside).await? else {
        anyhow::bail!("expected an authorisation");
    };
    assert!(is_authorised_write(&inside, &token));

    let outside = entry_at(&share, &gary, &["wiki"], 11)?;
    assert_eq!(garys_auth.best_authorisation(&outside).await?, None);
    Ok(())
}

#[tokio::test]
async fn it_fails_every_operation_after_a_wrong_password() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    auth.add_identity_keypair(suzy.clone()).await?;

    let mut wrong = Auth::new(backend.clone(), config("battery staple"));
    let wrong_password = AuthError::Vault(VaultError::WrongPassword);

    assert_eq!(wrong.ready().await, Err(wrong_password.clone()));
    assert_eq!(
        wrong.identity_keypair(suzy.id()).await,
        Err(wrong_password.clone())
    );
    assert_eq!(
        wrong.add_identity_keypair(suzy.clone()).await,
        Err(wrong_password.clone())
    );
    assert_eq!(wrong.wipe().await, Err(wrong_password));

    assert_eq!(auth.identity_keypair(suzy.id()).await?, Some(suzy));
    Ok(())
}

#[tokio::test]
async fn it_forgets_everything_after_a_wipe() -> Result<()> {
    let backend = Backend::default();
    let mut auth = open(&backend);
    let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?;
    let share = ShareKeypair::from_seed("gardens", true, [9; 32])?;
    auth.add_identity_keypair(suzy.clone()).await?;
    auth.mint_full(share.id(), suzy.id(), AccessMode::Write, true)
        .await?;

    auth.wipe().await?;
    assert!(backend.is_empty().await);

    let fresh = Auth::new(backend.clone(), config("a new password"));
    fresh.ready().await?;
    assert_eq!(fresh.identity_keypair(suzy.id()).await?, None);
    Ok(())
}
