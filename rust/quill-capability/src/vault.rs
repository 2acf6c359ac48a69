use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use async_stream::try_stream;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{Stream, StreamExt, pin_mut};
use hkdf::Hkdf;
use quill_common::ConditionalSync;
use quill_storage::{KeyRange, QuillStorageError, ScanDirection, StorageSource};
use sha2::Sha256;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::VaultError;

/// PBKDF2 rounds applied to the vault password unless configured otherwise
pub const DEFAULT_KDF_ITERATIONS: u32 = 250_000;

const SALT_LENGTH: usize = 16;
const IV_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;

const CHECK_PLAINTEXT: &[u8] = b"quill vault check";
const RECORD_KEY_INFO: &[u8] = b"quill vault record";

type MasterKey = [u8; KEY_LENGTH];

/// How a [Vault] is named and unlocked
#[derive(Clone)]
pub struct VaultConfig {
    /// Prefixes every storage key the vault writes, so several vaults may
    /// share a backend
    pub namespace: String,
    /// The password the master key is derived from
    pub password: String,
    /// PBKDF2-HMAC-SHA256 rounds
    pub kdf_iterations: u32,
}

impl VaultConfig {
    /// A configuration with the default iteration count
    pub fn new(namespace: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            password: password.into(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }

    /// Override the PBKDF2 iteration count
    pub fn with_kdf_iterations(mut self, kdf_iterations: u32) -> Self {
        self.kdf_iterations = kdf_iterations;
        self
    }
}

impl Debug for VaultConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("namespace", &self.namespace)
            .field("kdf_iterations", &self.kdf_iterations)
            .finish_non_exhaustive()
    }
}

/// The kinds of record a [Vault] holds. Each kind lives under its own key
/// prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// An encoded identity keypair
    IdentityKeypair,
    /// An encoded share keypair
    ShareKeypair,
    /// An encoded read capability pack
    ReadCapability,
    /// An encoded write capability pack
    WriteCapability,
}

impl RecordKind {
    /// Every kind
    pub const ALL: [RecordKind; 4] = [
        RecordKind::IdentityKeypair,
        RecordKind::ShareKeypair,
        RecordKind::ReadCapability,
        RecordKind::WriteCapability,
    ];

    /// The name used in storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::IdentityKeypair => "identitykeypair",
            RecordKind::ShareKeypair => "sharekeypair",
            RecordKind::ReadCapability => "read",
            RecordKind::WriteCapability => "write",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records encrypted at rest under a password.
///
/// The master key is stretched from the password the first time any
/// operation needs it and kept for the life of the vault (and its clones).
/// A wrong password fails that derivation, and every later operation fails
/// with the same error.
///
/// Each record is `salt(16) || iv(12) || ciphertext`, sealed with AES-256-GCM
/// under a key expanded from the master key and the record's salt, and stored
/// under `<namespace>_<kind>_<base64(blake3(ciphertext))>`.
#[derive(Clone)]
pub struct Vault<Backend> {
    backend: Backend,
    config: Arc<VaultConfig>,
    master_key: Arc<OnceCell<Result<MasterKey, VaultError>>>,
}

impl<Backend> Vault<Backend>
where
    Backend: StorageSource<Key = Vec<u8>, Value = Vec<u8>> + ConditionalSync,
{
    /// Open a vault over `backend`. Nothing is read until the first operation.
    pub fn open(backend: Backend, config: VaultConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            master_key: Arc::new(OnceCell::new()),
        }
    }

    /// The namespace prefixing this vault's storage keys
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Derive the master key now, failing if the password is wrong
    pub async fn ready(&self) -> Result<(), VaultError> {
        self.master_key().await.map(|_| ())
    }

    async fn master_key(&self) -> Result<MasterKey, VaultError> {
        self.master_key
            .get_or_init(|| self.unlock())
            .await
            .clone()
    }

    fn check_key(&self) -> Vec<u8> {
        format!("{}_vault_check", self.config.namespace).into_bytes()
    }

    fn prefix(&self, kind: RecordKind) -> Vec<u8> {
        format!("{}_{}_", self.config.namespace, kind).into_bytes()
    }

    async fn unlock(&self) -> Result<MasterKey, VaultError> {
        let check_key = self.check_key();

        match self.backend.get(&check_key).await.map_err(storage_error)? {
            Some(record) => {
                if record.len() < SALT_LENGTH {
                    return Err(VaultError::Decryption(
                        "vault check record is truncated".into(),
                    ));
                }
                let (salt, sealed) = record.split_at(SALT_LENGTH);
                let master_key = stretch(&self.config, salt)?;
                match open_sealed(&master_key, sealed) {
                    Ok(plaintext) if plaintext == CHECK_PLAINTEXT => Ok(master_key),
                    _ => Err(VaultError::WrongPassword),
                }
            }
            None => {
                let salt = random_bytes::<SALT_LENGTH>()?;
                let master_key = stretch(&self.config, &salt)?;

                let mut record = salt.to_vec();
                record.extend(seal(&master_key, CHECK_PLAINTEXT)?);
                self.backend
                    .clone()
                    .set(check_key, record)
                    .await
                    .map_err(storage_error)?;

                debug!("Created vault '{}'", self.config.namespace);
                Ok(master_key)
            }
        }
    }

    /// Encrypt and store `plaintext` as a record of `kind`, returning its
    /// storage key
    pub async fn put(&mut self, kind: RecordKind, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let master_key = self.master_key().await?;

        let salt = random_bytes::<SALT_LENGTH>()?;
        let sealed = seal(&record_key(&master_key, &salt)?, plaintext)?;

        let mut key = self.prefix(kind);
        key.extend(STANDARD.encode(blake3::hash(&sealed[IV_LENGTH..]).as_bytes()).into_bytes());

        let mut record = salt.to_vec();
        record.extend(sealed);
        self.backend
            .set(key.clone(), record)
            .await
            .map_err(storage_error)?;

        Ok(key)
    }

    /// Stream the decrypted records of `kind` in storage key order, paired
    /// with their storage keys. Records that fail to decrypt are skipped.
    pub fn records(
        &self,
        kind: RecordKind,
    ) -> impl Stream<Item = Result<(Vec<u8>, Vec<u8>), VaultError>> {
        try_stream! {
            let master_key = self.master_key().await?;
            let scan = self
                .backend
                .scan(KeyRange::prefix(&self.prefix(kind)), ScanDirection::Forward);
            pin_mut!(scan);

            while let Some(item) = scan.next().await {
                let (key, record) = item.map_err(storage_error)?;
                match open_record(&master_key, &record) {
                    Ok(plaintext) => yield (key, plaintext),
                    Err(error) => warn!(
                        "Skipping {kind} record {}: {error}",
                        String::from_utf8_lossy(&key)
                    ),
                }
            }
        }
    }

    /// Remove the record stored under `key`
    pub async fn delete(&mut self, key: &Vec<u8>) -> Result<bool, VaultError> {
        self.master_key().await?;
        self.backend.delete(key).await.map_err(storage_error)
    }

    /// Remove every record of this vault, including the password check. The
    /// password must be correct.
    ///
    /// A key prefix can also match records of another vault whose namespace
    /// extends this one (`a_read_` covers the vault `a_read`), so only the
    /// records that open under this vault's key are removed.
    pub async fn wipe(mut self) -> Result<(), VaultError> {
        let master_key = self.master_key().await?;

        for kind in RecordKind::ALL {
            let mut keys = Vec::new();
            {
                let scan = self
                    .backend
                    .scan(KeyRange::prefix(&self.prefix(kind)), ScanDirection::Forward);
                pin_mut!(scan);
                while let Some(item) = scan.next().await {
                    let (key, record) = item.map_err(storage_error)?;
                    if open_record(&master_key, &record).is_ok() {
                        keys.push(key);
                    }
                }
            }
            for key in keys {
                self.backend.delete(&key).await.map_err(storage_error)?;
            }
        }

        let check_key = self.check_key();
        self.backend
            .delete(&check_key)
            .await
            .map_err(storage_error)?;

        debug!("Wiped vault '{}'", self.config.namespace);
        Ok(())
    }
}

fn storage_error<E: Into<QuillStorageError>>(error: E) -> VaultError {
    VaultError::from(error.into())
}

fn random_bytes<const N: usize>() -> Result<[u8; N], VaultError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|error| VaultError::Rng(error.to_string()))?;
    Ok(bytes)
}

fn stretch(config: &VaultConfig, salt: &[u8]) -> Result<MasterKey, VaultError> {
    if config.kdf_iterations == 0 {
        return Err(VaultError::KeyDerivation(
            "at least one iteration is required".into(),
        ));
    }
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        config.password.as_bytes(),
        salt,
        config.kdf_iterations,
        &mut key,
    );
    Ok(key)
}

fn record_key(master_key: &MasterKey, salt: &[u8]) -> Result<[u8; KEY_LENGTH], VaultError> {
    let mut key = [0u8; KEY_LENGTH];
    Hkdf::<Sha256>::new(Some(salt), master_key)
        .expand(RECORD_KEY_INFO, &mut key)
        .map_err(|error| VaultError::KeyDerivation(error.to_string()))?;
    Ok(key)
}

/// `iv || ciphertext`
fn seal(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|error| VaultError::Encryption(format!("Failed to create cipher: {error}")))?;

    let iv = random_bytes::<IV_LENGTH>()?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|error| VaultError::Encryption(error.to_string()))?;

    let mut sealed = iv.to_vec();
    sealed.extend(ciphertext);
    Ok(sealed)
}

fn open_sealed(key: &[u8; KEY_LENGTH], sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
    if sealed.len() < IV_LENGTH {
        return Err(VaultError::Decryption("ciphertext too short".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|error| VaultError::Decryption(format!("Failed to create cipher: {error}")))?;

    let (iv, ciphertext) = sealed.split_at(IV_LENGTH);
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|error| VaultError::Decryption(error.to_string()))
}

fn open_record(master_key: &MasterKey, record: &[u8]) -> Result<Vec<u8>, VaultError> {
    if record.len() < SALT_LENGTH {
        return Err(VaultError::Decryption("record too short".into()));
    }
    let (salt, sealed) = record.split_at(SALT_LENGTH);
    open_sealed(&record_key(master_key, salt)?, sealed)
}
