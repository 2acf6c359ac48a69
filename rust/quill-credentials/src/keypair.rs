use std::fmt::{Debug, Formatter};

use ed25519_dalek::SigningKey;
use quill_common::{ByteReader, ValidationError};
use signature::Signer;

use crate::identifier::is_communal_key;
use crate::{
    Identifier, IdentifierClass, IdentityClass, KeypairError, ShareClass, Signature,
    validate_shortname,
};

/// The length in bytes of a keypair's secret half
pub const SECRET_LENGTH: usize = 32;

/// An identifier together with the Ed25519 secret key it was derived from.
pub struct Keypair<C: IdentifierClass> {
    id: Identifier<C>,
    signing_key: SigningKey,
}

/// The keypair of a writer or reader
pub type IdentityKeypair = Keypair<IdentityClass>;

/// The keypair of a share
pub type ShareKeypair = Keypair<ShareClass>;

fn random_seed() -> Result<[u8; SECRET_LENGTH], KeypairError> {
    let mut seed = [0u8; SECRET_LENGTH];
    getrandom::getrandom(&mut seed)?;
    Ok(seed)
}

impl<C: IdentifierClass> Keypair<C> {
    fn from_signing_key(shortname: &str, signing_key: SigningKey) -> Result<Self, ValidationError> {
        let id = Identifier::new(shortname, signing_key.verifying_key().to_bytes())?;
        Ok(Self { id, signing_key })
    }

    /// Rebuild a keypair from an identifier and its secret key, failing if
    /// the two do not belong together.
    pub fn from_parts(
        id: Identifier<C>,
        secret: [u8; SECRET_LENGTH],
    ) -> Result<Self, ValidationError> {
        let signing_key = SigningKey::from_bytes(&secret);
        if signing_key.verifying_key().to_bytes() != *id.key() {
            return Err(ValidationError::InvalidIdentifier(format!(
                "secret key does not belong to {id}"
            )));
        }
        Ok(Self { id, signing_key })
    }

    /// The public identifier
    pub fn id(&self) -> &Identifier<C> {
        &self.id
    }

    /// The secret key bytes
    pub fn secret(&self) -> [u8; SECRET_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Sign `message` with the secret key
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signer::<ed25519_dalek::Signature>::sign(&self.signing_key, message).into()
    }

    /// Encode as the identifier's fixed-layout encoding followed by the
    /// 32-byte secret.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.id.encode();
        out.extend_from_slice(&self.secret());
        out
    }

    /// Decode a keypair produced by [`Keypair::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let id = Identifier::<C>::decode_from(&mut reader)?;
        let secret = reader.read_array::<SECRET_LENGTH>()?;
        reader.finish()?;
        Self::from_parts(id, secret)
    }
}

impl Keypair<IdentityClass> {
    /// Generate a fresh identity keypair
    pub fn generate(shortname: &str) -> Result<Self, KeypairError> {
        validate_shortname::<IdentityClass>(shortname)?;
        let signing_key = SigningKey::from_bytes(&random_seed()?);
        Ok(Self::from_signing_key(shortname, signing_key)?)
    }

    /// Derive an identity keypair deterministically from `seed`
    pub fn from_seed(shortname: &str, seed: [u8; SECRET_LENGTH]) -> Result<Self, ValidationError> {
        Self::from_signing_key(shortname, SigningKey::from_bytes(&seed))
    }
}

impl Keypair<ShareClass> {
    /// Generate a fresh share keypair. Key generation repeats until the
    /// communal bit of the public key matches `communal`.
    pub fn generate(shortname: &str, communal: bool) -> Result<Self, KeypairError> {
        validate_shortname::<ShareClass>(shortname)?;
        loop {
            let signing_key = SigningKey::from_bytes(&random_seed()?);
            if is_communal_key(&signing_key.verifying_key().to_bytes()) == communal {
                return Ok(Self::from_signing_key(shortname, signing_key)?);
            }
        }
    }

    /// Derive a share keypair deterministically from `seed`. The seed is
    /// rehashed until the communal bit of the public key matches `communal`.
    pub fn from_seed(
        shortname: &str,
        communal: bool,
        seed: [u8; SECRET_LENGTH],
    ) -> Result<Self, ValidationError> {
        validate_shortname::<ShareClass>(shortname)?;
        let mut seed = seed;
        loop {
            let signing_key = SigningKey::from_bytes(&seed);
            if is_communal_key(&signing_key.verifying_key().to_bytes()) == communal {
                return Self::from_signing_key(shortname, signing_key);
            }
            seed = *blake3::hash(&seed).as_bytes();
        }
    }
}

impl<C: IdentifierClass> Clone for Keypair<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            signing_key: self.signing_key.clone(),
        }
    }
}

impl<C: IdentifierClass> PartialEq for Keypair<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl<C: IdentifierClass> Eq for Keypair<C> {}

impl<C: IdentifierClass> Debug for Keypair<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn it_signs_and_verifies() -> Result<()> {
        let keypair = IdentityKeypair::generate("suzy")?;
        let signature = keypair.sign(b"hello");

        assert!(keypair.id().verify(b"hello", &signature));
        assert!(!keypair.id().verify(b"goodbye", &signature));

        let other = IdentityKeypair::generate("suzy")?;
        assert!(!other.id().verify(b"hello", &signature));
        Ok(())
    }

    #[test]
    fn it_generates_shares_of_the_requested_kind() -> Result<()> {
        for _ in 0..4 {
            let communal = ShareKeypair::generate("gardens", true)?;
            assert!(communal.id().is_communal());
            assert_eq!(communal.id().sigil(), '+');

            let owned = ShareKeypair::generate("gardens", false)?;
            assert!(!owned.id().is_communal());
            assert_eq!(owned.id().sigil(), '-');
        }
        Ok(())
    }

    #[test]
    fn it_derives_the_same_keypair_from_the_same_seed() -> Result<()> {
        let a = ShareKeypair::from_seed("gardens", false, [3; 32])?;
        let b = ShareKeypair::from_seed("gardens", false, [3; 32])?;
        assert_eq!(a, b);
        assert!(!a.id().is_communal());

        let c = ShareKeypair::from_seed("gardens", true, [3; 32])?;
        assert!(c.id().is_communal());
        assert_ne!(a.id(), c.id());
        Ok(())
    }

    #[test]
    fn it_round_trips_the_keypair_encoding() -> Result<()> {
        let keypair = ShareKeypair::generate("gardens", true)?;
        let decoded = ShareKeypair::decode(&keypair.encode())?;
        assert_eq!(decoded, keypair);
        Ok(())
    }

    #[test]
    fn it_rejects_a_secret_that_does_not_match_the_identifier() -> Result<()> {
        let keypair = IdentityKeypair::generate("suzy")?;
        let other = IdentityKeypair::generate("suzy")?;
        assert!(IdentityKeypair::from_parts(keypair.id().clone(), other.secret()).is_err());
        Ok(())
    }

    #[test]
    fn it_rejects_invalid_shortnames_before_generating() {
        assert!(matches!(
            IdentityKeypair::generate("toolong"),
            Err(KeypairError::Validation(_))
        ));
        assert!(ShareKeypair::generate("9lives", true).is_err());
    }
}
