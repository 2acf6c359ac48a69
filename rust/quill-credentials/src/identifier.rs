use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use quill_common::{ByteReader, ValidationError, decode_base32, encode_base32};

use crate::Signature;

/// The length in bytes of an identifier's public key
pub const KEY_LENGTH: usize = 32;

/// Parameters that distinguish one class of identifier from another.
pub trait IdentifierClass: Copy + Default + Debug + Send + Sync + 'static {
    /// The shortest legal shortname
    const MIN_SHORTNAME_LENGTH: usize;
    /// The longest legal shortname, and the fixed width of the encoded
    /// shortname field
    const MAX_SHORTNAME_LENGTH: usize;
    /// A human name for the class, used in error messages
    const NAME: &'static str;

    /// The sigil an identifier with this key displays with
    fn sigil(key: &[u8; KEY_LENGTH]) -> char;
}

/// Marker for identifiers of writers and readers (subspaces).
#[derive(Clone, Copy, Default, Debug)]
pub struct IdentityClass;

impl IdentifierClass for IdentityClass {
    const MIN_SHORTNAME_LENGTH: usize = 4;
    const MAX_SHORTNAME_LENGTH: usize = 4;
    const NAME: &'static str = "identity";

    fn sigil(_key: &[u8; KEY_LENGTH]) -> char {
        '@'
    }
}

/// Marker for identifiers of shares (namespaces).
#[derive(Clone, Copy, Default, Debug)]
pub struct ShareClass;

impl IdentifierClass for ShareClass {
    const MIN_SHORTNAME_LENGTH: usize = 1;
    const MAX_SHORTNAME_LENGTH: usize = 15;
    const NAME: &'static str = "share";

    fn sigil(key: &[u8; KEY_LENGTH]) -> char {
        if is_communal_key(key) { '+' } else { '-' }
    }
}

pub(crate) fn is_communal_key(key: &[u8; KEY_LENGTH]) -> bool {
    key[KEY_LENGTH - 1] & 1 == 1
}

/// An identifier of a writer or reader
pub type IdentityId = Identifier<IdentityClass>;

/// An identifier of a share (namespace)
pub type ShareId = Identifier<ShareClass>;

/// A shortname plus a 32-byte public key.
///
/// Identifiers order by their encoded bytes: shortname first (a shorter name
/// orders before any name it is a prefix of), then key.
pub struct Identifier<C: IdentifierClass> {
    shortname: String,
    key: [u8; KEY_LENGTH],
    class: PhantomData<C>,
}

/// Check a shortname against the length bounds of `C` and the `[a-z0-9]`
/// charset. The first character may not be a digit.
pub fn validate_shortname<C: IdentifierClass>(shortname: &str) -> Result<(), ValidationError> {
    let reject = |reason: String| ValidationError::InvalidShortname {
        shortname: shortname.to_owned(),
        reason,
    };

    let length = shortname.len();
    if length < C::MIN_SHORTNAME_LENGTH || length > C::MAX_SHORTNAME_LENGTH {
        return Err(reject(
            if C::MIN_SHORTNAME_LENGTH == C::MAX_SHORTNAME_LENGTH {
                format!(
                    "{} shortnames must be exactly {} characters",
                    C::NAME,
                    C::MAX_SHORTNAME_LENGTH
                )
            } else {
                format!(
                    "{} shortnames must be {} to {} characters",
                    C::NAME,
                    C::MIN_SHORTNAME_LENGTH,
                    C::MAX_SHORTNAME_LENGTH
                )
            },
        ));
    }

    if let Some(invalid) = shortname
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
    {
        return Err(reject(format!("'{invalid}' is not in [a-z0-9]")));
    }

    if shortname.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(reject("the first character may not be a digit".into()));
    }

    Ok(())
}

impl<C: IdentifierClass> Identifier<C> {
    /// Pair a validated shortname with a public key
    pub fn new(shortname: &str, key: [u8; KEY_LENGTH]) -> Result<Self, ValidationError> {
        validate_shortname::<C>(shortname)?;
        Ok(Self {
            shortname: shortname.to_owned(),
            key,
            class: PhantomData,
        })
    }

    /// The human-readable part
    pub fn shortname(&self) -> &str {
        &self.shortname
    }

    /// The public key
    pub fn key(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// The display sigil
    pub fn sigil(&self) -> char {
        C::sigil(&self.key)
    }

    /// Verify that `signature` was made over `message` by the secret half of
    /// this identifier's key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;

        let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&self.key) else {
            return false;
        };
        verifying_key
            .verify(message, &ed25519_dalek::Signature::from(*signature))
            .is_ok()
    }

    /// Append the fixed-layout encoding: the shortname bytes, a single NUL
    /// when the shortname is shorter than the class maximum, then the key.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.shortname.as_bytes());
        if self.shortname.len() < C::MAX_SHORTNAME_LENGTH {
            out.push(0);
        }
        out.extend_from_slice(&self.key);
    }

    /// The fixed-layout encoding as a fresh buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(C::MAX_SHORTNAME_LENGTH + KEY_LENGTH);
        self.encode_into(&mut out);
        out
    }

    /// Decode an identifier from the front of `reader`
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let window = reader.remaining();
        let limit = window.len().min(C::MAX_SHORTNAME_LENGTH);
        let (shortname_length, consumed) = match window[..limit].iter().position(|b| *b == 0) {
            Some(nul) => (nul, nul + 1),
            None => (C::MAX_SHORTNAME_LENGTH, C::MAX_SHORTNAME_LENGTH),
        };

        let shortname = reader.take(shortname_length)?;
        reader.advance(consumed - shortname_length)?;
        let shortname = std::str::from_utf8(shortname).map_err(|_| {
            ValidationError::InvalidIdentifier(format!("{} shortname is not UTF-8", C::NAME))
        })?;
        let key = reader.read_array::<KEY_LENGTH>()?;

        Self::new(shortname, key)
    }

    /// Decode an identifier from the front of `bytes`, returning it with the
    /// number of bytes it occupied
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize), ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let identifier = Self::decode_from(&mut reader)?;
        Ok((identifier, reader.offset()))
    }

    /// Decode an identifier that occupies all of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut reader = ByteReader::new(bytes);
        let identifier = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(identifier)
    }

    /// The identifier immediately after this one with the same shortname
    /// length, or `None` if this is the greatest. Used as an exclusive upper
    /// bound when scanning ranges of identifiers; the result is not required
    /// to be a usable key.
    pub fn successor(&self) -> Option<Self> {
        let mut key = self.key;
        for byte in key.iter_mut().rev() {
            if *byte == u8::MAX {
                *byte = 0;
            } else {
                *byte += 1;
                return Some(Self {
                    shortname: self.shortname.clone(),
                    key,
                    class: PhantomData,
                });
            }
        }

        next_shortname(&self.shortname).map(|shortname| Self {
            shortname,
            key: [0u8; KEY_LENGTH],
            class: PhantomData,
        })
    }
}

impl Identifier<ShareClass> {
    /// Whether anyone may write to this share in their own subspace without
    /// the owner's signature
    pub fn is_communal(&self) -> bool {
        is_communal_key(&self.key)
    }
}

/// The next shortname of the same length in byte order, where the first
/// character ranges over `a-z` and the others over `0-9a-z`.
fn next_shortname(shortname: &str) -> Option<String> {
    let mut bytes = shortname.as_bytes().to_vec();
    for index in (0..bytes.len()).rev() {
        let next = match bytes[index] {
            b'z' => continue,
            b'9' => b'a',
            other => other + 1,
        };
        bytes[index] = next;
        for following in bytes.iter_mut().skip(index + 1) {
            *following = b'0';
        }
        return String::from_utf8(bytes).ok();
    }
    None
}

impl<C: IdentifierClass> Clone for Identifier<C> {
    fn clone(&self) -> Self {
        Self {
            shortname: self.shortname.clone(),
            key: self.key,
            class: PhantomData,
        }
    }
}

impl<C: IdentifierClass> PartialEq for Identifier<C> {
    fn eq(&self, other: &Self) -> bool {
        self.shortname == other.shortname && self.key == other.key
    }
}

impl<C: IdentifierClass> Eq for Identifier<C> {}

impl<C: IdentifierClass> Hash for Identifier<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shortname.hash(state);
        self.key.hash(state);
    }
}

impl<C: IdentifierClass> Ord for Identifier<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shortname
            .as_bytes()
            .cmp(other.shortname.as_bytes())
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl<C: IdentifierClass> PartialOrd for Identifier<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: IdentifierClass> Display for Identifier<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}.{}",
            self.sigil(),
            self.shortname,
            encode_base32(&self.key)
        )
    }
}

impl<C: IdentifierClass> Debug for Identifier<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl<C: IdentifierClass> FromStr for Identifier<C> {
    type Err = ValidationError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            ValidationError::InvalidIdentifier(format!("'{address}' {reason}"))
        };

        let mut chars = address.chars();
        let sigil = chars.next().ok_or_else(|| invalid("is empty"))?;
        let (shortname, encoded_key) = chars
            .as_str()
            .split_once('.')
            .ok_or_else(|| invalid("has no '.' separator"))?;

        let key: [u8; KEY_LENGTH] = decode_base32(encoded_key)
            .ok_or_else(|| invalid("has a key that is not base32"))?
            .try_into()
            .map_err(|_| invalid("has a key that is not 32 bytes"))?;

        let identifier = Self::new(shortname, key)?;

        if identifier.sigil() != sigil {
            return Err(match sigil {
                '@' | '+' | '-' => ValidationError::SigilMismatch {
                    sigil,
                    address: address.to_owned(),
                },
                _ => invalid("has an unknown sigil"),
            });
        }

        Ok(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn identity(shortname: &str, fill: u8) -> IdentityId {
        IdentityId::new(shortname, [fill; KEY_LENGTH]).unwrap()
    }

    fn share_key(communal: bool) -> [u8; KEY_LENGTH] {
        let mut key = [0x42u8; KEY_LENGTH];
        key[KEY_LENGTH - 1] = if communal { 0x43 } else { 0x42 };
        key
    }

    #[test]
    fn it_validates_shortnames() {
        assert!(validate_shortname::<IdentityClass>("suzy").is_ok());
        assert!(validate_shortname::<IdentityClass>("suz").is_err());
        assert!(validate_shortname::<IdentityClass>("suzie").is_err());
        assert!(validate_shortname::<IdentityClass>("Suzy").is_err());
        assert!(validate_shortname::<IdentityClass>("1uzy").is_err());
        assert!(validate_shortname::<IdentityClass>("s1zy").is_ok());

        assert!(validate_shortname::<ShareClass>("a").is_ok());
        assert!(validate_shortname::<ShareClass>("gardening123456").is_ok());
        assert!(validate_shortname::<ShareClass>("gardening1234567").is_err());
        assert!(validate_shortname::<ShareClass>("").is_err());
        assert!(validate_shortname::<ShareClass>("gar-den").is_err());
    }

    #[test]
    fn it_round_trips_the_byte_encoding() -> Result<()> {
        let id = identity("suzy", 7);
        let bytes = id.encode();
        assert_eq!(bytes.len(), 4 + KEY_LENGTH);
        assert_eq!(IdentityId::decode(&bytes)?, id);

        let share = ShareId::new("gardens", share_key(true))?;
        let bytes = share.encode();
        assert_eq!(bytes.len(), "gardens".len() + 1 + KEY_LENGTH);
        assert_eq!(bytes["gardens".len()], 0);
        assert_eq!(ShareId::decode(&bytes)?, share);

        let full = ShareId::new("abcdefghijklmno", share_key(false))?;
        assert_eq!(full.encode().len(), 15 + KEY_LENGTH);
        assert_eq!(ShareId::decode(&full.encode())?, full);
        Ok(())
    }

    #[test]
    fn it_decodes_identifiers_embedded_in_larger_buffers() -> Result<()> {
        let share = ShareId::new("gardens", share_key(true))?;
        let id = identity("suzy", 9);
        let mut bytes = share.encode();
        id.encode_into(&mut bytes);

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(ShareId::decode_from(&mut reader)?, share);
        assert_eq!(IdentityId::decode_from(&mut reader)?, id);
        reader.finish()?;

        let (decoded, consumed) = ShareId::decode_prefix(&bytes)?;
        assert_eq!(decoded, share);
        assert_eq!(consumed, share.encode().len());
        Ok(())
    }

    #[test]
    fn it_round_trips_the_display_form() -> Result<()> {
        let id = identity("suzy", 1);
        let address = id.to_string();
        assert!(address.starts_with("@suzy."));
        assert_eq!(address.parse::<IdentityId>()?, id);

        let communal = ShareId::new("gardens", share_key(true))?;
        assert!(communal.to_string().starts_with("+gardens."));
        assert_eq!(communal.to_string().parse::<ShareId>()?, communal);

        let owned = ShareId::new("gardens", share_key(false))?;
        assert!(owned.to_string().starts_with("-gardens."));
        assert!(!owned.is_communal());
        Ok(())
    }

    #[test]
    fn it_rejects_a_sigil_that_contradicts_the_communal_bit() -> Result<()> {
        let owned = ShareId::new("gardens", share_key(false))?;
        let forged = owned.to_string().replacen('-', "+", 1);

        assert!(matches!(
            forged.parse::<ShareId>(),
            Err(ValidationError::SigilMismatch { sigil: '+', .. })
        ));
        assert!(
            owned
                .to_string()
                .replacen('-', "@", 1)
                .parse::<ShareId>()
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn it_orders_by_shortname_then_key() {
        assert!(identity("aaaa", 9) < identity("aaab", 0));
        assert!(identity("suzy", 1) < identity("suzy", 2));

        let short = ShareId::new("abc", share_key(true)).unwrap();
        let long = ShareId::new("abcd", share_key(true)).unwrap();
        assert!(short < long);
        assert!(short.encode() < long.encode());
    }

    #[test]
    fn it_finds_successors() {
        let id = identity("suzy", 1);
        let next = id.successor().unwrap();
        let mut expected = [1u8; KEY_LENGTH];
        expected[KEY_LENGTH - 1] = 2;
        assert_eq!(next.key(), &expected);
        assert!(next > id);

        let rollover = identity("suz9", 0xff).successor().unwrap();
        assert_eq!(rollover.shortname(), "suza");
        assert_eq!(rollover.key(), &[0u8; KEY_LENGTH]);

        let carry = identity("sazz", 0xff).successor().unwrap();
        assert_eq!(carry.shortname(), "sb00");

        assert!(identity("zzzz", 0xff).successor().is_none());
    }

    #[test]
    fn it_rejects_malformed_addresses() {
        assert!("".parse::<IdentityId>().is_err());
        assert!("@suzy".parse::<IdentityId>().is_err());
        assert!("@suzy.notbase32!".parse::<IdentityId>().is_err());
        assert!("@suzy.aaaa".parse::<IdentityId>().is_err());
    }
}
