//! Hierarchical document addresses.
//!
//! A [`Path`] is an ordered sequence of byte-string components. Paths address
//! documents within a subspace and scope capabilities (as an area's path
//! prefix). The empty path is valid and is a prefix of every path.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::{ByteReader, ValidationError, encode_base32};

/// The maximum number of components in a [`Path`]
pub const MAX_COMPONENT_COUNT: usize = 16;
/// The maximum length in bytes of a single component
pub const MAX_COMPONENT_LENGTH: usize = 64;
/// The maximum summed length in bytes of all components
pub const MAX_PATH_LENGTH: usize = 1024;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xff;
const COMPONENT_END: u8 = 0x01;
const PATH_END: u8 = 0x00;

/// An immutable, bounds-checked sequence of byte-string components.
///
/// Paths order component-wise, and a path orders before every path it is a
/// prefix of.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    components: Vec<Vec<u8>>,
}

impl Path {
    /// The empty path
    pub fn empty() -> Self {
        Self::default()
    }

    /// Construct a path from raw byte components, validating the component
    /// count, component length and total length bounds.
    pub fn new<I, C>(components: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let components: Vec<Vec<u8>> = components.into_iter().map(Into::into).collect();
        Self::check_bounds(&components)?;
        Ok(Self { components })
    }

    /// Construct a path from ASCII components. In addition to the bounds
    /// checked by [`Path::new`], every component may only use the characters
    /// `[A-Za-z0-9._-]`.
    pub fn from_ascii<I, S>(components: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = Vec::new();
        for component in components {
            let component = component.as_ref();
            if let Some(invalid) = component.chars().find(|c| !is_path_char(*c)) {
                return Err(ValidationError::InvalidPath(format!(
                    "component '{component}' contains disallowed character '{invalid}'"
                )));
            }
            raw.push(component.as_bytes().to_vec());
        }
        Self::new(raw)
    }

    fn check_bounds(components: &[Vec<u8>]) -> Result<(), ValidationError> {
        if components.len() > MAX_COMPONENT_COUNT {
            return Err(ValidationError::InvalidPath(format!(
                "{} components exceeds the maximum of {MAX_COMPONENT_COUNT}",
                components.len()
            )));
        }

        let mut total = 0usize;
        for component in components {
            if component.len() > MAX_COMPONENT_LENGTH {
                return Err(ValidationError::InvalidPath(format!(
                    "component of {} bytes exceeds the maximum of {MAX_COMPONENT_LENGTH}",
                    component.len()
                )));
            }
            total += component.len();
        }

        if total > MAX_PATH_LENGTH {
            return Err(ValidationError::InvalidPath(format!(
                "{total} bytes exceeds the maximum path length of {MAX_PATH_LENGTH}"
            )));
        }

        Ok(())
    }

    /// The components of this path, in order
    pub fn components(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.components.iter().map(Vec::as_slice)
    }

    /// The component at `index`, if any
    pub fn component(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(Vec::as_slice)
    }

    /// The number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether this is the empty path
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The summed length in bytes of all components
    pub fn total_length(&self) -> usize {
        self.components.iter().map(Vec::len).sum()
    }

    /// Whether `self` is a prefix of (or equal to) `other`
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(left, right)| left == right)
    }

    /// Whether `other` is a prefix of (or equal to) `self`
    pub fn is_prefixed_by(&self, other: &Path) -> bool {
        other.is_prefix_of(self)
    }

    /// Whether `self` is a prefix of `other` and shorter than it
    pub fn is_strict_prefix_of(&self, other: &Path) -> bool {
        self.components.len() < other.components.len() && self.is_prefix_of(other)
    }

    /// Every strict prefix of this path, shortest first (starting with the
    /// empty path)
    pub fn strict_prefixes(&self) -> impl Iterator<Item = Path> + '_ {
        (0..self.components.len()).map(|length| Path {
            components: self.components[..length].to_vec(),
        })
    }

    /// Concatenate `suffix` onto this path, re-validating the bounds
    pub fn with_suffix(&self, suffix: &Path) -> Result<Path, ValidationError> {
        Path::new(
            self.components
                .iter()
                .chain(suffix.components.iter())
                .cloned(),
        )
    }

    /// Append a single component, re-validating the bounds
    pub fn with_component(&self, component: impl Into<Vec<u8>>) -> Result<Path, ValidationError> {
        let mut components = self.components.clone();
        components.push(component.into());
        Path::new(components)
    }

    /// Format as `/a/b/c`. Returns `None` when any component falls outside
    /// the ASCII path charset. The empty path formats as `/`.
    pub fn format_ascii(&self) -> Option<String> {
        let mut formatted = String::new();
        for component in &self.components {
            let text = std::str::from_utf8(component).ok()?;
            if !text.chars().all(is_path_char) {
                return None;
            }
            formatted.push('/');
            formatted.push_str(text);
        }
        if formatted.is_empty() {
            formatted.push('/');
        }
        Some(formatted)
    }

    /// Format as `/` followed by each component in base32. Always succeeds.
    pub fn format_base32(&self) -> String {
        if self.components.is_empty() {
            return "/".into();
        }
        self.components
            .iter()
            .map(|component| format!("/{}", encode_base32(component)))
            .collect()
    }

    /// Append the order-preserving encoding of this path to `out`.
    ///
    /// Zero bytes are escaped as `00 ff`, each component ends with `00 01`
    /// and the path ends with `00 00`, so that comparing encodings byte-wise
    /// orders paths exactly like [`Ord`] does and no encoding is a prefix of
    /// another.
    pub fn encode_ordered(&self, out: &mut Vec<u8>) {
        self.encode_ordered_components(out);
        out.extend_from_slice(&[ESCAPE, PATH_END]);
    }

    /// Append the order-preserving encoding without the path terminator.
    /// Every path prefixed by `self` has an encoding that starts with these
    /// bytes.
    pub fn encode_ordered_components(&self, out: &mut Vec<u8>) {
        for component in &self.components {
            for byte in component {
                if *byte == 0 {
                    out.extend_from_slice(&[ESCAPE, ESCAPED_ZERO]);
                } else {
                    out.push(*byte);
                }
            }
            out.extend_from_slice(&[ESCAPE, COMPONENT_END]);
        }
    }

    /// Decode a path written by [`Path::encode_ordered`] from the front of
    /// `reader`.
    pub fn decode_ordered(reader: &mut ByteReader<'_>) -> Result<Path, ValidationError> {
        let mut components = Vec::new();
        let mut current = Vec::new();
        loop {
            match reader.read_u8()? {
                ESCAPE => match reader.read_u8()? {
                    ESCAPED_ZERO => current.push(0),
                    COMPONENT_END => components.push(std::mem::take(&mut current)),
                    PATH_END if current.is_empty() => break,
                    other => {
                        return Err(ValidationError::InvalidEncoding(format!(
                            "unexpected escape sequence 00 {other:02x} in path"
                        )));
                    }
                },
                byte => current.push(byte),
            }
        }
        Path::new(components)
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

impl FromStr for Path {
    type Err = ValidationError;

    /// Parse the `/a/b/c` form produced by [`Path::format_ascii`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(ValidationError::InvalidPath(format!(
                "'{s}' does not start with '/'"
            )));
        };
        if rest.is_empty() {
            return Ok(Path::empty());
        }
        Path::from_ascii(rest.split('/'))
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.format_ascii() {
            Some(ascii) => write!(f, "{ascii}"),
            None => write!(f, "{}", self.format_base32()),
        }
    }
}

impl std::fmt::Debug for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Path({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn ordered(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        path.encode_ordered(&mut out);
        out
    }

    #[test]
    fn it_enforces_component_bounds() {
        assert!(Path::new(vec![vec![0u8; MAX_COMPONENT_LENGTH]]).is_ok());
        assert!(Path::new(vec![vec![0u8; MAX_COMPONENT_LENGTH + 1]]).is_err());
        assert!(Path::new(vec![b"a".to_vec(); MAX_COMPONENT_COUNT]).is_ok());
        assert!(Path::new(vec![b"a".to_vec(); MAX_COMPONENT_COUNT + 1]).is_err());
    }

    #[test]
    fn it_enforces_total_length() {
        let components = vec![vec![1u8; MAX_COMPONENT_LENGTH]; MAX_COMPONENT_COUNT];
        assert_eq!(MAX_COMPONENT_LENGTH * MAX_COMPONENT_COUNT, MAX_PATH_LENGTH);
        let path = Path::new(components).unwrap();
        assert!(path.with_component(vec![1u8]).is_err());
    }

    #[test]
    fn it_rejects_characters_outside_the_ascii_charset() {
        assert!(Path::from_ascii(["notes", "2024-01.md"]).is_ok());
        assert!(Path::from_ascii(["with space"]).is_err());
        assert!(Path::from_ascii(["slash/inside"]).is_err());
    }

    #[test]
    fn it_treats_the_empty_path_as_a_universal_prefix() -> Result<()> {
        let empty = Path::empty();
        let deep = Path::from_ascii(["a", "b", "c"])?;
        assert!(empty.is_prefix_of(&deep));
        assert!(empty.is_prefix_of(&empty));
        assert!(deep.is_prefixed_by(&empty));
        assert!(!deep.is_prefix_of(&empty));
        Ok(())
    }

    #[test]
    fn it_distinguishes_strict_prefixes() -> Result<()> {
        let short = Path::from_ascii(["a"])?;
        let long = Path::from_ascii(["a", "b"])?;
        let other = Path::from_ascii(["ab"])?;
        assert!(short.is_strict_prefix_of(&long));
        assert!(!short.is_strict_prefix_of(&short));
        assert!(!short.is_prefix_of(&other));
        Ok(())
    }

    #[test]
    fn it_concatenates_suffixes() -> Result<()> {
        let joined = Path::from_ascii(["x"])?.with_suffix(&Path::from_ascii(["y", "z"])?)?;
        assert_eq!(joined, Path::from_ascii(["x", "y", "z"])?);
        Ok(())
    }

    #[test]
    fn it_formats_ascii_and_base32() -> Result<()> {
        let path = Path::from_ascii(["blog", "post.md"])?;
        assert_eq!(path.format_ascii().as_deref(), Some("/blog/post.md"));
        assert_eq!(Path::empty().format_ascii().as_deref(), Some("/"));
        assert_eq!("/blog/post.md".parse::<Path>()?, path);
        assert_eq!("/".parse::<Path>()?, Path::empty());

        let binary = Path::new(vec![vec![0xffu8, 0x00]])?;
        assert_eq!(binary.format_ascii(), None);
        assert_eq!(binary.format_base32(), "/74aa");
        assert_eq!(binary.to_string(), "/74aa");
        Ok(())
    }

    #[test]
    fn it_orders_encodings_like_paths() -> Result<()> {
        let mut paths = vec![
            Path::empty(),
            Path::from_ascii(["a"])?,
            Path::new(vec![b"a\0".to_vec()])?,
            Path::from_ascii(["a", "b"])?,
            Path::from_ascii(["ab"])?,
            Path::new(vec![Vec::new()])?,
            Path::new(vec![vec![0u8]])?,
            Path::from_ascii(["b"])?,
        ];
        paths.sort();

        let mut encodings: Vec<Vec<u8>> = paths.iter().map(ordered).collect();
        let by_path = encodings.clone();
        encodings.sort();
        assert_eq!(encodings, by_path);
        Ok(())
    }

    #[test]
    fn it_decodes_ordered_encodings() -> Result<()> {
        let path = Path::new(vec![b"a\0b".to_vec(), Vec::new(), b"c".to_vec()])?;
        let mut bytes = ordered(&path);
        bytes.push(42);

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(Path::decode_ordered(&mut reader)?, path);
        assert_eq!(reader.remaining(), &[42]);
        Ok(())
    }

    #[test]
    fn it_prefixes_descendant_encodings_with_the_component_encoding() -> Result<()> {
        let ancestor = Path::from_ascii(["a"])?;
        let mut prefix = Vec::new();
        ancestor.encode_ordered_components(&mut prefix);

        assert!(ordered(&Path::from_ascii(["a", "b"])?).starts_with(&prefix));
        assert!(ordered(&ancestor).starts_with(&prefix));
        assert!(!ordered(&Path::from_ascii(["ab"])?).starts_with(&prefix));
        Ok(())
    }
}
