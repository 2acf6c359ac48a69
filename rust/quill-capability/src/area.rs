use std::fmt::{Display, Formatter};

use quill_common::{ByteReader, Path, ValidationError};
use quill_credentials::IdentityId;

use crate::TimeRange;

/// The subspaces an [Area] covers: all of them, or the one belonging to a
/// single identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AreaSubspace {
    /// Every identity's subspace
    Any,
    /// A single identity's subspace
    Id(IdentityId),
}

impl AreaSubspace {
    /// Whether `subspace` is covered
    pub fn includes(&self, subspace: &IdentityId) -> bool {
        match self {
            AreaSubspace::Any => true,
            AreaSubspace::Id(id) => id == subspace,
        }
    }

    /// Whether every subspace covered by `other` is covered by `self`
    pub fn includes_subspace(&self, other: &AreaSubspace) -> bool {
        match (self, other) {
            (AreaSubspace::Any, _) => true,
            (AreaSubspace::Id(_), AreaSubspace::Any) => false,
            (AreaSubspace::Id(id), AreaSubspace::Id(other)) => id == other,
        }
    }
}

/// A region of a share: a set of subspaces, a path prefix and a time range.
/// Capabilities grant access to an area, and queries select documents within
/// one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Area {
    /// The covered subspaces
    pub subspace: AreaSubspace,
    /// Every covered path is prefixed by this path
    pub path_prefix: Path,
    /// The covered timestamps
    pub times: TimeRange,
}

impl Area {
    /// Construct an area from its parts
    pub fn new(subspace: AreaSubspace, path_prefix: Path, times: TimeRange) -> Self {
        Self {
            subspace,
            path_prefix,
            times,
        }
    }

    /// Every subspace, path and time
    pub fn full() -> Self {
        Self::new(AreaSubspace::Any, Path::empty(), TimeRange::full())
    }

    /// Every path and time of a single subspace
    pub fn subspace(id: IdentityId) -> Self {
        Self::new(AreaSubspace::Id(id), Path::empty(), TimeRange::full())
    }

    /// Whether the position `(subspace, path, timestamp)` lies in the area
    pub fn includes(&self, subspace: &IdentityId, path: &Path, timestamp: u64) -> bool {
        self.subspace.includes(subspace)
            && path.is_prefixed_by(&self.path_prefix)
            && self.times.includes(timestamp)
    }

    /// Whether `other` lies entirely within this area
    pub fn includes_area(&self, other: &Area) -> bool {
        self.subspace.includes_subspace(&other.subspace)
            && other.path_prefix.is_prefixed_by(&self.path_prefix)
            && self.times.includes_range(&other.times)
    }

    /// Narrow this area by `restriction`. Fields the restriction leaves unset
    /// are inherited. Fails if the result would reach outside this area.
    pub fn restrict(&self, restriction: &Restriction) -> Result<Area, ValidationError> {
        let restricted = Area {
            subspace: restriction
                .subspace
                .clone()
                .unwrap_or_else(|| self.subspace.clone()),
            path_prefix: restriction
                .path_prefix
                .clone()
                .unwrap_or_else(|| self.path_prefix.clone()),
            times: restriction.times.unwrap_or(self.times),
        };

        if !self.includes_area(&restricted) {
            return Err(ValidationError::AreaWidened(format!(
                "{restricted} is not within {self}"
            )));
        }

        Ok(restricted)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match &self.subspace {
            AreaSubspace::Any => out.push(0),
            AreaSubspace::Id(id) => {
                out.push(1);
                id.encode_into(out);
            }
        }

        out.push(self.path_prefix.len() as u8);
        for component in self.path_prefix.components() {
            out.extend_from_slice(&(component.len() as u16).to_be_bytes());
            out.extend_from_slice(component);
        }

        self.times.encode_into(out);
    }

    /// The canonical byte encoding, as covered by delegation signatures
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let subspace = match reader.read_u8()? {
            0 => AreaSubspace::Any,
            1 => AreaSubspace::Id(IdentityId::decode_from(reader)?),
            flag => {
                return Err(ValidationError::InvalidEncoding(format!(
                    "unknown area subspace flag {flag}"
                )));
            }
        };

        let count = reader.read_u8()?;
        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let length = reader.read_u16()?;
            components.push(reader.take(length as usize)?.to_vec());
        }
        let path_prefix = Path::new(components)?;

        let times = TimeRange::decode_from(reader)?;

        Ok(Self::new(subspace, path_prefix, times))
    }
}

impl Display for Area {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.subspace {
            AreaSubspace::Any => write!(f, "any subspace")?,
            AreaSubspace::Id(id) => write!(f, "{id}")?,
        }
        write!(f, " under {} during {}", self.path_prefix, self.times)
    }
}

/// How a delegation narrows the granted area. Unset fields keep the value of
/// the area being delegated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Restriction {
    /// The subspaces to grant
    pub subspace: Option<AreaSubspace>,
    /// The path prefix to grant
    pub path_prefix: Option<Path>,
    /// The time range to grant
    pub times: Option<TimeRange>,
}

impl Restriction {
    /// Grant only `id`'s subspace
    pub fn with_subspace(mut self, id: IdentityId) -> Self {
        self.subspace = Some(AreaSubspace::Id(id));
        self
    }

    /// Grant only paths under `path_prefix`
    pub fn with_path_prefix(mut self, path_prefix: Path) -> Self {
        self.path_prefix = Some(path_prefix);
        self
    }

    /// Grant only timestamps in `times`
    pub fn with_times(mut self, times: TimeRange) -> Self {
        self.times = Some(times);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quill_credentials::IdentityKeypair;

    fn suzy() -> Result<IdentityId> {
        Ok(IdentityKeypair::from_seed("suzy", [1; 32])?.id().clone())
    }

    fn path(components: &[&str]) -> Result<Path> {
        Ok(Path::from_ascii(components)?)
    }

    #[test]
    fn it_includes_positions_within_the_area() -> Result<()> {
        let suzy = suzy()?;
        let other = IdentityKeypair::from_seed("gary", [2; 32])?.id().clone();
        let area = Area::new(
            AreaSubspace::Id(suzy.clone()),
            path(&["blog"])?,
            TimeRange::closed(100, 200)?,
        );

        assert!(area.includes(&suzy, &path(&["blog", "post"])?, 150));
        assert!(area.includes(&suzy, &path(&["blog"])?, 100));
        assert!(!area.includes(&other, &path(&["blog"])?, 150));
        assert!(!area.includes(&suzy, &path(&["wiki"])?, 150));
        assert!(!area.includes(&suzy, &path(&["blog"])?, 200));
        Ok(())
    }

    #[test]
    fn it_only_narrows_when_restricting() -> Result<()> {
        let suzy = suzy()?;
        let granted = Area::new(AreaSubspace::Any, path(&["x"])?, TimeRange::open(10));

        let narrowed = granted.restrict(
            &Restriction::default()
                .with_subspace(suzy.clone())
                .with_path_prefix(path(&["x", "y"])?),
        )?;
        assert_eq!(narrowed.subspace, AreaSubspace::Id(suzy));
        assert_eq!(narrowed.path_prefix, path(&["x", "y"])?);
        assert_eq!(narrowed.times, TimeRange::open(10));

        assert!(matches!(
            granted.restrict(&Restriction::default().with_path_prefix(path(&["y"])?)),
            Err(ValidationError::AreaWidened(_))
        ));
        assert!(matches!(
            granted.restrict(&Restriction::default().with_times(TimeRange::full())),
            Err(ValidationError::AreaWidened(_))
        ));
        assert!(
            narrowed
                .restrict(&Restriction {
                    subspace: Some(AreaSubspace::Any),
                    ..Default::default()
                })
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn it_round_trips_the_area_encoding() -> Result<()> {
        let areas = [
            Area::full(),
            Area::subspace(suzy()?),
            Area::new(
                AreaSubspace::Any,
                Path::new(vec![vec![0u8, 1, 2], vec![]])?,
                TimeRange::closed(5, 500)?,
            ),
        ];
        for area in areas {
            let bytes = area.encode();
            let mut reader = ByteReader::new(&bytes);
            assert_eq!(Area::decode_from(&mut reader)?, area);
            reader.finish()?;
        }
        Ok(())
    }
}
