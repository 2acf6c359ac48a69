use std::fmt::{Display, Formatter};

use quill_common::{ByteReader, ValidationError};

/// A half-open range of microsecond timestamps `[start, end)`. An `end` of
/// `None` leaves the range open towards the future.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeRange {
    /// The first included timestamp
    pub start: u64,
    /// The first excluded timestamp, if any
    pub end: Option<u64>,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::full()
    }
}

impl TimeRange {
    /// Every timestamp
    pub const fn full() -> Self {
        Self {
            start: 0,
            end: None,
        }
    }

    /// Every timestamp from `start` onwards
    pub const fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    /// The timestamps in `[start, end)`. An `end` before `start` is rejected.
    pub fn closed(start: u64, end: u64) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidArea(format!(
                "time range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// Whether `timestamp` falls within the range
    pub fn includes(&self, timestamp: u64) -> bool {
        self.start <= timestamp && self.end.is_none_or(|end| timestamp < end)
    }

    /// Whether every timestamp of `other` falls within the range
    pub fn includes_range(&self, other: &TimeRange) -> bool {
        if other.start < self.start {
            return false;
        }
        match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(end), Some(other_end)) => other_end <= end,
        }
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.start.to_be_bytes());
        match self.end {
            Some(end) => {
                out.push(1);
                out.extend_from_slice(&end.to_be_bytes());
            }
            None => out.push(0),
        }
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, ValidationError> {
        let start = reader.read_u64()?;
        match reader.read_u8()? {
            0 => Ok(Self::open(start)),
            1 => Self::closed(start, reader.read_u64()?),
            flag => Err(ValidationError::InvalidEncoding(format!(
                "unknown time range end flag {flag}"
            ))),
        }
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {end})", self.start),
            None => write!(f, "[{}, ∞)", self.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_treats_the_end_as_exclusive() -> anyhow::Result<()> {
        let range = TimeRange::closed(10, 20)?;
        assert!(!range.includes(9));
        assert!(range.includes(10));
        assert!(range.includes(19));
        assert!(!range.includes(20));
        assert!(TimeRange::open(10).includes(u64::MAX));
        Ok(())
    }

    #[test]
    fn it_treats_an_open_end_as_infinity_when_comparing_ranges() -> anyhow::Result<()> {
        let full = TimeRange::full();
        let closed = TimeRange::closed(10, 20)?;

        assert!(full.includes_range(&closed));
        assert!(full.includes_range(&TimeRange::open(5)));
        assert!(!closed.includes_range(&TimeRange::open(10)));
        assert!(!closed.includes_range(&TimeRange::closed(5, 15)?));
        assert!(!closed.includes_range(&TimeRange::closed(15, 25)?));
        assert!(closed.includes_range(&TimeRange::closed(12, 20)?));
        Ok(())
    }

    #[test]
    fn it_rejects_inverted_ranges() {
        assert!(TimeRange::closed(20, 10).is_err());
        assert!(TimeRange::closed(10, 10).is_ok());
    }
}
