use std::ops::Bound;

use futures_util::Stream;

use crate::StorageBackend;

/// The order in which a [StorageSource::scan] visits keys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending key order
    #[default]
    Forward,
    /// Descending key order
    Reverse,
}

/// A range of keys with independently bounded ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange<Key> {
    /// The lower bound
    pub start: Bound<Key>,
    /// The upper bound
    pub end: Bound<Key>,
}

impl<Key> KeyRange<Key> {
    /// A range between the given bounds
    pub fn new(start: Bound<Key>, end: Bound<Key>) -> Self {
        Self { start, end }
    }

    /// A range covering every key
    pub fn full() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Whether `key` lies within the range
    pub fn contains(&self, key: &Key) -> bool
    where
        Key: Ord,
    {
        let above_start = match &self.start {
            Bound::Included(start) => key >= start,
            Bound::Excluded(start) => key > start,
            Bound::Unbounded => true,
        };
        let below_end = match &self.end {
            Bound::Included(end) => key <= end,
            Bound::Excluded(end) => key < end,
            Bound::Unbounded => true,
        };
        above_start && below_end
    }
}

impl KeyRange<Vec<u8>> {
    /// A range covering every key that starts with `prefix`
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: Bound::Included(prefix.to_vec()),
            end: prefix_upper_bound(prefix).map_or(Bound::Unbounded, Bound::Excluded),
        }
    }
}

/// The smallest byte string greater than every string starting with
/// `prefix`, or `None` when no such string exists (the prefix is empty or all
/// `0xff`).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

/// A trait that may be implemented by any [`StorageBackend`] whose keys are
/// ordered, so that ranges of them can be visited lazily.
pub trait StorageSource: StorageBackend {
    /// Stream the entries whose keys fall within `range`, in `direction`
    /// order. Entries are fetched as the stream is polled; writes that land
    /// ahead of the stream's position are observed.
    fn scan(
        &self,
        range: KeyRange<<Self as StorageBackend>::Key>,
        direction: ScanDirection,
    ) -> impl Stream<
        Item = Result<
            (
                <Self as StorageBackend>::Key,
                <Self as StorageBackend>::Value,
            ),
            <Self as StorageBackend>::Error,
        >,
    >;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_bounds_prefix_ranges() {
        assert_eq!(prefix_upper_bound(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_upper_bound(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
        assert_eq!(prefix_upper_bound(&[]), None);

        let range = KeyRange::prefix(&[1, 0xff]);
        assert!(range.contains(&vec![1, 0xff]));
        assert!(range.contains(&vec![1, 0xff, 0xff, 7]));
        assert!(!range.contains(&vec![2]));
        assert!(!range.contains(&vec![1, 0xfe, 9]));
    }
}
