//! The layout of the store's keys. Every key starts with a tag byte that
//! selects one of four families:
//!
//! | Tag    | Key                                    | Value             |
//! |--------|----------------------------------------|-------------------|
//! | `0x00` | subspace, path                         | the entry record  |
//! | `0x01` | path, timestamp, subspace              | the entry key     |
//! | `0x02` | timestamp, subspace, path              | the entry key     |
//! | `0x03` | payload digest                         | a reference count |
//!
//! Paths use [Path::encode_ordered], timestamps are big-endian and
//! identities use their fixed-width encoding, so byte-wise key order is the
//! order of the fields they are built from.

use std::ops::Bound;

use quill_capability::Entry;
use quill_common::{Blake3Hash, Path};
use quill_credentials::IdentityId;
use quill_storage::KeyRange;

pub(crate) const ENTRY_TAG: u8 = 0x00;
pub(crate) const PATH_INDEX_TAG: u8 = 0x01;
pub(crate) const TIME_INDEX_TAG: u8 = 0x02;
pub(crate) const REFERENCE_TAG: u8 = 0x03;

/// The key of the entry record for `(subspace, path)`
pub(crate) fn entry_key(subspace: &IdentityId, path: &Path) -> Vec<u8> {
    let mut key = vec![ENTRY_TAG];
    subspace.encode_into(&mut key);
    path.encode_ordered(&mut key);
    key
}

/// The entry records of `subspace` (or of every subspace) at or below
/// `path_prefix`. Without a subspace the prefix cannot be narrowed by path.
pub(crate) fn entry_range(subspace: Option<&IdentityId>, path_prefix: &Path) -> KeyRange<Vec<u8>> {
    let mut prefix = vec![ENTRY_TAG];
    if let Some(subspace) = subspace {
        subspace.encode_into(&mut prefix);
        path_prefix.encode_ordered_components(&mut prefix);
    }
    KeyRange::prefix(&prefix)
}

pub(crate) fn path_index_key(entry: &Entry) -> Vec<u8> {
    let mut key = vec![PATH_INDEX_TAG];
    entry.path.encode_ordered(&mut key);
    key.extend_from_slice(&entry.timestamp.to_be_bytes());
    entry.subspace.encode_into(&mut key);
    key
}

/// Path index keys of every entry exactly at `path`
pub(crate) fn exact_path_range(path: &Path) -> KeyRange<Vec<u8>> {
    let mut prefix = vec![PATH_INDEX_TAG];
    path.encode_ordered(&mut prefix);
    KeyRange::prefix(&prefix)
}

/// Path index keys of every entry at or below `path_prefix`
pub(crate) fn path_prefix_range(path_prefix: &Path) -> KeyRange<Vec<u8>> {
    let mut prefix = vec![PATH_INDEX_TAG];
    path_prefix.encode_ordered_components(&mut prefix);
    KeyRange::prefix(&prefix)
}

pub(crate) fn time_index_key(entry: &Entry) -> Vec<u8> {
    let mut key = vec![TIME_INDEX_TAG];
    key.extend_from_slice(&entry.timestamp.to_be_bytes());
    entry.subspace.encode_into(&mut key);
    entry.path.encode_ordered(&mut key);
    key
}

/// Time index keys with timestamps in `[gte, lt)`
pub(crate) fn time_range(gte: Option<u64>, lt: Option<u64>) -> KeyRange<Vec<u8>> {
    let bound = |timestamp: u64| {
        let mut key = vec![TIME_INDEX_TAG];
        key.extend_from_slice(&timestamp.to_be_bytes());
        key
    };
    KeyRange::new(
        Bound::Included(gte.map_or_else(|| vec![TIME_INDEX_TAG], bound)),
        Bound::Excluded(lt.map_or_else(|| vec![TIME_INDEX_TAG + 1], bound)),
    )
}

pub(crate) fn reference_key(digest: &Blake3Hash) -> Vec<u8> {
    let mut key = vec![REFERENCE_TAG];
    key.extend_from_slice(digest.bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quill_credentials::{IdentityKeypair, ShareKeypair};

    fn entry(subspace: &IdentityId, path: &[&str], timestamp: u64) -> Result<Entry> {
        Ok(Entry {
            namespace: ShareKeypair::from_seed("gardens", true, [9; 32])?.id().clone(),
            subspace: subspace.clone(),
            path: Path::from_ascii(path)?,
            timestamp,
            payload_length: 0,
            payload_digest: Blake3Hash::hash(b""),
        })
    }

    #[test]
    fn it_orders_path_index_keys_by_path_then_time() -> Result<()> {
        let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?.id().clone();
        let gary = IdentityKeypair::from_seed("gary", [2; 32])?.id().clone();

        let mut keys = vec![
            path_index_key(&entry(&suzy, &["b"], 1)?),
            path_index_key(&entry(&gary, &["a", "z"], 5)?),
            path_index_key(&entry(&suzy, &["a"], 9)?),
            path_index_key(&entry(&gary, &["a"], 2)?),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                path_index_key(&entry(&gary, &["a"], 2)?),
                path_index_key(&entry(&suzy, &["a"], 9)?),
                path_index_key(&entry(&gary, &["a", "z"], 5)?),
                path_index_key(&entry(&suzy, &["b"], 1)?),
            ]
        );
        Ok(())
    }

    #[test]
    fn it_scopes_ranges_to_their_family() -> Result<()> {
        let suzy = IdentityKeypair::from_seed("suzy", [1; 32])?.id().clone();
        let below = entry(&suzy, &["a", "b"], 3)?;
        let beside = entry(&suzy, &["ab"], 3)?;
        let prefix = Path::from_ascii(["a"])?;

        assert!(path_prefix_range(&prefix).contains(&path_index_key(&below)));
        assert!(!path_prefix_range(&prefix).contains(&path_index_key(&beside)));
        assert!(!exact_path_range(&prefix).contains(&path_index_key(&below)));

        let subspace_range = entry_range(Some(&suzy), &prefix);
        assert!(subspace_range.contains(&entry_key(&suzy, &below.path)));
        assert!(!subspace_range.contains(&entry_key(&suzy, &beside.path)));
        assert!(!entry_range(None, &prefix).contains(&path_index_key(&below)));

        let times = time_range(Some(3), Some(4));
        assert!(times.contains(&time_index_key(&below)));
        assert!(!time_range(None, Some(3)).contains(&time_index_key(&below)));
        assert!(!time_range(None, None).contains(&reference_key(&below.payload_digest)));
        Ok(())
    }
}
