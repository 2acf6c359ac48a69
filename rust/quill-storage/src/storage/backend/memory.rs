use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use quill_common::ConditionalSync;
use tokio::sync::RwLock;

use crate::{KeyRange, QuillStorageError, ScanDirection, StorageSource};

use super::StorageBackend;

/// A trivial implementation of [StorageBackend] - backed by a [BTreeMap] -
/// where all values are kept in memory and never persisted. Clones share the
/// same entries.
#[derive(Clone)]
pub struct MemoryStorageBackend<Key, Value>
where
    Key: Ord,
    Value: Clone,
{
    entries: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl<Key, Value> Default for MemoryStorageBackend<Key, Value>
where
    Key: Ord,
    Value: Clone,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<Key, Value> MemoryStorageBackend<Key, Value>
where
    Key: Ord,
    Value: Clone,
{
    /// The number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> StorageBackend for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Ord + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;
    type Error = QuillStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }
}

impl<Key, Value> StorageSource for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Ord + ConditionalSync,
    Value: Clone + ConditionalSync,
{
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
    > {
        try_stream! {
            let mut cursor: Option<Key> = None;
            loop {
                // The lock is released before each entry is yielded
                let next = {
                    let entries = self.entries.read().await;
                    next_entry(&entries, &range, cursor.as_ref(), direction)
                };
                let Some((key, value)) = next else {
                    break;
                };
                cursor = Some(key.clone());
                yield (key, value);
            }
        }
    }
}

/// The first entry of `range` beyond `cursor` in `direction`
fn next_entry<Key, Value>(
    entries: &BTreeMap<Key, Value>,
    range: &KeyRange<Key>,
    cursor: Option<&Key>,
    direction: ScanDirection,
) -> Option<(Key, Value)>
where
    Key: Clone + Ord,
    Value: Clone,
{
    let (start, end) = match (direction, cursor) {
        (_, None) => (range.start.as_ref(), range.end.as_ref()),
        (ScanDirection::Forward, Some(cursor)) => (Bound::Excluded(cursor), range.end.as_ref()),
        (ScanDirection::Reverse, Some(cursor)) => (range.start.as_ref(), Bound::Excluded(cursor)),
    };

    if is_empty(start, end) {
        return None;
    }

    let mut candidates = entries.range::<Key, _>((start, end));
    let found = match direction {
        ScanDirection::Forward => candidates.next(),
        ScanDirection::Reverse => candidates.next_back(),
    };
    found.map(|(key, value)| (key.clone(), value.clone()))
}

/// [BTreeMap::range] panics on inverted bounds, so those are caught first
fn is_empty<Key: Ord>(start: Bound<&Key>, end: Bound<&Key>) -> bool {
    match (start, end) {
        (Bound::Included(start), Bound::Included(end)) => start > end,
        (
            Bound::Included(start) | Bound::Excluded(start),
            Bound::Included(end) | Bound::Excluded(end),
        ) => start >= end,
        _ => false,
    }
}
