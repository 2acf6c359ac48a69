use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt, pin_mut};
use quill_capability::{Auth, AuthorisationToken, Entry, is_authorised_write};
use quill_common::{
    AuthorisationError, Blake3Hash, ConditionalSync, Path, QuillError, ValidationError,
    time::now_micros,
};
use quill_credentials::{IdentityId, ShareId};
use quill_storage::{KeyRange, PayloadStore, ScanDirection, StorageSource};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::document::{PayloadSource, Record};
use crate::error::storage_error;
use crate::key::{
    entry_key, entry_range, exact_path_range, path_index_key, path_prefix_range, reference_key,
    time_index_key, time_range,
};
use crate::{
    Document, DocumentOrder, DocumentQuery, NoOpReason, SetFailure, SetOptions, SetOutcome,
    StoreError, StoreEvent,
};

/// How many events a subscriber may fall behind before it starts missing
/// them
pub const EVENT_CAPACITY: usize = 256;

fn invariant(message: String) -> StoreError {
    StoreError::Invariant(QuillError::Invariant(message))
}

fn decode_record(bytes: &[u8]) -> Result<Record, StoreError> {
    Record::decode(bytes).map_err(|error| invariant(format!("Stored entry is corrupt: {error}")))
}

fn require_record(record: Option<Record>) -> Result<Record, StoreError> {
    record.ok_or_else(|| invariant("Index refers to a missing entry".into()))
}

fn invalid_entry(error: impl Into<StoreError>) -> SetOutcome {
    SetOutcome::Failure(SetFailure::InvalidEntry(error.into()))
}

fn newest_first(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| b.entry.recency(&a.entry));
    records
}

/// The documents of one share.
///
/// Each `(identity, path)` key holds at most one document, the most recent
/// write to it (last writer wins, ties broken by payload digest and then
/// length). A write also removes every older document of the same identity
/// below its path. Writes must be authorised by a write capability held in
/// the [Auth] credential store.
///
/// Entries and their indexes live in one ordered key-value backend; payloads
/// live in a [PayloadStore] and are reference counted, so a payload shared by
/// several documents is erased with the last of them.
#[derive(Clone)]
pub struct Store<Entries, Payloads, Credentials> {
    namespace: ShareId,
    entries: Entries,
    payloads: Payloads,
    reader: Arc<dyn PayloadSource>,
    auth: Auth<Credentials>,
    events: broadcast::Sender<StoreEvent>,
}

impl<Entries, Payloads, Credentials> Store<Entries, Payloads, Credentials>
where
    Entries: StorageSource<Key = Vec<u8>, Value = Vec<u8>> + ConditionalSync,
    Payloads: PayloadStore + 'static,
    Credentials: StorageSource<Key = Vec<u8>, Value = Vec<u8>> + ConditionalSync,
{
    /// A store for `namespace` over the given backends, authorising writes
    /// with the capabilities held in `auth`
    pub fn new(
        namespace: ShareId,
        entries: Entries,
        payloads: Payloads,
        auth: Auth<Credentials>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            namespace,
            entries,
            reader: Arc::new(payloads.clone()),
            payloads,
            auth,
            events,
        }
    }

    /// The share whose documents this store holds
    pub fn namespace(&self) -> &ShareId {
        &self.namespace
    }

    /// The credential store used to authorise writes
    pub fn auth(&self) -> &Auth<Credentials> {
        &self.auth
    }

    /// Receive every [StoreEvent] emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }

    fn document(&self, record: &Record) -> Document {
        Document::new(
            record.entry.clone(),
            record.token.clone(),
            self.reader.clone(),
        )
    }

    fn entry(&self, identity: &IdentityId, path: &Path, timestamp: u64, payload: &[u8]) -> Entry {
        Entry {
            namespace: self.namespace.clone(),
            subspace: identity.clone(),
            path: path.clone(),
            timestamp,
            payload_length: payload.len() as u64,
            payload_digest: Blake3Hash::hash(payload),
        }
    }

    async fn record_at(&self, key: &Vec<u8>) -> Result<Option<Record>, StoreError> {
        match self.entries.get(key).await.map_err(storage_error)? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn authorise(&self, entry: &Entry) -> Result<Option<AuthorisationToken>, StoreError> {
        Ok(self.auth.best_authorisation(entry).await?)
    }

    /// The older documents of the same identity strictly below the entry's
    /// path, which writing the entry would remove
    async fn prunable(&self, entry: &Entry) -> Result<Vec<Record>, StoreError> {
        let scan = self.entries.scan(
            entry_range(Some(&entry.subspace), &entry.path),
            ScanDirection::Forward,
        );
        pin_mut!(scan);

        let mut prunable = Vec::new();
        while let Some(item) = scan.next().await {
            let (_, value) = item.map_err(storage_error)?;
            let record = decode_record(&value)?;
            if record.entry.path != entry.path && entry.is_newer_than(&record.entry) {
                prunable.push(record);
            }
        }
        Ok(prunable)
    }

    /// Whether a document at least as recent already exists at the entry's
    /// key, or a newer one at an ancestor path that would prune it
    async fn is_obsolete(&self, entry: &Entry) -> Result<bool, StoreError> {
        if let Some(existing) = self
            .record_at(&entry_key(&entry.subspace, &entry.path))
            .await?
        {
            if !entry.is_newer_than(&existing.entry) {
                trace!("{} is already at {}", existing.entry.subspace, entry.path);
                return Ok(true);
            }
        }

        for ancestor in entry.path.strict_prefixes() {
            if let Some(existing) = self
                .record_at(&entry_key(&entry.subspace, &ancestor))
                .await?
            {
                if existing.entry.is_newer_than(entry) {
                    trace!("A newer document at {ancestor} covers {}", entry.path);
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    async fn reference_count(&self, digest: &Blake3Hash) -> Result<u64, StoreError> {
        match self
            .entries
            .get(&reference_key(digest))
            .await
            .map_err(storage_error)?
        {
            Some(bytes) => {
                let count = <[u8; 8]>::try_from(bytes.as_slice()).map_err(|_| {
                    invariant(format!("Reference count of payload {digest} is corrupt"))
                })?;
                Ok(u64::from_be_bytes(count))
            }
            None => Ok(0),
        }
    }

    async fn retain_payload(&mut self, digest: &Blake3Hash) -> Result<(), StoreError> {
        let count = self.reference_count(digest).await? + 1;
        self.entries
            .set(reference_key(digest), count.to_be_bytes().to_vec())
            .await
            .map_err(storage_error)
    }

    /// Drop one reference to a payload, erasing it with the last one.
    /// Reports whether stored bytes were erased.
    async fn release_payload(&mut self, digest: &Blake3Hash) -> Result<bool, StoreError> {
        let count = self.reference_count(digest).await?;
        if count == 0 {
            return Err(invariant(format!(
                "Payload {digest} is released more often than it is referenced"
            )));
        }

        if count > 1 {
            self.entries
                .set(reference_key(digest), (count - 1).to_be_bytes().to_vec())
                .await
                .map_err(storage_error)?;
            return Ok(false);
        }

        self.entries
            .delete(&reference_key(digest))
            .await
            .map_err(storage_error)?;
        // The bytes of an ingested entry may never have arrived
        Ok(self.payloads.erase(digest).await?)
    }

    async fn remove(&mut self, record: &Record, cause: &Document) -> Result<(), StoreError> {
        let entry = &record.entry;
        for key in [
            entry_key(&entry.subspace, &entry.path),
            path_index_key(entry),
            time_index_key(entry),
        ] {
            self.entries.delete(&key).await.map_err(storage_error)?;
        }

        let removed = self.document(record);
        self.emit(StoreEvent::EntryRemoved {
            removed: removed.clone(),
            cause: cause.clone(),
        });

        if self.release_payload(&entry.payload_digest).await? {
            self.emit(StoreEvent::PayloadRemoved {
                digest: entry.payload_digest,
                removed,
                cause: cause.clone(),
            });
        }
        Ok(())
    }

    /// Write `record` over whatever is at its key and remove the `prunable`
    /// documents below it
    async fn insert(
        &mut self,
        record: Record,
        prunable: Vec<Record>,
    ) -> Result<(Document, Vec<Path>), StoreError> {
        let document = self.document(&record);
        let entry = &record.entry;
        let key = entry_key(&entry.subspace, &entry.path);

        self.retain_payload(&entry.payload_digest).await?;
        if let Some(previous) = self.record_at(&key).await? {
            self.remove(&previous, &document).await?;
        }

        self.entries
            .set(key.clone(), record.encode())
            .await
            .map_err(storage_error)?;
        self.entries
            .set(path_index_key(entry), key.clone())
            .await
            .map_err(storage_error)?;
        self.entries
            .set(time_index_key(entry), key)
            .await
            .map_err(storage_error)?;

        let mut pruned = Vec::with_capacity(prunable.len());
        for stale in &prunable {
            self.remove(stale, &document).await?;
            pruned.push(stale.entry.path.clone());
        }
        if !pruned.is_empty() {
            debug!("Pruned {} documents below {}", pruned.len(), entry.path);
        }

        Ok((document, pruned))
    }

    /// Write `payload` at `path` as `identity`.
    ///
    /// The write is a no-op if a document at least as recent already exists
    /// at the same key, or a newer one at an ancestor path. It is prevented
    /// if it would remove older documents below `path` and
    /// [SetOptions::permit_pruning] is not set. It fails if no held write
    /// capability covers it.
    pub async fn set(
        &mut self,
        identity: &IdentityId,
        path: &Path,
        payload: Vec<u8>,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        let timestamp = options.timestamp.unwrap_or_else(now_micros);
        let entry = self.entry(identity, path, timestamp, &payload);
        debug!("Setting {path} for {identity} at {timestamp}");

        let prunable = self.prunable(&entry).await?;
        if !prunable.is_empty() && !options.permit_pruning {
            debug!(
                "Writing {path} would prune {} documents; not permitted",
                prunable.len()
            );
            return Ok(SetOutcome::PruningPrevented {
                documents: prunable.iter().map(|record| self.document(record)).collect(),
            });
        }

        let Some(token) = self.authorise(&entry).await? else {
            return Ok(invalid_entry(AuthorisationError::NoCapability {
                namespace: self.namespace.to_string(),
                subspace: identity.to_string(),
                path: path.to_string(),
            }));
        };

        if self.is_obsolete(&entry).await? {
            return Ok(SetOutcome::NoOp(NoOpReason::ObsoleteFromSameSubspace));
        }

        self.payloads.store(payload).await?;
        let (document, pruned) = self.insert(Record { entry, token }, prunable).await?;
        self.emit(StoreEvent::DocumentSet {
            document: document.clone(),
        });

        Ok(SetOutcome::Success { document, pruned })
    }

    /// [Store::set], with the identity given by its display address. An
    /// address that does not parse fails the write.
    pub async fn set_with_address(
        &mut self,
        address: &str,
        path: &Path,
        payload: Vec<u8>,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        match IdentityId::from_str(address) {
            Ok(identity) => self.set(&identity, path, payload, options).await,
            Err(error) => Ok(invalid_entry(error)),
        }
    }

    /// Replace the document at `path` with an empty payload, one microsecond
    /// after it, so that the clear wins over it. Fails if there is no
    /// document to clear.
    pub async fn clear(&mut self, identity: &IdentityId, path: &Path) -> Result<Document, StoreError> {
        let Some(existing) = self.record_at(&entry_key(identity, path)).await? else {
            return Err(ValidationError::NoSuchDocument(format!("{path} for {identity}")).into());
        };

        let timestamp = existing.entry.timestamp.saturating_add(1);
        let entry = self.entry(identity, path, timestamp, &[]);
        let Some(token) = self.authorise(&entry).await? else {
            return Err(AuthorisationError::NoCapability {
                namespace: self.namespace.to_string(),
                subspace: identity.to_string(),
                path: path.to_string(),
            }
            .into());
        };

        let prunable = self.prunable(&entry).await?;
        self.payloads.store(Vec::new()).await?;
        let (document, pruned) = self.insert(Record { entry, token }, prunable).await?;
        debug!(
            "Cleared {path} for {identity}, pruning {} documents",
            pruned.len()
        );

        self.emit(StoreEvent::DocumentSet {
            document: document.clone(),
        });
        Ok(document)
    }

    /// Accept an entry written elsewhere, along with its payload if it is at
    /// hand. The token must prove the write, and a payload must match the
    /// entry's digest and length. Older documents below the entry are pruned
    /// without asking.
    pub async fn ingest(
        &mut self,
        entry: Entry,
        token: AuthorisationToken,
        payload: Option<Vec<u8>>,
    ) -> Result<SetOutcome, StoreError> {
        debug!(
            "Ingesting {} for {} at {}",
            entry.path, entry.subspace, entry.timestamp
        );

        if entry.namespace != self.namespace {
            return Ok(invalid_entry(ValidationError::InvalidIdentifier(format!(
                "entry belongs to {}, not {}",
                entry.namespace, self.namespace
            ))));
        }
        if !is_authorised_write(&entry, &token) {
            return Ok(invalid_entry(AuthorisationError::InvalidToken(format!(
                "{} at {}",
                entry.subspace, entry.path
            ))));
        }
        if let Some(payload) = &payload {
            if payload.len() as u64 != entry.payload_length
                || Blake3Hash::hash(payload) != entry.payload_digest
            {
                return Ok(invalid_entry(ValidationError::InvalidPayload(format!(
                    "payload does not match entry {} at {}",
                    entry.subspace, entry.path
                ))));
            }
        }

        if self.is_obsolete(&entry).await? {
            return Ok(SetOutcome::NoOp(NoOpReason::ObsoleteFromSameSubspace));
        }

        let prunable = self.prunable(&entry).await?;
        let with_payload = match payload {
            Some(payload) => {
                self.payloads.store(payload).await?;
                true
            }
            None => false,
        };
        let (document, pruned) = self.insert(Record { entry, token }, prunable).await?;

        self.emit(StoreEvent::EntryIngest {
            document: document.clone(),
        });
        if with_payload {
            self.emit(StoreEvent::PayloadIngest {
                document: document.clone(),
            });
        }

        Ok(SetOutcome::Success { document, pruned })
    }

    /// Accept the payload of a document whose entry arrived without one.
    /// Reports whether a document at `(identity, path)` claims these bytes.
    pub async fn ingest_payload(
        &mut self,
        identity: &IdentityId,
        path: &Path,
        payload: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let Some(record) = self.record_at(&entry_key(identity, path)).await? else {
            return Ok(false);
        };
        if payload.len() as u64 != record.entry.payload_length
            || Blake3Hash::hash(&payload) != record.entry.payload_digest
        {
            return Ok(false);
        }

        self.payloads.store(payload).await?;
        self.emit(StoreEvent::PayloadIngest {
            document: self.document(&record),
        });
        Ok(true)
    }

    /// The document at exactly `(identity, path)`
    pub async fn get(
        &self,
        identity: &IdentityId,
        path: &Path,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .record_at(&entry_key(identity, path))
            .await?
            .map(|record| self.document(&record)))
    }

    /// The most recent document at `path` across every identity
    pub async fn latest_doc_at_path(&self, path: &Path) -> Result<Option<Document>, StoreError> {
        let records = self.indexed_records(exact_path_range(path), ScanDirection::Forward);
        pin_mut!(records);

        let mut latest: Option<Record> = None;
        while let Some(record) = records.next().await {
            let record = record?;
            if latest
                .as_ref()
                .is_none_or(|latest| record.entry.is_newer_than(&latest.entry))
            {
                latest = Some(record);
            }
        }
        Ok(latest.map(|record| self.document(&record)))
    }

    /// Every document at `path` across every identity, newest first. The
    /// first document is the one [Store::latest_doc_at_path] returns.
    pub fn documents_at_path(
        &self,
        path: &Path,
    ) -> impl Stream<Item = Result<Document, StoreError>> {
        let range = exact_path_range(path);
        try_stream! {
            let records = self.indexed_records(range, ScanDirection::Reverse);
            pin_mut!(records);

            // The index orders equal timestamps by identity, so each run of
            // them is re-ranked by recency
            let mut tied: Vec<Record> = Vec::new();
            while let Some(record) = records.next().await {
                let record = record?;
                if tied
                    .first()
                    .is_some_and(|first| first.entry.timestamp != record.entry.timestamp)
                {
                    for record in newest_first(std::mem::take(&mut tied)) {
                        yield self.document(&record);
                    }
                }
                tied.push(record);
            }
            for record in newest_first(tied) {
                yield self.document(&record);
            }
        }
    }

    /// Every document, in `order`
    pub fn documents(
        &self,
        order: DocumentOrder,
        descending: bool,
    ) -> impl Stream<Item = Result<Document, StoreError>> {
        self.query_docs(DocumentQuery::default().with_order(order, descending))
    }

    /// The documents selected by `query`, in its order
    pub fn query_docs(
        &self,
        query: DocumentQuery,
    ) -> impl Stream<Item = Result<Document, StoreError>> {
        try_stream! {
            let records = self.ordered_records(&query);
            pin_mut!(records);

            let mut count = 0usize;
            let mut size = 0u64;
            while query.limit.is_none_or(|limit| count < limit) {
                let Some(record) = records.next().await else {
                    break;
                };
                let record = record?;
                if !query.matches(&record.entry) {
                    continue;
                }

                size = size.saturating_add(record.entry.payload_length);
                if query.max_size.is_some_and(|max_size| size > max_size) {
                    break;
                }

                count += 1;
                yield self.document(&record);
            }
        }
    }

    /// The distinct paths of the documents selected by `query`, in first
    /// seen order
    pub fn query_paths(&self, query: DocumentQuery) -> impl Stream<Item = Result<Path, StoreError>> {
        try_stream! {
            let documents = self.query_docs(query);
            pin_mut!(documents);

            let mut seen = HashSet::new();
            while let Some(document) = documents.next().await {
                let path = document?.path().clone();
                if seen.insert(path.clone()) {
                    yield path;
                }
            }
        }
    }

    /// The distinct identities of the documents selected by `query`, in
    /// first seen order
    pub fn query_identities(
        &self,
        query: DocumentQuery,
    ) -> impl Stream<Item = Result<IdentityId, StoreError>> {
        try_stream! {
            let documents = self.query_docs(query);
            pin_mut!(documents);

            let mut seen = HashSet::new();
            while let Some(document) = documents.next().await {
                let identity = document?.identity().clone();
                if seen.insert(identity.clone()) {
                    yield identity;
                }
            }
        }
    }

    /// Records reached through an index family whose values are entry keys
    fn indexed_records(
        &self,
        range: KeyRange<Vec<u8>>,
        direction: ScanDirection,
    ) -> impl Stream<Item = Result<Record, StoreError>> {
        try_stream! {
            let scan = self.entries.scan(range, direction);
            pin_mut!(scan);
            while let Some(item) = scan.next().await {
                let (_, key) = item.map_err(storage_error)?;
                yield require_record(self.record_at(&key).await?)?;
            }
        }
    }

    /// Records read straight from the entry family
    fn entry_records(
        &self,
        range: KeyRange<Vec<u8>>,
        direction: ScanDirection,
    ) -> impl Stream<Item = Result<Record, StoreError>> {
        try_stream! {
            let scan = self.entries.scan(range, direction);
            pin_mut!(scan);
            while let Some(item) = scan.next().await {
                let (_, value) = item.map_err(storage_error)?;
                yield decode_record(&value)?;
            }
        }
    }

    /// Records in the query's order, narrowed by whatever part of the query
    /// the order's key family can express
    fn ordered_records(
        &self,
        query: &DocumentQuery,
    ) -> impl Stream<Item = Result<Record, StoreError>> {
        let direction = if query.descending {
            ScanDirection::Reverse
        } else {
            ScanDirection::Forward
        };
        let path_prefix = query.path_prefix.clone().unwrap_or_default();
        let order = query.order;
        let identity = query.identity.clone();
        let (gte, lt) = (query.timestamp_gte, query.timestamp_lt);

        try_stream! {
            match order {
                DocumentOrder::Path => {
                    let records = self.indexed_records(path_prefix_range(&path_prefix), direction);
                    pin_mut!(records);
                    while let Some(record) = records.next().await {
                        yield record?;
                    }
                }
                DocumentOrder::Timestamp => {
                    let records = self.indexed_records(time_range(gte, lt), direction);
                    pin_mut!(records);
                    while let Some(record) = records.next().await {
                        yield record?;
                    }
                }
                DocumentOrder::Identity => {
                    let records =
                        self.entry_records(entry_range(identity.as_ref(), &path_prefix), direction);
                    pin_mut!(records);
                    while let Some(record) = records.next().await {
                        yield record?;
                    }
                }
            }
        }
    }
}
