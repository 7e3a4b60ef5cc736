use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::DocSyncResult;
use crate::local::index_manager::IndexManager;
use crate::local::persistence::PersistenceTransaction;
use crate::model::{
    DocumentKey, DocumentKeySet, MaybeDocument, MaybeDocumentMap, NoDocument,
    OptionalMaybeDocumentMap, SnapshotVersion,
};
use crate::query::Query;
use crate::util::hard_assert;

/// Cache of the last-known server state per document.
///
/// Entries carry the read time at which they were received; the read-time
/// watermark feeds the multi-client change feed.
pub trait RemoteDocumentCache: Send + Sync {
    fn get_entry(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Option<MaybeDocument>>;

    fn get_entries(
        &self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<OptionalMaybeDocumentMap>;

    /// Existing documents in the query's collection updated at or after
    /// `since_read_time`; tombstones are not returned.
    fn get_documents_matching_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<MaybeDocumentMap>;

    fn set_entry(
        &self,
        txn: &mut PersistenceTransaction,
        doc: &MaybeDocument,
        read_time: SnapshotVersion,
    ) -> DocSyncResult<()>;

    fn remove_entry(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
        read_time: SnapshotVersion,
        track_removal: bool,
    ) -> DocSyncResult<()>;

    /// Documents changed after `since_read_time` (removals surface as
    /// tombstones at their removal read time), plus the new watermark.
    fn get_new_document_changes(
        &self,
        txn: &mut PersistenceTransaction,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<(MaybeDocumentMap, SnapshotVersion)>;

    fn get_latest_read_time(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<SnapshotVersion>;
}

pub struct MemoryRemoteDocumentCache {
    index_manager: Arc<dyn IndexManager>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<DocumentKey, (MaybeDocument, SnapshotVersion)>,
    /// Read time of the latest change per key, including tracked removals.
    change_log: BTreeMap<DocumentKey, SnapshotVersion>,
    latest_read_time: SnapshotVersion,
}

impl MemoryRemoteDocumentCache {
    pub fn new(index_manager: Arc<dyn IndexManager>) -> Self {
        Self {
            index_manager,
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl RemoteDocumentCache for MemoryRemoteDocumentCache {
    fn get_entry(
        &self,
        _txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Option<MaybeDocument>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.docs.get(key).map(|(doc, _)| doc.clone()))
    }

    fn get_entries(
        &self,
        _txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<OptionalMaybeDocumentMap> {
        let inner = self.inner.lock().unwrap();
        Ok(keys
            .iter()
            .map(|key| {
                (
                    key.clone(),
                    inner.docs.get(key).map(|(doc, _)| doc.clone()),
                )
            })
            .collect())
    }

    fn get_documents_matching_query(
        &self,
        _txn: &mut PersistenceTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let inner = self.inner.lock().unwrap();
        let mut results = MaybeDocumentMap::new();
        for (key, (doc, read_time)) in &inner.docs {
            if !since_read_time.is_min() && *read_time <= since_read_time {
                continue;
            }
            if let MaybeDocument::Document(document) = doc {
                if query.matches(document) {
                    results.insert(key.clone(), doc.clone());
                }
            }
        }
        Ok(results)
    }

    fn set_entry(
        &self,
        txn: &mut PersistenceTransaction,
        doc: &MaybeDocument,
        read_time: SnapshotVersion,
    ) -> DocSyncResult<()> {
        hard_assert(
            !read_time.is_min(),
            "Cannot add a document to the remote cache with a zero read time",
        )?;

        let key = doc.key().clone();
        self.index_manager
            .add_to_collection_parent_index(txn, &key.collection_path())?;

        let mut inner = self.inner.lock().unwrap();
        inner.docs.insert(key.clone(), (doc.clone(), read_time));
        inner.change_log.insert(key, read_time);
        inner.latest_read_time = inner.latest_read_time.max(read_time);
        Ok(())
    }

    fn remove_entry(
        &self,
        _txn: &mut PersistenceTransaction,
        key: &DocumentKey,
        read_time: SnapshotVersion,
        track_removal: bool,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.docs.remove(key);
        if track_removal {
            inner.change_log.insert(key.clone(), read_time);
            inner.latest_read_time = inner.latest_read_time.max(read_time);
        } else {
            inner.change_log.remove(key);
        }
        Ok(())
    }

    fn get_new_document_changes(
        &self,
        _txn: &mut PersistenceTransaction,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<(MaybeDocumentMap, SnapshotVersion)> {
        let inner = self.inner.lock().unwrap();
        let mut changes = MaybeDocumentMap::new();
        for (key, read_time) in &inner.change_log {
            if *read_time <= since_read_time {
                continue;
            }
            let doc = inner
                .docs
                .get(key)
                .map(|(doc, _)| doc.clone())
                .unwrap_or_else(|| NoDocument::new(key.clone(), *read_time).into());
            changes.insert(key.clone(), doc);
        }
        Ok((changes, inner.latest_read_time))
    }

    fn get_latest_read_time(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<SnapshotVersion> {
        Ok(self.inner.lock().unwrap().latest_read_time)
    }
}

enum BufferedChange {
    Set(MaybeDocument),
    Remove,
}

/// Transactional staging area over the remote document cache.
///
/// Reads pass through to the underlying cache until a key is changed in the
/// buffer; `apply` writes all staged changes within the caller's transaction.
pub struct RemoteDocumentChangeBuffer {
    cache: Arc<dyn RemoteDocumentCache>,
    track_removals: bool,
    changes: BTreeMap<DocumentKey, (BufferedChange, SnapshotVersion)>,
    read_cache: BTreeMap<DocumentKey, Option<MaybeDocument>>,
}

impl RemoteDocumentChangeBuffer {
    pub fn new(cache: Arc<dyn RemoteDocumentCache>, track_removals: bool) -> Self {
        Self {
            cache,
            track_removals,
            changes: BTreeMap::new(),
            read_cache: BTreeMap::new(),
        }
    }

    pub fn add_entry(&mut self, doc: MaybeDocument, read_time: SnapshotVersion) {
        self.changes
            .insert(doc.key().clone(), (BufferedChange::Set(doc), read_time));
    }

    pub fn remove_entry(&mut self, key: DocumentKey, read_time: SnapshotVersion) {
        self.changes
            .insert(key, (BufferedChange::Remove, read_time));
    }

    pub fn get_entry(
        &mut self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Option<MaybeDocument>> {
        if let Some((change, _)) = self.changes.get(key) {
            return Ok(match change {
                BufferedChange::Set(doc) => Some(doc.clone()),
                BufferedChange::Remove => None,
            });
        }
        if let Some(cached) = self.read_cache.get(key) {
            return Ok(cached.clone());
        }
        let doc = self.cache.get_entry(txn, key)?;
        self.read_cache.insert(key.clone(), doc.clone());
        Ok(doc)
    }

    pub fn get_entries(
        &mut self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<OptionalMaybeDocumentMap> {
        let mut results = OptionalMaybeDocumentMap::new();
        for key in keys {
            results.insert(key.clone(), self.get_entry(txn, key)?);
        }
        Ok(results)
    }

    pub fn apply(&mut self, txn: &mut PersistenceTransaction) -> DocSyncResult<()> {
        for (key, (change, read_time)) in &self.changes {
            match change {
                BufferedChange::Set(doc) => self.cache.set_entry(txn, doc, *read_time)?,
                BufferedChange::Remove => {
                    self.cache
                        .remove_entry(txn, key, *read_time, self.track_removals)?
                }
            }
        }
        self.changes.clear();
        self.read_cache.clear();
        Ok(())
    }
}
