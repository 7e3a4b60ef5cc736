use std::sync::Arc;

use crate::error::DocSyncResult;
use crate::local::index_manager::IndexManager;
use crate::local::mutation_queue::MutationQueue;
use crate::local::persistence::PersistenceTransaction;
use crate::local::remote_document_cache::RemoteDocumentCache;
use crate::model::{
    DocumentKey, DocumentKeySet, MaybeDocument, MaybeDocumentMap, NoDocument,
    OptionalMaybeDocumentMap, SnapshotVersion,
};
use crate::mutation::MutationBatch;
use crate::query::Query;

/// Latency-compensated read surface: remote document state overlaid with
/// every unacknowledged mutation, in batch order.
pub struct LocalDocumentsView {
    remote_document_cache: Arc<dyn RemoteDocumentCache>,
    mutation_queue: Arc<dyn MutationQueue>,
    index_manager: Arc<dyn IndexManager>,
}

impl LocalDocumentsView {
    pub fn new(
        remote_document_cache: Arc<dyn RemoteDocumentCache>,
        mutation_queue: Arc<dyn MutationQueue>,
        index_manager: Arc<dyn IndexManager>,
    ) -> Self {
        Self {
            remote_document_cache,
            mutation_queue,
            index_manager,
        }
    }

    /// Local view of a single document; `None` when nothing is known about
    /// the key locally.
    pub fn get_document(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Option<MaybeDocument>> {
        let batches = self
            .mutation_queue
            .get_all_mutation_batches_affecting_document_key(txn, key)?;
        let remote = self.remote_document_cache.get_entry(txn, key)?;
        Ok(apply_batches(key, remote, &batches))
    }

    /// Local view of every key in `keys`; unknown keys map to a tombstone at
    /// the zero version so callers receive a complete map.
    pub fn get_documents(
        &self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let entries = self.remote_document_cache.get_entries(txn, keys)?;
        self.local_view_of_entries(txn, entries)
    }

    /// Local view computed atop caller-provided remote states, avoiding a
    /// second read of documents the caller just wrote.
    pub fn get_local_view_of_documents(
        &self,
        txn: &mut PersistenceTransaction,
        base_docs: MaybeDocumentMap,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let entries: OptionalMaybeDocumentMap = base_docs
            .into_iter()
            .map(|(key, doc)| (key, Some(doc)))
            .collect();
        self.local_view_of_entries(txn, entries)
    }

    fn local_view_of_entries(
        &self,
        txn: &mut PersistenceTransaction,
        entries: OptionalMaybeDocumentMap,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let keys: DocumentKeySet = entries.keys().cloned().collect();
        let batches = self
            .mutation_queue
            .get_all_mutation_batches_affecting_document_keys(txn, &keys)?;

        let mut results = MaybeDocumentMap::new();
        for (key, remote) in entries {
            let local = apply_batches(&key, remote, &batches)
                .unwrap_or_else(|| NoDocument::new(key.clone(), SnapshotVersion::MIN).into());
            results.insert(key, local);
        }
        Ok(results)
    }

    /// Documents matching `query`, drawn from the remote cache (restricted
    /// to entries read after `since_read_time`) and pending mutations.
    pub fn get_documents_matching_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<MaybeDocumentMap> {
        if query.is_document_query() {
            let key = DocumentKey::from_path(query.path().clone())?;
            let mut results = MaybeDocumentMap::new();
            if let Some(doc @ MaybeDocument::Document(_)) = self.get_document(txn, &key)? {
                results.insert(key, doc);
            }
            Ok(results)
        } else if query.is_collection_group_query() {
            self.get_documents_matching_collection_group_query(txn, query, since_read_time)
        } else {
            self.get_documents_matching_collection_query(txn, query, since_read_time)
        }
    }

    fn get_documents_matching_collection_group_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let group = query
            .collection_group_name()
            .expect("collection group query without group");
        let mut results = MaybeDocumentMap::new();
        for parent in self.index_manager.get_collection_parents(txn, group)? {
            let collection_query = query.clone().as_collection_query_at_path(parent.child([group]));
            let docs =
                self.get_documents_matching_collection_query(txn, &collection_query, since_read_time)?;
            results.extend(docs);
        }
        Ok(results)
    }

    fn get_documents_matching_collection_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let mut results =
            self.remote_document_cache
                .get_documents_matching_query(txn, query, since_read_time)?;
        let batches = self
            .mutation_queue
            .get_all_mutation_batches_affecting_query(txn, query)?;

        for batch in &batches {
            for key in batch.keys() {
                if key.collection_path() != *query.path() {
                    continue;
                }
                // Patch bases may live outside the since-read-time window.
                let base = match results.get(&key) {
                    Some(doc) => Some(doc.clone()),
                    None => self.remote_document_cache.get_entry(txn, &key)?,
                };
                match batch.apply_to_local_view(&key, base) {
                    Some(doc @ MaybeDocument::Document(_)) => {
                        results.insert(key, doc);
                    }
                    _ => {
                        results.remove(&key);
                    }
                }
            }
        }

        results.retain(|_, doc| match doc {
            MaybeDocument::Document(document) => query.matches(document),
            MaybeDocument::NoDocument(_) => false,
        });
        Ok(results)
    }
}

fn apply_batches(
    key: &DocumentKey,
    remote: Option<MaybeDocument>,
    batches: &[MutationBatch],
) -> Option<MaybeDocument> {
    let mut doc = remote;
    for batch in batches {
        doc = batch.apply_to_local_view(key, doc);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::index_manager::MemoryIndexManager;
    use crate::local::mutation_queue::MemoryMutationQueue;
    use crate::local::persistence::TransactionMode;
    use crate::local::remote_document_cache::MemoryRemoteDocumentCache;
    use crate::model::{Document, FieldPath, ResourcePath, Timestamp};
    use crate::mutation::Mutation;
    use crate::value::{map_value_from, MapValue, Value};

    struct Fixture {
        view: LocalDocumentsView,
        cache: Arc<MemoryRemoteDocumentCache>,
        queue: Arc<MemoryMutationQueue>,
    }

    fn fixture() -> Fixture {
        let index_manager = Arc::new(MemoryIndexManager::new());
        let cache = Arc::new(MemoryRemoteDocumentCache::new(index_manager.clone()));
        let queue = Arc::new(MemoryMutationQueue::new(index_manager.clone()));
        Fixture {
            view: LocalDocumentsView::new(cache.clone(), queue.clone(), index_manager),
            cache,
            queue,
        }
    }

    fn txn() -> PersistenceTransaction {
        PersistenceTransaction::new("test", TransactionMode::ReadWrite, 1)
    }

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    fn remote_doc(path: &str, seconds: i64, fields: MapValue) -> MaybeDocument {
        Document::new(
            key(path),
            SnapshotVersion::from_seconds_and_nanos(seconds, 0),
            fields,
            false,
        )
        .into()
    }

    #[test]
    fn overlays_pending_mutation_on_remote_doc() {
        let fixture = fixture();
        let mut txn = txn();
        fixture
            .cache
            .set_entry(
                &mut txn,
                &remote_doc("rooms/eros", 5, map_value_from([("x", Value::from_integer(0))])),
                SnapshotVersion::from_seconds_and_nanos(5, 0),
            )
            .unwrap();
        fixture
            .queue
            .add_mutation_batch(
                &mut txn,
                Timestamp::now(),
                Vec::new(),
                vec![Mutation::patch(
                    key("rooms/eros"),
                    map_value_from([("x", Value::from_integer(1))]),
                    vec![FieldPath::from_dot_separated("x").unwrap()],
                )],
            )
            .unwrap();

        let doc = fixture
            .view
            .get_document(&mut txn, &key("rooms/eros"))
            .unwrap()
            .unwrap();
        let doc = doc.as_document().unwrap();
        assert!(doc.has_pending_writes());
        assert_eq!(
            doc.field(&FieldPath::from_dot_separated("x").unwrap()),
            Some(&Value::from_integer(1))
        );
    }

    #[test]
    fn unknown_keys_become_min_tombstones() {
        let fixture = fixture();
        let mut txn = txn();
        let keys: DocumentKeySet = [key("rooms/none")].into_iter().collect();
        let docs = fixture.view.get_documents(&mut txn, &keys).unwrap();
        let doc = docs.get(&key("rooms/none")).unwrap();
        assert!(!doc.is_document());
        assert!(doc.version().is_min());
    }

    #[test]
    fn query_includes_docs_created_by_mutations() {
        let fixture = fixture();
        let mut txn = txn();
        fixture
            .queue
            .add_mutation_batch(
                &mut txn,
                Timestamp::now(),
                Vec::new(),
                vec![Mutation::set(
                    key("rooms/new"),
                    map_value_from([("x", Value::from_integer(9))]),
                )],
            )
            .unwrap();

        let query = Query::new(ResourcePath::from_string("rooms").unwrap());
        let docs = fixture
            .view
            .get_documents_matching_query(&mut txn, &query, SnapshotVersion::MIN)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.get(&key("rooms/new")).unwrap().has_pending_writes());
    }

    #[test]
    fn query_drops_locally_deleted_docs() {
        let fixture = fixture();
        let mut txn = txn();
        fixture
            .cache
            .set_entry(
                &mut txn,
                &remote_doc("rooms/gone", 5, MapValue::empty()),
                SnapshotVersion::from_seconds_and_nanos(5, 0),
            )
            .unwrap();
        fixture
            .queue
            .add_mutation_batch(
                &mut txn,
                Timestamp::now(),
                Vec::new(),
                vec![Mutation::delete(key("rooms/gone"))],
            )
            .unwrap();

        let query = Query::new(ResourcePath::from_string("rooms").unwrap());
        let docs = fixture
            .view
            .get_documents_matching_query(&mut txn, &query, SnapshotVersion::MIN)
            .unwrap();
        assert!(docs.is_empty());
    }
}
