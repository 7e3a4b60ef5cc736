//! End-to-end coverage of the local store against the in-memory persistence
//! engine: the write/acknowledge/reject cycle, remote event application,
//! target lifecycle and resume tokens, query execution, user changes, and
//! bundle loading.

use std::sync::Arc;

use docsync_local::bundle::{
    encode_bundle, BundleDocument, BundleElement, BundleLoader, BundleMetadata, BundleReader,
    BundledDocumentMetadata, BundledNamedQuery, BundledQuery, TaskState,
};
use docsync_local::local::{
    LocalStore, LocalViewChanges, MemoryPersistence, QueryEngine,
};
use docsync_local::model::{
    Document, DocumentKey, DocumentKeySet, FieldPath, MaybeDocument, NoDocument, ResourcePath,
    SnapshotVersion, Timestamp,
};
use docsync_local::mutation::{Mutation, MutationBatchResult};
use docsync_local::query::Query;
use docsync_local::remote::{RemoteEvent, TargetChange, TargetId};
use docsync_local::user::User;
use docsync_local::value::{map_value_from, MapValue, Value};
use serde_json::json;

fn new_store() -> LocalStore<MemoryPersistence> {
    new_store_with_persistence().0
}

fn new_store_with_persistence() -> (LocalStore<MemoryPersistence>, Arc<MemoryPersistence>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let persistence = Arc::new(MemoryPersistence::new());
    let query_engine = Arc::new(QueryEngine::new());
    let store = LocalStore::new(persistence.clone(), query_engine, &User::unauthenticated());
    store.start().expect("store start");
    (store, persistence)
}

fn key(path: &str) -> DocumentKey {
    DocumentKey::from_string(path).unwrap()
}

fn field(path: &str) -> FieldPath {
    FieldPath::from_dot_separated(path).unwrap()
}

fn version(seconds: i64) -> SnapshotVersion {
    SnapshotVersion::from_seconds_and_nanos(seconds, 0)
}

fn remote_doc(path: &str, seconds: i64, fields: MapValue) -> MaybeDocument {
    Document::new(key(path), version(seconds), fields, false).into()
}

fn doc_update_event(
    snapshot_seconds: i64,
    target_id: Option<(TargetId, &[u8])>,
    docs: Vec<MaybeDocument>,
) -> RemoteEvent {
    let mut event = RemoteEvent {
        snapshot_version: version(snapshot_seconds),
        ..RemoteEvent::default()
    };
    if let Some((id, token)) = target_id {
        let mut change = TargetChange {
            resume_token: token.to_vec(),
            current: true,
            ..TargetChange::default()
        };
        for doc in &docs {
            change.added_documents.insert(doc.key().clone());
        }
        event.target_changes.insert(id, change);
    }
    for doc in docs {
        event.add_document_update(doc);
    }
    event
}

fn ack(store: &LocalStore<MemoryPersistence>, commit_seconds: i64) -> MutationBatchResult {
    let batch = store
        .next_mutation_batch(None)
        .expect("next batch")
        .expect("a pending batch");
    MutationBatchResult::from_commit_version(batch, version(commit_seconds), Vec::new())
}

fn integer_field(doc: &MaybeDocument, path: &str) -> Option<i64> {
    doc.as_document()
        .and_then(|doc| doc.field(&field(path)))
        .and_then(|value| match value.kind() {
            docsync_local::value::ValueKind::Integer(value) => Some(*value),
            _ => None,
        })
}

#[test]
fn local_write_then_acknowledge() {
    let store = new_store();

    let result = store
        .local_write(vec![Mutation::set(
            key("a/1"),
            map_value_from([("x", Value::from_integer(1))]),
        )])
        .unwrap();
    assert_eq!(result.batch_id, 1);
    let written = result.changes.get(&key("a/1")).unwrap();
    assert!(written.has_pending_writes());
    assert_eq!(integer_field(written, "x"), Some(1));

    let changes = store.acknowledge_batch(&ack(&store, 10)).unwrap();
    let acked = changes.get(&key("a/1")).unwrap();
    assert_eq!(acked.version(), version(10));
    assert!(!acked.has_pending_writes());
    assert_eq!(integer_field(acked, "x"), Some(1));

    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert_eq!(read.version(), version(10));
    assert!(!read.has_pending_writes());
}

#[test]
fn remote_then_local_overlay_then_reject() {
    let store = new_store();

    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            5,
            None,
            vec![remote_doc("a/1", 5, map_value_from([("x", Value::from_integer(0))]))],
        ))
        .unwrap();

    let result = store
        .local_write(vec![Mutation::patch(
            key("a/1"),
            map_value_from([("x", Value::from_integer(1))]),
            vec![field("x")],
        )])
        .unwrap();
    let patched = result.changes.get(&key("a/1")).unwrap();
    assert!(patched.has_pending_writes());
    assert_eq!(integer_field(patched, "x"), Some(1));

    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert!(read.has_pending_writes());
    assert_eq!(integer_field(&read, "x"), Some(1));

    let rolled_back = store.reject_batch(result.batch_id).unwrap();
    let doc = rolled_back.get(&key("a/1")).unwrap();
    assert!(!doc.has_pending_writes());
    assert_eq!(integer_field(doc, "x"), Some(0));
    assert_eq!(doc.version(), version(5));
}

#[test]
fn rejecting_unknown_batch_hard_fails() {
    let store = new_store();
    let err = store.reject_batch(42).unwrap_err();
    assert_eq!(err.code_str(), "docsync/not-found");
}

#[test]
fn stale_remote_update_is_dropped() {
    let store = new_store();

    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            10,
            None,
            vec![remote_doc("a/1", 10, map_value_from([("x", Value::from_integer(2))]))],
        ))
        .unwrap();

    let changes = store
        .apply_remote_event_to_local_cache(&doc_update_event(
            11,
            None,
            vec![remote_doc("a/1", 7, map_value_from([("x", Value::from_integer(1))]))],
        ))
        .unwrap();
    assert!(changes.is_empty());

    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert_eq!(read.version(), version(10));
    assert_eq!(integer_field(&read, "x"), Some(2));
}

#[test]
fn equal_version_replaces_optimistic_state() {
    use docsync_local::local::{Persistence, TransactionMode};

    let (store, persistence) = new_store_with_persistence();

    // Seed the cache with an optimistic copy still flagged as pending.
    let optimistic: MaybeDocument = Document::new(
        key("a/1"),
        version(10),
        map_value_from([("x", Value::from_integer(1))]),
        true,
    )
    .into();
    let cache = persistence.get_remote_document_cache();
    persistence
        .run_transaction("seed", TransactionMode::ReadWrite, |txn| {
            cache.set_entry(txn, &optimistic, version(10))
        })
        .unwrap();

    // A server echo at the same numeric version must replace it.
    let changes = store
        .apply_remote_event_to_local_cache(&doc_update_event(
            10,
            None,
            vec![remote_doc("a/1", 10, map_value_from([("x", Value::from_integer(1))]))],
        ))
        .unwrap();
    assert_eq!(changes.len(), 1);
    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert!(!read.has_pending_writes());
}

#[test]
fn server_echo_after_acknowledge_is_a_no_op() {
    let store = new_store();

    store
        .local_write(vec![Mutation::set(
            key("a/1"),
            map_value_from([("x", Value::from_integer(1))]),
        )])
        .unwrap();
    store.acknowledge_batch(&ack(&store, 10)).unwrap();

    // The watch stream echoes the commit at the same version; the cached
    // state is already authoritative, so nothing changes and nothing fails.
    let changes = store
        .apply_remote_event_to_local_cache(&doc_update_event(
            10,
            None,
            vec![remote_doc("a/1", 10, map_value_from([("x", Value::from_integer(1))]))],
        ))
        .unwrap();
    assert!(changes.is_empty());
    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert_eq!(read.version(), version(10));
    assert_eq!(integer_field(&read, "x"), Some(1));
}

#[test]
fn manufactured_tombstone_evicts_cache_entry() {
    let store = new_store();

    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            10,
            None,
            vec![remote_doc("a/1", 10, MapValue::empty())],
        ))
        .unwrap();

    let mut event = RemoteEvent {
        snapshot_version: version(12),
        ..RemoteEvent::default()
    };
    event.add_document_update(NoDocument::new(key("a/1"), SnapshotVersion::MIN).into());
    event.resolved_limbo_documents.insert(key("a/1"));

    let changes = store.apply_remote_event_to_local_cache(&event).unwrap();
    assert_eq!(changes.len(), 1);
    assert!(store.read_local_document(&key("a/1")).unwrap().is_none());
}

#[test]
fn batch_ids_are_strictly_increasing_without_gaps() {
    let store = new_store();
    for expected in 1..=3 {
        let result = store
            .local_write(vec![Mutation::set(key("a/1"), MapValue::empty())])
            .unwrap();
        assert_eq!(result.batch_id, expected);
    }
}

#[test]
fn acknowledged_batch_leaves_the_queue() {
    let store = new_store();
    store
        .local_write(vec![Mutation::set(key("a/1"), MapValue::empty())])
        .unwrap();
    assert_eq!(store.get_highest_unacknowledged_batch_id().unwrap(), Some(1));

    store.acknowledge_batch(&ack(&store, 5)).unwrap();
    assert_eq!(store.get_highest_unacknowledged_batch_id().unwrap(), None);
    assert!(store.next_mutation_batch(None).unwrap().is_none());
}

#[test]
fn snapshot_version_advances_with_remote_events() {
    let store = new_store();
    assert_eq!(
        store.get_last_remote_snapshot_version().unwrap(),
        SnapshotVersion::MIN
    );

    store
        .apply_remote_event_to_local_cache(&doc_update_event(9, None, vec![]))
        .unwrap();
    assert_eq!(store.get_last_remote_snapshot_version().unwrap(), version(9));
}

#[test]
fn regressing_snapshot_version_is_fatal() {
    let store = new_store();
    store
        .apply_remote_event_to_local_cache(&doc_update_event(9, None, vec![]))
        .unwrap();
    let err = store
        .apply_remote_event_to_local_cache(&doc_update_event(4, None, vec![]))
        .unwrap_err();
    assert_eq!(err.code_str(), "docsync/internal");
}

#[test]
fn applying_the_same_event_twice_is_idempotent() {
    let store = new_store();
    let target = store
        .allocate_target(Query::new(ResourcePath::from_string("a").unwrap()))
        .unwrap();

    let event = doc_update_event(
        6,
        Some((target.target_id(), b"token")),
        vec![remote_doc("a/1", 6, map_value_from([("x", Value::from_integer(3))]))],
    );

    store.apply_remote_event_to_local_cache(&event).unwrap();
    let first_read = store.read_local_document(&key("a/1")).unwrap();
    let first_target = store.get_cached_target(target.target_id()).unwrap();

    store.apply_remote_event_to_local_cache(&event).unwrap();
    let second_read = store.read_local_document(&key("a/1")).unwrap();
    let second_target = store.get_cached_target(target.target_id()).unwrap();

    assert_eq!(first_read, second_read);
    assert_eq!(
        first_target.as_ref().map(|t| t.resume_token().to_vec()),
        second_target.as_ref().map(|t| t.resume_token().to_vec())
    );
    assert_eq!(
        first_target.map(|t| t.snapshot_version()),
        second_target.map(|t| t.snapshot_version())
    );
}

#[test]
fn resume_token_persistence_policy() {
    let store = new_store();
    let target = store
        .allocate_target(Query::new(ResourcePath::from_string("a").unwrap()))
        .unwrap();
    let id = target.target_id();

    // First token always persists.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(1, Some((id, b"r0")), vec![]))
        .unwrap();
    let cached = store.get_cached_target(id).unwrap().unwrap();
    assert_eq!(cached.resume_token(), b"r0");

    // Token-only update within the max age: in-memory only.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(2, Some((id, b"r1")), vec![]))
        .unwrap();
    let cached = store.get_cached_target(id).unwrap().unwrap();
    assert_eq!(cached.resume_token(), b"r0");
    let in_memory = store
        .get_local_target_data(target.target())
        .unwrap()
        .unwrap();
    assert_eq!(in_memory.resume_token(), b"r1");
    assert_eq!(in_memory.snapshot_version(), version(2));

    // Older than the max age: written through.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(361, Some((id, b"r2")), vec![]))
        .unwrap();
    let cached = store.get_cached_target(id).unwrap().unwrap();
    assert_eq!(cached.resume_token(), b"r2");

    // Document movement forces the write regardless of age.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            362,
            Some((id, b"r3")),
            vec![remote_doc("a/1", 362, MapValue::empty())],
        ))
        .unwrap();
    let cached = store.get_cached_target(id).unwrap().unwrap();
    assert_eq!(cached.resume_token(), b"r3");
}

#[test]
fn allocate_target_reuses_persisted_state() {
    let store = new_store();
    let query = Query::new(ResourcePath::from_string("a").unwrap());
    let first = store.allocate_target(query.clone()).unwrap();
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            5,
            Some((first.target_id(), b"tok")),
            vec![],
        ))
        .unwrap();
    store.release_target(first.target_id(), false).unwrap();

    let second = store.allocate_target(query).unwrap();
    assert_eq!(second.target_id(), first.target_id());
    assert_eq!(second.resume_token(), b"tok");
}

#[test]
fn release_target_drops_in_memory_state() {
    let store = new_store();
    let query = Query::new(ResourcePath::from_string("a").unwrap());
    let target = store.allocate_target(query.clone()).unwrap();
    store.release_target(target.target_id(), false).unwrap();
    assert!(store.get_local_target_data(&query).unwrap().is_some());

    let err = store.release_target(target.target_id(), false).unwrap_err();
    assert_eq!(err.code_str(), "docsync/internal");
}

#[test]
fn execute_query_merges_remote_and_pending_docs() {
    let store = new_store();
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            5,
            None,
            vec![remote_doc("a/1", 5, map_value_from([("x", Value::from_integer(0))]))],
        ))
        .unwrap();
    store
        .local_write(vec![Mutation::set(
            key("a/2"),
            map_value_from([("x", Value::from_integer(7))]),
        )])
        .unwrap();

    let query = Query::new(ResourcePath::from_string("a").unwrap());
    let result = store.execute_query(&query, false).unwrap();
    assert_eq!(result.documents.len(), 2);
    assert!(result
        .documents
        .get(&key("a/2"))
        .unwrap()
        .has_pending_writes());
}

#[test]
fn previous_results_optimization_matches_full_scan() {
    let store = new_store();
    let query = Query::new(ResourcePath::from_string("a").unwrap());
    let target = store.allocate_target(query.clone()).unwrap();

    let docs = vec![
        remote_doc("a/1", 5, map_value_from([("x", Value::from_integer(1))])),
        remote_doc("a/2", 5, map_value_from([("x", Value::from_integer(2))])),
    ];
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            5,
            Some((target.target_id(), b"tok")),
            docs,
        ))
        .unwrap();

    // Raise the limbo-free frontier the way the sync layer would after a
    // server-confirmed snapshot.
    let added: DocumentKeySet = [key("a/1"), key("a/2")].into_iter().collect();
    store
        .notify_local_view_changes(vec![LocalViewChanges::new(
            target.target_id(),
            false,
            added,
            DocumentKeySet::new(),
        )])
        .unwrap();

    // New remote doc and a pending local write after the frontier.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            8,
            Some((target.target_id(), b"tok2")),
            vec![remote_doc("a/3", 8, map_value_from([("x", Value::from_integer(3))]))],
        ))
        .unwrap();
    store
        .local_write(vec![Mutation::patch(
            key("a/1"),
            map_value_from([("x", Value::from_integer(11))]),
            vec![field("x")],
        )])
        .unwrap();

    let optimized = store.execute_query(&query, true).unwrap();
    let full = store.execute_query(&query, false).unwrap();
    assert_eq!(optimized.documents, full.documents);
    assert_eq!(optimized.documents.len(), 3);
    assert_eq!(
        integer_field(optimized.documents.get(&key("a/1")).unwrap(), "x"),
        Some(11)
    );
}

#[test]
fn notify_local_view_changes_advances_limbo_free_version() {
    let store = new_store();
    let query = Query::new(ResourcePath::from_string("a").unwrap());
    let target = store.allocate_target(query.clone()).unwrap();

    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            7,
            Some((target.target_id(), b"tok")),
            vec![],
        ))
        .unwrap();

    store
        .notify_local_view_changes(vec![LocalViewChanges::new(
            target.target_id(),
            false,
            DocumentKeySet::new(),
            DocumentKeySet::new(),
        )])
        .unwrap();
    let data = store.get_local_target_data(&query).unwrap().unwrap();
    assert_eq!(data.last_limbo_free_snapshot_version(), version(7));

    // From-cache snapshots must not advance the frontier.
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            9,
            Some((target.target_id(), b"tok2")),
            vec![],
        ))
        .unwrap();
    store
        .notify_local_view_changes(vec![LocalViewChanges::new(
            target.target_id(),
            true,
            DocumentKeySet::new(),
            DocumentKeySet::new(),
        )])
        .unwrap();
    let data = store.get_local_target_data(&query).unwrap().unwrap();
    assert_eq!(data.last_limbo_free_snapshot_version(), version(7));
}

#[test]
fn handle_user_change_swaps_mutation_queues() {
    let store = new_store();
    store
        .local_write(vec![Mutation::set(
            key("a/1"),
            map_value_from([("x", Value::from_integer(1))]),
        )])
        .unwrap();

    let result = store.handle_user_change(User::new("alice")).unwrap();
    assert_eq!(result.removed_batch_ids, vec![1]);
    assert!(result.added_batch_ids.is_empty());
    // Alice's view has no pending write for the document.
    let doc = result.affected_documents.get(&key("a/1")).unwrap();
    assert!(!doc.has_pending_writes());

    assert!(store.read_local_document(&key("a/1")).unwrap().is_none());

    // Switching back restores the anonymous queue and its batch.
    let result = store.handle_user_change(User::unauthenticated()).unwrap();
    assert!(result.removed_batch_ids.is_empty());
    assert_eq!(result.added_batch_ids, vec![1]);
    let read = store.read_local_document(&key("a/1")).unwrap().unwrap();
    assert!(read.has_pending_writes());
}

#[test]
fn lookup_mutation_documents_reflects_queue_state() {
    let store = new_store();
    let result = store
        .local_write(vec![Mutation::set(key("a/1"), MapValue::empty())])
        .unwrap();

    let docs = store
        .lookup_mutation_documents(result.batch_id)
        .unwrap()
        .unwrap();
    assert!(docs.get(&key("a/1")).unwrap().has_pending_writes());

    store.acknowledge_batch(&ack(&store, 5)).unwrap();
    assert!(store
        .lookup_mutation_documents(result.batch_id)
        .unwrap()
        .is_none());
}

#[test]
fn new_document_changes_are_reported_once() {
    let store = new_store();
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            5,
            None,
            vec![remote_doc("a/1", 5, MapValue::empty())],
        ))
        .unwrap();

    let changes = store.get_new_document_changes().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(store.get_new_document_changes().unwrap().is_empty());

    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            6,
            None,
            vec![remote_doc("a/2", 6, MapValue::empty())],
        ))
        .unwrap();
    let changes = store.get_new_document_changes().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes.contains_key(&key("a/2")));
}

#[test]
fn active_clients_lists_this_client() {
    let store = new_store();
    assert_eq!(store.get_active_clients().len(), 1);
}

#[test]
fn collect_garbage_sees_active_targets() {
    use docsync_local::local::{
        GarbageCollectionStats, GarbageCollector, PersistenceTransaction, TargetData,
    };
    use docsync_local::DocSyncResult;
    use std::collections::BTreeMap;

    struct CountingCollector;

    impl GarbageCollector for CountingCollector {
        fn collect(
            &self,
            _txn: &mut PersistenceTransaction,
            active_targets: &BTreeMap<TargetId, TargetData>,
        ) -> DocSyncResult<GarbageCollectionStats> {
            Ok(GarbageCollectionStats {
                did_run: true,
                sequence_numbers_collected: active_targets.len(),
                targets_removed: 0,
                documents_removed: 0,
            })
        }
    }

    let store = new_store();
    store
        .allocate_target(Query::new(ResourcePath::from_string("a").unwrap()))
        .unwrap();

    let stats = store.collect_garbage(&CountingCollector).unwrap();
    assert!(stats.did_run);
    assert_eq!(stats.sequence_numbers_collected, 1);
}

fn sample_bundle() -> Vec<u8> {
    let fields = serde_json::from_value(json!({ "x": { "integerValue": "9" } })).unwrap();
    encode_bundle(&[
        BundleElement::Metadata(BundleMetadata {
            id: "b1".to_string(),
            version: 1,
            create_time: version(20),
            total_documents: 1,
            total_bytes: 0,
        }),
        BundleElement::NamedQuery(BundledNamedQuery {
            name: "q1".to_string(),
            read_time: Timestamp::new(20, 0),
            bundled_query: BundledQuery {
                parent: "c".to_string(),
                collection_group: None,
                filters: vec![],
                order_by: vec![],
                limit: None,
                limit_type: None,
            },
        }),
        BundleElement::DocumentMetadata(BundledDocumentMetadata {
            name: "c/1".to_string(),
            read_time: Timestamp::new(20, 0),
            exists: true,
            queries: vec!["q1".to_string()],
        }),
        BundleElement::Document(BundleDocument {
            name: "c/1".to_string(),
            update_time: Timestamp::new(20, 0),
            fields,
        }),
    ])
}

fn load_bundle(store: &LocalStore<MemoryPersistence>, data: &[u8]) -> TaskState {
    let mut reader = BundleReader::new(data);
    let metadata = reader.read_metadata().unwrap();
    assert!(!store.has_newer_bundle(&metadata).unwrap());

    let mut loader = BundleLoader::new(store, metadata);
    let mut saw_progress = false;
    while let Some(element) = reader.next_element().unwrap() {
        if loader.add_sized_element(element).unwrap().is_some() {
            saw_progress = true;
        }
    }
    assert!(saw_progress);
    let result = loader.complete().unwrap();
    assert_eq!(result.progress.documents_loaded, 1);
    result.progress.task_state
}

#[test]
fn bundle_ingest_pins_documents_and_saves_queries() {
    let store = new_store();
    let data = sample_bundle();
    assert_eq!(load_bundle(&store, &data), TaskState::Success);

    // Document landed in the cache at the bundle's version.
    let read = store.read_local_document(&key("c/1")).unwrap().unwrap();
    assert_eq!(read.version(), version(20));
    assert_eq!(integer_field(&read, "x"), Some(9));

    // Umbrella target pins the loaded document.
    let umbrella = Query::new(ResourcePath::from_string("__bundle__/docs/b1").unwrap());
    let result = store.execute_query(&umbrella, true).unwrap();
    assert!(result.remote_keys.contains(&key("c/1")));

    // Named query is retrievable and resumes at the bundle frontier.
    let named = store.get_named_query("q1").unwrap().unwrap();
    assert_eq!(named.read_time, version(20));
    let target = store.get_local_target_data(&named.query).unwrap().unwrap();
    assert_eq!(target.snapshot_version(), version(20));
    assert!(target.resume_token().is_empty());

    let query_result = store.execute_query(&named.query, true).unwrap();
    assert!(query_result.documents.contains_key(&key("c/1")));

    // The loaded bundle now satisfies has_newer_bundle.
    let mut reader = BundleReader::new(&data);
    let metadata = reader.read_metadata().unwrap();
    assert!(store.has_newer_bundle(&metadata).unwrap());
}

#[test]
fn bundle_docs_do_not_clobber_newer_cache_state() {
    let store = new_store();
    store
        .apply_remote_event_to_local_cache(&doc_update_event(
            30,
            None,
            vec![remote_doc("c/1", 30, map_value_from([("x", Value::from_integer(1))]))],
        ))
        .unwrap();

    load_bundle(&store, &sample_bundle());

    // The cache already held a newer revision; the bundled one is ignored.
    let read = store.read_local_document(&key("c/1")).unwrap().unwrap();
    assert_eq!(read.version(), version(30));
    assert_eq!(integer_field(&read, "x"), Some(1));
}
