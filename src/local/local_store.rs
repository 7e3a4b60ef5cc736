use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::bundle::converter::BundleConverter;
use crate::bundle::types::{BundleMetadata, BundledDocument, NamedQuery};
use crate::error::{internal_error, not_found, DocSyncResult};
use crate::local::bundle_cache::BundleCache;
use crate::local::index_manager::IndexManager;
use crate::local::local_documents_view::LocalDocumentsView;
use crate::local::local_view_changes::LocalViewChanges;
use crate::local::mutation_queue::MutationQueue;
use crate::local::persistence::{
    GarbageCollectionStats, GarbageCollector, Persistence, PersistenceTransaction,
    TransactionMode,
};
use crate::local::query_engine::QueryEngine;
use crate::local::remote_document_cache::{RemoteDocumentCache, RemoteDocumentChangeBuffer};
use crate::local::target_cache::TargetCache;
use crate::local::target_data::{TargetData, TargetPurpose};
use crate::model::{
    DocumentKey, DocumentKeySet, MaybeDocumentMap, OptionalMaybeDocumentMap, ResourcePath,
    SnapshotVersion, Timestamp,
};
use crate::mutation::{BatchId, Mutation, MutationBatch, MutationBatchResult};
use crate::query::Query;
use crate::remote::{RemoteEvent, TargetChange, TargetId};
use crate::user::User;
use crate::util::hard_assert;

/// Oldest a persisted resume token may grow before a token-only update is
/// written through anyway (five minutes, in microseconds).
const RESUME_TOKEN_MAX_AGE_MICROS: i64 = 5 * 60 * 1_000_000;

/// Outcome of a local write: the assigned batch id and the document states
/// the user should now observe.
#[derive(Debug)]
pub struct LocalWriteResult {
    pub batch_id: BatchId,
    pub changes: MaybeDocumentMap,
}

/// Documents matching a query plus the keys the server last confirmed for
/// its target.
#[derive(Debug)]
pub struct QueryResult {
    pub documents: MaybeDocumentMap,
    pub remote_keys: DocumentKeySet,
}

/// Result of switching the authenticated user.
#[derive(Debug)]
pub struct UserChangeResult {
    pub affected_documents: MaybeDocumentMap,
    pub removed_batch_ids: Vec<BatchId>,
    pub added_batch_ids: Vec<BatchId>,
}

/// Client-side coordinator for pending mutations, the remote document cache,
/// and the target registry.
///
/// Every operation runs inside a single persistence transaction. In-memory
/// state (the target index and the document-change watermark) is mutated
/// only after a transaction commits, from a working copy built inside it, so
/// engine-level retries always observe the pre-transaction state.
pub struct LocalStore<P: Persistence> {
    persistence: Arc<P>,
    mutation_queue: Mutex<Arc<dyn MutationQueue>>,
    remote_documents: Arc<dyn RemoteDocumentCache>,
    local_documents: Mutex<Arc<LocalDocumentsView>>,
    query_engine: Arc<QueryEngine>,
    target_cache: Arc<dyn TargetCache>,
    bundle_cache: Arc<dyn BundleCache>,
    index_manager: Arc<dyn IndexManager>,
    target_data_by_target: Mutex<BTreeMap<TargetId, TargetData>>,
    target_id_by_query: Mutex<BTreeMap<String, TargetId>>,
    last_document_change_read_time: Mutex<SnapshotVersion>,
}

impl<P: Persistence> LocalStore<P> {
    pub fn new(persistence: Arc<P>, query_engine: Arc<QueryEngine>, initial_user: &User) -> Self {
        let mutation_queue = persistence.get_mutation_queue(initial_user);
        let remote_documents = persistence.get_remote_document_cache();
        let index_manager = persistence.get_index_manager();
        let local_documents = Arc::new(LocalDocumentsView::new(
            remote_documents.clone(),
            mutation_queue.clone(),
            index_manager.clone(),
        ));
        query_engine.set_local_documents_view(local_documents.clone());

        Self {
            target_cache: persistence.get_target_cache(),
            bundle_cache: persistence.get_bundle_cache(),
            persistence,
            mutation_queue: Mutex::new(mutation_queue),
            remote_documents,
            local_documents: Mutex::new(local_documents),
            query_engine,
            index_manager,
            target_data_by_target: Mutex::new(BTreeMap::new()),
            target_id_by_query: Mutex::new(BTreeMap::new()),
            last_document_change_read_time: Mutex::new(SnapshotVersion::MIN),
        }
    }

    /// Brings in-memory watermarks up to date with persisted state.
    pub fn start(&self) -> DocSyncResult<()> {
        self.synchronize_last_document_change_read_time()
    }

    /// Creates a batch from `mutations`, applies it to the local view, and
    /// returns the changed document states.
    ///
    /// Mutations carrying non-idempotent transforms get a synthetic base
    /// patch recording the pre-image of the transformed fields, so replayed
    /// server values cannot double-apply.
    pub fn local_write(&self, mutations: Vec<Mutation>) -> DocSyncResult<LocalWriteResult> {
        let local_write_time = Timestamp::now();
        let keys: DocumentKeySet = mutations.iter().map(|m| m.key().clone()).collect();
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        let local_documents = self.local_documents.lock().unwrap().clone();

        let (batch, existing_docs) = self.persistence.run_transaction(
            "Locally write mutations",
            TransactionMode::ReadWrite,
            |txn| {
                let existing = local_documents.get_documents(txn, &keys)?;
                let mut base_mutations = Vec::new();
                for mutation in &mutations {
                    if !mutation.has_non_idempotent_transforms() {
                        continue;
                    }
                    if let Some(base_value) = mutation.extract_base_value(existing.get(mutation.key()))
                    {
                        base_mutations.push(Mutation::patch(
                            mutation.key().clone(),
                            base_value,
                            mutation.base_value_mask(),
                        ));
                    }
                }
                let batch = mutation_queue.add_mutation_batch(
                    txn,
                    local_write_time,
                    base_mutations,
                    mutations.clone(),
                )?;
                Ok((batch, existing))
            },
        )?;

        let previous: OptionalMaybeDocumentMap = existing_docs
            .into_iter()
            .map(|(key, doc)| (key, Some(doc)))
            .collect();
        let changes = batch.apply_to_local_document_set(&previous);
        Ok(LocalWriteResult {
            batch_id: batch.batch_id,
            changes,
        })
    }

    /// Records a server acknowledgement: folds the batch's effects into the
    /// remote cache (where the ack is newer), drops the batch, and returns
    /// the resulting local view of the touched documents.
    pub fn acknowledge_batch(
        &self,
        batch_result: &MutationBatchResult,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        let local_documents = self.local_documents.lock().unwrap().clone();

        self.persistence.run_transaction(
            "Acknowledge batch",
            TransactionMode::ReadWritePrimary,
            |txn| {
                let batch = &batch_result.batch;
                let affected = batch.keys();
                let mut buffer =
                    RemoteDocumentChangeBuffer::new(self.remote_documents.clone(), true);

                for key in &affected {
                    let remote_doc = buffer.get_entry(txn, key)?;
                    let ack_version = batch_result.doc_versions.get(key).copied().ok_or_else(
                        || {
                            internal_error(format!(
                                "Batch {} acknowledged without a version for {key}",
                                batch.batch_id
                            ))
                        },
                    )?;
                    if remote_doc
                        .as_ref()
                        .map_or(true, |doc| doc.version() < ack_version)
                    {
                        match batch.apply_to_remote_document(key, remote_doc, batch_result)? {
                            Some(new_doc) => {
                                buffer.add_entry(new_doc, batch_result.commit_version)
                            }
                            None => debug!(
                                "LocalStore: acknowledged batch {} left no state for {key}",
                                batch.batch_id
                            ),
                        }
                    }
                }

                mutation_queue.remove_mutation_batch(txn, batch)?;
                mutation_queue.perform_consistency_check(txn)?;
                buffer.apply(txn)?;
                local_documents.get_documents(txn, &affected)
            },
        )
    }

    /// Removes a rejected batch and returns the local view of its documents
    /// with the batch's effects rolled back.
    pub fn reject_batch(&self, batch_id: BatchId) -> DocSyncResult<MaybeDocumentMap> {
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        let local_documents = self.local_documents.lock().unwrap().clone();

        self.persistence.run_transaction(
            "Reject batch",
            TransactionMode::ReadWritePrimary,
            |txn| {
                let batch = mutation_queue
                    .lookup_mutation_batch(txn, batch_id)?
                    .ok_or_else(|| {
                        not_found(format!("Attempt to reject nonexistent batch {batch_id}"))
                    })?;
                let keys = batch.keys();
                mutation_queue.remove_mutation_batch(txn, &batch)?;
                mutation_queue.perform_consistency_check(txn)?;
                local_documents.get_documents(txn, &keys)
            },
        )
    }

    pub fn get_highest_unacknowledged_batch_id(&self) -> DocSyncResult<Option<BatchId>> {
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        self.persistence.run_transaction(
            "Get highest unacknowledged batch id",
            TransactionMode::ReadOnly,
            |txn| mutation_queue.get_highest_unacknowledged_batch_id(txn),
        )
    }

    pub fn get_last_remote_snapshot_version(&self) -> DocSyncResult<SnapshotVersion> {
        self.persistence.run_transaction(
            "Get last remote snapshot version",
            TransactionMode::ReadOnly,
            |txn| self.target_cache.get_last_remote_snapshot_version(txn),
        )
    }

    /// Reconciles a remote event with the cache: updates target membership
    /// and resume tokens, reconciles document states, advances the global
    /// snapshot, and returns the local view of everything that changed.
    pub fn apply_remote_event_to_local_cache(
        &self,
        remote_event: &RemoteEvent,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let local_documents = self.local_documents.lock().unwrap().clone();
        let delegate = self.persistence.reference_delegate();

        let (changes, new_target_data) = self.persistence.run_transaction(
            "Apply remote event",
            TransactionMode::ReadWritePrimary,
            |txn| {
                let remote_version = remote_event.snapshot_version;
                // Working copy of the target index: retried transaction
                // bodies must re-derive every update from the shared state.
                let mut new_target_data = self.target_data_by_target.lock().unwrap().clone();
                let mut buffer =
                    RemoteDocumentChangeBuffer::new(self.remote_documents.clone(), true);

                for (target_id, change) in &remote_event.target_changes {
                    let old_target_data = match new_target_data.get(target_id) {
                        Some(data) => data.clone(),
                        // Target released while the event was in flight.
                        None => continue,
                    };

                    self.target_cache.remove_matching_keys(
                        txn,
                        &change.removed_documents,
                        *target_id,
                    )?;
                    self.target_cache
                        .add_matching_keys(txn, &change.added_documents, *target_id)?;

                    if !change.resume_token.is_empty() {
                        let updated = old_target_data
                            .with_resume_token(change.resume_token.clone(), remote_version)
                            .with_sequence_number(txn.current_sequence_number());
                        new_target_data.insert(*target_id, updated.clone());

                        if should_persist_target_data(&old_target_data, &updated, change) {
                            self.target_cache.update_target_data(txn, &updated)?;
                        }
                    }
                }

                for key in remote_event.document_updates.keys() {
                    if remote_event.resolved_limbo_documents.contains(key) {
                        delegate.update_limbo_document(txn, key)?;
                    }
                }

                let changed_docs = self.populate_document_changes(
                    txn,
                    &mut buffer,
                    &remote_event.document_updates,
                    remote_version,
                    None,
                )?;

                if !remote_version.is_min() {
                    let last_version =
                        self.target_cache.get_last_remote_snapshot_version(txn)?;
                    hard_assert(
                        remote_version >= last_version,
                        format!(
                            "Watch stream reverted to previous snapshot: {remote_version} < {last_version}"
                        ),
                    )?;
                    self.target_cache.set_targets_metadata(
                        txn,
                        txn.current_sequence_number(),
                        remote_version,
                    )?;
                }

                buffer.apply(txn)?;
                let changes =
                    local_documents.get_local_view_of_documents(txn, changed_docs)?;
                Ok((changes, new_target_data))
            },
        )?;

        *self.target_data_by_target.lock().unwrap() = new_target_data;
        Ok(changes)
    }

    /// Stages `documents` into `buffer`, keeping only updates that advance
    /// the cached state. Read times come from `document_versions` when given,
    /// else from `global_version`.
    fn populate_document_changes(
        &self,
        txn: &mut PersistenceTransaction,
        buffer: &mut RemoteDocumentChangeBuffer,
        documents: &MaybeDocumentMap,
        global_version: SnapshotVersion,
        document_versions: Option<&BTreeMap<DocumentKey, SnapshotVersion>>,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let keys: DocumentKeySet = documents.keys().cloned().collect();
        let existing_docs = buffer.get_entries(txn, &keys)?;

        let mut changed = MaybeDocumentMap::new();
        for (key, doc) in documents {
            let existing = existing_docs.get(key).cloned().flatten();
            let read_time = document_versions
                .and_then(|versions| versions.get(key).copied())
                .unwrap_or(global_version);

            if doc.is_manufactured_no_document() {
                // Access was revoked; drop the entry rather than caching the
                // synthetic tombstone.
                buffer.remove_entry(key.clone(), read_time);
                changed.insert(key.clone(), doc.clone());
                continue;
            }

            // An equal version still wins over an optimistic local state:
            // the authoritative copy clears the pending-writes flag.
            let advances = match &existing {
                None => true,
                Some(existing_doc) => {
                    doc.version() > existing_doc.version()
                        || (doc.version() == existing_doc.version()
                            && existing_doc.has_pending_writes())
                }
            };
            if advances {
                hard_assert(
                    !read_time.is_min(),
                    "Cannot add a document to the remote cache with a zero read time",
                )?;
                buffer.add_entry(doc.clone(), read_time);
                changed.insert(key.clone(), doc.clone());
            } else {
                debug!(
                    "LocalStore: ignoring outdated update for {key} (existing {} >= incoming {})",
                    existing.map(|d| d.version()).unwrap_or(SnapshotVersion::MIN),
                    doc.version()
                );
            }
        }
        Ok(changed)
    }

    /// Registers a listen for `target`, reusing persisted state when the
    /// target was allocated before.
    pub fn allocate_target(&self, target: Query) -> DocSyncResult<TargetData> {
        let target_data = self.persistence.run_transaction(
            "Allocate target",
            TransactionMode::ReadWrite,
            |txn| {
                if let Some(cached) = self.target_cache.get_target_data(txn, &target)? {
                    Ok(cached)
                } else {
                    let target_id = self.target_cache.allocate_target_id(txn)?;
                    let data = TargetData::new(
                        target.clone(),
                        target_id,
                        TargetPurpose::Listen,
                        txn.current_sequence_number(),
                    );
                    self.target_cache.add_target_data(txn, &data)?;
                    Ok(data)
                }
            },
        )?;

        // Another client may have advanced the persisted target since we
        // last held it; only adopt the newer state.
        let mut targets = self.target_data_by_target.lock().unwrap();
        let adopt = match targets.get(&target_data.target_id()) {
            None => true,
            Some(cached) => target_data.snapshot_version() > cached.snapshot_version(),
        };
        if adopt {
            targets.insert(target_data.target_id(), target_data.clone());
            self.target_id_by_query
                .lock()
                .unwrap()
                .insert(target_data.target().canonical_id(), target_data.target_id());
        }
        Ok(target_data)
    }

    /// Target data for `query` if a listen is registered, consulting the
    /// in-memory index before the cache.
    pub fn get_local_target_data(&self, query: &Query) -> DocSyncResult<Option<TargetData>> {
        self.persistence
            .run_transaction("Get target data", TransactionMode::ReadOnly, |txn| {
                self.target_data_for_query(txn, query)
            })
    }

    fn target_data_for_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
    ) -> DocSyncResult<Option<TargetData>> {
        let cached_id = self
            .target_id_by_query
            .lock()
            .unwrap()
            .get(&query.canonical_id())
            .copied();
        match cached_id {
            Some(target_id) => Ok(self
                .target_data_by_target
                .lock()
                .unwrap()
                .get(&target_id)
                .cloned()),
            None => self.target_cache.get_target_data(txn, query),
        }
    }

    /// Unregisters a target. Sequence-number bookkeeping failures caused by
    /// transient storage errors are logged and swallowed: the periodic
    /// target metadata flush makes them recoverable.
    pub fn release_target(
        &self,
        target_id: TargetId,
        keep_persisted_target_data: bool,
    ) -> DocSyncResult<()> {
        let target_data = self
            .target_data_by_target
            .lock()
            .unwrap()
            .get(&target_id)
            .cloned()
            .ok_or_else(|| internal_error(format!("Tried to release nonexistent target {target_id}")))?;

        let mode = if keep_persisted_target_data {
            TransactionMode::ReadWrite
        } else {
            TransactionMode::ReadWritePrimary
        };
        let delegate = self.persistence.reference_delegate();
        let result = self
            .persistence
            .run_transaction("Release target", mode, |txn| {
                if !keep_persisted_target_data {
                    delegate.remove_target(txn, &target_data)?;
                }
                Ok(())
            });
        match result {
            Ok(()) => {}
            Err(err) if err.is_transient_storage_error() => {
                debug!("LocalStore: failed to update sequence number for released target {target_id}: {err}");
            }
            Err(err) => return Err(err),
        }

        self.target_data_by_target.lock().unwrap().remove(&target_id);
        self.target_id_by_query
            .lock()
            .unwrap()
            .remove(&target_data.target().canonical_id());
        Ok(())
    }

    /// Runs `query` against the local view. With `use_previous_results`, the
    /// query engine may limit its work to documents changed since the
    /// target's last limbo-free snapshot.
    pub fn execute_query(
        &self,
        query: &Query,
        use_previous_results: bool,
    ) -> DocSyncResult<QueryResult> {
        self.persistence
            .run_transaction("Execute query", TransactionMode::ReadOnly, |txn| {
                let target_data = self.target_data_for_query(txn, query)?;
                let (last_limbo_free_snapshot_version, remote_keys) = match &target_data {
                    Some(data) if use_previous_results => (
                        data.last_limbo_free_snapshot_version(),
                        self.target_cache
                            .get_matching_keys_for_target_id(txn, data.target_id())?,
                    ),
                    _ => (SnapshotVersion::MIN, DocumentKeySet::new()),
                };
                let documents = self.query_engine.get_documents_matching_query(
                    txn,
                    query,
                    last_limbo_free_snapshot_version,
                    &remote_keys,
                )?;
                Ok(QueryResult {
                    documents,
                    remote_keys,
                })
            })
    }

    /// Records view membership deltas with the reference delegate and, for
    /// server-confirmed snapshots, advances the target's limbo-free version.
    /// Transient storage failures are logged and swallowed: a missed
    /// sequence-number bump only accelerates eventual collection of
    /// still-live documents by a negligible amount.
    pub fn notify_local_view_changes(
        &self,
        view_changes: Vec<LocalViewChanges>,
    ) -> DocSyncResult<()> {
        let delegate = self.persistence.reference_delegate();
        let result = self.persistence.run_transaction(
            "Notify local view changes",
            TransactionMode::ReadWrite,
            |txn| {
                for view_change in &view_changes {
                    for key in &view_change.added {
                        delegate.add_reference(txn, view_change.target_id, key)?;
                    }
                    for key in &view_change.removed {
                        delegate.remove_reference(txn, view_change.target_id, key)?;
                    }
                }
                Ok(())
            },
        );
        match result {
            Ok(()) => {}
            Err(err) if err.is_transient_storage_error() => {
                debug!("LocalStore: failed to update sequence numbers: {err}");
            }
            Err(err) => return Err(err),
        }

        let mut targets = self.target_data_by_target.lock().unwrap();
        for view_change in &view_changes {
            if view_change.from_cache {
                continue;
            }
            if let Some(data) = targets.get(&view_change.target_id) {
                let updated =
                    data.with_last_limbo_free_snapshot_version(data.snapshot_version());
                targets.insert(view_change.target_id, updated);
            }
        }
        Ok(())
    }

    pub fn next_mutation_batch(
        &self,
        after_batch_id: Option<BatchId>,
    ) -> DocSyncResult<Option<MutationBatch>> {
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        self.persistence.run_transaction(
            "Get next mutation batch",
            TransactionMode::ReadOnly,
            |txn| mutation_queue.get_next_mutation_batch_after_batch_id(txn, after_batch_id),
        )
    }

    pub fn read_local_document(
        &self,
        key: &DocumentKey,
    ) -> DocSyncResult<Option<crate::model::MaybeDocument>> {
        let local_documents = self.local_documents.lock().unwrap().clone();
        self.persistence
            .run_transaction("Read document", TransactionMode::ReadOnly, |txn| {
                local_documents.get_document(txn, key)
            })
    }

    /// Local view of the documents a pending batch affects; `None` when the
    /// batch is no longer in the queue.
    pub fn lookup_mutation_documents(
        &self,
        batch_id: BatchId,
    ) -> DocSyncResult<Option<MaybeDocumentMap>> {
        let mutation_queue = self.mutation_queue.lock().unwrap().clone();
        let local_documents = self.local_documents.lock().unwrap().clone();
        self.persistence.run_transaction(
            "Lookup mutation documents",
            TransactionMode::ReadOnly,
            |txn| match mutation_queue.lookup_mutation_batch(txn, batch_id)? {
                Some(batch) => local_documents.get_documents(txn, &batch.keys()).map(Some),
                None => Ok(None),
            },
        )
    }

    pub fn get_active_clients(&self) -> Vec<String> {
        self.persistence.get_active_clients()
    }

    pub fn get_cached_target(&self, target_id: TargetId) -> DocSyncResult<Option<TargetData>> {
        self.persistence
            .run_transaction("Get cached target", TransactionMode::ReadOnly, |txn| {
                self.target_cache.get_target_data_for_id(txn, target_id)
            })
    }

    /// Documents changed since the previous call, as observed through the
    /// cache's read-time change feed.
    pub fn get_new_document_changes(&self) -> DocSyncResult<MaybeDocumentMap> {
        let since = *self.last_document_change_read_time.lock().unwrap();
        let (changes, read_time) = self.persistence.run_transaction(
            "Get new document changes",
            TransactionMode::ReadOnly,
            |txn| self.remote_documents.get_new_document_changes(txn, since),
        )?;
        *self.last_document_change_read_time.lock().unwrap() = read_time;
        Ok(changes)
    }

    /// Aligns the change-feed watermark with the newest persisted read time.
    pub fn synchronize_last_document_change_read_time(&self) -> DocSyncResult<()> {
        let read_time = self.persistence.run_transaction(
            "Synchronize last document change read time",
            TransactionMode::ReadOnly,
            |txn| self.remote_documents.get_latest_read_time(txn),
        )?;
        *self.last_document_change_read_time.lock().unwrap() = read_time;
        Ok(())
    }

    /// Swaps to `user`'s mutation queue and reports which batches and
    /// documents the switch affects.
    pub fn handle_user_change(&self, user: User) -> DocSyncResult<UserChangeResult> {
        let old_queue = self.mutation_queue.lock().unwrap().clone();
        let new_queue = self.persistence.get_mutation_queue(&user);
        let new_view = Arc::new(LocalDocumentsView::new(
            self.remote_documents.clone(),
            new_queue.clone(),
            self.index_manager.clone(),
        ));

        let (affected_documents, removed_batch_ids, added_batch_ids) =
            self.persistence.run_transaction(
                "Handle user change",
                TransactionMode::ReadOnly,
                |txn| {
                    let old_batches = old_queue.get_all_mutation_batches(txn)?;
                    let new_batches = new_queue.get_all_mutation_batches(txn)?;

                    let removed: Vec<BatchId> =
                        old_batches.iter().map(|batch| batch.batch_id).collect();
                    let added: Vec<BatchId> =
                        new_batches.iter().map(|batch| batch.batch_id).collect();

                    let mut keys = DocumentKeySet::new();
                    for batch in old_batches.iter().chain(new_batches.iter()) {
                        keys.extend(batch.keys());
                    }
                    let affected = new_view.get_documents(txn, &keys)?;
                    Ok((affected, removed, added))
                },
            )?;

        *self.mutation_queue.lock().unwrap() = new_queue;
        *self.local_documents.lock().unwrap() = new_view.clone();
        self.query_engine.set_local_documents_view(new_view);

        Ok(UserChangeResult {
            affected_documents,
            removed_batch_ids,
            added_batch_ids,
        })
    }

    /// Runs the supplied collector against the live target index.
    pub fn collect_garbage(
        &self,
        garbage_collector: &dyn GarbageCollector,
    ) -> DocSyncResult<GarbageCollectionStats> {
        let active_targets = self.target_data_by_target.lock().unwrap().clone();
        self.persistence.run_transaction(
            "Collect garbage",
            TransactionMode::ReadWritePrimary,
            |txn| garbage_collector.collect(txn, &active_targets),
        )
    }

    /// True when a bundle with the same id and an equal-or-newer create time
    /// has already been loaded.
    pub fn has_newer_bundle(&self, metadata: &BundleMetadata) -> DocSyncResult<bool> {
        let cached = self.persistence.run_transaction(
            "Get bundle metadata",
            TransactionMode::ReadOnly,
            |txn| self.bundle_cache.get_bundle_metadata(txn, &metadata.id),
        )?;
        Ok(cached
            .map(|existing| existing.create_time >= metadata.create_time)
            .unwrap_or(false))
    }

    pub fn save_bundle(&self, metadata: &BundleMetadata) -> DocSyncResult<()> {
        self.persistence
            .run_transaction("Save bundle", TransactionMode::ReadWrite, |txn| {
                self.bundle_cache.save_bundle_metadata(txn, metadata)
            })
    }

    pub fn get_named_query(&self, name: &str) -> DocSyncResult<Option<NamedQuery>> {
        self.persistence
            .run_transaction("Get named query", TransactionMode::ReadOnly, |txn| {
                self.bundle_cache.get_named_query(txn, name)
            })
    }

    /// Writes bundled documents into the remote cache (per-document read
    /// times; only newer states win) and pins them under the bundle's
    /// umbrella target so eager collection cannot reclaim them.
    pub fn apply_bundle_documents(
        &self,
        documents: &[BundledDocument],
        bundle_name: &str,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let converter = BundleConverter::new();
        let mut document_map = MaybeDocumentMap::new();
        let mut version_map = BTreeMap::new();
        let mut document_keys = DocumentKeySet::new();
        for bundled in documents {
            let (doc, read_time) = converter.to_maybe_document(bundled)?;
            if doc.is_document() {
                document_keys.insert(doc.key().clone());
            }
            version_map.insert(doc.key().clone(), read_time);
            document_map.insert(doc.key().clone(), doc);
        }

        let umbrella = self.allocate_target(bundle_umbrella_target(bundle_name))?;
        let local_documents = self.local_documents.lock().unwrap().clone();
        self.persistence.run_transaction(
            "Apply bundle documents",
            TransactionMode::ReadWrite,
            |txn| {
                let mut buffer =
                    RemoteDocumentChangeBuffer::new(self.remote_documents.clone(), true);
                let changed = self.populate_document_changes(
                    txn,
                    &mut buffer,
                    &document_map,
                    SnapshotVersion::MIN,
                    Some(&version_map),
                )?;
                buffer.apply(txn)?;
                self.target_cache
                    .remove_matching_keys_for_target_id(txn, umbrella.target_id())?;
                self.target_cache
                    .add_matching_keys(txn, &document_keys, umbrella.target_id())?;
                local_documents.get_local_view_of_documents(txn, changed)
            },
        )
    }

    /// Persists a bundled named query and rewinds its target to the bundle's
    /// read time when the bundle is ahead of the target's own snapshot, so a
    /// subsequent listen resumes at the bundle's frontier.
    pub fn save_named_query(
        &self,
        query: &NamedQuery,
        documents: DocumentKeySet,
    ) -> DocSyncResult<()> {
        let allocated = self.allocate_target(query.query.clone())?;
        let target_id = allocated.target_id();

        let rewound = self.persistence.run_transaction(
            "Save named query",
            TransactionMode::ReadWrite,
            |txn| {
                if allocated.snapshot_version() >= query.read_time {
                    self.bundle_cache.save_named_query(txn, query)?;
                    return Ok(None);
                }
                let new_target_data = allocated
                    .with_resume_token(Vec::new(), query.read_time)
                    .with_sequence_number(txn.current_sequence_number());
                self.target_cache.update_target_data(txn, &new_target_data)?;
                self.target_cache
                    .remove_matching_keys_for_target_id(txn, target_id)?;
                self.target_cache
                    .add_matching_keys(txn, &documents, target_id)?;
                self.bundle_cache.save_named_query(txn, query)?;
                Ok(Some(new_target_data))
            },
        )?;

        if let Some(data) = rewound {
            self.target_data_by_target
                .lock()
                .unwrap()
                .insert(target_id, data);
        }
        Ok(())
    }
}

/// Synthetic target pinning a bundle's documents against garbage collection.
fn bundle_umbrella_target(bundle_name: &str) -> Query {
    Query::new(ResourcePath::from_segments([
        "__bundle__",
        "docs",
        bundle_name,
    ]))
}

/// Resume tokens are written through only when they carry real progress:
/// always for a target's first token, otherwise when the persisted token is
/// older than the maximum age or the change moved documents. The in-memory
/// token is authoritative for live reconnects.
fn should_persist_target_data(
    old_target_data: &TargetData,
    new_target_data: &TargetData,
    change: &TargetChange,
) -> bool {
    if old_target_data.resume_token().is_empty() {
        return true;
    }

    let delta_micros = new_target_data.snapshot_version().to_microseconds()
        - old_target_data.snapshot_version().to_microseconds();
    if delta_micros >= RESUME_TOKEN_MAX_AGE_MICROS {
        return true;
    }

    change.has_document_changes()
}
