use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::{internal_error, invalid_argument, DocSyncResult};
use crate::local::index_manager::IndexManager;
use crate::local::persistence::PersistenceTransaction;
use crate::local::reference_set::ReferenceSet;
use crate::model::{DocumentKey, DocumentKeySet, Timestamp};
use crate::mutation::{BatchId, Mutation, MutationBatch};
use crate::query::Query;

/// Ordered log of mutation batches awaiting server acknowledgement.
///
/// Batch ids are assigned strictly increasing by `add_mutation_batch`; a
/// batch leaves the queue only through acknowledgement or rejection.
pub trait MutationQueue: Send + Sync {
    fn add_mutation_batch(
        &self,
        txn: &mut PersistenceTransaction,
        local_write_time: Timestamp,
        base_mutations: Vec<Mutation>,
        mutations: Vec<Mutation>,
    ) -> DocSyncResult<MutationBatch>;

    fn lookup_mutation_batch(
        &self,
        txn: &mut PersistenceTransaction,
        batch_id: BatchId,
    ) -> DocSyncResult<Option<MutationBatch>>;

    /// First batch with an id strictly greater than `batch_id`, or the
    /// oldest batch when `batch_id` is `None`.
    fn get_next_mutation_batch_after_batch_id(
        &self,
        txn: &mut PersistenceTransaction,
        batch_id: Option<BatchId>,
    ) -> DocSyncResult<Option<MutationBatch>>;

    fn get_highest_unacknowledged_batch_id(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<Option<BatchId>>;

    fn get_all_mutation_batches(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<Vec<MutationBatch>>;

    fn get_all_mutation_batches_affecting_document_key(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Vec<MutationBatch>>;

    fn get_all_mutation_batches_affecting_document_keys(
        &self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<Vec<MutationBatch>>;

    fn get_all_mutation_batches_affecting_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
    ) -> DocSyncResult<Vec<MutationBatch>>;

    fn remove_mutation_batch(
        &self,
        txn: &mut PersistenceTransaction,
        batch: &MutationBatch,
    ) -> DocSyncResult<()>;

    /// Verifies structural invariants; cheap enough to run after every
    /// removal.
    fn perform_consistency_check(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<()>;
}

pub struct MemoryMutationQueue {
    index_manager: Arc<dyn IndexManager>,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Batches in ascending batch-id order.
    queue: Vec<MutationBatch>,
    next_batch_id: BatchId,
    batches_by_document_key: ReferenceSet,
}

impl MemoryMutationQueue {
    pub fn new(index_manager: Arc<dyn IndexManager>) -> Self {
        Self {
            index_manager,
            inner: Mutex::new(Inner {
                queue: Vec::new(),
                next_batch_id: 1,
                batches_by_document_key: ReferenceSet::new(),
            }),
        }
    }

    fn batches_for_ids(inner: &Inner, ids: &BTreeSet<BatchId>) -> Vec<MutationBatch> {
        inner
            .queue
            .iter()
            .filter(|batch| ids.contains(&batch.batch_id))
            .cloned()
            .collect()
    }
}

impl MutationQueue for MemoryMutationQueue {
    fn add_mutation_batch(
        &self,
        txn: &mut PersistenceTransaction,
        local_write_time: Timestamp,
        base_mutations: Vec<Mutation>,
        mutations: Vec<Mutation>,
    ) -> DocSyncResult<MutationBatch> {
        if mutations.is_empty() {
            return Err(invalid_argument("Mutation batches should not be empty"));
        }

        let mut inner = self.inner.lock().unwrap();
        let batch_id = inner.next_batch_id;
        inner.next_batch_id += 1;

        let batch = MutationBatch::new(batch_id, local_write_time, base_mutations, mutations);
        for key in batch.keys() {
            inner.batches_by_document_key.add_reference(&key, batch_id);
            self.index_manager
                .add_to_collection_parent_index(txn, &key.collection_path())?;
        }
        inner.queue.push(batch.clone());
        Ok(batch)
    }

    fn lookup_mutation_batch(
        &self,
        _txn: &mut PersistenceTransaction,
        batch_id: BatchId,
    ) -> DocSyncResult<Option<MutationBatch>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .queue
            .iter()
            .find(|batch| batch.batch_id == batch_id)
            .cloned())
    }

    fn get_next_mutation_batch_after_batch_id(
        &self,
        _txn: &mut PersistenceTransaction,
        batch_id: Option<BatchId>,
    ) -> DocSyncResult<Option<MutationBatch>> {
        let inner = self.inner.lock().unwrap();
        let after = batch_id.unwrap_or(-1);
        Ok(inner
            .queue
            .iter()
            .find(|batch| batch.batch_id > after)
            .cloned())
    }

    fn get_highest_unacknowledged_batch_id(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<Option<BatchId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.queue.last().map(|batch| batch.batch_id))
    }

    fn get_all_mutation_batches(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<Vec<MutationBatch>> {
        Ok(self.inner.lock().unwrap().queue.clone())
    }

    fn get_all_mutation_batches_affecting_document_key(
        &self,
        _txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<Vec<MutationBatch>> {
        let inner = self.inner.lock().unwrap();
        let ids: BTreeSet<BatchId> = inner
            .batches_by_document_key
            .ids_for_key(key)
            .into_iter()
            .collect();
        Ok(Self::batches_for_ids(&inner, &ids))
    }

    fn get_all_mutation_batches_affecting_document_keys(
        &self,
        _txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
    ) -> DocSyncResult<Vec<MutationBatch>> {
        let inner = self.inner.lock().unwrap();
        let mut ids = BTreeSet::new();
        for key in keys {
            ids.extend(inner.batches_by_document_key.ids_for_key(key));
        }
        Ok(Self::batches_for_ids(&inner, &ids))
    }

    fn get_all_mutation_batches_affecting_query(
        &self,
        _txn: &mut PersistenceTransaction,
        query: &Query,
    ) -> DocSyncResult<Vec<MutationBatch>> {
        let inner = self.inner.lock().unwrap();
        let matches_query = |key: &DocumentKey| match query.collection_group_name() {
            Some(group) => key.collection_id() == group,
            None => key.collection_path() == *query.path(),
        };
        Ok(inner
            .queue
            .iter()
            .filter(|batch| batch.keys().iter().any(|key| matches_query(key)))
            .cloned()
            .collect())
    }

    fn remove_mutation_batch(
        &self,
        _txn: &mut PersistenceTransaction,
        batch: &MutationBatch,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .queue
            .iter()
            .position(|candidate| candidate.batch_id == batch.batch_id)
            .ok_or_else(|| {
                internal_error(format!(
                    "Attempted to remove unknown batch {}",
                    batch.batch_id
                ))
            })?;
        inner.queue.remove(index);
        for key in batch.keys() {
            inner
                .batches_by_document_key
                .remove_reference(&key, batch.batch_id);
        }
        Ok(())
    }

    fn perform_consistency_check(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<()> {
        let inner = self.inner.lock().unwrap();
        if inner.queue.is_empty() && !inner.batches_by_document_key.is_empty() {
            return Err(internal_error(
                "Document leak: dangling mutation references with an empty queue",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::index_manager::MemoryIndexManager;
    use crate::local::persistence::TransactionMode;
    use crate::model::ResourcePath;
    use crate::value::MapValue;

    fn queue() -> MemoryMutationQueue {
        MemoryMutationQueue::new(Arc::new(MemoryIndexManager::new()))
    }

    fn txn() -> PersistenceTransaction {
        PersistenceTransaction::new("test", TransactionMode::ReadWrite, 1)
    }

    fn set_mutation(path: &str) -> Mutation {
        Mutation::set(DocumentKey::from_string(path).unwrap(), MapValue::empty())
    }

    fn add(queue: &MemoryMutationQueue, txn: &mut PersistenceTransaction, path: &str) -> MutationBatch {
        queue
            .add_mutation_batch(txn, Timestamp::now(), Vec::new(), vec![set_mutation(path)])
            .unwrap()
    }

    #[test]
    fn assigns_increasing_batch_ids() {
        let queue = queue();
        let mut txn = txn();
        let first = add(&queue, &mut txn, "rooms/a");
        let second = add(&queue, &mut txn, "rooms/b");
        assert_eq!(first.batch_id, 1);
        assert_eq!(second.batch_id, 2);
        assert_eq!(
            queue.get_highest_unacknowledged_batch_id(&mut txn).unwrap(),
            Some(2)
        );
    }

    #[test]
    fn rejects_empty_batches() {
        let queue = queue();
        let mut txn = txn();
        let err = queue
            .add_mutation_batch(&mut txn, Timestamp::now(), Vec::new(), Vec::new())
            .unwrap_err();
        assert_eq!(err.code_str(), "docsync/invalid-argument");
    }

    #[test]
    fn finds_batches_by_key() {
        let queue = queue();
        let mut txn = txn();
        add(&queue, &mut txn, "rooms/a");
        add(&queue, &mut txn, "rooms/b");
        add(&queue, &mut txn, "rooms/a");

        let key = DocumentKey::from_string("rooms/a").unwrap();
        let batches = queue
            .get_all_mutation_batches_affecting_document_key(&mut txn, &key)
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.windows(2).all(|w| w[0].batch_id < w[1].batch_id));
    }

    #[test]
    fn finds_batches_by_query() {
        let queue = queue();
        let mut txn = txn();
        add(&queue, &mut txn, "rooms/a");
        add(&queue, &mut txn, "halls/b");

        let query = Query::new(ResourcePath::from_string("rooms").unwrap());
        let batches = queue
            .get_all_mutation_batches_affecting_query(&mut txn, &query)
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch_id, 1);
    }

    #[test]
    fn next_batch_after_id() {
        let queue = queue();
        let mut txn = txn();
        add(&queue, &mut txn, "rooms/a");
        add(&queue, &mut txn, "rooms/b");

        let next = queue
            .get_next_mutation_batch_after_batch_id(&mut txn, Some(1))
            .unwrap()
            .unwrap();
        assert_eq!(next.batch_id, 2);
        let first = queue
            .get_next_mutation_batch_after_batch_id(&mut txn, None)
            .unwrap()
            .unwrap();
        assert_eq!(first.batch_id, 1);
    }

    #[test]
    fn removal_clears_key_references() {
        let queue = queue();
        let mut txn = txn();
        let batch = add(&queue, &mut txn, "rooms/a");
        queue.remove_mutation_batch(&mut txn, &batch).unwrap();
        queue.perform_consistency_check(&mut txn).unwrap();
        assert!(queue
            .get_all_mutation_batches(&mut txn)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn removing_unknown_batch_fails() {
        let queue = queue();
        let mut txn = txn();
        let batch = MutationBatch::new(9, Timestamp::now(), Vec::new(), vec![set_mutation("rooms/a")]);
        let err = queue.remove_mutation_batch(&mut txn, &batch).unwrap_err();
        assert_eq!(err.code_str(), "docsync/internal");
    }
}
