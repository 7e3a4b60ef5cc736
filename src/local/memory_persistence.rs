use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::DocSyncResult;
use crate::local::bundle_cache::{BundleCache, MemoryBundleCache};
use crate::local::index_manager::{IndexManager, MemoryIndexManager};
use crate::local::mutation_queue::{MemoryMutationQueue, MutationQueue};
use crate::local::persistence::{
    ListenSequenceNumber, Persistence, PersistenceTransaction, ReferenceDelegate, TransactionMode,
};
use crate::local::remote_document_cache::{MemoryRemoteDocumentCache, RemoteDocumentCache};
use crate::local::target_cache::{MemoryTargetCache, TargetCache};
use crate::local::target_data::TargetData;
use crate::model::DocumentKey;
use crate::remote::TargetId;
use crate::user::User;

const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Single-process, in-memory persistence engine.
///
/// Transactions over this engine never conflict, but the retry contract is
/// honored so that callers written against a conflicting engine behave
/// identically here.
pub struct MemoryPersistence {
    index_manager: Arc<MemoryIndexManager>,
    remote_document_cache: Arc<MemoryRemoteDocumentCache>,
    target_cache: Arc<MemoryTargetCache>,
    bundle_cache: Arc<MemoryBundleCache>,
    reference_delegate: Arc<MemoryLruReferenceDelegate>,
    mutation_queues: Mutex<BTreeMap<String, Arc<MemoryMutationQueue>>>,
    listen_sequence: AtomicI64,
    client_id: String,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        let index_manager = Arc::new(MemoryIndexManager::new());
        let target_cache = Arc::new(MemoryTargetCache::new());
        let remote_document_cache =
            Arc::new(MemoryRemoteDocumentCache::new(index_manager.clone()));
        Self {
            index_manager,
            remote_document_cache,
            reference_delegate: Arc::new(MemoryLruReferenceDelegate::new(target_cache.clone())),
            target_cache,
            bundle_cache: Arc::new(MemoryBundleCache::new()),
            mutation_queues: Mutex::new(BTreeMap::new()),
            listen_sequence: AtomicI64::new(0),
            client_id: format!("memory-{}", std::process::id()),
        }
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistence for MemoryPersistence {
    fn reference_delegate(&self) -> Arc<dyn ReferenceDelegate> {
        self.reference_delegate.clone()
    }

    fn get_mutation_queue(&self, user: &User) -> Arc<dyn MutationQueue> {
        let mut queues = self.mutation_queues.lock().unwrap();
        queues
            .entry(user.queue_key())
            .or_insert_with(|| Arc::new(MemoryMutationQueue::new(self.index_manager.clone())))
            .clone()
    }

    fn get_remote_document_cache(&self) -> Arc<dyn RemoteDocumentCache> {
        self.remote_document_cache.clone()
    }

    fn get_target_cache(&self) -> Arc<dyn TargetCache> {
        self.target_cache.clone()
    }

    fn get_bundle_cache(&self) -> Arc<dyn BundleCache> {
        self.bundle_cache.clone()
    }

    fn get_index_manager(&self) -> Arc<dyn IndexManager> {
        self.index_manager.clone()
    }

    fn get_active_clients(&self) -> Vec<String> {
        vec![self.client_id.clone()]
    }

    fn run_transaction<T, F>(
        &self,
        label: &str,
        mode: TransactionMode,
        mut body: F,
    ) -> DocSyncResult<T>
    where
        F: FnMut(&mut PersistenceTransaction) -> DocSyncResult<T>,
    {
        let mut attempts = 0;
        loop {
            let sequence_number = self.listen_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let mut txn = PersistenceTransaction::new(label, mode, sequence_number);
            match body(&mut txn) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_storage_error() => {
                    attempts += 1;
                    if attempts >= MAX_TRANSACTION_ATTEMPTS {
                        return Err(err);
                    }
                    debug!("Retrying transaction '{label}' after transient failure: {err}");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Reference delegate for LRU collection: records the sequence number at
/// which documents were last referenced and keeps released target data
/// around (with a bumped sequence number) for the collector to age out.
pub struct MemoryLruReferenceDelegate {
    target_cache: Arc<MemoryTargetCache>,
    orphaned_at: Mutex<BTreeMap<DocumentKey, ListenSequenceNumber>>,
}

impl MemoryLruReferenceDelegate {
    pub fn new(target_cache: Arc<MemoryTargetCache>) -> Self {
        Self {
            target_cache,
            orphaned_at: Mutex::new(BTreeMap::new()),
        }
    }

    /// Sequence number at which `key` was last touched outside any target.
    pub fn orphaned_sequence_number(&self, key: &DocumentKey) -> Option<ListenSequenceNumber> {
        self.orphaned_at.lock().unwrap().get(key).copied()
    }

    fn record(&self, txn: &PersistenceTransaction, key: &DocumentKey) {
        self.orphaned_at
            .lock()
            .unwrap()
            .insert(key.clone(), txn.current_sequence_number());
    }
}

impl ReferenceDelegate for MemoryLruReferenceDelegate {
    fn add_reference(
        &self,
        txn: &mut PersistenceTransaction,
        _target_id: TargetId,
        key: &DocumentKey,
    ) -> DocSyncResult<()> {
        self.record(txn, key);
        Ok(())
    }

    fn remove_reference(
        &self,
        txn: &mut PersistenceTransaction,
        _target_id: TargetId,
        key: &DocumentKey,
    ) -> DocSyncResult<()> {
        self.record(txn, key);
        Ok(())
    }

    fn remove_target(
        &self,
        txn: &mut PersistenceTransaction,
        target_data: &TargetData,
    ) -> DocSyncResult<()> {
        let updated = target_data.with_sequence_number(txn.current_sequence_number());
        self.target_cache.update_target_data(txn, &updated)
    }

    fn update_limbo_document(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<()> {
        self.record(txn, key);
        Ok(())
    }
}
