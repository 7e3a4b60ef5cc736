use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DocSyncResult;
use crate::local::bundle_cache::BundleCache;
use crate::local::index_manager::IndexManager;
use crate::local::mutation_queue::MutationQueue;
use crate::local::remote_document_cache::RemoteDocumentCache;
use crate::local::target_cache::TargetCache;
use crate::local::target_data::TargetData;
use crate::model::DocumentKey;
use crate::remote::TargetId;
use crate::user::User;

/// Monotonic per-operation counter ordering targets and orphaned documents
/// for LRU garbage collection.
pub type ListenSequenceNumber = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
    /// Writes allowed only from the primary client; required for operations
    /// that mutate the remote document cache or the target lifecycle.
    ReadWritePrimary,
}

/// Handle threaded through every read and write performed within one
/// persistence transaction.
#[derive(Debug)]
pub struct PersistenceTransaction {
    label: String,
    mode: TransactionMode,
    sequence_number: ListenSequenceNumber,
}

impl PersistenceTransaction {
    pub fn new(
        label: impl Into<String>,
        mode: TransactionMode,
        sequence_number: ListenSequenceNumber,
    ) -> Self {
        Self {
            label: label.into(),
            mode,
            sequence_number,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn current_sequence_number(&self) -> ListenSequenceNumber {
        self.sequence_number
    }
}

/// Durable engine behind the local store.
///
/// `run_transaction` retries bodies that fail with transient storage errors,
/// so bodies must be re-runnable: they may only mutate in-memory state via
/// copy-on-write working sets that the caller installs after commit.
pub trait Persistence: Send + Sync + 'static {
    fn reference_delegate(&self) -> Arc<dyn ReferenceDelegate>;

    fn get_mutation_queue(&self, user: &User) -> Arc<dyn MutationQueue>;

    fn get_remote_document_cache(&self) -> Arc<dyn RemoteDocumentCache>;

    fn get_target_cache(&self) -> Arc<dyn TargetCache>;

    fn get_bundle_cache(&self) -> Arc<dyn BundleCache>;

    fn get_index_manager(&self) -> Arc<dyn IndexManager>;

    /// Identifiers of the clients currently sharing this persistence layer.
    fn get_active_clients(&self) -> Vec<String>;

    fn run_transaction<T, F>(
        &self,
        label: &str,
        mode: TransactionMode,
        body: F,
    ) -> DocSyncResult<T>
    where
        F: FnMut(&mut PersistenceTransaction) -> DocSyncResult<T>;
}

/// Hooks through which the store reports document liveness to the garbage
/// collection policy.
pub trait ReferenceDelegate: Send + Sync {
    fn add_reference(
        &self,
        txn: &mut PersistenceTransaction,
        target_id: TargetId,
        key: &DocumentKey,
    ) -> DocSyncResult<()>;

    fn remove_reference(
        &self,
        txn: &mut PersistenceTransaction,
        target_id: TargetId,
        key: &DocumentKey,
    ) -> DocSyncResult<()>;

    /// Invoked when a target is released; may schedule or perform collection
    /// of documents only that target was pinning.
    fn remove_target(
        &self,
        txn: &mut PersistenceTransaction,
        target_data: &TargetData,
    ) -> DocSyncResult<()>;

    /// Invoked when a limbo document's resolution completes.
    fn update_limbo_document(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<()>;
}

/// Outcome of one garbage-collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GarbageCollectionStats {
    pub did_run: bool,
    pub sequence_numbers_collected: usize,
    pub targets_removed: usize,
    pub documents_removed: usize,
}

/// Collection policy driven by the local store; the policy itself lives
/// outside this crate.
pub trait GarbageCollector {
    fn collect(
        &self,
        txn: &mut PersistenceTransaction,
        active_targets: &BTreeMap<TargetId, TargetData>,
    ) -> DocSyncResult<GarbageCollectionStats>;
}
