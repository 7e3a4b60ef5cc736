use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::DocSyncResult;
use crate::local::persistence::{ListenSequenceNumber, PersistenceTransaction};
use crate::local::reference_set::ReferenceSet;
use crate::local::target_data::TargetData;
use crate::model::{DocumentKey, DocumentKeySet, SnapshotVersion};
use crate::query::Query;
use crate::remote::TargetId;
use crate::util::hard_assert;

/// Registry of server-side listens: target data by query identity, the
/// target→document matching index, and the global snapshot metadata.
pub trait TargetCache: Send + Sync {
    fn get_target_data(
        &self,
        txn: &mut PersistenceTransaction,
        target: &Query,
    ) -> DocSyncResult<Option<TargetData>>;

    fn get_target_data_for_id(
        &self,
        txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<Option<TargetData>>;

    fn allocate_target_id(&self, txn: &mut PersistenceTransaction) -> DocSyncResult<TargetId>;

    fn add_target_data(
        &self,
        txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()>;

    fn update_target_data(
        &self,
        txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()>;

    fn remove_target_data(
        &self,
        txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()>;

    fn add_matching_keys(
        &self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
        target_id: TargetId,
    ) -> DocSyncResult<()>;

    fn remove_matching_keys(
        &self,
        txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
        target_id: TargetId,
    ) -> DocSyncResult<()>;

    fn remove_matching_keys_for_target_id(
        &self,
        txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<()>;

    fn get_matching_keys_for_target_id(
        &self,
        txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<DocumentKeySet>;

    /// Whether any target currently pins `key`.
    fn contains_key(
        &self,
        txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<bool>;

    fn get_last_remote_snapshot_version(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<SnapshotVersion>;

    fn get_highest_sequence_number(
        &self,
        txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<ListenSequenceNumber>;

    fn set_targets_metadata(
        &self,
        txn: &mut PersistenceTransaction,
        highest_listen_sequence_number: ListenSequenceNumber,
        last_remote_snapshot_version: SnapshotVersion,
    ) -> DocSyncResult<()>;
}

pub struct MemoryTargetCache {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Target data keyed by the target's canonical id.
    targets: BTreeMap<String, TargetData>,
    target_ids: BTreeMap<TargetId, String>,
    references: ReferenceSet,
    highest_target_id: TargetId,
    highest_sequence_number: ListenSequenceNumber,
    last_remote_snapshot_version: SnapshotVersion,
}

impl MemoryTargetCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryTargetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetCache for MemoryTargetCache {
    fn get_target_data(
        &self,
        _txn: &mut PersistenceTransaction,
        target: &Query,
    ) -> DocSyncResult<Option<TargetData>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.targets.get(&target.canonical_id()).cloned())
    }

    fn get_target_data_for_id(
        &self,
        _txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<Option<TargetData>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .target_ids
            .get(&target_id)
            .and_then(|canonical| inner.targets.get(canonical))
            .cloned())
    }

    fn allocate_target_id(&self, _txn: &mut PersistenceTransaction) -> DocSyncResult<TargetId> {
        let mut inner = self.inner.lock().unwrap();
        // Even ids; odd ids are reserved for limbo resolution targets
        // assigned by the sync layer.
        inner.highest_target_id += 2;
        Ok(inner.highest_target_id)
    }

    fn add_target_data(
        &self,
        _txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let canonical = data.target().canonical_id();
        hard_assert(
            !inner.targets.contains_key(&canonical),
            "Adding a target that is already registered",
        )?;
        inner.target_ids.insert(data.target_id(), canonical.clone());
        inner.targets.insert(canonical, data.clone());
        if data.target_id() > inner.highest_target_id {
            inner.highest_target_id = data.target_id();
        }
        if data.sequence_number() > inner.highest_sequence_number {
            inner.highest_sequence_number = data.sequence_number();
        }
        Ok(())
    }

    fn update_target_data(
        &self,
        _txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let canonical = data.target().canonical_id();
        hard_assert(
            inner.targets.contains_key(&canonical),
            "Updating a target that is not registered",
        )?;
        inner.target_ids.insert(data.target_id(), canonical.clone());
        inner.targets.insert(canonical, data.clone());
        if data.sequence_number() > inner.highest_sequence_number {
            inner.highest_sequence_number = data.sequence_number();
        }
        Ok(())
    }

    fn remove_target_data(
        &self,
        _txn: &mut PersistenceTransaction,
        data: &TargetData,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.targets.remove(&data.target().canonical_id());
        inner.target_ids.remove(&data.target_id());
        inner.references.remove_references_for_id(data.target_id());
        Ok(())
    }

    fn add_matching_keys(
        &self,
        _txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
        target_id: TargetId,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.references.add_references(keys, target_id);
        Ok(())
    }

    fn remove_matching_keys(
        &self,
        _txn: &mut PersistenceTransaction,
        keys: &DocumentKeySet,
        target_id: TargetId,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.references.remove_references(keys, target_id);
        Ok(())
    }

    fn remove_matching_keys_for_target_id(
        &self,
        _txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.references.remove_references_for_id(target_id);
        Ok(())
    }

    fn get_matching_keys_for_target_id(
        &self,
        _txn: &mut PersistenceTransaction,
        target_id: TargetId,
    ) -> DocSyncResult<DocumentKeySet> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.references.references_for_id(target_id))
    }

    fn contains_key(
        &self,
        _txn: &mut PersistenceTransaction,
        key: &DocumentKey,
    ) -> DocSyncResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.references.contains_key(key))
    }

    fn get_last_remote_snapshot_version(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<SnapshotVersion> {
        Ok(self.inner.lock().unwrap().last_remote_snapshot_version)
    }

    fn get_highest_sequence_number(
        &self,
        _txn: &mut PersistenceTransaction,
    ) -> DocSyncResult<ListenSequenceNumber> {
        Ok(self.inner.lock().unwrap().highest_sequence_number)
    }

    fn set_targets_metadata(
        &self,
        _txn: &mut PersistenceTransaction,
        highest_listen_sequence_number: ListenSequenceNumber,
        last_remote_snapshot_version: SnapshotVersion,
    ) -> DocSyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.last_remote_snapshot_version = last_remote_snapshot_version;
        if highest_listen_sequence_number > inner.highest_sequence_number {
            inner.highest_sequence_number = highest_listen_sequence_number;
        }
        Ok(())
    }
}
