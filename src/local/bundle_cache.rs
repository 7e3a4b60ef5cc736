use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::bundle::types::{BundleMetadata, NamedQuery};
use crate::error::DocSyncResult;
use crate::local::persistence::PersistenceTransaction;

/// Storage for bundle metadata and the named queries bundles define.
pub trait BundleCache: Send + Sync {
    fn get_bundle_metadata(
        &self,
        txn: &mut PersistenceTransaction,
        bundle_id: &str,
    ) -> DocSyncResult<Option<BundleMetadata>>;

    fn save_bundle_metadata(
        &self,
        txn: &mut PersistenceTransaction,
        metadata: &BundleMetadata,
    ) -> DocSyncResult<()>;

    fn get_named_query(
        &self,
        txn: &mut PersistenceTransaction,
        name: &str,
    ) -> DocSyncResult<Option<NamedQuery>>;

    fn save_named_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &NamedQuery,
    ) -> DocSyncResult<()>;
}

#[derive(Default)]
pub struct MemoryBundleCache {
    bundles: Mutex<BTreeMap<String, BundleMetadata>>,
    named_queries: Mutex<BTreeMap<String, NamedQuery>>,
}

impl MemoryBundleCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BundleCache for MemoryBundleCache {
    fn get_bundle_metadata(
        &self,
        _txn: &mut PersistenceTransaction,
        bundle_id: &str,
    ) -> DocSyncResult<Option<BundleMetadata>> {
        Ok(self.bundles.lock().unwrap().get(bundle_id).cloned())
    }

    fn save_bundle_metadata(
        &self,
        _txn: &mut PersistenceTransaction,
        metadata: &BundleMetadata,
    ) -> DocSyncResult<()> {
        self.bundles
            .lock()
            .unwrap()
            .insert(metadata.id.clone(), metadata.clone());
        Ok(())
    }

    fn get_named_query(
        &self,
        _txn: &mut PersistenceTransaction,
        name: &str,
    ) -> DocSyncResult<Option<NamedQuery>> {
        Ok(self.named_queries.lock().unwrap().get(name).cloned())
    }

    fn save_named_query(
        &self,
        _txn: &mut PersistenceTransaction,
        query: &NamedQuery,
    ) -> DocSyncResult<()> {
        self.named_queries
            .lock()
            .unwrap()
            .insert(query.name.clone(), query.clone());
        Ok(())
    }
}
