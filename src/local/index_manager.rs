use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::error::DocSyncResult;
use crate::local::persistence::PersistenceTransaction;
use crate::model::ResourcePath;

/// Index over collection parents, consulted by collection-group queries.
pub trait IndexManager: Send + Sync {
    fn add_to_collection_parent_index(
        &self,
        txn: &mut PersistenceTransaction,
        collection_path: &ResourcePath,
    ) -> DocSyncResult<()>;

    fn get_collection_parents(
        &self,
        txn: &mut PersistenceTransaction,
        collection_id: &str,
    ) -> DocSyncResult<Vec<ResourcePath>>;
}

#[derive(Default)]
pub struct MemoryIndexManager {
    collection_parents: Mutex<BTreeMap<String, BTreeSet<ResourcePath>>>,
}

impl MemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexManager for MemoryIndexManager {
    fn add_to_collection_parent_index(
        &self,
        _txn: &mut PersistenceTransaction,
        collection_path: &ResourcePath,
    ) -> DocSyncResult<()> {
        if let Some(collection_id) = collection_path.last_segment() {
            let parent = collection_path
                .pop_last()
                .unwrap_or_else(ResourcePath::root);
            self.collection_parents
                .lock()
                .unwrap()
                .entry(collection_id.to_string())
                .or_default()
                .insert(parent);
        }
        Ok(())
    }

    fn get_collection_parents(
        &self,
        _txn: &mut PersistenceTransaction,
        collection_id: &str,
    ) -> DocSyncResult<Vec<ResourcePath>> {
        Ok(self
            .collection_parents
            .lock()
            .unwrap()
            .get(collection_id)
            .map(|parents| parents.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::persistence::TransactionMode;

    #[test]
    fn records_distinct_parents() {
        let manager = MemoryIndexManager::new();
        let mut txn = PersistenceTransaction::new("test", TransactionMode::ReadWrite, 1);
        for path in ["rooms/eros/messages", "rooms/ares/messages", "messages"] {
            manager
                .add_to_collection_parent_index(
                    &mut txn,
                    &ResourcePath::from_string(path).unwrap(),
                )
                .unwrap();
        }
        let parents = manager
            .get_collection_parents(&mut txn, "messages")
            .unwrap();
        assert_eq!(parents.len(), 3);
    }
}
