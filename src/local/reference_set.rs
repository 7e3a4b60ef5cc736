use std::collections::BTreeSet;

use crate::model::{DocumentKey, DocumentKeySet};

/// Two-way index of (document key, id) references.
///
/// Backs the target-cache matching sets and the mutation queue's key index;
/// lookups are needed in both directions, so references are stored twice.
#[derive(Debug, Default)]
pub struct ReferenceSet {
    by_key: BTreeSet<(DocumentKey, i32)>,
    by_id: BTreeSet<(i32, DocumentKey)>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn add_reference(&mut self, key: &DocumentKey, id: i32) {
        self.by_key.insert((key.clone(), id));
        self.by_id.insert((id, key.clone()));
    }

    pub fn add_references(&mut self, keys: &DocumentKeySet, id: i32) {
        for key in keys {
            self.add_reference(key, id);
        }
    }

    pub fn remove_reference(&mut self, key: &DocumentKey, id: i32) {
        self.by_key.remove(&(key.clone(), id));
        self.by_id.remove(&(id, key.clone()));
    }

    pub fn remove_references(&mut self, keys: &DocumentKeySet, id: i32) {
        for key in keys {
            self.remove_reference(key, id);
        }
    }

    /// Removes every reference held under `id`, returning the keys released.
    pub fn remove_references_for_id(&mut self, id: i32) -> DocumentKeySet {
        let keys = self.references_for_id(id);
        for key in &keys {
            self.remove_reference(key, id);
        }
        keys
    }

    pub fn references_for_id(&self, id: i32) -> DocumentKeySet {
        self.by_id
            .iter()
            .skip_while(|(entry_id, _)| *entry_id < id)
            .take_while(|(entry_id, _)| *entry_id == id)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn ids_for_key(&self, key: &DocumentKey) -> Vec<i32> {
        self.by_key
            .range((key.clone(), i32::MIN)..=(key.clone(), i32::MAX))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn contains_key(&self, key: &DocumentKey) -> bool {
        self.by_key
            .range((key.clone(), i32::MIN)..=(key.clone(), i32::MAX))
            .next()
            .is_some()
    }
}
