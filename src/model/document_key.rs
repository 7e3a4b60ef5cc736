use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::error::{invalid_argument, DocSyncResult};
use crate::model::resource_path::ResourcePath;

/// Path of alternating collection/document segments identifying a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> DocSyncResult<Self> {
        if path.len() < 2 || path.len() % 2 != 0 {
            return Err(invalid_argument(
                "Document keys must point to a document (even number of segments)",
            ));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> DocSyncResult<Self> {
        let resource = ResourcePath::from_string(path)?;
        Self::from_path(resource)
    }

    pub fn collection_path(&self) -> ResourcePath {
        self.path
            .pop_last()
            .expect("DocumentKey path always has a parent collection")
    }

    /// Identifier of the collection immediately containing this document.
    pub fn collection_id(&self) -> &str {
        self.path
            .segment(self.path.len() - 2)
            .expect("DocumentKey path always has a collection segment")
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path
            .last_segment()
            .expect("DocumentKey path always has an id")
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl Ord for DocumentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.as_vec().cmp(other.path.as_vec())
    }
}

impl PartialOrd for DocumentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_even_segments() {
        let err = DocumentKey::from_string("rooms").unwrap_err();
        assert_eq!(err.code_str(), "docsync/invalid-argument");
    }

    #[test]
    fn parses_valid_path() {
        let key = DocumentKey::from_string("rooms/eros").unwrap();
        assert_eq!(key.id(), "eros");
        assert_eq!(key.collection_id(), "rooms");
        assert_eq!(key.collection_path().canonical_string(), "rooms");
    }

    #[test]
    fn orders_by_segments() {
        let a = DocumentKey::from_string("rooms/a").unwrap();
        let b = DocumentKey::from_string("rooms/b").unwrap();
        assert!(a < b);
    }
}
