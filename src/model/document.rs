use crate::model::{DocumentKey, FieldPath, SnapshotVersion};
use crate::value::{MapValue, Value};

/// A document that exists at a confirmed or locally mutated state.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    key: DocumentKey,
    version: SnapshotVersion,
    data: MapValue,
    has_pending_writes: bool,
}

impl Document {
    pub fn new(
        key: DocumentKey,
        version: SnapshotVersion,
        data: MapValue,
        has_pending_writes: bool,
    ) -> Self {
        Self {
            key,
            version,
            data,
            has_pending_writes,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn data(&self) -> &MapValue {
        &self.data
    }

    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }

    pub fn field(&self, path: &FieldPath) -> Option<&Value> {
        self.data.get(path)
    }
}

/// Tombstone recording that a document is known not to exist at `version`.
#[derive(Clone, Debug, PartialEq)]
pub struct NoDocument {
    key: DocumentKey,
    version: SnapshotVersion,
}

impl NoDocument {
    pub fn new(key: DocumentKey, version: SnapshotVersion) -> Self {
        Self { key, version }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }
}

/// Cached document state: either a concrete document or a tombstone.
///
/// A `NoDocument` carrying [`SnapshotVersion::MIN`] is the manufactured
/// tombstone produced for permission-denied limbo resolution. It is applied to
/// reads but must never be written into the remote document cache.
#[derive(Clone, Debug, PartialEq)]
pub enum MaybeDocument {
    Document(Document),
    NoDocument(NoDocument),
}

impl MaybeDocument {
    pub fn key(&self) -> &DocumentKey {
        match self {
            MaybeDocument::Document(doc) => doc.key(),
            MaybeDocument::NoDocument(doc) => doc.key(),
        }
    }

    pub fn version(&self) -> SnapshotVersion {
        match self {
            MaybeDocument::Document(doc) => doc.version(),
            MaybeDocument::NoDocument(doc) => doc.version(),
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        match self {
            MaybeDocument::Document(doc) => doc.has_pending_writes(),
            MaybeDocument::NoDocument(_) => false,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, MaybeDocument::Document(_))
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            MaybeDocument::Document(doc) => Some(doc),
            MaybeDocument::NoDocument(_) => None,
        }
    }

    /// True for the manufactured permission-denied tombstone.
    pub fn is_manufactured_no_document(&self) -> bool {
        matches!(self, MaybeDocument::NoDocument(doc) if doc.version().is_min())
    }
}

impl From<Document> for MaybeDocument {
    fn from(doc: Document) -> Self {
        MaybeDocument::Document(doc)
    }
}

impl From<NoDocument> for MaybeDocument {
    fn from(doc: NoDocument) -> Self {
        MaybeDocument::NoDocument(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map_value_from;

    #[test]
    fn manufactured_tombstone_detection() {
        let key = DocumentKey::from_string("rooms/eros").unwrap();
        let manufactured = MaybeDocument::NoDocument(NoDocument::new(
            key.clone(),
            SnapshotVersion::MIN,
        ));
        let regular = MaybeDocument::NoDocument(NoDocument::new(
            key.clone(),
            SnapshotVersion::from_seconds_and_nanos(1, 0),
        ));
        assert!(manufactured.is_manufactured_no_document());
        assert!(!regular.is_manufactured_no_document());
    }

    #[test]
    fn document_accessors() {
        let key = DocumentKey::from_string("rooms/eros").unwrap();
        let doc = Document::new(
            key.clone(),
            SnapshotVersion::from_seconds_and_nanos(4, 0),
            map_value_from([("open", Value::from_bool(true))]),
            true,
        );
        let maybe = MaybeDocument::from(doc);
        assert_eq!(maybe.key(), &key);
        assert!(maybe.has_pending_writes());
        assert!(maybe.is_document());
    }
}
