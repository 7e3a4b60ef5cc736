pub mod document;
pub mod document_key;
pub mod field_path;
pub mod resource_path;
pub mod snapshot_version;
pub mod timestamp;

pub use document::{Document, MaybeDocument, NoDocument};
pub use document_key::DocumentKey;
pub use field_path::FieldPath;
pub use resource_path::ResourcePath;
pub use snapshot_version::SnapshotVersion;
pub use timestamp::Timestamp;

use std::collections::{BTreeMap, BTreeSet};

/// Map from document keys to their current local or remote state.
pub type MaybeDocumentMap = BTreeMap<DocumentKey, MaybeDocument>;

/// Map flavor used where a key may be known but its state unknown.
pub type OptionalMaybeDocumentMap = BTreeMap<DocumentKey, Option<MaybeDocument>>;

/// Set of document keys, ordered by path.
pub type DocumentKeySet = BTreeSet<DocumentKey>;
