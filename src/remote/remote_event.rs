use std::collections::BTreeMap;

use crate::model::{DocumentKeySet, MaybeDocument, MaybeDocumentMap, SnapshotVersion};

/// Identifier under which a server-side listen is registered.
pub type TargetId = i32;

/// Aggregated result of a batch of watch responses, ready to be applied to
/// the local cache.
#[derive(Clone, Debug, Default)]
pub struct RemoteEvent {
    /// Snapshot version the event brings the client up to. The minimum
    /// version marks events that carry no consistent global snapshot.
    pub snapshot_version: SnapshotVersion,
    pub target_changes: BTreeMap<TargetId, TargetChange>,
    pub document_updates: MaybeDocumentMap,
    /// Keys whose limbo resolution completed with this event.
    pub resolved_limbo_documents: DocumentKeySet,
}

impl RemoteEvent {
    pub fn is_empty(&self) -> bool {
        self.target_changes.is_empty()
            && self.document_updates.is_empty()
            && self.resolved_limbo_documents.is_empty()
    }

    pub fn add_document_update(&mut self, doc: MaybeDocument) {
        self.document_updates.insert(doc.key().clone(), doc);
    }
}

/// Per-target membership and resume-token delta within a remote event.
#[derive(Clone, Debug, Default)]
pub struct TargetChange {
    /// Opaque server cursor; empty when the server sent none.
    pub resume_token: Vec<u8>,
    /// Whether the server reported the target as up to date.
    pub current: bool,
    pub added_documents: DocumentKeySet,
    pub modified_documents: DocumentKeySet,
    pub removed_documents: DocumentKeySet,
}

impl TargetChange {
    /// True when the change reports any document membership movement.
    pub fn has_document_changes(&self) -> bool {
        !self.added_documents.is_empty()
            || !self.modified_documents.is_empty()
            || !self.removed_documents.is_empty()
    }
}
