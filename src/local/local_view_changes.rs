use crate::model::DocumentKeySet;
use crate::remote::TargetId;

/// Delta in a view's document membership, reported back by the sync layer
/// after it raises a snapshot to the user.
#[derive(Clone, Debug, Default)]
pub struct LocalViewChanges {
    pub target_id: TargetId,
    /// True when the snapshot was served from cache rather than confirmed by
    /// the server.
    pub from_cache: bool,
    pub added: DocumentKeySet,
    pub removed: DocumentKeySet,
}

impl LocalViewChanges {
    pub fn new(
        target_id: TargetId,
        from_cache: bool,
        added: DocumentKeySet,
        removed: DocumentKeySet,
    ) -> Self {
        Self {
            target_id,
            from_cache,
            added,
            removed,
        }
    }
}
