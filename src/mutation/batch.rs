use std::collections::BTreeMap;

use crate::error::{internal_error, DocSyncResult};
use crate::model::{
    DocumentKeySet, MaybeDocument, MaybeDocumentMap, OptionalMaybeDocumentMap, SnapshotVersion,
    Timestamp,
};
use crate::mutation::Mutation;

pub type BatchId = i32;

/// Group of mutations written atomically by the local client.
///
/// `base_mutations` are synthetic patches that capture the pre-image of
/// fields feeding non-idempotent transforms. They affect only the local view
/// and are never sent to the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationBatch {
    pub batch_id: BatchId,
    pub local_write_time: Timestamp,
    pub base_mutations: Vec<Mutation>,
    pub mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new(
        batch_id: BatchId,
        local_write_time: Timestamp,
        base_mutations: Vec<Mutation>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Self {
            batch_id,
            local_write_time,
            base_mutations,
            mutations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Keys affected by the user-facing mutations.
    pub fn keys(&self) -> DocumentKeySet {
        self.mutations
            .iter()
            .map(|mutation| mutation.key().clone())
            .collect()
    }

    /// Overlays this batch onto the given state of one document.
    pub fn apply_to_local_view(
        &self,
        key: &crate::model::DocumentKey,
        maybe_doc: Option<MaybeDocument>,
    ) -> Option<MaybeDocument> {
        let mut doc = maybe_doc;
        for mutation in self.base_mutations.iter().filter(|m| m.key() == key) {
            doc = mutation.apply_to_local_view(doc, self.local_write_time);
        }
        for mutation in self.mutations.iter().filter(|m| m.key() == key) {
            doc = mutation.apply_to_local_view(doc, self.local_write_time);
        }
        doc
    }

    /// Overlays this batch onto a set of documents, returning the states the
    /// user should observe for every key the batch touches.
    pub fn apply_to_local_document_set(
        &self,
        docs: &OptionalMaybeDocumentMap,
    ) -> MaybeDocumentMap {
        let mut results = MaybeDocumentMap::new();
        for key in self.keys() {
            let base = docs.get(&key).cloned().flatten();
            if let Some(mutated) = self.apply_to_local_view(&key, base) {
                results.insert(key, mutated);
            }
        }
        results
    }

    /// Applies the acknowledged effect of this batch for one key.
    ///
    /// Base mutations are skipped: they exist purely for latency
    /// compensation and have no server-side counterpart.
    pub fn apply_to_remote_document(
        &self,
        key: &crate::model::DocumentKey,
        maybe_doc: Option<MaybeDocument>,
        result: &MutationBatchResult,
    ) -> DocSyncResult<Option<MaybeDocument>> {
        let ack_version = result.doc_versions.get(key).copied().ok_or_else(|| {
            internal_error(format!(
                "Batch {} acknowledged without a version for {key}",
                self.batch_id
            ))
        })?;

        let mut doc = maybe_doc;
        for mutation in self.mutations.iter().filter(|m| m.key() == key) {
            doc = mutation.apply_to_remote_document(
                doc,
                ack_version,
                result.commit_version.timestamp(),
            );
        }
        Ok(doc)
    }
}

/// Server acknowledgement of a mutation batch.
#[derive(Clone, Debug)]
pub struct MutationBatchResult {
    pub batch: MutationBatch,
    pub commit_version: SnapshotVersion,
    pub doc_versions: BTreeMap<crate::model::DocumentKey, SnapshotVersion>,
    pub stream_token: Vec<u8>,
}

impl MutationBatchResult {
    pub fn new(
        batch: MutationBatch,
        commit_version: SnapshotVersion,
        doc_versions: BTreeMap<crate::model::DocumentKey, SnapshotVersion>,
        stream_token: Vec<u8>,
    ) -> Self {
        Self {
            batch,
            commit_version,
            doc_versions,
            stream_token,
        }
    }

    /// Builds a result where every document committed at the batch commit
    /// version.
    pub fn from_commit_version(
        batch: MutationBatch,
        commit_version: SnapshotVersion,
        stream_token: Vec<u8>,
    ) -> Self {
        let doc_versions = batch
            .keys()
            .into_iter()
            .map(|key| (key, commit_version))
            .collect();
        Self::new(batch, commit_version, doc_versions, stream_token)
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch.batch_id
    }
}
