use std::collections::BTreeMap;

use crate::bundle::converter::BundleConverter;
use crate::bundle::types::{
    BundleElement, BundleMetadata, BundledDocument, BundledNamedQuery, SizedBundleElement,
};
use crate::error::{invalid_argument, DocSyncResult};
use crate::local::local_store::LocalStore;
use crate::local::persistence::Persistence;
use crate::model::{DocumentKey, DocumentKeySet, MaybeDocumentMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Error,
    Running,
    Success,
}

/// Point-in-time snapshot of a bundle load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadBundleProgress {
    pub task_state: TaskState,
    pub documents_loaded: u32,
    pub total_documents: u32,
    pub bytes_loaded: u64,
    pub total_bytes: u64,
}

/// Final outcome of a bundle load.
#[derive(Debug)]
pub struct BundleLoadResult {
    pub progress: LoadBundleProgress,
    pub changed_docs: MaybeDocumentMap,
}

/// Accumulates a bundle's elements and commits them to the local store.
///
/// Elements stream in one at a time; a document payload must immediately
/// follow its metadata. `complete` applies everything buffered: documents
/// first, then the named queries over the loaded keys.
pub struct BundleLoader<'a, P: Persistence> {
    local_store: &'a LocalStore<P>,
    metadata: BundleMetadata,
    queries: Vec<BundledNamedQuery>,
    documents: Vec<BundledDocument>,
    bytes_loaded: u64,
}

impl<'a, P: Persistence> BundleLoader<'a, P> {
    pub fn new(local_store: &'a LocalStore<P>, metadata: BundleMetadata) -> Self {
        Self {
            local_store,
            metadata,
            queries: Vec::new(),
            documents: Vec::new(),
            bytes_loaded: 0,
        }
    }

    /// Buffers one element. Returns an updated progress snapshot when the
    /// element completed a document, `None` otherwise.
    pub fn add_sized_element(
        &mut self,
        element: SizedBundleElement,
    ) -> DocSyncResult<Option<LoadBundleProgress>> {
        self.bytes_loaded += element.byte_length as u64;

        let document_completed = match element.element {
            BundleElement::Metadata(_) => {
                return Err(invalid_argument(
                    "Bundle metadata may only appear at the start of a bundle",
                ));
            }
            BundleElement::NamedQuery(query) => {
                self.queries.push(query);
                false
            }
            BundleElement::DocumentMetadata(metadata) => {
                if let Some(pending) = self.documents.last() {
                    if pending.metadata.exists && pending.document.is_none() {
                        return Err(invalid_argument(format!(
                            "Bundled document {} is missing its payload",
                            pending.metadata.name
                        )));
                    }
                }
                let completes = !metadata.exists;
                self.documents.push(BundledDocument {
                    metadata,
                    document: None,
                });
                completes
            }
            BundleElement::Document(doc) => {
                let pending = self.documents.last_mut().ok_or_else(|| {
                    invalid_argument("Bundled document arrived without preceding metadata")
                })?;
                if !pending.metadata.exists || pending.document.is_some() {
                    return Err(invalid_argument(format!(
                        "Unexpected bundled document payload {}",
                        doc.name
                    )));
                }
                if pending.metadata.name != doc.name {
                    return Err(invalid_argument(format!(
                        "Bundled document name {} does not match its metadata {}",
                        doc.name, pending.metadata.name
                    )));
                }
                pending.document = Some(doc);
                true
            }
        };

        if document_completed {
            Ok(Some(self.progress(TaskState::Running)))
        } else {
            Ok(None)
        }
    }

    fn documents_loaded(&self) -> u32 {
        self.documents
            .iter()
            .filter(|doc| !doc.metadata.exists || doc.document.is_some())
            .count() as u32
    }

    fn progress(&self, task_state: TaskState) -> LoadBundleProgress {
        LoadBundleProgress {
            task_state,
            documents_loaded: self.documents_loaded(),
            total_documents: self.metadata.total_documents,
            bytes_loaded: self.bytes_loaded,
            total_bytes: self.metadata.total_bytes,
        }
    }

    /// Applies the buffered documents and named queries, records the bundle
    /// as loaded, and reports the resulting document changes.
    pub fn complete(self) -> DocSyncResult<BundleLoadResult> {
        if let Some(pending) = self.documents.last() {
            if pending.metadata.exists && pending.document.is_none() {
                return Err(invalid_argument(format!(
                    "Bundle ended while document {} was still pending",
                    pending.metadata.name
                )));
            }
        }

        let changed_docs = self
            .local_store
            .apply_bundle_documents(&self.documents, &self.metadata.id)?;

        let mut keys_by_query: BTreeMap<&str, DocumentKeySet> = BTreeMap::new();
        for doc in &self.documents {
            for query_name in &doc.metadata.queries {
                let key = DocumentKey::from_string(&doc.metadata.name)?;
                keys_by_query
                    .entry(query_name.as_str())
                    .or_default()
                    .insert(key);
            }
        }

        let converter = BundleConverter::new();
        for bundled_query in &self.queries {
            let named_query = converter.to_named_query(bundled_query)?;
            let keys = keys_by_query
                .remove(named_query.name.as_str())
                .unwrap_or_default();
            self.local_store.save_named_query(&named_query, keys)?;
        }

        self.local_store.save_bundle(&self.metadata)?;

        Ok(BundleLoadResult {
            progress: self.progress(TaskState::Success),
            changed_docs,
        })
    }
}
