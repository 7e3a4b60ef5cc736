use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{internal_error, DocSyncResult};
use crate::local::local_documents_view::LocalDocumentsView;
use crate::local::persistence::PersistenceTransaction;
use crate::model::{Document, DocumentKeySet, MaybeDocumentMap, SnapshotVersion};
use crate::query::{LimitType, Query};

/// Index-free query execution over the local documents view.
///
/// When a query ran before, the documents previously in its result set plus
/// everything that changed since the target's last limbo-free snapshot are
/// sufficient input; the full-collection scan is reserved for first runs and
/// for limit queries whose previous boundary may have been displaced.
pub struct QueryEngine {
    local_documents: Mutex<Option<Arc<LocalDocumentsView>>>,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            local_documents: Mutex::new(None),
        }
    }

    pub fn set_local_documents_view(&self, view: Arc<LocalDocumentsView>) {
        *self.local_documents.lock().unwrap() = Some(view);
    }

    pub fn get_documents_matching_query(
        &self,
        txn: &mut PersistenceTransaction,
        query: &Query,
        last_limbo_free_snapshot_version: SnapshotVersion,
        remote_keys: &DocumentKeySet,
    ) -> DocSyncResult<MaybeDocumentMap> {
        let view = self
            .local_documents
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| internal_error("Query engine used before local documents view set"))?;

        // Queries that have never reached a limbo-free snapshot gain nothing
        // from previous results.
        if last_limbo_free_snapshot_version.is_min() {
            return view.get_documents_matching_query(txn, query, SnapshotVersion::MIN);
        }

        let previous = view.get_documents(txn, remote_keys)?;
        let mut matching_previous: Vec<Document> = previous
            .values()
            .filter_map(|doc| doc.as_document())
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        matching_previous.sort_by(|a, b| query.compare(a, b));

        if query.has_limit()
            && needs_refill(
                query,
                &matching_previous,
                remote_keys,
                last_limbo_free_snapshot_version,
            )
        {
            debug!(
                "QueryEngine: full scan for '{}' (limit query needs refill)",
                query.canonical_id()
            );
            return view.get_documents_matching_query(txn, query, SnapshotVersion::MIN);
        }

        debug!(
            "QueryEngine: re-using {} previous results for '{}'",
            matching_previous.len(),
            query.canonical_id()
        );

        let mut results: MaybeDocumentMap = matching_previous
            .into_iter()
            .map(|doc| (doc.key().clone(), doc.into()))
            .collect();
        let updated = view.get_documents_matching_query(
            txn,
            query,
            last_limbo_free_snapshot_version,
        )?;
        results.extend(updated);
        Ok(results)
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A limit query must rescan when its previous result set may no longer
/// contain the correct boundary: membership shrank, the boundary document
/// has pending writes, or the boundary moved after the limbo-free snapshot.
fn needs_refill(
    query: &Query,
    sorted_previous: &[Document],
    remote_keys: &DocumentKeySet,
    last_limbo_free_snapshot_version: SnapshotVersion,
) -> bool {
    if remote_keys.len() != sorted_previous.len() {
        return true;
    }
    let boundary = match query.limit_type() {
        LimitType::First => sorted_previous.last(),
        LimitType::Last => sorted_previous.first(),
    };
    match boundary {
        None => false,
        Some(doc) => {
            doc.has_pending_writes() || doc.version() > last_limbo_free_snapshot_version
        }
    }
}
