pub mod bundle_cache;
pub mod index_manager;
pub mod local_documents_view;
pub mod local_store;
pub mod local_view_changes;
pub mod memory_persistence;
pub mod mutation_queue;
pub mod persistence;
pub mod query_engine;
pub mod reference_set;
pub mod remote_document_cache;
pub mod target_cache;
pub mod target_data;

pub use bundle_cache::{BundleCache, MemoryBundleCache};
pub use index_manager::{IndexManager, MemoryIndexManager};
pub use local_documents_view::LocalDocumentsView;
pub use local_store::{LocalStore, LocalWriteResult, QueryResult, UserChangeResult};
pub use local_view_changes::LocalViewChanges;
pub use memory_persistence::{MemoryLruReferenceDelegate, MemoryPersistence};
pub use mutation_queue::{MemoryMutationQueue, MutationQueue};
pub use persistence::{
    GarbageCollectionStats, GarbageCollector, ListenSequenceNumber, Persistence,
    PersistenceTransaction, ReferenceDelegate, TransactionMode,
};
pub use query_engine::QueryEngine;
pub use reference_set::ReferenceSet;
pub use remote_document_cache::{
    MemoryRemoteDocumentCache, RemoteDocumentCache, RemoteDocumentChangeBuffer,
};
pub use target_cache::{MemoryTargetCache, TargetCache};
pub use target_data::{TargetData, TargetPurpose};
