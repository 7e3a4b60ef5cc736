pub mod converter;
pub mod loader;
pub mod reader;
pub mod types;

pub use converter::BundleConverter;
pub use loader::{BundleLoadResult, BundleLoader, LoadBundleProgress, TaskState};
pub use reader::{encode_bundle, BundleReader};
pub use types::{
    BundleDocument, BundleElement, BundleMetadata, BundledDocument, BundledDocumentMetadata,
    BundledFilter, BundledNamedQuery, BundledOrderBy, BundledQuery, NamedQuery,
    SizedBundleElement,
};
