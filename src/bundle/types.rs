use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{SnapshotVersion, Timestamp};
use crate::query::Query;

/// Header element describing the bundle that follows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    pub id: String,
    #[serde(default)]
    pub version: u32,
    pub create_time: SnapshotVersion,
    #[serde(default)]
    pub total_documents: u32,
    #[serde(default)]
    pub total_bytes: u64,
}

/// Saved query definition shipped inside a bundle, in wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledNamedQuery {
    pub name: String,
    pub read_time: Timestamp,
    pub bundled_query: BundledQuery,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledQuery {
    pub parent: String,
    #[serde(default)]
    pub collection_group: Option<String>,
    #[serde(default)]
    pub filters: Vec<BundledFilter>,
    #[serde(default)]
    pub order_by: Vec<BundledOrderBy>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub limit_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledFilter {
    pub field: String,
    pub op: String,
    pub value: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledOrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Option<String>,
}

/// Announces the document named next in the stream, or records that it does
/// not exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledDocumentMetadata {
    pub name: String,
    pub read_time: Timestamp,
    #[serde(default)]
    pub exists: bool,
    /// Names of the bundled queries this document belongs to.
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Full document payload with typed field values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDocument {
    pub name: String,
    pub update_time: Timestamp,
    #[serde(default)]
    pub fields: serde_json::Map<String, JsonValue>,
}

/// One element of the bundle stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleElement {
    Metadata(BundleMetadata),
    NamedQuery(BundledNamedQuery),
    DocumentMetadata(BundledDocumentMetadata),
    Document(BundleDocument),
}

/// Element plus the number of wire bytes it occupied, for progress tracking.
#[derive(Clone, Debug, PartialEq)]
pub struct SizedBundleElement {
    pub element: BundleElement,
    pub byte_length: usize,
}

/// Metadata/document pairing accumulated while reading a bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct BundledDocument {
    pub metadata: BundledDocumentMetadata,
    pub document: Option<BundleDocument>,
}

/// Decoded named query as stored in the bundle cache.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedQuery {
    pub name: String,
    pub query: Query,
    pub read_time: SnapshotVersion,
}
