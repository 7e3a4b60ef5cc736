//! Decoding of bundled wire elements into model types.
//!
//! Bundle payloads carry typed field values (`integerValue`, `mapValue`,
//! ...); this converter maps them onto the value model and turns bundled
//! document and query elements into their cache representations.

use serde_json::Value as JsonValue;

use crate::bundle::types::{BundledDocument, BundledNamedQuery, BundledQuery, NamedQuery};
use crate::error::{invalid_argument, DocSyncResult};
use crate::model::{
    Document, DocumentKey, FieldPath, MaybeDocument, NoDocument, ResourcePath, SnapshotVersion,
    Timestamp,
};
use crate::query::{
    FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, Query,
};
use crate::value::{BytesValue, MapValue, Value};

#[derive(Clone, Debug, Default)]
pub struct BundleConverter;

impl BundleConverter {
    pub fn new() -> Self {
        Self
    }

    /// Converts a bundled document into cache form, returning the state and
    /// the read time at which the bundle observed it.
    pub fn to_maybe_document(
        &self,
        bundled: &BundledDocument,
    ) -> DocSyncResult<(MaybeDocument, SnapshotVersion)> {
        let read_time = SnapshotVersion::new(bundled.metadata.read_time);
        if !bundled.metadata.exists {
            let key = DocumentKey::from_string(&bundled.metadata.name)?;
            return Ok((NoDocument::new(key, read_time).into(), read_time));
        }

        let doc = bundled.document.as_ref().ok_or_else(|| {
            invalid_argument(format!(
                "Bundled document {} is marked existing but carries no payload",
                bundled.metadata.name
            ))
        })?;
        let key = DocumentKey::from_string(&doc.name)?;
        let data = self.decode_fields(&doc.fields)?;
        let version = SnapshotVersion::new(doc.update_time);
        Ok((Document::new(key, version, data, false).into(), read_time))
    }

    pub fn to_named_query(&self, bundled: &BundledNamedQuery) -> DocSyncResult<NamedQuery> {
        Ok(NamedQuery {
            name: bundled.name.clone(),
            query: self.decode_bundled_query(&bundled.bundled_query)?,
            read_time: SnapshotVersion::new(bundled.read_time),
        })
    }

    fn decode_bundled_query(&self, bundled: &BundledQuery) -> DocSyncResult<Query> {
        let parent = ResourcePath::from_string(&bundled.parent)?;
        let mut query = match &bundled.collection_group {
            Some(group) => Query::collection_group_at_path(parent, group.clone()),
            None => Query::new(parent),
        };

        for filter in &bundled.filters {
            let op = FilterOperator::from_str(&filter.op).ok_or_else(|| {
                invalid_argument(format!("Unknown filter operator: {}", filter.op))
            })?;
            query = query.with_filter(FieldFilter::new(
                FieldPath::from_dot_separated(&filter.field)?,
                op,
                self.decode_value(&filter.value)?,
            ));
        }

        for order in &bundled.order_by {
            let direction = match order.direction.as_deref() {
                Some("DESCENDING") => OrderDirection::Descending,
                _ => OrderDirection::Ascending,
            };
            query = query.with_order_by(OrderBy::new(
                FieldPath::from_dot_separated(&order.field)?,
                direction,
            ));
        }

        if let Some(limit) = bundled.limit {
            let limit_type = match bundled.limit_type.as_deref() {
                Some("LAST") => LimitType::Last,
                _ => LimitType::First,
            };
            query = query.with_limit(limit, limit_type);
        }

        Ok(query)
    }

    pub fn decode_fields(
        &self,
        fields: &serde_json::Map<String, JsonValue>,
    ) -> DocSyncResult<MapValue> {
        let mut decoded = std::collections::BTreeMap::new();
        for (name, value) in fields {
            decoded.insert(name.clone(), self.decode_value(value)?);
        }
        Ok(MapValue::new(decoded))
    }

    pub fn decode_value(&self, value: &JsonValue) -> DocSyncResult<Value> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid_argument("Field values must be typed objects"))?;

        if object.contains_key("nullValue") {
            return Ok(Value::null());
        }
        if let Some(boolean) = object.get("booleanValue") {
            return Ok(Value::from_bool(boolean.as_bool().ok_or_else(|| {
                invalid_argument("booleanValue must be a boolean")
            })?));
        }
        if let Some(integer) = object.get("integerValue") {
            return Ok(Value::from_integer(match integer {
                JsonValue::String(text) => text
                    .parse::<i64>()
                    .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
                JsonValue::Number(number) => number
                    .as_i64()
                    .ok_or_else(|| invalid_argument("integerValue out of range"))?,
                _ => return Err(invalid_argument("integerValue must be a string or number")),
            }));
        }
        if let Some(double) = object.get("doubleValue") {
            return Ok(Value::from_double(double.as_f64().ok_or_else(|| {
                invalid_argument("doubleValue must be a number")
            })?));
        }
        if let Some(timestamp) = object.get("timestampValue") {
            let timestamp: Timestamp = serde_json::from_value(timestamp.clone())
                .map_err(|err| invalid_argument(format!("Invalid timestampValue: {err}")))?;
            return Ok(Value::from_timestamp(timestamp));
        }
        if let Some(text) = object.get("stringValue") {
            return Ok(Value::from_string(text.as_str().ok_or_else(|| {
                invalid_argument("stringValue must be a string")
            })?));
        }
        if let Some(bytes) = object.get("bytesValue") {
            let encoded = bytes
                .as_str()
                .ok_or_else(|| invalid_argument("bytesValue must be a base64 string"))?;
            return Ok(Value::from_bytes(BytesValue::from_base64(encoded)?));
        }
        if let Some(array) = object.get("arrayValue") {
            let values = array
                .get("values")
                .and_then(JsonValue::as_array)
                .map(|values| {
                    values
                        .iter()
                        .map(|value| self.decode_value(value))
                        .collect::<DocSyncResult<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            return Ok(Value::from_array(values));
        }
        if let Some(map) = object.get("mapValue") {
            let fields = map
                .get("fields")
                .and_then(JsonValue::as_object)
                .cloned()
                .unwrap_or_default();
            return Ok(Value::from_map_value(self.decode_fields(&fields)?));
        }

        Err(invalid_argument("Unknown typed value in bundle"))
    }
}
