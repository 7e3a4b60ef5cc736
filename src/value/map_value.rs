use std::collections::BTreeMap;

use crate::model::FieldPath;
use crate::value::{Value, ValueKind};

/// Nested map of named fields forming a document's data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: BTreeMap<String, Value>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Retrieves the value referenced by the provided field path, if present.
    pub fn get(&self, field_path: &FieldPath) -> Option<&Value> {
        get_from_segments(self.fields(), field_path.segments())
    }
}

fn get_from_segments<'a>(
    fields: &'a BTreeMap<String, Value>,
    segments: &[String],
) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let value = fields.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else if let ValueKind::Map(child) = value.kind() {
        get_from_segments(child.fields(), rest)
    } else {
        None
    }
}
