//! Field-path editing over nested field maps.
//!
//! These helpers power mutation application: writing a value at a dotted
//! path, deleting a path, and reading a path out of raw field maps.

use std::collections::BTreeMap;

use crate::model::FieldPath;
use crate::value::{MapValue, Value, ValueKind};

/// Reads the value at `path` from `data`, if present.
pub fn value_at_path(data: &MapValue, path: &FieldPath) -> Option<Value> {
    data.get(path).cloned()
}

/// Writes `value` at `path`, materializing intermediate maps as needed.
/// A non-map value encountered along the way is replaced by a map.
pub fn set_value_at_path(fields: &mut BTreeMap<String, Value>, path: &FieldPath, value: Value) {
    set_at_segments(fields, path.segments(), value);
}

fn set_at_segments(fields: &mut BTreeMap<String, Value>, segments: &[String], value: Value) {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }

    let mut child_fields = match fields.get(first).map(Value::kind) {
        Some(ValueKind::Map(child)) => child.fields().clone(),
        _ => BTreeMap::new(),
    };
    set_at_segments(&mut child_fields, rest, value);
    fields.insert(first.clone(), Value::from_map(child_fields));
}

/// Removes the value at `path`; empty intermediate maps are pruned.
pub fn delete_value_at_path(fields: &mut BTreeMap<String, Value>, path: &FieldPath) {
    delete_at_segments(fields, path.segments());
}

fn delete_at_segments(fields: &mut BTreeMap<String, Value>, segments: &[String]) {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    if rest.is_empty() {
        fields.remove(first);
        return;
    }

    if let Some(value) = fields.get(first).cloned() {
        if let ValueKind::Map(child) = value.kind() {
            let mut child_fields = child.fields().clone();
            delete_at_segments(&mut child_fields, rest);
            if child_fields.is_empty() {
                fields.remove(first);
            } else {
                fields.insert(first.clone(), Value::from_map(child_fields));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map_value_from;

    fn path(p: &str) -> FieldPath {
        FieldPath::from_dot_separated(p).unwrap()
    }

    #[test]
    fn sets_nested_value() {
        let mut fields = BTreeMap::new();
        set_value_at_path(&mut fields, &path("stats.visits"), Value::from_integer(3));
        let data = MapValue::new(fields);
        assert_eq!(
            value_at_path(&data, &path("stats.visits")),
            Some(Value::from_integer(3))
        );
    }

    #[test]
    fn overwrites_scalar_with_map() {
        let mut fields = map_value_from([("stats", Value::from_integer(1))]).into_fields();
        set_value_at_path(&mut fields, &path("stats.visits"), Value::from_integer(3));
        let data = MapValue::new(fields);
        assert!(value_at_path(&data, &path("stats.visits")).is_some());
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let mut fields = BTreeMap::new();
        set_value_at_path(&mut fields, &path("a.b"), Value::from_bool(true));
        delete_value_at_path(&mut fields, &path("a.b"));
        assert!(fields.is_empty());
    }
}
