pub mod array_value;
pub mod bytes_value;
pub mod map_value;
pub mod object;
pub mod value;

pub use array_value::ArrayValue;
pub use bytes_value::BytesValue;
pub use map_value::MapValue;
pub use value::{Value, ValueKind};

use std::collections::BTreeMap;

/// Builds a [`MapValue`] from `(name, value)` pairs; test and fixture helper.
pub fn map_value_from<I, S>(entries: I) -> MapValue
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    let mut fields = BTreeMap::new();
    for (name, value) in entries {
        fields.insert(name.into(), value);
    }
    MapValue::new(fields)
}
