use std::collections::BTreeMap;

use crate::model::{
    Document, DocumentKey, FieldPath, MaybeDocument, NoDocument, SnapshotVersion, Timestamp,
};
use crate::value::object::{delete_value_at_path, set_value_at_path, value_at_path};
use crate::value::{MapValue, Value, ValueKind};

/// Guard that must hold against the current document state for a mutation to
/// take effect.
#[derive(Clone, Debug, PartialEq)]
pub enum Precondition {
    None,
    Exists(bool),
    /// Holds when the document exists and its version is not newer than the
    /// given version.
    UpdateTime(SnapshotVersion),
}

impl Precondition {
    pub fn is_none(&self) -> bool {
        matches!(self, Precondition::None)
    }

    pub fn is_validated_by(&self, maybe_doc: Option<&MaybeDocument>) -> bool {
        match self {
            Precondition::None => true,
            Precondition::Exists(true) => {
                matches!(maybe_doc, Some(doc) if doc.is_document())
            }
            Precondition::Exists(false) => {
                !matches!(maybe_doc, Some(doc) if doc.is_document())
            }
            Precondition::UpdateTime(version) => {
                matches!(maybe_doc, Some(doc) if doc.is_document() && doc.version() <= *version)
            }
        }
    }
}

/// Server-evaluated transformation of a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    ServerTimestamp,
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    NumericIncrement(Value),
}

impl TransformOperation {
    /// Idempotent transforms replay safely; non-idempotent ones require a
    /// captured pre-image so a server echo does not double-apply.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, TransformOperation::NumericIncrement(_))
    }

    /// The pre-image stored in a base mutation for this transform, given the
    /// field's previous value. Only non-idempotent transforms have one.
    pub fn compute_base_value(&self, previous: Option<&Value>) -> Option<Value> {
        match self {
            TransformOperation::NumericIncrement(_) => Some(match previous.map(Value::kind) {
                Some(ValueKind::Integer(_)) | Some(ValueKind::Double(_)) => {
                    previous.cloned().expect("numeric previous value")
                }
                _ => Value::from_integer(0),
            }),
            _ => None,
        }
    }

    fn apply(&self, previous: Option<Value>, context_time: Timestamp) -> Value {
        match self {
            TransformOperation::ServerTimestamp => Value::from_timestamp(context_time),
            TransformOperation::ArrayUnion(elements) => {
                let mut values = existing_array(previous);
                for element in elements {
                    if !values.iter().any(|candidate| candidate == element) {
                        values.push(element.clone());
                    }
                }
                Value::from_array(values)
            }
            TransformOperation::ArrayRemove(elements) => {
                let values = existing_array(previous)
                    .into_iter()
                    .filter(|candidate| !elements.iter().any(|needle| needle == candidate))
                    .collect();
                Value::from_array(values)
            }
            TransformOperation::NumericIncrement(operand) => {
                numeric_increment(previous, operand)
            }
        }
    }
}

fn existing_array(previous: Option<Value>) -> Vec<Value> {
    match previous.as_ref().map(Value::kind) {
        Some(ValueKind::Array(array)) => array.values().to_vec(),
        _ => Vec::new(),
    }
}

fn numeric_increment(previous: Option<Value>, operand: &Value) -> Value {
    match (previous.as_ref().map(Value::kind), operand.kind()) {
        (Some(ValueKind::Integer(current)), ValueKind::Integer(delta)) => {
            match current.checked_add(*delta) {
                Some(sum) => Value::from_integer(sum),
                None => Value::from_double(*current as f64 + *delta as f64),
            }
        }
        (Some(ValueKind::Double(current)), ValueKind::Integer(delta)) => {
            Value::from_double(current + *delta as f64)
        }
        (Some(ValueKind::Integer(current)), ValueKind::Double(delta)) => {
            Value::from_double(*current as f64 + delta)
        }
        (Some(ValueKind::Double(current)), ValueKind::Double(delta)) => {
            Value::from_double(current + delta)
        }
        (_, ValueKind::Integer(delta)) => Value::from_integer(*delta),
        (_, ValueKind::Double(delta)) => Value::from_double(*delta),
        // Non-numeric operands are rejected at the API layer; treat as no-op.
        _ => previous.unwrap_or_else(Value::null),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field: FieldPath, operation: TransformOperation) -> Self {
        Self { field, operation }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

/// A single pending write.
///
/// Transforms attach to set and patch mutations; they are evaluated against
/// the pre-mutation document state and their results overlay the written
/// data.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Set {
        key: DocumentKey,
        data: MapValue,
        transforms: Vec<FieldTransform>,
        precondition: Precondition,
    },
    Patch {
        key: DocumentKey,
        data: MapValue,
        mask: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
        precondition: Precondition,
    },
    Delete {
        key: DocumentKey,
        precondition: Precondition,
    },
}

impl Mutation {
    pub fn set(key: DocumentKey, data: MapValue) -> Self {
        Mutation::Set {
            key,
            data,
            transforms: Vec::new(),
            precondition: Precondition::None,
        }
    }

    pub fn set_with_transforms(
        key: DocumentKey,
        data: MapValue,
        transforms: Vec<FieldTransform>,
    ) -> Self {
        Mutation::Set {
            key,
            data,
            transforms,
            precondition: Precondition::None,
        }
    }

    pub fn patch(key: DocumentKey, data: MapValue, mask: Vec<FieldPath>) -> Self {
        Mutation::Patch {
            key,
            data,
            mask,
            transforms: Vec::new(),
            precondition: Precondition::Exists(true),
        }
    }

    pub fn patch_with_transforms(
        key: DocumentKey,
        data: MapValue,
        mask: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
    ) -> Self {
        Mutation::Patch {
            key,
            data,
            mask,
            transforms,
            precondition: Precondition::Exists(true),
        }
    }

    pub fn delete(key: DocumentKey) -> Self {
        Mutation::Delete {
            key,
            precondition: Precondition::None,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            Mutation::Set { key, .. } => key,
            Mutation::Patch { key, .. } => key,
            Mutation::Delete { key, .. } => key,
        }
    }

    pub fn precondition(&self) -> &Precondition {
        match self {
            Mutation::Set { precondition, .. } => precondition,
            Mutation::Patch { precondition, .. } => precondition,
            Mutation::Delete { precondition, .. } => precondition,
        }
    }

    pub fn field_transforms(&self) -> &[FieldTransform] {
        match self {
            Mutation::Set { transforms, .. } => transforms,
            Mutation::Patch { transforms, .. } => transforms,
            Mutation::Delete { .. } => &[],
        }
    }

    pub fn has_non_idempotent_transforms(&self) -> bool {
        self.field_transforms()
            .iter()
            .any(|transform| !transform.operation().is_idempotent())
    }

    /// Captures the pre-image of fields feeding non-idempotent transforms.
    ///
    /// Returns the data for a synthetic patch mutation, or `None` when this
    /// mutation carries no non-idempotent transforms or no document exists to
    /// capture from.
    pub fn extract_base_value(&self, maybe_doc: Option<&MaybeDocument>) -> Option<MapValue> {
        let doc = maybe_doc.and_then(MaybeDocument::as_document)?;
        let mut fields = BTreeMap::new();
        for transform in self.field_transforms() {
            let previous = doc.field(transform.field());
            if let Some(base) = transform.operation().compute_base_value(previous) {
                set_value_at_path(&mut fields, transform.field(), base);
            }
        }
        if fields.is_empty() {
            None
        } else {
            Some(MapValue::new(fields))
        }
    }

    /// Field mask covering the non-idempotent transform targets.
    pub fn base_value_mask(&self) -> Vec<FieldPath> {
        self.field_transforms()
            .iter()
            .filter(|transform| !transform.operation().is_idempotent())
            .map(|transform| transform.field().clone())
            .collect()
    }

    /// Applies this mutation for the latency-compensated local view.
    ///
    /// Returns the document state the user should observe, or the input
    /// unchanged when the precondition does not hold.
    pub fn apply_to_local_view(
        &self,
        maybe_doc: Option<MaybeDocument>,
        local_write_time: Timestamp,
    ) -> Option<MaybeDocument> {
        if !self.precondition().is_validated_by(maybe_doc.as_ref()) {
            return maybe_doc;
        }

        match self {
            Mutation::Set {
                key,
                data,
                transforms,
                ..
            } => {
                let version = post_mutation_version(maybe_doc.as_ref());
                let new_data =
                    transformed_data(data.clone(), transforms, maybe_doc.as_ref(), local_write_time);
                Some(Document::new(key.clone(), version, new_data, true).into())
            }
            Mutation::Patch {
                key,
                data,
                mask,
                transforms,
                ..
            } => {
                let version = post_mutation_version(maybe_doc.as_ref());
                let patched = patch_document_data(maybe_doc.as_ref(), data, mask);
                let new_data =
                    transformed_data(patched, transforms, maybe_doc.as_ref(), local_write_time);
                Some(Document::new(key.clone(), version, new_data, true).into())
            }
            Mutation::Delete { key, .. } => {
                Some(NoDocument::new(key.clone(), SnapshotVersion::MIN).into())
            }
        }
    }

    /// Applies this mutation as acknowledged by the server.
    ///
    /// The resulting document is authoritative up to `ack_version` and no
    /// longer carries pending writes. A patch acknowledged against an absent
    /// cache entry yields `None`; the watch stream later delivers the
    /// authoritative document.
    pub fn apply_to_remote_document(
        &self,
        maybe_doc: Option<MaybeDocument>,
        ack_version: SnapshotVersion,
        commit_time: Timestamp,
    ) -> Option<MaybeDocument> {
        match self {
            Mutation::Set {
                key,
                data,
                transforms,
                ..
            } => {
                let new_data =
                    transformed_data(data.clone(), transforms, maybe_doc.as_ref(), commit_time);
                Some(Document::new(key.clone(), ack_version, new_data, false).into())
            }
            Mutation::Patch {
                key,
                data,
                mask,
                transforms,
                ..
            } => match maybe_doc {
                Some(MaybeDocument::Document(_)) => {
                    let patched = patch_document_data(maybe_doc.as_ref(), data, mask);
                    let new_data =
                        transformed_data(patched, transforms, maybe_doc.as_ref(), commit_time);
                    Some(Document::new(key.clone(), ack_version, new_data, false).into())
                }
                other => other,
            },
            Mutation::Delete { key, .. } => {
                Some(NoDocument::new(key.clone(), ack_version).into())
            }
        }
    }
}

fn post_mutation_version(maybe_doc: Option<&MaybeDocument>) -> SnapshotVersion {
    match maybe_doc {
        Some(MaybeDocument::Document(doc)) => doc.version(),
        _ => SnapshotVersion::MIN,
    }
}

fn patch_document_data(
    maybe_doc: Option<&MaybeDocument>,
    data: &MapValue,
    mask: &[FieldPath],
) -> MapValue {
    let mut fields = maybe_doc
        .and_then(MaybeDocument::as_document)
        .map(|doc| doc.data().fields().clone())
        .unwrap_or_default();
    for path in mask {
        match value_at_path(data, path) {
            Some(value) => set_value_at_path(&mut fields, path, value),
            None => delete_value_at_path(&mut fields, path),
        }
    }
    MapValue::new(fields)
}

fn transformed_data(
    data: MapValue,
    transforms: &[FieldTransform],
    maybe_doc: Option<&MaybeDocument>,
    context_time: Timestamp,
) -> MapValue {
    if transforms.is_empty() {
        return data;
    }

    let previous_doc = maybe_doc.and_then(MaybeDocument::as_document);
    let mut fields = data.into_fields();
    for transform in transforms {
        let previous = previous_doc.and_then(|doc| doc.field(transform.field()).cloned());
        let transformed = transform.operation().apply(previous, context_time);
        set_value_at_path(&mut fields, transform.field(), transformed);
    }
    MapValue::new(fields)
}
