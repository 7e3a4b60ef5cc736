use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::model::{Document, DocumentKey, FieldPath, ResourcePath};
use crate::value::{Value, ValueKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "LESS_THAN" => FilterOperator::LessThan,
            "LESS_THAN_OR_EQUAL" => FilterOperator::LessThanOrEqual,
            "GREATER_THAN" => FilterOperator::GreaterThan,
            "GREATER_THAN_OR_EQUAL" => FilterOperator::GreaterThanOrEqual,
            "EQUAL" => FilterOperator::Equal,
            "NOT_EQUAL" => FilterOperator::NotEqual,
            "ARRAY_CONTAINS" => FilterOperator::ArrayContains,
            "ARRAY_CONTAINS_ANY" => FilterOperator::ArrayContainsAny,
            "IN" => FilterOperator::In,
            "NOT_IN" => FilterOperator::NotIn,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitType {
    First,
    Last,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    op: FilterOperator,
    value: Value,
}

impl FieldFilter {
    pub fn new(field: FieldPath, op: FilterOperator, value: Value) -> Self {
        Self { field, op, value }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn op(&self) -> FilterOperator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn matches(&self, doc: &Document) -> bool {
        match field_value(doc, &self.field) {
            Some(value) => self.evaluate(&value),
            None => match self.op {
                FilterOperator::NotEqual => self.evaluate(&Value::null()),
                _ => false,
            },
        }
    }

    fn evaluate(&self, value: &Value) -> bool {
        match self.op {
            FilterOperator::Equal => value == &self.value,
            FilterOperator::NotEqual => value != &self.value,
            FilterOperator::LessThan => compare_values(value, &self.value) == Some(Ordering::Less),
            FilterOperator::LessThanOrEqual => matches!(
                compare_values(value, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::GreaterThan => {
                compare_values(value, &self.value) == Some(Ordering::Greater)
            }
            FilterOperator::GreaterThanOrEqual => matches!(
                compare_values(value, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::ArrayContains => match value.kind() {
                ValueKind::Array(array) => array.contains(&self.value),
                _ => false,
            },
            FilterOperator::ArrayContainsAny => match (value.kind(), self.value.kind()) {
                (ValueKind::Array(array), ValueKind::Array(needles)) => {
                    needles.values().iter().any(|needle| array.contains(needle))
                }
                _ => false,
            },
            FilterOperator::In => match self.value.kind() {
                ValueKind::Array(values) => values.contains(value),
                _ => false,
            },
            FilterOperator::NotIn => match self.value.kind() {
                ValueKind::Array(values) => {
                    !matches!(value.kind(), ValueKind::Null) && !values.contains(value)
                }
                _ => false,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// A query over the local document space.
///
/// Also serves as the target definition persisted in the target cache: the
/// canonical id is the identity under which listens are registered.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    path: ResourcePath,
    collection_group: Option<String>,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
    limit_type: LimitType,
}

impl Query {
    pub fn new(path: ResourcePath) -> Self {
        Self {
            path,
            collection_group: None,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            limit_type: LimitType::First,
        }
    }

    pub fn collection_group(group: impl Into<String>) -> Self {
        Self::collection_group_at_path(ResourcePath::root(), group)
    }

    /// Collection-group query scoped beneath `path`.
    pub fn collection_group_at_path(path: ResourcePath, group: impl Into<String>) -> Self {
        Self {
            path,
            collection_group: Some(group.into()),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            limit_type: LimitType::First,
        }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_limit(mut self, limit: u32, limit_type: LimitType) -> Self {
        self.limit = Some(limit);
        self.limit_type = limit_type;
        self
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn collection_group_name(&self) -> Option<&str> {
        self.collection_group.as_deref()
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn explicit_order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    /// True when the query addresses exactly one document.
    pub fn is_document_query(&self) -> bool {
        self.path.len() % 2 == 0
            && !self.path.is_empty()
            && self.collection_group.is_none()
            && self.filters.is_empty()
    }

    pub fn is_collection_group_query(&self) -> bool {
        self.collection_group.is_some()
    }

    /// Rewrites a collection-group query as a concrete collection query
    /// rooted at `path`, preserving filters, ordering, and limits.
    pub fn as_collection_query_at_path(mut self, path: ResourcePath) -> Self {
        self.path = path;
        self.collection_group = None;
        self
    }

    /// Effective ordering: explicit clauses followed by the key ordering.
    pub fn result_order_by(&self) -> Vec<OrderBy> {
        let mut order = self.order_by.clone();
        let direction = order
            .last()
            .map(|o| o.direction())
            .unwrap_or(OrderDirection::Ascending);
        if !order
            .iter()
            .any(|o| o.field() == &FieldPath::document_id())
        {
            order.push(OrderBy::new(FieldPath::document_id(), direction));
        }
        order
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_path(doc.key())
            && self.matches_order_by(doc)
            && self.filters.iter().all(|filter| filter.matches(doc))
    }

    fn matches_path(&self, key: &DocumentKey) -> bool {
        match &self.collection_group {
            Some(group) => {
                key.collection_id() == group && self.path.is_prefix_of(key.path())
            }
            None => {
                if self.path.len() % 2 == 0 && !self.path.is_empty() {
                    // Document query: path must be the key itself.
                    key.path() == &self.path
                } else {
                    key.collection_path() == self.path
                }
            }
        }
    }

    fn matches_order_by(&self, doc: &Document) -> bool {
        self.order_by.iter().all(|order| {
            order.field() == &FieldPath::document_id() || doc.field(order.field()).is_some()
        })
    }

    /// Total order over matching documents: explicit clauses, then the key.
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        for order in self.result_order_by() {
            let ordering = if order.field() == &FieldPath::document_id() {
                left.key().cmp(right.key())
            } else {
                let left_value = field_value(left, order.field()).unwrap_or_else(Value::null);
                let right_value = field_value(right, order.field()).unwrap_or_else(Value::null);
                compare_values(&left_value, &right_value).unwrap_or(Ordering::Equal)
            };
            let ordering = match order.direction() {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable identity string for target registration.
    pub fn canonical_id(&self) -> String {
        let mut id = self.path.canonical_string();
        if let Some(group) = &self.collection_group {
            let _ = write!(id, "|cg:{group}");
        }
        for filter in &self.filters {
            let _ = write!(
                id,
                "|f:{}{}{:?}",
                filter.field().canonical_string(),
                filter.op().as_str(),
                filter.value()
            );
        }
        for order in &self.order_by {
            let _ = write!(
                id,
                "|ob:{}{}",
                order.field().canonical_string(),
                order.direction().as_str()
            );
        }
        if let Some(limit) = self.limit {
            let _ = write!(
                id,
                "|l:{limit}{}",
                match self.limit_type {
                    LimitType::First => "f",
                    LimitType::Last => "l",
                }
            );
        }
        id
    }
}

fn field_value(doc: &Document, field: &FieldPath) -> Option<Value> {
    if field == &FieldPath::document_id() {
        return Some(Value::from_string(doc.key().path().canonical_string()));
    }
    doc.field(field).cloned()
}

/// Partial order across comparable value kinds; `None` for mixed kinds that
/// have no defined relative order.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
