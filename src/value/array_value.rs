use crate::value::Value;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayValue {
    values: Vec<Value>,
}

impl ArrayValue {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn contains(&self, needle: &Value) -> bool {
        self.values.iter().any(|candidate| candidate == needle)
    }
}
