use super::field::FieldValue;
use std::collections::HashMap;
use std::fmt;

type NamedValues<V> = HashMap<String, V, ahash::RandomState>;

/// Prepared arguments for one evaluation, keyed by input field name.
///
/// Built fresh for every row and consumed by a single `evaluate` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    values: NamedValues<FieldValue>,
}

impl FeatureRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity_and_hasher(capacity, ahash::RandomState::default()),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A decoded output value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Double(f64),
    Integer(i64),
    Text(String),
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Double(v) => write!(f, "{v}"),
            ResultValue::Integer(v) => write!(f, "{v}"),
            ResultValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Named outputs of one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRecord {
    values: NamedValues<ResultValue>,
}

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ResultValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ResultValue> {
        self.values.get(name)
    }
}

/// Column name under which the probability of `category` is reported.
pub fn probability_name(category: f64) -> String {
    format!("probability({category})")
}
