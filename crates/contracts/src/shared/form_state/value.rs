use serde::{Deserialize, Serialize};

/// A single form value as read from (or written to) one input element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Text(String),
}

impl Scalar {
    /// Checkbox coercion: `true` or the literal string `"true"` check the box,
    /// anything else leaves it unchecked.
    pub fn is_checked(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Text(s) => s == "true",
            Scalar::Null => false,
        }
    }

    /// Text to place in a value-bearing input.
    pub fn to_input_string(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Bool(_) => false,
            Scalar::Text(s) => s.is_empty(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Value stored under one key of a step bucket.
///
/// `List` holds the values of a repeating field, one entry per DOM row;
/// position is the row index. `Opaque` keeps structured data owned by the UI
/// layer (e.g. the assembled list of attached documents) exactly as it was
/// pushed through `update_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Opaque(serde_json::Value),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Number of rows this value accounts for when it backs a repeating field.
    /// Structured arrays count their elements.
    pub fn row_len(&self) -> usize {
        match self {
            FieldValue::Scalar(Scalar::Null) => 0,
            FieldValue::Scalar(_) => 1,
            FieldValue::List(items) => items.len(),
            FieldValue::Opaque(serde_json::Value::Array(items)) => items.len(),
            FieldValue::Opaque(_) => 0,
        }
    }

    /// Empty string, empty array, or an array with nothing but blanks.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(Scalar::Text(s)) => s.is_empty(),
            FieldValue::Scalar(_) => false,
            FieldValue::List(items) => items.iter().all(Scalar::is_blank),
            FieldValue::Opaque(serde_json::Value::Array(items)) => items.is_empty(),
            FieldValue::Opaque(serde_json::Value::String(s)) => s.is_empty(),
            FieldValue::Opaque(_) => false,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<Vec<Scalar>> for FieldValue {
    fn from(value: Vec<Scalar>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(Scalar::from).collect())
    }
}

impl From<serde_json::Value> for FieldValue {
    /// Plain JSON coming from JS handlers; scalars and arrays of scalars are
    /// normalised, anything else is kept opaque.
    fn from(value: serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(FieldValue::Opaque(value))
    }
}
