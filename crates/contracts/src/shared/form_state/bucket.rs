use super::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved bucket key carrying the capture time (epoch millis).
pub const TIMESTAMP_KEY: &str = "_timestamp";

/// Field values of one wizard step.
///
/// Keys are either scalar field names or repeating base names (without the
/// `[]` marker). The capture time lives in its own typed slot so it is never
/// mistaken for form data; on the wire it is the `_timestamp` key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepBucket {
    #[serde(rename = "_timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl StepBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Inserts a value; the reserved timestamp key is refused.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        let field = field.into();
        if field == TIMESTAMP_KEY || field.is_empty() {
            return false;
        }
        self.fields.insert(field, value.into());
        true
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Row count backing a repeating base name (0 when absent).
    pub fn list_len(&self, base: &str) -> usize {
        self.fields.get(base).map(FieldValue::row_len).unwrap_or(0)
    }

    /// Overlays freshly collected values on this bucket.
    ///
    /// Keys absent from `collected` keep their previous value, so data the UI
    /// keeps outside plain inputs survives a capture pass.
    pub fn merge_collected(&mut self, collected: BTreeMap<String, FieldValue>, now_ms: i64) {
        for (field, value) in collected {
            self.insert(field, value);
        }
        self.timestamp = Some(now_ms);
    }

    /// Drops entries that carry nothing (empty strings, empty or all-blank
    /// lists). Returns how many keys were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.fields.len();
        self.fields.retain(|_, value| !value.is_empty());
        before - self.fields.len()
    }
}

impl FromIterator<(String, FieldValue)> for StepBucket {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut bucket = StepBucket::new();
        for (field, value) in iter {
            bucket.insert(field, value);
        }
        bucket
    }
}
