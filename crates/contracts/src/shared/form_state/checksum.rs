//! Corruption check for the persisted envelope.
//!
//! A 32-bit rolling hash (`h = h * 31 + unit`, wrapping) over the canonical
//! JSON text of `formData`. It only has to notice truncation or a flipped
//! character; it is not an integrity guarantee against tampering.

use serde::Serialize;
use serde_json::{Map, Value};

/// JSON text with object keys sorted at every level.
pub fn canonical_json<T: Serialize>(data: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(data)?;
    serde_json::to_string(&sorted(value))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (key, inner) in entries {
                out.insert(key, sorted(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Order-sensitive rolling hash over UTF-16 code units, rendered as 8 hex digits.
pub fn rolling_hash(text: &str) -> String {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    format!("{:08x}", hash as u32)
}

/// Checksum of any serializable value via its canonical JSON text.
pub fn checksum<T: Serialize>(data: &T) -> serde_json::Result<String> {
    canonical_json(data).map(|text| rolling_hash(&text))
}
