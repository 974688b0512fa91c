//! Form state contracts: wizard steps, per-step buckets, the persisted
//! envelope and the declarative field schema.

pub mod bucket;
pub mod checksum;
pub mod envelope;
pub mod schema;
pub mod step;
pub mod value;

pub use bucket::{StepBucket, TIMESTAMP_KEY};
pub use envelope::{CacheEnvelope, EnvelopeRejection, RawEnvelope, ValidatedEnvelope};
pub use schema::{FieldKind, FormSchema, RowGroupSpec, StepSchema};
pub use step::{FormState, FormSteps, StepId, StepParseError};
pub use value::{FieldValue, Scalar};

/// Array marker carried by repeating field names in markup (`autor_nome[]`).
pub const ARRAY_MARKER: &str = "[]";

/// Strips the trailing array marker, returning the base name of a repeating field.
pub fn repeating_base(name: &str) -> Option<&str> {
    name.strip_suffix(ARRAY_MARKER).filter(|base| !base.is_empty())
}

/// Markup name of a repeating field with the given base name.
pub fn repeating_name(base: &str) -> String {
    format!("{base}{ARRAY_MARKER}")
}
