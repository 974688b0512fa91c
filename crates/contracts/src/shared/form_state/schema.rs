//! Declarative per-step field table.
//!
//! Lists which base names repeat together in one dynamic row group and which
//! keys belong to other UI routines. The restorer decides its strategy from
//! this table and from the shape of the stored value, never from the field
//! name itself.

use super::bucket::StepBucket;
use super::step::StepId;
use serde::{Deserialize, Serialize};

/// A set of repeating fields rendered once per dynamic row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowGroupSpec {
    pub id: String,
    /// Base names (without `[]`) of the inputs inside one row.
    pub fields: Vec<String>,
    /// CSS selector matching one row container, relative to the form scope.
    #[serde(default)]
    pub row_selector: Option<String>,
    /// Bucket key holding a list of objects, one per row, handed to the
    /// row factory when growing (e.g. the attached documents).
    #[serde(default)]
    pub seed_field: Option<String>,
}

impl RowGroupSpec {
    pub fn contains(&self, base: &str) -> bool {
        self.fields.iter().any(|f| f == base)
    }

    /// Rows needed to hold every list of this group stored in `bucket`.
    pub fn required_rows(&self, bucket: &StepBucket) -> usize {
        self.fields
            .iter()
            .chain(self.seed_field.iter())
            .map(|field| bucket.list_len(field))
            .max()
            .unwrap_or(0)
    }

    /// Whether `bucket` stores anything for this group at all.
    pub fn has_data(&self, bucket: &StepBucket) -> bool {
        self.fields
            .iter()
            .chain(self.seed_field.iter())
            .any(|field| bucket.contains(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepSchema {
    #[serde(default)]
    pub row_groups: Vec<RowGroupSpec>,
    /// Keys owned by other routines: never cleared, never assigned.
    #[serde(default)]
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind<'a> {
    Scalar,
    Repeating(&'a RowGroupSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormSchema {
    #[serde(default)]
    pub personal: StepSchema,
    #[serde(default)]
    pub social: StepSchema,
    #[serde(default)]
    pub incapacity: StepSchema,
    #[serde(default)]
    pub professional: StepSchema,
    #[serde(default)]
    pub documents: StepSchema,
}

impl FormSchema {
    pub fn step(&self, step: StepId) -> &StepSchema {
        match step {
            StepId::Personal => &self.personal,
            StepId::Social => &self.social,
            StepId::Incapacity => &self.incapacity,
            StepId::Professional => &self.professional,
            StepId::Documents => &self.documents,
        }
    }

    pub fn row_groups(&self, step: StepId) -> &[RowGroupSpec] {
        &self.step(step).row_groups
    }

    pub fn group(&self, step: StepId, id: &str) -> Option<&RowGroupSpec> {
        self.row_groups(step).iter().find(|g| g.id == id)
    }

    pub fn group_of(&self, step: StepId, base: &str) -> Option<&RowGroupSpec> {
        self.row_groups(step).iter().find(|g| g.contains(base))
    }

    pub fn kind_of(&self, step: StepId, field: &str) -> FieldKind<'_> {
        match self.group_of(step, field) {
            Some(group) => FieldKind::Repeating(group),
            None => FieldKind::Scalar,
        }
    }

    pub fn is_external(&self, step: StepId, field: &str) -> bool {
        let schema = self.step(step);
        schema.external.iter().any(|f| f == field)
            || schema
                .row_groups
                .iter()
                .any(|g| g.seed_field.as_deref() == Some(field))
    }
}
