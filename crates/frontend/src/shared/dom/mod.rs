//! Minimal view of a form's DOM used by capture and restore.
//!
//! [`web`] binds it to `web_sys`; tests run against an in-memory form.

pub mod web;

#[cfg(test)]
pub mod fake;

use contracts::shared::form_state::RowGroupSpec;

/// Attribute marking an input as owned by another routine.
pub const EXTERNAL_ATTR: &str = "data-ficha-external";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Checkbox,
    Radio,
    Select,
    TextArea,
    Hidden,
    File,
    Button,
}

impl InputKind {
    /// Parses the `type` attribute of an `<input>`.
    pub fn from_input_type(ty: &str) -> Self {
        match ty.to_ascii_lowercase().as_str() {
            "checkbox" => InputKind::Checkbox,
            "radio" => InputKind::Radio,
            "hidden" => InputKind::Hidden,
            "file" => InputKind::File,
            "button" | "submit" | "reset" | "image" => InputKind::Button,
            _ => InputKind::Text,
        }
    }

    /// Carries a value worth capturing.
    pub fn holds_data(&self) -> bool {
        !matches!(self, InputKind::File | InputKind::Button)
    }

    /// May be blanked before a restore. Inputs owned by other routines are
    /// opted out with [`EXTERNAL_ATTR`] or the schema's `external` list, not
    /// by their kind.
    pub fn is_clearable(&self) -> bool {
        matches!(
            self,
            InputKind::Text
                | InputKind::Checkbox
                | InputKind::Radio
                | InputKind::Select
                | InputKind::TextArea
                | InputKind::Hidden
        )
    }
}

pub trait FieldElement: Clone + PartialEq {
    fn name(&self) -> Option<String>;
    fn id(&self) -> Option<String>;
    fn kind(&self) -> InputKind;
    fn value(&self) -> String;
    fn set_value(&self, value: &str);
    fn checked(&self) -> bool;
    fn set_checked(&self, checked: bool);
    /// Marked with [`EXTERNAL_ATTR`].
    fn is_external(&self) -> bool;
    /// Fires `input` and `change` so dependent UI recomputes.
    fn notify_changed(&self);
}

/// A form, or any element subtree acting as one.
pub trait FormScope {
    type Field: FieldElement;

    /// Named input, select and textarea elements in document order.
    fn fields(&self) -> Vec<Self::Field>;

    fn fields_named(&self, name: &str) -> Vec<Self::Field> {
        self.fields()
            .into_iter()
            .filter(|f| f.name().as_deref() == Some(name))
            .collect()
    }

    fn field_by_id(&self, id: &str) -> Option<Self::Field>;

    /// Rows of a dynamic group currently rendered.
    fn row_count(&self, group: &RowGroupSpec) -> usize;

    /// Removes the row at `index`; returns false when nothing was removed.
    fn remove_row(&self, group: &RowGroupSpec, index: usize) -> bool;
}
