//! In-memory form used by unit tests.

use super::{FieldElement, FormScope, InputKind};
use crate::shared::state::row_factory::RowError;
use contracts::shared::form_state::{repeating_name, RowGroupSpec};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
struct FakeFieldData {
    name: Option<String>,
    id: Option<String>,
    kind: InputKind,
    value: String,
    checked: bool,
    external: bool,
    notifications: usize,
    row: Option<(String, u32)>,
}

#[derive(Debug, Clone)]
pub struct FakeField(Rc<RefCell<FakeFieldData>>);

impl PartialEq for FakeField {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FakeField {
    pub fn new(kind: InputKind, name: Option<&str>) -> Self {
        Self(Rc::new(RefCell::new(FakeFieldData {
            name: name.map(str::to_string),
            id: None,
            kind,
            value: String::new(),
            checked: false,
            external: false,
            notifications: 0,
            row: None,
        })))
    }

    pub fn text(name: &str) -> Self {
        Self::new(InputKind::Text, Some(name))
    }

    pub fn checkbox(name: &str) -> Self {
        Self::new(InputKind::Checkbox, Some(name))
    }

    pub fn radio(name: &str, value: &str) -> Self {
        Self::new(InputKind::Radio, Some(name)).with_value(value)
    }

    pub fn with_value(self, value: &str) -> Self {
        self.0.borrow_mut().value = value.to_string();
        self
    }

    pub fn with_id(self, id: &str) -> Self {
        self.0.borrow_mut().id = Some(id.to_string());
        self
    }

    pub fn with_checked(self, checked: bool) -> Self {
        self.0.borrow_mut().checked = checked;
        self
    }

    pub fn external(self) -> Self {
        self.0.borrow_mut().external = true;
        self
    }

    pub fn notifications(&self) -> usize {
        self.0.borrow().notifications
    }
}

impl FieldElement for FakeField {
    fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    fn id(&self) -> Option<String> {
        self.0.borrow().id.clone()
    }

    fn kind(&self) -> InputKind {
        self.0.borrow().kind
    }

    fn value(&self) -> String {
        self.0.borrow().value.clone()
    }

    fn set_value(&self, value: &str) {
        self.0.borrow_mut().value = value.to_string();
    }

    fn checked(&self) -> bool {
        self.0.borrow().checked
    }

    fn set_checked(&self, checked: bool) {
        self.0.borrow_mut().checked = checked;
    }

    fn is_external(&self) -> bool {
        self.0.borrow().external
    }

    fn notify_changed(&self) {
        self.0.borrow_mut().notifications += 1;
    }
}

#[derive(Debug, Default)]
struct FakeFormData {
    fields: Vec<FakeField>,
    next_row: u32,
}

/// Flat list of fields; rows are tagged runs of fields. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeForm(Rc<RefCell<FakeFormData>>);

impl FakeForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, field: FakeField) -> FakeField {
        self.0.borrow_mut().fields.push(field.clone());
        field
    }

    /// Appends one row with a text input per field of the group.
    pub fn add_row(&self, group: &RowGroupSpec) {
        let mut data = self.0.borrow_mut();
        let row = data.next_row;
        data.next_row += 1;
        for base in &group.fields {
            let field = FakeField::text(&repeating_name(base));
            field.0.borrow_mut().row = Some((group.id.clone(), row));
            data.fields.push(field);
        }
    }

    fn row_ids(&self, group: &RowGroupSpec) -> Vec<u32> {
        let mut ids = Vec::new();
        for field in &self.0.borrow().fields {
            if let Some((gid, row)) = &field.0.borrow().row {
                if gid == &group.id && !ids.contains(row) {
                    ids.push(*row);
                }
            }
        }
        ids
    }

    /// Row factory appending to this form, like an "add" button would.
    pub fn row_factory(
        &self,
        group: &RowGroupSpec,
    ) -> impl Fn(Option<serde_json::Value>) -> futures::future::Ready<Result<(), RowError>> {
        let form = self.clone();
        let group = group.clone();
        move |_seed| {
            form.add_row(&group);
            futures::future::ready(Ok(()))
        }
    }

    pub fn values_named(&self, name: &str) -> Vec<String> {
        self.fields_named(name).iter().map(|f| f.value()).collect()
    }
}

impl FormScope for FakeForm {
    type Field = FakeField;

    fn fields(&self) -> Vec<FakeField> {
        self.0.borrow().fields.clone()
    }

    fn field_by_id(&self, id: &str) -> Option<FakeField> {
        self.0
            .borrow()
            .fields
            .iter()
            .find(|f| f.id().as_deref() == Some(id))
            .cloned()
    }

    fn row_count(&self, group: &RowGroupSpec) -> usize {
        self.row_ids(group).len()
    }

    fn remove_row(&self, group: &RowGroupSpec, index: usize) -> bool {
        let Some(row) = self.row_ids(group).get(index).copied() else {
            return false;
        };
        self.0.borrow_mut().fields.retain(|f| {
            f.0.borrow()
                .row
                .as_ref()
                .map_or(true, |(gid, r)| gid != &group.id || *r != row)
        });
        true
    }
}
