//! `web_sys` binding of the form scope.

use super::{FieldElement, FormScope, InputKind, EXTERNAL_ATTR};
use contracts::shared::form_state::{repeating_name, RowGroupSpec};
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventInit, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

const FIELD_SELECTOR: &str = "input[name], select[name], textarea[name]";

/// Quotes a value for use inside a `[attr="..."]` selector.
fn attr_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn elements(root: &Element, selector: &str) -> Vec<Element> {
    let Ok(list) = root.query_selector_all(selector) else {
        log::warn!("invalid selector `{}`", selector);
        return Vec::new();
    };
    (0..list.length())
        .filter_map(|i| list.get(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct WebField {
    element: Element,
}

impl WebField {
    pub fn element(&self) -> &Element {
        &self.element
    }
}

impl FieldElement for WebField {
    fn name(&self) -> Option<String> {
        self.element.get_attribute("name")
    }

    fn id(&self) -> Option<String> {
        Some(self.element.id()).filter(|id| !id.is_empty())
    }

    fn kind(&self) -> InputKind {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            InputKind::from_input_type(&input.type_())
        } else if self.element.dyn_ref::<HtmlSelectElement>().is_some() {
            InputKind::Select
        } else if self.element.dyn_ref::<HtmlTextAreaElement>().is_some() {
            InputKind::TextArea
        } else {
            InputKind::Button
        }
    }

    fn value(&self) -> String {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            input.value()
        } else if let Some(select) = self.element.dyn_ref::<HtmlSelectElement>() {
            select.value()
        } else if let Some(area) = self.element.dyn_ref::<HtmlTextAreaElement>() {
            area.value()
        } else {
            String::new()
        }
    }

    fn set_value(&self, value: &str) {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            input.set_value(value);
        } else if let Some(select) = self.element.dyn_ref::<HtmlSelectElement>() {
            select.set_value(value);
        } else if let Some(area) = self.element.dyn_ref::<HtmlTextAreaElement>() {
            area.set_value(value);
        }
    }

    fn checked(&self) -> bool {
        self.element
            .dyn_ref::<HtmlInputElement>()
            .is_some_and(|input| input.checked())
    }

    fn set_checked(&self, checked: bool) {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            input.set_checked(checked);
        }
    }

    fn is_external(&self) -> bool {
        self.element.has_attribute(EXTERNAL_ATTR)
    }

    fn notify_changed(&self) {
        for ty in ["input", "change"] {
            let init = EventInit::new();
            init.set_bubbles(true);
            match Event::new_with_event_init_dict(ty, &init) {
                Ok(event) => {
                    let _ = self.element.dispatch_event(&event);
                }
                Err(err) => log::warn!("could not create `{}` event: {:?}", ty, err),
            }
        }
    }
}

/// Form scope rooted at any element (usually the step's `<form>`).
#[derive(Clone, Debug)]
pub struct WebFormScope {
    root: Element,
}

impl WebFormScope {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn by_id(id: &str) -> Option<Self> {
        web_sys::window()?
            .document()?
            .get_element_by_id(id)
            .map(Self::new)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    fn rows(&self, group: &RowGroupSpec) -> Vec<Element> {
        match &group.row_selector {
            Some(selector) => elements(&self.root, selector),
            // Without a row selector each input of the first field is taken
            // to live directly inside its row container.
            None => group
                .fields
                .first()
                .map(|base| self.fields_named(&repeating_name(base)))
                .unwrap_or_default()
                .into_iter()
                .filter_map(|f| f.element.parent_element())
                .collect(),
        }
    }
}

impl FormScope for WebFormScope {
    type Field = WebField;

    fn fields(&self) -> Vec<WebField> {
        elements(&self.root, FIELD_SELECTOR)
            .into_iter()
            .map(|element| WebField { element })
            .collect()
    }

    fn fields_named(&self, name: &str) -> Vec<WebField> {
        let name = attr_value(name);
        let selector = format!(
            "input[name=\"{name}\"], select[name=\"{name}\"], textarea[name=\"{name}\"]"
        );
        elements(&self.root, &selector)
            .into_iter()
            .map(|element| WebField { element })
            .collect()
    }

    fn field_by_id(&self, id: &str) -> Option<WebField> {
        let element = self
            .root
            .query_selector(&format!("[id=\"{}\"]", attr_value(id)))
            .ok()
            .flatten()?;
        let field = WebField { element };
        // Only form controls are valid targets.
        (field.kind() != InputKind::Button).then_some(field)
    }

    fn row_count(&self, group: &RowGroupSpec) -> usize {
        self.rows(group).len()
    }

    fn remove_row(&self, group: &RowGroupSpec, index: usize) -> bool {
        match self.rows(group).get(index) {
            Some(row) => {
                row.remove();
                true
            }
            None => false,
        }
    }
}
