//! Leptos context carrying the page's form session.

use super::session::FormSession;
use contracts::shared::form_state::{FieldValue, StepId};
use leptos::prelude::*;
use std::rc::Rc;

#[derive(Clone, Copy)]
pub struct FormSessionContext {
    session: StoredValue<Rc<FormSession>, LocalStorage>,
}

impl FormSessionContext {
    pub fn session(&self) -> Rc<FormSession> {
        self.session.get_value()
    }

    pub fn update_field(&self, step: StepId, field: &str, value: impl Into<FieldValue>) -> bool {
        self.session().update_field(step, field, value)
    }
}

pub fn provide_form_session(session: Rc<FormSession>) -> FormSessionContext {
    let ctx = FormSessionContext {
        session: StoredValue::new_local(session),
    };
    provide_context(ctx);
    ctx
}

/// Opens the page's form session and makes it available to `children`.
#[component]
pub fn FormSessionProvider(children: ChildrenFn) -> impl IntoView {
    match FormSession::browser() {
        Ok(session) => {
            provide_form_session(session);
        }
        Err(err) => log::error!("form session unavailable: {}", err),
    }

    children()
}

pub fn use_form_session() -> Option<FormSessionContext> {
    use_context::<FormSessionContext>()
}

/// `on:input` handler writing one field straight into the store.
pub fn field_writer(step: StepId, field: &'static str) -> impl Fn(String) + Clone + 'static {
    let ctx = use_form_session();
    move |value: String| match ctx {
        Some(ctx) => {
            ctx.update_field(step, field, value);
        }
        None => log::warn!("no form session in context, `{}` not stored", field),
    }
}
