//! JavaScript entry point for pages whose wizard UI is not written in Rust.
//!
//! ```js
//! const ficha = new FichaHandle("ficha-form");
//! ficha.registerRowFactory("familiares", () => addFamiliarRow());
//! await ficha.goTo("social", async () => router.show("social"));
//! ficha.updateField("documents", "documentos_anexados", docs);
//! ```

use crate::shared::dom::web::WebFormScope;
use crate::shared::state::navigation::NavigationOutcome;
use crate::shared::state::row_factory::{ButtonRowFactory, RowError, RowFactory};
use crate::shared::state::session::FormSession;
use crate::system::hooks::PageHooks;
use contracts::shared::form_state::{FieldValue, StepId};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::Serialize;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_step(step: &str) -> Result<StepId, JsValue> {
    step.parse::<StepId>().map_err(js_err)
}

/// Plain JS objects (not `Map`s) for nested data.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_err)
}

/// Row factory backed by a JS function; a returned Promise is awaited.
struct JsRowFactory {
    group: String,
    callback: js_sys::Function,
}

impl RowFactory for JsRowFactory {
    fn add_row(&self, seed: Option<serde_json::Value>) -> LocalBoxFuture<'static, Result<(), RowError>> {
        let group = self.group.clone();
        let callback = self.callback.clone();
        async move {
            let arg = match &seed {
                Some(seed) => to_js(seed).map_err(|e| RowError::new(&group, format!("{e:?}")))?,
                None => JsValue::UNDEFINED,
            };
            let result = callback
                .call1(&JsValue::NULL, &arg)
                .map_err(|e| RowError::new(&group, format!("{e:?}")))?;
            if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
                JsFuture::from(promise)
                    .await
                    .map_err(|e| RowError::new(&group, format!("{e:?}")))?;
            }
            Ok(())
        }
        .boxed_local()
    }
}

#[wasm_bindgen]
pub struct FichaHandle {
    session: Rc<FormSession>,
    root: web_sys::Element,
    hooks: Option<PageHooks>,
}

impl FichaHandle {
    fn scope(&self) -> WebFormScope {
        WebFormScope::new(self.root.clone())
    }

    fn ensure_open(&self) -> Result<(), JsValue> {
        if self.session.is_torn_down() {
            return Err(js_err("form session is closed"));
        }
        Ok(())
    }
}

#[wasm_bindgen]
impl FichaHandle {
    /// Opens the session for the form (or wrapper element) with id `form_root_id`.
    #[wasm_bindgen(constructor)]
    pub fn new(form_root_id: &str) -> Result<FichaHandle, JsValue> {
        let scope = WebFormScope::by_id(form_root_id)
            .ok_or_else(|| js_err(format!("no element with id `{form_root_id}`")))?;
        let session = FormSession::browser().map_err(js_err)?;
        let root = scope.root().clone();
        let hooks = PageHooks::install(Rc::clone(&session), root.clone());
        Ok(Self {
            session,
            root,
            hooks: Some(hooks),
        })
    }

    /// Forced capture of the active step; false when no step is active.
    #[wasm_bindgen(js_name = captureNow)]
    pub fn capture_now(&self) -> bool {
        if self.session.is_torn_down() {
            return false;
        }
        self.session.navigator().capture_now(&self.scope()).is_some()
    }

    /// Restores `step` into the current markup; resolves to the restore report.
    #[wasm_bindgen(js_name = restoreStep)]
    pub fn restore_step(&self, step: &str) -> Result<js_sys::Promise, JsValue> {
        self.ensure_open()?;
        let step = parse_step(step)?;
        let session = Rc::clone(&self.session);
        let scope = self.scope();
        Ok(future_to_promise(async move {
            let report = session.navigator().restore_step(step, &scope).await;
            to_js(&report)
        }))
    }

    /// Capture, then `render(step)` (may return a Promise), then restore.
    /// Resolves to `true` when the navigation completed.
    #[wasm_bindgen(js_name = goTo)]
    pub fn go_to(&self, step: &str, render: js_sys::Function) -> Result<js_sys::Promise, JsValue> {
        self.ensure_open()?;
        let target = parse_step(step)?;
        let session = Rc::clone(&self.session);
        let root = self.root.clone();
        Ok(future_to_promise(async move {
            let current = WebFormScope::new(root.clone());
            let outcome = session
                .navigator()
                .go_to(Some(&current), target, |step| async move {
                    let rendered = match render.call1(&JsValue::NULL, &JsValue::from_str(step.as_str())) {
                        Ok(value) => value,
                        Err(err) => {
                            log::error!("render callback for `{}` failed: {:?}", step, err);
                            return None;
                        }
                    };
                    if let Ok(promise) = rendered.dyn_into::<js_sys::Promise>() {
                        if let Err(err) = JsFuture::from(promise).await {
                            log::error!("render of `{}` rejected: {:?}", step, err);
                            return None;
                        }
                    }
                    Some(WebFormScope::new(root))
                })
                .await;
            Ok(JsValue::from_bool(matches!(
                outcome,
                NavigationOutcome::Completed { .. }
            )))
        }))
    }

    #[wasm_bindgen(js_name = updateField)]
    pub fn update_field(&self, step: &str, field: &str, value: JsValue) -> Result<bool, JsValue> {
        let step = parse_step(step)?;
        let value: serde_json::Value = serde_wasm_bindgen::from_value(value).map_err(js_err)?;
        Ok(self.session.update_field(step, field, FieldValue::from(value)))
    }

    #[wasm_bindgen(js_name = setActiveStep)]
    pub fn set_active_step(&self, step: &str) -> Result<(), JsValue> {
        self.ensure_open()?;
        self.session.store().set_active_step(parse_step(step)?);
        Ok(())
    }

    /// `callback(seed?)` must append exactly one row to `group`.
    #[wasm_bindgen(js_name = registerRowFactory)]
    pub fn register_row_factory(&self, group: &str, callback: js_sys::Function) {
        self.session.row_factories().register(
            group,
            JsRowFactory {
                group: group.to_string(),
                callback,
            },
        );
    }

    /// Grows `group` by clicking the button matching `selector`.
    #[wasm_bindgen(js_name = registerAddButton)]
    pub fn register_add_button(&self, group: &str, selector: &str) {
        self.session
            .row_factories()
            .register(group, ButtonRowFactory::new(group, selector));
    }

    /// Plain `formData` object keyed by step name.
    #[wasm_bindgen(js_name = formData)]
    pub fn form_data(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.report_data())
    }

    pub fn clear(&self) {
        self.session.clear();
    }

    /// Final capture and listener removal.
    pub fn teardown(&mut self) {
        self.hooks = None;
        self.session.teardown(Some(&self.scope()));
    }
}
