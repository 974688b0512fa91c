//! "Add one row" callbacks supplied by the UI layer, keyed by row group id.

use futures::future::{FutureExt, LocalBoxFuture};
use gloo_timers::future::TimeoutFuture;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use thiserror::Error;
use wasm_bindgen::JsCast;

#[derive(Debug, Error)]
#[error("could not add a row to `{group}`: {reason}")]
pub struct RowError {
    pub group: String,
    pub reason: String,
}

impl RowError {
    pub fn new(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            reason: reason.into(),
        }
    }
}

pub trait RowFactory {
    /// Appends exactly one row. `seed` is the stored object for the new row
    /// when the group declares a seed field (e.g. one attached document).
    fn add_row(&self, seed: Option<Value>) -> LocalBoxFuture<'static, Result<(), RowError>>;
}

impl<F, Fut> RowFactory for F
where
    F: Fn(Option<Value>) -> Fut,
    Fut: Future<Output = Result<(), RowError>> + 'static,
{
    fn add_row(&self, seed: Option<Value>) -> LocalBoxFuture<'static, Result<(), RowError>> {
        self(seed).boxed_local()
    }
}

/// Clicks the group's "add" button and yields one tick so the new row renders.
#[derive(Clone, Debug)]
pub struct ButtonRowFactory {
    group: String,
    selector: String,
}

impl ButtonRowFactory {
    pub fn new(group: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            selector: selector.into(),
        }
    }
}

impl RowFactory for ButtonRowFactory {
    fn add_row(&self, seed: Option<Value>) -> LocalBoxFuture<'static, Result<(), RowError>> {
        let group = self.group.clone();
        let selector = self.selector.clone();
        async move {
            if seed.is_some() {
                log::debug!("button factory for `{}` ignores row seed", group);
            }
            let button = web_sys::window()
                .and_then(|w| w.document())
                .and_then(|d| d.query_selector(&selector).ok().flatten())
                .and_then(|el| el.dyn_into::<web_sys::HtmlElement>().ok())
                .ok_or_else(|| RowError::new(&group, format!("no button matches `{selector}`")))?;
            button.click();
            TimeoutFuture::new(0).await;
            Ok(())
        }
        .boxed_local()
    }
}

/// Registry of row factories. Clones share the same table.
#[derive(Clone, Default)]
pub struct RowFactories {
    inner: Rc<RefCell<HashMap<String, Rc<dyn RowFactory>>>>,
}

impl RowFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, group: impl Into<String>, factory: impl RowFactory + 'static) {
        self.inner.borrow_mut().insert(group.into(), Rc::new(factory));
    }

    pub fn unregister(&self, group: &str) -> bool {
        self.inner.borrow_mut().remove(group).is_some()
    }

    pub fn get(&self, group: &str) -> Option<Rc<dyn RowFactory>> {
        self.inner.borrow().get(group).cloned()
    }
}
