//! Page-level listeners: save on unload, throttled autosave on input.

use crate::shared::dom::web::WebFormScope;
use crate::shared::state::session::FormSession;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventTarget};

struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

/// Installed listeners; dropping this removes them.
pub struct PageHooks {
    listeners: Vec<Listener>,
}

impl PageHooks {
    pub fn install(session: Rc<FormSession>, form_root: Element) -> Self {
        let mut hooks = Self {
            listeners: Vec::new(),
        };

        if let Some(window) = web_sys::window() {
            for event in ["pagehide", "beforeunload"] {
                let session = Rc::clone(&session);
                let root = form_root.clone();
                hooks.listen(window.clone().unchecked_into(), event, move |_| {
                    session.navigator().on_unload(&WebFormScope::new(root.clone()));
                });
            }
        } else {
            log::warn!("no window, unload capture disabled");
        }

        for event in ["input", "change"] {
            let session = Rc::clone(&session);
            let root = form_root.clone();
            hooks.listen(form_root.clone().unchecked_into(), event, move |_| {
                session.autosave(&WebFormScope::new(root.clone()));
            });
        }

        hooks
    }

    fn listen(&mut self, target: EventTarget, event: &'static str, handler: impl FnMut(Event) + 'static) {
        let callback = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        if let Err(err) =
            target.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
        {
            log::warn!("could not listen for `{}`: {:?}", event, err);
            return;
        }
        self.listeners.push(Listener {
            target,
            event,
            callback,
        });
    }
}

impl Drop for PageHooks {
    fn drop(&mut self) {
        for listener in self.listeners.drain(..) {
            let _ = listener.target.remove_event_listener_with_callback(
                listener.event,
                listener.callback.as_ref().unchecked_ref(),
            );
        }
    }
}
