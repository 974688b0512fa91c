use super::cache_manager::CacheManager;
use crate::shared::clock::Clock;
use contracts::shared::form_state::{FieldValue, FormState, StepBucket, StepId};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// FormStateStore holds the wizard's field values for the whole session.
/// Every mutation is written through to the storage slot.
pub struct FormStateStore {
    state: RefCell<FormState>,
    cache: CacheManager,
    clock: Rc<dyn Clock>,
}

impl FormStateStore {
    pub fn new(cache: CacheManager, clock: Rc<dyn Clock>) -> Self {
        Self {
            state: RefCell::new(FormState::new()),
            cache,
            clock,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> FormState {
        self.state.borrow().clone()
    }

    /// Copy of one step's bucket
    pub fn bucket(&self, step: StepId) -> StepBucket {
        self.state.borrow().steps.bucket(step).clone()
    }

    pub fn active_step(&self) -> Option<StepId> {
        self.state.borrow().active_step
    }

    pub fn set_active_step(&self, step: StepId) {
        {
            let mut state = self.state.borrow_mut();
            if state.active_step == Some(step) {
                return;
            }
            state.active_step = Some(step);
        }
        self.persist();
    }

    /// Single-field write used by change handlers outside a full capture.
    /// Field names are not checked against any schema.
    pub fn update_field(&self, step: StepId, field: &str, value: impl Into<FieldValue>) -> bool {
        {
            let mut state = self.state.borrow_mut();
            let bucket = state.steps.bucket_mut(step);
            if !bucket.insert(field, value) {
                log::warn!("refusing to store reserved or empty field name `{}`", field);
                return false;
            }
            bucket.timestamp = Some(self.clock.now_ms());
        }
        self.persist()
    }

    pub fn remove_field(&self, step: StepId, field: &str) -> Option<FieldValue> {
        let removed = self.state.borrow_mut().steps.bucket_mut(step).remove(field);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Overlays a capture pass on a copy of the step's bucket, stamps it and
    /// writes it back.
    pub fn commit_capture(&self, step: StepId, collected: BTreeMap<String, FieldValue>) -> StepBucket {
        let bucket = {
            let mut state = self.state.borrow_mut();
            let mut bucket = state.steps.bucket(step).clone();
            bucket.merge_collected(collected, self.clock.now_ms());
            *state.steps.bucket_mut(step) = bucket.clone();
            bucket
        };
        self.persist();
        bucket
    }

    /// Back to the five empty buckets with no active step; the storage slot
    /// is removed.
    pub fn reset(&self) {
        *self.state.borrow_mut() = FormState::new();
        self.cache.clear();
    }

    pub fn persist(&self) -> bool {
        let state = self.state.borrow();
        self.cache.persist(&state)
    }

    /// Replaces the in-memory state with a validated envelope, if any.
    pub fn load(&self) -> bool {
        match self.cache.load() {
            Some(state) => {
                *self.state.borrow_mut() = state;
                true
            }
            None => false,
        }
    }

    /// Plain `formData` object, as read by the report generator.
    pub fn report_data(&self) -> Value {
        serde_json::to_value(&self.state.borrow().steps).unwrap_or_else(|err| {
            log::error!("could not serialize form data: {}", err);
            Value::Null
        })
    }
}
