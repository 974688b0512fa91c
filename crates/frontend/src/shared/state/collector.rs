//! Field collector: reads a form scope into a flat key → value map.
//!
//! Checkboxes yield their checked state, a radio group yields the value of
//! its checked member (or null), `name[]` inputs are gathered positionally
//! under their base name, and everything else is keyed by its literal name.

use super::form_state_manager::FormStateStore;
use crate::shared::clock::Clock;
use crate::shared::dom::{FieldElement, FormScope, InputKind};
use crate::shared::guard::Cooldown;
use contracts::shared::form_state::{
    repeating_base, FieldValue, FormSchema, Scalar, StepBucket, StepId, ARRAY_MARKER,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub type CollectedFields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured(StepBucket),
    /// Dropped by the minimum-interval guard.
    Throttled,
}

fn scalar_of<F: FieldElement>(field: &F, kind: InputKind) -> Scalar {
    match kind {
        InputKind::Checkbox => Scalar::Bool(field.checked()),
        InputKind::Radio if field.checked() => Scalar::Text(field.value()),
        InputKind::Radio => Scalar::Null,
        _ => Scalar::Text(field.value()),
    }
}

/// Single DOM pass. Never fails: unnamed or non-data elements are skipped.
pub fn collect_fields<S: FormScope>(scope: &S) -> CollectedFields {
    let mut collected = CollectedFields::new();
    let mut radios: BTreeMap<String, Scalar> = BTreeMap::new();

    for field in scope.fields() {
        let Some(name) = field.name().filter(|n| !n.trim().is_empty()) else {
            continue;
        };
        let kind = field.kind();
        if !kind.holds_data() {
            continue;
        }

        if let Some(base) = repeating_base(&name) {
            let value = scalar_of(&field, kind);
            match collected
                .entry(base.to_string())
                .or_insert_with(|| FieldValue::List(Vec::new()))
            {
                FieldValue::List(items) => items.push(value),
                other => {
                    log::warn!("`{}` is both scalar and repeating in this form", base);
                    *other = FieldValue::List(vec![value]);
                }
            }
            continue;
        }
        if name.ends_with(ARRAY_MARKER) {
            continue;
        }

        match kind {
            InputKind::Radio => {
                let group = radios.entry(name).or_default();
                if field.checked() {
                    *group = Scalar::Text(field.value());
                }
            }
            _ => {
                if collected.contains_key(&name) {
                    log::debug!("duplicate field name `{}`, keeping the last one", name);
                }
                collected.insert(name, FieldValue::Scalar(scalar_of(&field, kind)));
            }
        }
    }

    for (name, value) in radios {
        collected.insert(name, FieldValue::Scalar(value));
    }
    collected
}

/// Pads the lists of each row group to a common length so position N still
/// names the same row for every member. Returns the number of padded lists.
pub fn align_row_groups(collected: &mut CollectedFields, schema: &FormSchema, step: StepId) -> usize {
    let mut padded = 0;
    for group in schema.row_groups(step) {
        let rows = group
            .fields
            .iter()
            .filter_map(|f| collected.get(f).and_then(FieldValue::as_list))
            .map(<[Scalar]>::len)
            .max()
            .unwrap_or(0);
        for base in &group.fields {
            if let Some(FieldValue::List(items)) = collected.get_mut(base) {
                if items.len() < rows {
                    log::warn!(
                        "`{}` has {} of {} rows in group `{}`, padding with blanks",
                        base,
                        items.len(),
                        rows,
                        group.id
                    );
                    items.resize(rows, Scalar::Text(String::new()));
                    padded += 1;
                }
            }
        }
    }
    padded
}

pub struct FieldCollector {
    schema: Rc<FormSchema>,
    throttle: Cooldown,
    /// Row groups the last restore of a step could not grow to full length.
    short_groups: RefCell<BTreeMap<StepId, BTreeSet<String>>>,
}

impl FieldCollector {
    pub fn new(schema: Rc<FormSchema>, clock: Rc<dyn Clock>, min_interval_ms: i64) -> Self {
        Self {
            schema,
            throttle: Cooldown::new(min_interval_ms, clock),
            short_groups: RefCell::new(BTreeMap::new()),
        }
    }

    /// Records the groups a restore of `step` left short. Until the DOM
    /// shows every stored row again, captures keep the stored rows that
    /// have no element.
    pub fn mark_short_groups(&self, step: StepId, groups: &[String]) {
        let mut short = self.short_groups.borrow_mut();
        if groups.is_empty() {
            short.remove(&step);
        } else {
            short.insert(step, groups.iter().cloned().collect());
        }
    }

    pub fn is_short(&self, step: StepId, group: &str) -> bool {
        self.short_groups
            .borrow()
            .get(&step)
            .is_some_and(|groups| groups.contains(group))
    }

    fn keep_unrendered_rows(&self, store: &FormStateStore, step: StepId, collected: &mut CollectedFields) {
        let Some(groups) = self.short_groups.borrow().get(&step).cloned() else {
            return;
        };
        let stored = store.bucket(step);
        let mut caught_up = Vec::new();

        for id in groups {
            let Some(group) = self.schema.group(step, &id) else {
                caught_up.push(id);
                continue;
            };
            let stored_rows = group
                .fields
                .iter()
                .map(|f| stored.list_len(f))
                .max()
                .unwrap_or(0);
            let dom_rows = group
                .fields
                .iter()
                .filter_map(|f| collected.get(f).and_then(FieldValue::as_list))
                .map(<[Scalar]>::len)
                .max()
                .unwrap_or(0);
            if dom_rows >= stored_rows {
                caught_up.push(id);
                continue;
            }

            for base in &group.fields {
                let Some(FieldValue::List(kept)) = stored.get(base) else {
                    continue;
                };
                if let Some(FieldValue::List(items)) = collected.get_mut(base) {
                    if items.len() < kept.len() {
                        items.extend_from_slice(&kept[items.len()..]);
                    }
                }
            }
            log::info!(
                "group `{}` shows {} of {} stored rows, keeping the rest",
                group.id,
                dom_rows,
                stored_rows
            );
        }

        if let Some(groups) = self.short_groups.borrow_mut().get_mut(&step) {
            for id in &caught_up {
                groups.remove(id);
            }
        }
    }

    /// Capture triggered by DOM activity; ignored when the previous capture
    /// finished less than the minimum interval ago.
    pub fn capture<S: FormScope>(&self, store: &FormStateStore, scope: &S, step: StepId) -> CaptureOutcome {
        if !self.throttle.try_pass() {
            log::debug!("capture of `{}` throttled", step);
            return CaptureOutcome::Throttled;
        }
        CaptureOutcome::Captured(self.capture_now(store, scope, step))
    }

    /// Unthrottled capture for navigation and unload.
    pub fn capture_now<S: FormScope>(&self, store: &FormStateStore, scope: &S, step: StepId) -> StepBucket {
        let mut collected = collect_fields(scope);
        align_row_groups(&mut collected, &self.schema, step);
        self.keep_unrendered_rows(store, step, &mut collected);
        let count = collected.len();
        let bucket = store.commit_capture(step, collected);
        self.throttle.touch();
        log::debug!("captured {} fields for `{}`", count, step);
        bucket
    }
}
