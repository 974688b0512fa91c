//! Step lifecycle: capture before leaving, load and restore on arrival.

use super::collector::FieldCollector;
use super::form_state_manager::FormStateStore;
use super::restorer::{DomRestorer, RestoreReport};
use crate::shared::clock::Clock;
use crate::shared::dom::FormScope;
use crate::shared::guard::{Cooldown, LockTable};
use contracts::shared::form_state::{StepBucket, StepId};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Completed {
        from: Option<StepId>,
        to: StepId,
        report: RestoreReport,
    },
    /// Arrived inside the cool-down window of the previous navigation.
    Debounced,
    /// Another navigation is still running.
    Busy,
    /// The target step's markup never became available.
    RenderFailed(StepId),
}

pub struct NavigationCoordinator {
    store: Rc<FormStateStore>,
    collector: Rc<FieldCollector>,
    restorer: Rc<DomRestorer>,
    cooldown: Cooldown,
    busy: LockTable<()>,
    loaded: Cell<bool>,
}

impl NavigationCoordinator {
    pub fn new(
        store: Rc<FormStateStore>,
        collector: Rc<FieldCollector>,
        restorer: Rc<DomRestorer>,
        clock: Rc<dyn Clock>,
        cooldown_ms: i64,
        lock_timeout_ms: i64,
    ) -> Self {
        Self {
            store,
            collector,
            restorer,
            cooldown: Cooldown::new(cooldown_ms, Rc::clone(&clock)),
            busy: LockTable::new(lock_timeout_ms, clock),
            loaded: Cell::new(false),
        }
    }

    /// Loads the storage slot once per session. Returns whether a saved
    /// state was adopted by this call.
    pub fn ensure_loaded(&self) -> bool {
        if self.loaded.replace(true) {
            return false;
        }
        self.store.load()
    }

    /// "Capture now": forced capture of the active step, written through.
    pub fn capture_now<S: FormScope>(&self, scope: &S) -> Option<StepBucket> {
        let Some(step) = self.store.active_step() else {
            log::debug!("no active step, nothing to capture");
            return None;
        };
        Some(self.collector.capture_now(&self.store, scope, step))
    }

    /// "Restore step X": makes `step` active and rebuilds its form.
    pub async fn restore_step<S: FormScope>(&self, step: StepId, scope: &S) -> RestoreReport {
        self.ensure_loaded();
        self.store.set_active_step(step);
        let bucket = self.store.bucket(step);
        let report = self.restorer.restore(step, &bucket, scope).await;
        if !report.skipped {
            self.collector.mark_short_groups(step, &report.short_groups);
        }
        report
    }

    /// Full step change. The current step is captured before the target is
    /// rendered, and the target is restored only after `render` hands back
    /// its scope. A second trigger inside the cool-down window, or while a
    /// navigation is in flight, is dropped.
    pub async fn go_to<S, F, Fut>(&self, current: Option<&S>, target: StepId, render: F) -> NavigationOutcome
    where
        S: FormScope,
        F: FnOnce(StepId) -> Fut,
        Fut: Future<Output = Option<S>>,
    {
        if !self.cooldown.try_pass() {
            log::debug!("navigation to `{}` debounced", target);
            return NavigationOutcome::Debounced;
        }
        let Some(_token) = self.busy.try_acquire(()) else {
            log::warn!("navigation to `{}` ignored, another one is running", target);
            return NavigationOutcome::Busy;
        };

        let from = self.store.active_step();
        if let Some(scope) = current {
            self.capture_now(scope);
        }

        let Some(scope) = render(target).await else {
            log::warn!("step `{}` did not render, staying on {:?}", target, from);
            return NavigationOutcome::RenderFailed(target);
        };
        let report = self.restore_step(target, &scope).await;
        self.cooldown.touch();
        NavigationOutcome::Completed {
            from,
            to: target,
            report,
        }
    }

    /// Unload signal: same as "capture now".
    pub fn on_unload<S: FormScope>(&self, scope: &S) {
        if self.capture_now(scope).is_some() {
            log::info!("form state saved before unload");
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_held(&())
    }
}
