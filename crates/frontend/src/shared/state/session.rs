use super::cache_manager::CacheManager;
use super::collector::{CaptureOutcome, FieldCollector};
use super::form_state_manager::FormStateStore;
use super::navigation::NavigationCoordinator;
use super::restorer::DomRestorer;
use super::row_factory::RowFactories;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::{config_from_document, FichaConfig};
use crate::shared::dom::FormScope;
use crate::shared::storage::StorageAdapter;
use contracts::shared::form_state::{FieldValue, FormSchema, StepId};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;

/// Owns every persistence component for one page session. Built once,
/// shared by `Rc`, and torn down explicitly.
pub struct FormSession {
    config: FichaConfig,
    schema: Rc<FormSchema>,
    store: Rc<FormStateStore>,
    collector: Rc<FieldCollector>,
    restorer: Rc<DomRestorer>,
    navigator: NavigationCoordinator,
    torn_down: Cell<bool>,
}

impl FormSession {
    /// Wires the components and adopts a saved state if one validates.
    pub fn new(config: FichaConfig, storage: StorageAdapter, clock: Rc<dyn Clock>) -> Rc<Self> {
        let p = &config.persistence;
        let schema = Rc::new(config.steps.clone());
        let cache = CacheManager::new(storage, p.clone(), Rc::clone(&clock));
        let store = Rc::new(FormStateStore::new(cache, Rc::clone(&clock)));
        let collector = Rc::new(FieldCollector::new(
            Rc::clone(&schema),
            Rc::clone(&clock),
            p.capture_interval_ms,
        ));
        let restorer = Rc::new(DomRestorer::new(
            Rc::clone(&schema),
            RowFactories::new(),
            Rc::clone(&clock),
            p.lock_timeout_ms,
            p.max_rows_per_group,
        ));
        let navigator = NavigationCoordinator::new(
            Rc::clone(&store),
            Rc::clone(&collector),
            Rc::clone(&restorer),
            clock,
            p.navigation_cooldown_ms,
            p.lock_timeout_ms,
        );

        if navigator.ensure_loaded() {
            log::info!("form session resumed from saved state");
        } else {
            log::info!("form session started empty");
        }

        Rc::new(Self {
            config,
            schema,
            store,
            collector,
            restorer,
            navigator,
            torn_down: Cell::new(false),
        })
    }

    /// Session for the running page: page config, localStorage, wall clock.
    pub fn browser() -> anyhow::Result<Rc<Self>> {
        let config = config_from_document()?;
        Ok(Self::new(
            config,
            StorageAdapter::browser_default(),
            Rc::new(SystemClock),
        ))
    }

    pub fn config(&self) -> &FichaConfig {
        &self.config
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn store(&self) -> &FormStateStore {
        &self.store
    }

    pub fn navigator(&self) -> &NavigationCoordinator {
        &self.navigator
    }

    pub fn row_factories(&self) -> &RowFactories {
        self.restorer.factories()
    }

    /// Ignored once the session is torn down.
    pub fn update_field(&self, step: StepId, field: &str, value: impl Into<FieldValue>) -> bool {
        if self.is_torn_down() {
            log::warn!("session closed, `{}` not stored", field);
            return false;
        }
        self.store.update_field(step, field, value)
    }

    /// Throttled capture of the active step, for input/change activity.
    /// Events fired by a running restore or navigation, or arriving after
    /// teardown, are ignored.
    pub fn autosave<S: FormScope>(&self, scope: &S) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some(step) = self.store.active_step() else {
            return false;
        };
        if self.restorer.is_restoring(step) || self.navigator.is_busy() {
            log::debug!("autosave of `{}` skipped while the form is being rebuilt", step);
            return false;
        }
        matches!(
            self.collector.capture(&self.store, scope, step),
            CaptureOutcome::Captured(_)
        )
    }

    /// Plain `formData` object for the report generator.
    pub fn report_data(&self) -> Value {
        self.store.report_data()
    }

    pub fn clear(&self) {
        self.store.reset();
        log::info!("form data cleared");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    /// Final capture of the active step (when a scope is given). Afterwards
    /// autosave and `update_field` are no-ops; listeners belong to whoever
    /// installed them (`FichaHandle::teardown` drops its own). A session
    /// opened by `FormSessionProvider` lives as long as the page.
    pub fn teardown<S: FormScope>(&self, scope: Option<&S>) {
        if self.torn_down.replace(true) {
            return;
        }
        if let Some(scope) = scope {
            self.navigator.capture_now(scope);
        }
        log::info!("form session closed");
    }
}
