//! DOM restorer: rebuilds a step's form from its stored bucket.
//!
//! Order of work for one step:
//! 1. blank every clearable input not owned by another routine;
//! 2. grow (or trim) each row group to the stored row count;
//! 3. assign repeating values positionally, then scalar values;
//! 4. fire change notifications on every touched element.
//!
//! Only one restore per step runs at a time; an overlapping call is skipped.

use super::row_factory::RowFactories;
use crate::shared::clock::Clock;
use crate::shared::dom::{FieldElement, FormScope, InputKind};
use crate::shared::guard::LockTable;
use contracts::shared::form_state::{
    repeating_base, repeating_name, FieldKind, FieldValue, FormSchema, RowGroupSpec, Scalar,
    StepBucket, StepId,
};
use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub skipped: bool,
    pub cleared: usize,
    pub rows_added: usize,
    pub rows_removed: usize,
    pub assigned: usize,
    /// Keys (or `base[index]`) with no element to receive them.
    pub missing: Vec<String>,
    /// Row groups left with fewer rows than the stored lists need.
    pub short_groups: Vec<String>,
}

impl RestoreReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

enum Target<F> {
    Single(F),
    RadioGroup(Vec<F>),
}

/// Touched elements, each notified once at the end.
struct Touched<F>(Vec<F>);

impl<F: FieldElement> Touched<F> {
    fn push(&mut self, field: F) {
        if !self.0.contains(&field) {
            self.0.push(field);
        }
    }

    fn notify_all(self) {
        for field in self.0 {
            field.notify_changed();
        }
    }
}

/// Writes one scalar using the rule for the element's kind. Returns whether
/// the element changed.
fn assign<F: FieldElement>(field: &F, value: &Scalar) -> bool {
    match field.kind() {
        InputKind::Checkbox => {
            let checked = value.is_checked();
            let changed = field.checked() != checked;
            field.set_checked(checked);
            changed
        }
        InputKind::Radio => {
            let checked = field.value() == value.to_input_string();
            let changed = field.checked() != checked;
            field.set_checked(checked);
            changed
        }
        _ => {
            let text = value.to_input_string();
            let changed = field.value() != text;
            field.set_value(&text);
            changed
        }
    }
}

/// Seed object for row `index` of a group, taken from its seed field.
fn seed_at(bucket: &StepBucket, seed_field: &str, index: usize) -> Option<Value> {
    match bucket.get(seed_field)? {
        FieldValue::Opaque(Value::Array(items)) => items.get(index).cloned(),
        FieldValue::List(items) => items.get(index).and_then(|s| serde_json::to_value(s).ok()),
        _ => None,
    }
}

pub struct DomRestorer {
    schema: Rc<FormSchema>,
    factories: RowFactories,
    locks: LockTable<StepId>,
    max_rows: usize,
}

impl DomRestorer {
    pub fn new(
        schema: Rc<FormSchema>,
        factories: RowFactories,
        clock: Rc<dyn Clock>,
        lock_timeout_ms: i64,
        max_rows: usize,
    ) -> Self {
        Self {
            schema,
            factories,
            locks: LockTable::new(lock_timeout_ms, clock),
            max_rows,
        }
    }

    pub fn factories(&self) -> &RowFactories {
        &self.factories
    }

    pub fn is_restoring(&self, step: StepId) -> bool {
        self.locks.is_held(&step)
    }

    fn is_external<F: FieldElement>(&self, step: StepId, field: &F) -> bool {
        if field.is_external() {
            return true;
        }
        field.name().is_some_and(|name| {
            let key = repeating_base(&name).unwrap_or(&name);
            self.schema.is_external(step, key)
        })
    }

    pub async fn restore<S: FormScope>(&self, step: StepId, bucket: &StepBucket, scope: &S) -> RestoreReport {
        let Some(_token) = self.locks.try_acquire(step) else {
            log::warn!("restore of `{}` already in progress, skipping", step);
            return RestoreReport::skipped();
        };

        let mut report = RestoreReport::default();
        let mut touched = Touched(Vec::new());

        self.clear_scope(step, scope, &mut report, &mut touched);

        for group in self.schema.row_groups(step) {
            if group.has_data(bucket) {
                self.fit_rows(group, bucket, scope, &mut report).await;
            }
        }

        // Lists first so scalars land on the final set of elements.
        for (key, value) in bucket.iter() {
            if self.schema.is_external(step, key) {
                continue;
            }
            match (value, self.schema.kind_of(step, key)) {
                (FieldValue::List(items), _) => {
                    self.assign_list(key, items, scope, &mut report, &mut touched)
                }
                (FieldValue::Scalar(item), FieldKind::Repeating(_)) => self.assign_list(
                    key,
                    std::slice::from_ref(item),
                    scope,
                    &mut report,
                    &mut touched,
                ),
                _ => {}
            }
        }
        for (key, value) in bucket.iter() {
            if self.schema.is_external(step, key) {
                continue;
            }
            match (value, self.schema.kind_of(step, key)) {
                (FieldValue::Scalar(item), FieldKind::Scalar) => {
                    self.assign_scalar(key, item, scope, &mut report, &mut touched)
                }
                (FieldValue::Opaque(_), _) => {
                    log::debug!("`{}` holds structured data, not restored to inputs", key)
                }
                _ => {}
            }
        }

        touched.notify_all();
        log::info!(
            "restored `{}`: {} assigned, {} rows added, {} rows removed, {} missing",
            step,
            report.assigned,
            report.rows_added,
            report.rows_removed,
            report.missing.len()
        );
        report
    }

    /// Blanks leftovers so values from another session cannot bleed into
    /// freshly rendered markup.
    fn clear_scope<S: FormScope>(
        &self,
        step: StepId,
        scope: &S,
        report: &mut RestoreReport,
        touched: &mut Touched<S::Field>,
    ) {
        for field in scope.fields() {
            if !field.kind().is_clearable() || self.is_external(step, &field) {
                continue;
            }
            let changed = match field.kind() {
                InputKind::Checkbox | InputKind::Radio => {
                    let was = field.checked();
                    field.set_checked(false);
                    was
                }
                _ => {
                    let was = !field.value().is_empty();
                    field.set_value("");
                    was
                }
            };
            if changed {
                report.cleared += 1;
                touched.push(field);
            }
        }
    }

    /// Grows the group until it has as many rows as the stored lists, then
    /// trims surplus rows. The first row is never removed.
    async fn fit_rows<S: FormScope>(
        &self,
        group: &RowGroupSpec,
        bucket: &StepBucket,
        scope: &S,
        report: &mut RestoreReport,
    ) {
        let mut required = group.required_rows(bucket).max(1);
        if required > self.max_rows {
            log::warn!(
                "group `{}` wants {} rows, capping at {}",
                group.id,
                required,
                self.max_rows
            );
            required = self.max_rows;
        }

        let mut current = scope.row_count(group);
        if current < required {
            match self.factories.get(&group.id) {
                None => log::warn!(
                    "no row factory for `{}`: {} of {} rows available",
                    group.id,
                    current,
                    required
                ),
                Some(factory) => {
                    while current < required {
                        let seed = group
                            .seed_field
                            .as_deref()
                            .and_then(|field| seed_at(bucket, field, current));
                        if let Err(err) = factory.add_row(seed).await {
                            log::error!("{}", err);
                            break;
                        }
                        let after = scope.row_count(group);
                        if after <= current {
                            log::error!("row factory for `{}` did not add a row", group.id);
                            break;
                        }
                        report.rows_added += after - current;
                        current = after;
                    }
                }
            }
        }

        if current < required {
            report.short_groups.push(group.id.clone());
        }

        while current > required && current > 1 {
            if !scope.remove_row(group, current - 1) {
                log::warn!("could not remove row {} of `{}`", current - 1, group.id);
                break;
            }
            current -= 1;
            report.rows_removed += 1;
        }
    }

    fn assign_list<S: FormScope>(
        &self,
        base: &str,
        items: &[Scalar],
        scope: &S,
        report: &mut RestoreReport,
        touched: &mut Touched<S::Field>,
    ) {
        let fields = scope.fields_named(&repeating_name(base));
        for (index, item) in items.iter().enumerate() {
            match fields.get(index) {
                Some(field) if field.is_external() => {
                    log::debug!("`{}[{}]` is externally managed, left as is", base, index);
                }
                Some(field) => {
                    if assign(field, item) {
                        touched.push(field.clone());
                    }
                    report.assigned += 1;
                }
                None => {
                    log::debug!("no element for `{}[{}]`", base, index);
                    report.missing.push(format!("{base}[{index}]"));
                }
            }
        }
    }

    fn resolve<S: FormScope>(&self, key: &str, scope: &S) -> Option<Target<S::Field>> {
        if let Some(field) = scope.field_by_id(key) {
            return Some(Target::Single(field));
        }
        let mut named = scope.fields_named(key);
        match named.len() {
            0 => None,
            1 => named.pop().map(Target::Single),
            _ if named.iter().all(|f| f.kind() == InputKind::Radio) => {
                Some(Target::RadioGroup(named))
            }
            n => {
                log::warn!("`{}` matches {} elements, not restoring it", key, n);
                None
            }
        }
    }

    fn assign_scalar<S: FormScope>(
        &self,
        key: &str,
        value: &Scalar,
        scope: &S,
        report: &mut RestoreReport,
        touched: &mut Touched<S::Field>,
    ) {
        match self.resolve(key, scope) {
            Some(Target::Single(field)) if field.is_external() => {
                log::debug!("`{}` is externally managed, left as is", key);
            }
            Some(Target::RadioGroup(options)) if options.iter().any(|o| o.is_external()) => {
                log::debug!("`{}` is externally managed, left as is", key);
            }
            Some(Target::Single(field)) => {
                if assign(&field, value) {
                    touched.push(field);
                }
                report.assigned += 1;
            }
            Some(Target::RadioGroup(options)) => {
                for option in options {
                    if assign(&option, value) {
                        touched.push(option);
                    }
                }
                report.assigned += 1;
            }
            None => {
                log::debug!("no element for `{}`", key);
                report.missing.push(key.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;
    use crate::shared::config::default_config;
    use crate::shared::dom::fake::{FakeField, FakeForm};
    use crate::shared::state::collector::collect_fields;
    use crate::shared::state::row_factory::RowError;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        restorer: DomRestorer,
        schema: Rc<FormSchema>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let config = default_config().unwrap();
        let clock = ManualClock::new(0);
        let schema = Rc::new(config.steps);
        let restorer = DomRestorer::new(
            Rc::clone(&schema),
            RowFactories::new(),
            Rc::new(clock.clone()),
            config.persistence.lock_timeout_ms,
            config.persistence.max_rows_per_group,
        );
        Fixture {
            restorer,
            schema,
            clock,
        }
    }

    fn group(fx: &Fixture, step: StepId, id: &str) -> RowGroupSpec {
        fx.schema.group(step, id).unwrap().clone()
    }

    fn bucket_from(value: Value) -> StepBucket {
        serde_json::from_value(value).unwrap()
    }

    fn social_form(fx: &Fixture) -> (FakeForm, RowGroupSpec) {
        let familiares = group(fx, StepId::Social, "familiares");
        let form = FakeForm::new();
        form.add_row(&familiares);
        fx.restorer
            .factories()
            .register("familiares", form.row_factory(&familiares));
        (form, familiares)
    }

    #[test]
    fn test_grows_rows_and_assigns_positionally() {
        let fx = fixture();
        let (form, familiares) = social_form(&fx);
        let bucket = bucket_from(json!({
            "familiar_nome": ["Assistido", "Maria", "Pedro"]
        }));

        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));

        assert_eq!(form.row_count(&familiares), 3);
        assert_eq!(report.rows_added, 2);
        assert_eq!(
            form.values_named("familiar_nome[]"),
            vec!["Assistido", "Maria", "Pedro"]
        );
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_restore_is_idempotent() {
        let fx = fixture();
        let (form, familiares) = social_form(&fx);
        form.add(FakeField::text("renda_total"));
        let bucket = bucket_from(json!({
            "familiar_nome": ["Assistido", "Maria"],
            "familiar_renda": ["1000", "500"],
            "renda_total": "1500"
        }));

        block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        let first = collect_fields(&form);
        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        let second = collect_fields(&form);

        assert_eq!(first, second);
        assert_eq!(form.row_count(&familiares), 2);
        assert_eq!(report.rows_added, 0);
        assert_eq!(report.rows_removed, 0);
    }

    #[test]
    fn test_surplus_rows_are_trimmed_but_first_row_kept() {
        let fx = fixture();
        let (form, familiares) = social_form(&fx);
        form.add_row(&familiares);
        form.add_row(&familiares);
        form.add_row(&familiares);

        let bucket = bucket_from(json!({ "familiar_nome": ["Assistido", "Maria"] }));
        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        assert_eq!(report.rows_removed, 2);
        assert_eq!(form.row_count(&familiares), 2);

        let bucket = bucket_from(json!({ "familiar_nome": [] }));
        block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        assert_eq!(form.row_count(&familiares), 1);
    }

    #[test]
    fn test_positional_integrity_across_group_members() {
        let fx = fixture();
        let autores = group(&fx, StepId::Personal, "autores");
        let form = FakeForm::new();
        form.add_row(&autores);
        fx.restorer
            .factories()
            .register("autores", form.row_factory(&autores));

        let names = vec!["Ana", "Bia", "Caio", "Duda"];
        let cpfs = vec!["111", "222", "333", "444"];
        let births = vec!["01/01/1990", "02/02/1991", "03/03/1992", "04/04/1993"];
        let bucket = bucket_from(json!({
            "autor_nome": names,
            "autor_cpf": cpfs,
            "autor_data_nascimento": births
        }));
        block_on(fx.restorer.restore(StepId::Personal, &bucket, &form));

        let collected = collect_fields(&form);
        assert_eq!(collected["autor_nome"], FieldValue::from(names));
        assert_eq!(collected["autor_cpf"], FieldValue::from(cpfs));
        assert_eq!(collected["autor_data_nascimento"], FieldValue::from(births));
    }

    #[test]
    fn test_scalar_round_trip() {
        let fx = fixture();
        let form = FakeForm::new();
        form.add(FakeField::text("colaborador"));
        form.add(FakeField::text("cpf").with_id("cpf_requerente"));
        form.add(FakeField::checkbox("possui_advogado"));
        form.add(FakeField::radio("sexo", "F"));
        form.add(FakeField::radio("sexo", "M"));

        let bucket = bucket_from(json!({
            "colaborador": "João",
            "cpf_requerente": "123.456.789-00",
            "possui_advogado": true,
            "sexo": "M"
        }));
        let report = block_on(fx.restorer.restore(StepId::Personal, &bucket, &form));
        assert!(report.missing.is_empty(), "{:?}", report.missing);

        let collected = collect_fields(&form);
        assert_eq!(collected["colaborador"], FieldValue::from("João"));
        assert_eq!(collected["cpf"], FieldValue::from("123.456.789-00"));
        assert_eq!(collected["possui_advogado"], FieldValue::from(true));
        assert_eq!(collected["sexo"], FieldValue::from("M"));
    }

    #[test]
    fn test_checkbox_coercion_from_strings() {
        let fx = fixture();
        let form = FakeForm::new();
        let whatsapp = form.add(FakeField::checkbox("telefone_whatsapp_ativo"));

        let on = bucket_from(json!({ "telefone_whatsapp_ativo": "true" }));
        block_on(fx.restorer.restore(StepId::Personal, &on, &form));
        assert!(whatsapp.checked());

        let off = bucket_from(json!({ "telefone_whatsapp_ativo": "false" }));
        block_on(fx.restorer.restore(StepId::Personal, &off, &form));
        assert!(!whatsapp.checked());

        block_on(fx.restorer.restore(StepId::Personal, &on, &form));
        block_on(fx.restorer.restore(StepId::Personal, &StepBucket::new(), &form));
        assert!(!whatsapp.checked());
    }

    #[test]
    fn test_stale_values_cleared_but_external_kept() {
        let fx = fixture();
        let form = FakeForm::new();
        let stale = form.add(FakeField::text("observacao").with_value("old session"));
        let hidden = form.add(
            FakeField::new(InputKind::Hidden, Some("beneficio_id")).with_value("old-session"),
        );
        let hidden_marked = form.add(
            FakeField::new(InputKind::Hidden, Some("token")).with_value("abc").external(),
        );
        let marked = form.add(FakeField::text("beneficio").with_value("B31").external());
        let configured = form.add(FakeField::text("documentos_json").with_value("[]"));

        block_on(fx.restorer.restore(StepId::Documents, &StepBucket::new(), &form));

        assert_eq!(stale.value(), "");
        assert_eq!(hidden.value(), "");
        assert_eq!(hidden_marked.value(), "abc");
        assert_eq!(marked.value(), "B31");
        assert_eq!(configured.value(), "[]");
    }

    #[test]
    fn test_external_elements_are_not_assigned() {
        let fx = fixture();
        let form = FakeForm::new();
        let marked = form.add(FakeField::text("beneficio").with_value("B31").external());
        let owned_row = form.add(FakeField::text("autor_nome[]").with_value("Ana").external());
        let free_row = form.add(FakeField::text("autor_nome[]"));

        let bucket = bucket_from(json!({
            "beneficio": "B91",
            "autor_nome": ["Bia", "Caio"]
        }));
        let report = block_on(fx.restorer.restore(StepId::Personal, &bucket, &form));

        assert_eq!(marked.value(), "B31");
        assert_eq!(owned_row.value(), "Ana");
        assert_eq!(free_row.value(), "Caio");
        assert_eq!(report.assigned, 1);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_short_groups_are_reported() {
        let fx = fixture();
        let familiares = group(&fx, StepId::Social, "familiares");
        let form = FakeForm::new();
        form.add_row(&familiares);

        let bucket = bucket_from(json!({ "familiar_nome": ["Assistido", "Maria", "Pedro"] }));
        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        assert_eq!(report.short_groups, vec!["familiares"]);

        let (form, _) = social_form(&fx);
        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));
        assert!(report.short_groups.is_empty());
    }

    #[test]
    fn test_missing_targets_are_reported_not_fatal() {
        let fx = fixture();
        let form = FakeForm::new();
        form.add(FakeField::text("colaborador"));
        form.add(FakeField::text("dup"));
        form.add(FakeField::text("dup"));

        let bucket = bucket_from(json!({
            "colaborador": "João",
            "inexistente": "x",
            "dup": "y",
            "lista_solta": ["a", "b"]
        }));
        let report = block_on(fx.restorer.restore(StepId::Personal, &bucket, &form));

        assert_eq!(form.values_named("colaborador"), vec!["João"]);
        let mut missing = report.missing.clone();
        missing.sort();
        assert_eq!(missing, vec!["dup", "inexistente", "lista_solta[0]", "lista_solta[1]"]);
    }

    #[test]
    fn test_touched_elements_are_notified_once() {
        let fx = fixture();
        let form = FakeForm::new();
        let total = form.add(FakeField::text("renda_total").with_value("10"));
        let untouched = form.add(FakeField::text("outro"));

        let bucket = bucket_from(json!({ "renda_total": "20" }));
        block_on(fx.restorer.restore(StepId::Social, &bucket, &form));

        assert_eq!(total.value(), "20");
        assert_eq!(total.notifications(), 1);
        assert_eq!(untouched.notifications(), 0);
    }

    #[test]
    fn test_failing_factory_stops_growth_but_not_assignment() {
        let fx = fixture();
        let familiares = group(&fx, StepId::Social, "familiares");
        let form = FakeForm::new();
        form.add_row(&familiares);
        form.add(FakeField::text("renda_total"));
        fx.restorer.factories().register("familiares", |_seed: Option<Value>| {
            futures::future::ready(Err::<(), _>(RowError::new("familiares", "template missing")))
        });

        let bucket = bucket_from(json!({
            "familiar_nome": ["Assistido", "Maria"],
            "renda_total": "900"
        }));
        let report = block_on(fx.restorer.restore(StepId::Social, &bucket, &form));

        assert_eq!(form.row_count(&familiares), 1);
        assert_eq!(form.values_named("familiar_nome[]"), vec!["Assistido"]);
        assert_eq!(form.values_named("renda_total"), vec!["900"]);
        assert_eq!(report.missing, vec!["familiar_nome[1]"]);
    }

    #[test]
    fn test_seed_objects_reach_the_factory() {
        let fx = fixture();
        let documentos = group(&fx, StepId::Documents, "documentos");
        let form = FakeForm::new();
        form.add_row(&documentos);
        let seeds = Rc::new(std::cell::RefCell::new(Vec::new()));
        {
            let form = form.clone();
            let documentos = documentos.clone();
            let seeds = Rc::clone(&seeds);
            fx.restorer
                .factories()
                .register("documentos", move |seed: Option<Value>| {
                    seeds.borrow_mut().push(seed);
                    form.add_row(&documentos);
                    futures::future::ready(Ok::<(), RowError>(()))
                });
        }

        let bucket = bucket_from(json!({
            "documentos_anexados": [{ "nome": "RG" }, { "nome": "Laudo" }, { "nome": "CNIS" }]
        }));
        block_on(fx.restorer.restore(StepId::Documents, &bucket, &form));

        assert_eq!(form.row_count(&documentos), 3);
        assert_eq!(
            *seeds.borrow(),
            vec![Some(json!({ "nome": "Laudo" })), Some(json!({ "nome": "CNIS" }))]
        );
    }

    #[test]
    fn test_overlapping_restore_is_skipped() {
        let fx = fixture();
        let form = FakeForm::new();
        let _held = fx.restorer.locks.try_acquire(StepId::Social).unwrap();

        let report = block_on(fx.restorer.restore(StepId::Social, &StepBucket::new(), &form));
        assert!(report.skipped);
        assert!(fx.restorer.is_restoring(StepId::Social));

        // Other steps are unaffected.
        let report = block_on(fx.restorer.restore(StepId::Personal, &StepBucket::new(), &form));
        assert!(!report.skipped);

        // A holder that never finishes is released after the timeout.
        fx.clock.advance(5_000);
        let report = block_on(fx.restorer.restore(StepId::Social, &StepBucket::new(), &form));
        assert!(!report.skipped);
    }
}
