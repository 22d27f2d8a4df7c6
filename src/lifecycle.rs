//! # Action Lifecycle
//!
//! The [`ActionHost`] owns one interaction's schema tree, state, and
//! mounted-action stack, and drives descriptors through the lifecycle:
//! mount, form fill, authorize, rate-limit, validate, transactional call,
//! notify, unmount. The [`Engine`] bundles the shared collaborators the
//! lifecycle consumes (store, gate, notifier, limiter, audit sink).
//!
//! One database transaction is opened per call and resolved on every exit
//! path. Halt and Cancel are values returned by callbacks, not unwinding;
//! only validation failures propagate to the caller, so the standard
//! field-error UI can apply.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::action::{Action, ActionControl, ActionRun, ActionStatus, CancelParents};
use crate::audit::{AuditEntry, AuditOperation, AuditSink, NullAuditLog};
use crate::authorize::{AllowAllGate, Gate, authorize};
use crate::bulk::individually_authorized_records;
use crate::errors::{ConfigError, StoreError};
use crate::eval::{EvalCx, EvalSession, Operation};
use crate::hydrate::{dehydrate, hydrate};
use crate::mount::{MountContext, MountedAction, rate_limit_key, resolve_stack};
use crate::notify::{Notification, NotificationDispatcher, NullDispatcher};
use crate::rate_limit::{RateLimiter, RetryAfter};
use crate::record::{Record, RecordStore};
use crate::relationship::BridgeError;
use crate::schema::SchemaTree;
use crate::state::StateTree;
use crate::table::Table;
use crate::validate::{ValidationFailure, component_failures, validate};

/// Errors surfaced by mounting or calling an action.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// `call_mounted_action` with an empty stack.
    NothingMounted,
    /// The action's form state failed validation. Propagated so the
    /// caller's field-error UI applies.
    Validation(Vec<ValidationFailure>),
    /// The backing store failed.
    Store(StoreError),
    /// The interaction is misconfigured.
    Config(ConfigError),
    /// A callback failed fatally.
    Fatal(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingMounted => write!(f, "No action is mounted"),
            Self::Validation(failures) => {
                write!(f, "Validation failed: ")?;
                for (i, failure) in failures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", failure)?;
                }
                Ok(())
            }
            Self::Store(e) => write!(f, "Store error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Fatal(message) => write!(f, "Action failed: {}", message),
        }
    }
}

impl std::error::Error for CallError {}

impl From<StoreError> for CallError {
    fn from(e: StoreError) -> Self {
        CallError::Store(e)
    }
}

impl From<ConfigError> for CallError {
    fn from(e: ConfigError) -> Self {
        CallError::Config(e)
    }
}

impl From<BridgeError> for CallError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Store(e) => CallError::Store(e),
            BridgeError::Config(e) => CallError::Config(e),
        }
    }
}

/// The result of a completed action call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// Success or failure as the callbacks reported it.
    pub status: ActionStatus,
    /// The result value, if any callback produced one.
    pub result: Option<Value>,
    /// The configured redirect for the terminal status.
    pub redirect: Option<String>,
    /// Whether the action left the stack.
    pub unmounted: bool,
}

/// How a `call_mounted_action` round ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The call ran to a terminal status and the transaction committed.
    Completed(ActionOutcome),
    /// A callback halted the call; the action stays mounted.
    Halted,
    /// A callback cancelled the call.
    Cancelled {
        /// Whether the cancel also unmounted the action.
        unmounted: bool,
    },
    /// The rate limiter refused the attempt.
    RateLimited(RetryAfter),
    /// The call short-circuited silently (unresolvable, disabled, or
    /// unauthorized).
    Skipped,
}

/// How a mount round ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MountOutcome {
    /// The action has a modal; the stack is awaiting user interaction.
    AwaitingModal,
    /// No modal, so the call ran immediately.
    Called(CallOutcome),
    /// The mount was abandoned silently.
    Abandoned,
}

////////////////////////////////////////////// Engine //////////////////////////////////////////////////

/// The shared collaborators every lifecycle round consumes.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    gate: Arc<dyn Gate>,
    notifier: Arc<dyn NotificationDispatcher>,
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
}

impl Engine {
    /// Creates an engine over a store with permissive defaults: every
    /// ability granted, notifications and audit entries discarded.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Engine {
            store,
            gate: Arc::new(AllowAllGate),
            notifier: Arc::new(NullDispatcher),
            limiter: Arc::new(RateLimiter::new()),
            audit: Arc::new(NullAuditLog),
        }
    }

    /// Installs an authorization gate.
    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    /// Installs a notification dispatcher.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Installs an audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The backing record store.
    pub fn store(&self) -> &dyn RecordStore {
        &*self.store
    }

    /// The authorization gate.
    pub fn gate(&self) -> &dyn Gate {
        &*self.gate
    }

    /// The notification dispatcher.
    pub fn notifier(&self) -> &dyn NotificationDispatcher {
        &*self.notifier
    }

    /// The rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The audit sink.
    pub fn audit(&self) -> &dyn AuditSink {
        &*self.audit
    }

    fn resolve_transaction(&self, rollback: bool) -> Result<(), CallError> {
        if rollback {
            self.store().rollback()?;
        } else {
            self.store().commit()?;
        }
        Ok(())
    }
}

//////////////////////////////////////////// ActionHost ////////////////////////////////////////////////

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn merge_objects(base: &mut Value, incoming: &Value) {
    if let (Value::Object(base), Value::Object(incoming)) = (base, incoming) {
        for (key, value) in incoming {
            base.insert(key.clone(), value.clone());
        }
    }
}

fn merged_arguments(action: &Action, submitted: &Value) -> Value {
    let mut merged = action.arguments.clone();
    merge_objects(&mut merged, submitted);
    merged
}

/// One interaction instance: its schema tree, live state, bound record and
/// table, and the mounted-action stack.
///
/// A host is single-request state; the daemon serializes access to each
/// one. The mounted-action stack is the only part that crosses the wire.
pub struct ActionHost {
    tree: SchemaTree,
    table: Option<Table>,
    record: Option<Record>,
    operation: Operation,
    state: StateTree,
    stack: Vec<MountedAction>,
    /// Per-session generic resolution cache.
    action_cache: HashMap<String, Action>,
    /// Per-nesting-index resolved actions; truncated on unmount.
    index_cache: Vec<Action>,
    url_params: HashMap<String, Value>,
}

impl ActionHost {
    /// Creates a host over a schema tree with empty state and no record.
    pub fn new(tree: SchemaTree) -> Self {
        ActionHost {
            tree,
            table: None,
            record: None,
            operation: Operation::Edit,
            state: StateTree::new(),
            stack: Vec::new(),
            action_cache: HashMap::new(),
            index_cache: Vec::new(),
            url_params: HashMap::new(),
        }
    }

    /// Binds a table for table-scoped resolution.
    pub fn table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    /// Binds the interaction's record.
    pub fn record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Sets the operation.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Replaces the live state tree.
    pub fn state(mut self, state: StateTree) -> Self {
        self.state = state;
        self
    }

    /// The schema tree.
    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    /// The live state tree.
    pub fn state_tree(&self) -> &StateTree {
        &self.state
    }

    /// The mounted-action stack, deepest last.
    pub fn stack(&self) -> &[MountedAction] {
        &self.stack
    }

    /// Restores a stack deserialized from persisted state.
    pub fn restore_stack(&mut self, stack: Vec<MountedAction>) {
        self.index_cache.truncate(stack.len());
        self.stack = stack;
    }

    /// Sets a default-action URL parameter.
    pub fn set_url_param(&mut self, key: impl Into<String>, value: Value) {
        self.url_params.insert(key.into(), value);
    }

    /// The current default-action URL parameters.
    pub fn url_params(&self) -> &HashMap<String, Value> {
        &self.url_params
    }

    fn session(&self, record: Option<Record>) -> EvalSession {
        EvalSession::new(self.state.clone(), record, self.operation)
    }

    fn stack_snapshot(&self) -> Vec<(String, MountContext)> {
        self.stack
            .iter()
            .map(|mounted| (mounted.name.clone(), mounted.context.clone()))
            .collect()
    }

    fn pop_with_policy(&mut self, policy: &CancelParents) -> Vec<String> {
        let mut popped = Vec::new();
        match policy {
            CancelParents::One => {
                if let Some(mounted) = self.stack.pop() {
                    popped.push(mounted.name);
                }
            }
            CancelParents::All => {
                while let Some(mounted) = self.stack.pop() {
                    popped.push(mounted.name);
                }
            }
            CancelParents::To(ancestor) => {
                while let Some(top) = self.stack.last() {
                    if &top.name == ancestor {
                        break;
                    }
                    popped.push(self.stack.pop().map(|m| m.name).unwrap_or_default());
                }
            }
        }
        self.index_cache.truncate(self.stack.len());
        if self.stack.is_empty() {
            // Stale parameters must not leak into the URL once nothing is
            // mounted.
            self.url_params.clear();
        }
        popped
    }

    fn abandon_mount(&mut self, engine: &Engine, name: &str, reason: &str) -> MountOutcome {
        engine.audit().record(AuditEntry::new(AuditOperation::MountAbandoned {
            name: name.to_string(),
            reason: reason.to_string(),
        }));
        self.stack.pop();
        MountOutcome::Abandoned
    }

    /// Mounts a descriptor onto the stack.
    ///
    /// Unresolvable, disabled, and silently-denied mounts are abandoned
    /// without error. Actions without a modal call through immediately;
    /// the rest leave the stack awaiting modal interaction.
    pub fn mount(
        &mut self,
        engine: &Engine,
        descriptor: MountedAction,
    ) -> Result<MountOutcome, CallError> {
        let name = descriptor.name.clone();
        self.stack.push(descriptor);

        let resolved = match resolve_stack(
            &self.tree,
            self.table.as_ref(),
            engine.store(),
            &mut self.action_cache,
            &self.stack,
        ) {
            Ok(resolved) => resolved,
            Err(e) => return Ok(self.abandon_mount(engine, &name, &e.to_string())),
        };
        let Some(deepest) = resolved.into_iter().next_back() else {
            return Ok(self.abandon_mount(engine, &name, "empty resolution"));
        };
        let action = deepest.action;
        let record = deepest.record.or_else(|| self.record.clone());

        {
            let session = self.session(record.clone());
            let cx = EvalCx::new(&session, "");
            if action.disabled.evaluate(&cx) || action.hidden.evaluate(&cx) {
                return Ok(self.abandon_mount(engine, &name, "disabled or hidden"));
            }
        }

        // State other components expose to actions must already be valid.
        let exposed_failures = self.exposed_state_failures(record.clone());
        if !exposed_failures.is_empty() {
            self.stack.pop();
            return Err(CallError::Validation(exposed_failures));
        }

        if let Some(rule) = &action.authorization {
            let response = authorize(engine.gate(), rule, record.as_ref(), &[]);
            if !response.is_allowed() {
                if action.notifies_unauthorized {
                    let response = response.with_message(action.authorization_message.as_deref())?;
                    let body = response.message().unwrap_or_default().to_string();
                    engine
                        .notifier()
                        .dispatch(Notification::danger("Not allowed").body(body).persistent());
                }
                return Ok(self.abandon_mount(engine, &name, "unauthorized"));
            }
        }

        let idx = self.stack.len() - 1;
        let mut run = ActionRun {
            arguments: merged_arguments(&action, &self.stack[idx].arguments),
            data: self.stack[idx].data.clone(),
            record,
            records: Vec::new(),
            bulk_report: None,
            store: engine.store(),
        };
        if let Some(hook) = &action.before_form_filled {
            hook(&mut run);
        }
        if let Some(hook) = &action.fill_form {
            hook(&mut run);
        }
        if let Some(hook) = &action.after_form_filled {
            hook(&mut run);
        }
        self.stack[idx].data = run.data;

        self.index_cache.truncate(idx);
        self.index_cache.push(action.clone());
        engine.audit().record(AuditEntry::new(AuditOperation::ActionMounted {
            name: name.clone(),
            context: serde_json::to_value(&self.stack[idx].context).unwrap_or(Value::Null),
        }));

        if action.has_modal() {
            Ok(MountOutcome::AwaitingModal)
        } else {
            let outcome = self.call_mounted_action(engine, Value::Null)?;
            Ok(MountOutcome::Called(outcome))
        }
    }

    fn exposed_state_failures(&self, record: Option<Record>) -> Vec<ValidationFailure> {
        let session = self.session(record);
        let mut failures = Vec::new();
        self.tree.walk(self.tree.root(), &mut |id| {
            if self.tree.component(id).exposes_state_to_actions {
                failures.extend(component_failures(&self.tree, &session, id));
            }
        });
        failures
    }

    fn gather_exposed_state(&self, data: &mut Value) {
        self.tree.walk(self.tree.root(), &mut |id| {
            if !self.tree.component(id).exposes_state_to_actions {
                return;
            }
            let path = self.tree.absolute_state_path(id);
            if path.is_empty() {
                return;
            }
            if let Some(value) = self.state.get(&path) {
                crate::state::data_set(data, &path, value);
            }
        });
    }

    fn apply_control(
        &mut self,
        engine: &Engine,
        control: ActionControl,
        status: &mut ActionStatus,
        result: &mut Option<Value>,
    ) -> Result<Option<CallOutcome>, CallError> {
        match control {
            ActionControl::Success(value) => {
                if value.is_some() {
                    *result = value;
                }
            }
            ActionControl::Failure(value) => {
                *status = ActionStatus::Failure;
                if value.is_some() {
                    *result = value;
                }
            }
            ActionControl::Halt { rollback } => {
                engine.resolve_transaction(rollback)?;
                return Ok(Some(CallOutcome::Halted));
            }
            ActionControl::Cancel { rollback, unmount } => {
                engine.resolve_transaction(rollback)?;
                if unmount {
                    self.pop_with_policy(&CancelParents::One);
                }
                return Ok(Some(CallOutcome::Cancelled { unmounted: unmount }));
            }
        }
        Ok(None)
    }

    /// Calls the deepest mounted action.
    ///
    /// Opens one transaction and resolves it on every exit path; only
    /// validation failures surface as errors to the caller.
    pub fn call_mounted_action(
        &mut self,
        engine: &Engine,
        extra_arguments: Value,
    ) -> Result<CallOutcome, CallError> {
        let Some(idx) = self.stack.len().checked_sub(1) else {
            return Err(CallError::NothingMounted);
        };
        if extra_arguments.is_object() {
            merge_objects(&mut self.stack[idx].arguments, &extra_arguments);
        }

        let resolved = match resolve_stack(
            &self.tree,
            self.table.as_ref(),
            engine.store(),
            &mut self.action_cache,
            &self.stack,
        ) {
            Ok(resolved) => resolved,
            Err(_) => return Ok(CallOutcome::Skipped),
        };
        let Some(deepest) = resolved.into_iter().next_back() else {
            return Err(CallError::NothingMounted);
        };
        let action = deepest.action;
        let record = deepest.record.or_else(|| self.record.clone());
        let name = action.name().to_string();

        {
            let session = self.session(record.clone());
            let cx = EvalCx::new(&session, "");
            if action.disabled.evaluate(&cx) {
                return Ok(CallOutcome::Skipped);
            }
        }
        if let Some(rule) = &action.authorization {
            if !authorize(engine.gate(), rule, record.as_ref(), &[]).is_allowed() {
                return Ok(CallOutcome::Skipped);
            }
        }

        if let Some(limit) = action.rate_limit {
            let key = rate_limit_key(&self.stack);
            if let Err(retry) = engine.limiter().attempt(&key, limit) {
                engine.notifier().dispatch(
                    Notification::danger("Too many attempts")
                        .body(format!("Please try again in {}.", retry.humanize()))
                        .persistent(),
                );
                engine.audit().record(AuditEntry::new(
                    AuditOperation::ActionRateLimited {
                        name,
                        retry_after_secs: retry.seconds(),
                    },
                ));
                return Ok(CallOutcome::RateLimited(retry));
            }
        }

        engine.store().begin_transaction()?;
        let snapshot = self.stack_snapshot();

        let mut run = ActionRun {
            arguments: merged_arguments(&action, &self.stack[idx].arguments),
            data: self.stack[idx].data.clone(),
            record: record.clone(),
            records: Vec::new(),
            bulk_report: None,
            store: engine.store(),
        };

        if self.stack[idx].context.bulk {
            if let (Some(bulk), Some(table)) = (&action.bulk, &self.table) {
                let keys: Vec<String> = run
                    .argument("selected")
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                let selected = match table.selected_records(engine.store(), &keys) {
                    Ok(selected) => selected,
                    Err(e) => {
                        engine.store().rollback()?;
                        return Err(e.into());
                    }
                };
                let (authorized, report) = individually_authorized_records(
                    engine.gate(),
                    bulk.authorize_individual.as_ref(),
                    selected,
                );
                run.records = authorized;
                // Held open until after the hooks so callbacks can add
                // per-record processing failures to the same aggregate.
                run.bulk_report = Some(report);
            }
        }

        self.gather_exposed_state(&mut run.data);

        if let Some(form) = action.modal.as_ref().and_then(|m| m.form.clone()) {
            let form_tree = form();
            let form_session = EvalSession::new(
                StateTree::from_value(run.data.clone()),
                record.clone(),
                self.operation,
            );
            if let Err(e) = hydrate(&form_tree, &form_session, engine.store(), form_tree.root(), false)
            {
                engine.store().rollback()?;
                return Err(e.into());
            }
            let failures = validate(&form_tree, &form_session, engine.gate(), form_tree.root());
            if !failures.is_empty() {
                engine.store().rollback()?;
                // The modal stays open to display the field errors, so the
                // action stays mounted with its data intact.
                return Err(CallError::Validation(failures));
            }
            let validated = dehydrate(&form_tree, &form_session, form_tree.root());
            merge_objects(&mut run.data, &validated);
        }

        let mut status = ActionStatus::Success;
        let mut result: Option<Value> = None;

        let hooks = [&action.before, &action.callback, &action.after];
        for hook in hooks.into_iter().flatten() {
            match hook(&mut run) {
                Ok(control) => {
                    if let Some(outcome) =
                        self.apply_control(engine, control, &mut status, &mut result)?
                    {
                        self.record_call(engine, action.name(), &outcome, false);
                        return Ok(outcome);
                    }
                }
                Err(message) => {
                    engine.store().rollback()?;
                    return Err(CallError::Fatal(message));
                }
            }
        }

        if let (Some(report), Some(bulk)) = (run.bulk_report.take(), &action.bulk) {
            if let Some(notification) = report.failure_notification(
                action
                    .notifications
                    .failure_title
                    .as_deref()
                    .unwrap_or("Some records could not be processed"),
                &bulk.denial_templates,
            ) {
                engine.notifier().dispatch(notification);
            }
        }

        self.stack[idx].data = run.data;

        let redirect = match status {
            ActionStatus::Success => {
                if let Some(title) = &action.notifications.success_title {
                    engine
                        .notifier()
                        .dispatch(Notification::success(title.clone()));
                }
                action.success_redirect.clone()
            }
            ActionStatus::Failure => {
                if let Some(title) = &action.notifications.failure_title {
                    engine
                        .notifier()
                        .dispatch(Notification::danger(title.clone()));
                }
                action.failure_redirect.clone()
            }
        };

        engine.store().commit()?;

        self.stack[idx].arguments = empty_object();
        self.stack[idx].data = empty_object();

        // An externally mutated stack means something else mounted or
        // unmounted during the call; leave it alone in that case.
        let unmounted = if self.stack_snapshot() == snapshot {
            let popped = self.pop_with_policy(&CancelParents::One);
            if !popped.is_empty() {
                engine
                    .audit()
                    .record(AuditEntry::new(AuditOperation::ActionUnmounted { popped }));
            }
            true
        } else {
            false
        };

        let outcome = CallOutcome::Completed(ActionOutcome {
            status,
            result,
            redirect,
            unmounted,
        });
        self.record_call(engine, &name, &outcome, true);
        Ok(outcome)
    }

    fn record_call(&self, engine: &Engine, name: &str, outcome: &CallOutcome, committed: bool) {
        let status = match outcome {
            CallOutcome::Completed(outcome) => match outcome.status {
                ActionStatus::Success => "success",
                ActionStatus::Failure => "failure",
            },
            CallOutcome::Halted => "halted",
            CallOutcome::Cancelled { .. } => "cancelled",
            CallOutcome::RateLimited(_) => "rate-limited",
            CallOutcome::Skipped => "skipped",
        };
        engine.audit().record(AuditEntry::new(AuditOperation::ActionCalled {
            name: name.to_string(),
            status: status.to_string(),
            committed,
        }));
    }

    /// Unmounts from the deepest action, honoring its cancel-parents
    /// policy: clear everything, pop back to a named ancestor, or pop
    /// exactly one.
    pub fn unmount(&mut self, engine: &Engine) -> Vec<String> {
        let policy = resolve_stack(
            &self.tree,
            self.table.as_ref(),
            engine.store(),
            &mut self.action_cache,
            &self.stack,
        )
        .ok()
        .and_then(|resolved| resolved.into_iter().next_back())
        .map(|deepest| deepest.action.cancel_parents.clone())
        .unwrap_or_default();

        let popped = self.pop_with_policy(&policy);
        if !popped.is_empty() {
            engine.audit().record(AuditEntry::new(AuditOperation::ActionUnmounted {
                popped: popped.clone(),
            }));
        }
        popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BulkConfig, ModalConfig};
    use crate::authorize::{AuthorizationResponse, AuthorizationRule, MapGate};
    use crate::notify::{RecordingDispatcher, Severity};
    use crate::rate_limit::RateLimit;
    use crate::record::InMemoryRecordStore;
    use crate::schema::Component;
    use crate::validate::Rule;
    use serde_json::json;

    fn named(name: &str) -> Action {
        Action::new(name).unwrap()
    }

    fn host_with(action: Action) -> ActionHost {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::container().key("root").register_action(action));
        ActionHost::new(tree)
    }

    fn engine() -> (Arc<InMemoryRecordStore>, Arc<RecordingDispatcher>, Engine) {
        let store = Arc::new(InMemoryRecordStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = Engine::new(store.clone()).with_notifier(notifier.clone());
        (store, notifier, engine)
    }

    #[test]
    fn mount_without_modal_calls_through_and_unmounts() {
        let (store, _, engine) = engine();
        let action = named("create").action(|run| {
            let mut record = Record::new("post");
            record.fill(&json!({"title": "made"}));
            run.store.save(&mut record).map_err(|e| e.to_string())?;
            Ok(ActionControl::Success(Some(json!("ok"))))
        });
        let mut host = host_with(action);

        let outcome = host.mount(&engine, MountedAction::new("create")).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected a completed call");
        };
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.result, Some(json!("ok")));
        assert!(outcome.unmounted);
        assert!(host.stack().is_empty());
        assert_eq!(store.list("post").unwrap().len(), 1);
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn unresolvable_mounts_abandon_silently() {
        let (_, _, engine) = engine();
        let mut host = host_with(named("real"));
        let outcome = host.mount(&engine, MountedAction::new("ghost")).unwrap();
        assert_eq!(outcome, MountOutcome::Abandoned);
        assert!(host.stack().is_empty());
    }

    #[test]
    fn disabled_mounts_abandon_silently() {
        let (_, _, engine) = engine();
        let mut host = host_with(named("frozen").disabled(true));
        let outcome = host.mount(&engine, MountedAction::new("frozen")).unwrap();
        assert_eq!(outcome, MountOutcome::Abandoned);
        assert!(host.stack().is_empty());
    }

    #[test]
    fn unauthorized_mounts_notify_only_when_configured() {
        let gate = MapGate::denying_by_default()
            .with("run", AuthorizationResponse::deny_with_message("No."));
        let store = Arc::new(InMemoryRecordStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = Engine::new(store)
            .with_gate(Arc::new(gate))
            .with_notifier(notifier.clone());

        let rule = AuthorizationRule::Single("run".to_string());
        let mut silent = host_with(named("quiet").authorize(rule.clone()));
        silent.mount(&engine, MountedAction::new("quiet")).unwrap();
        assert!(notifier.sent().is_empty());

        let mut loud = host_with(named("loud").authorize(rule).notify_unauthorized());
        let outcome = loud.mount(&engine, MountedAction::new("loud")).unwrap();
        assert_eq!(outcome, MountOutcome::Abandoned);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Danger);
        assert_eq!(sent[0].body.as_deref(), Some("No."));
    }

    #[test]
    fn halt_resolves_the_transaction_per_its_flag() {
        let (store, _, engine) = engine();
        let action = named("stop")
            .modal(ModalConfig::new("Confirm"))
            .action(|run| {
                let mut record = Record::new("post");
                run.store.save(&mut record).map_err(|e| e.to_string())?;
                Ok(ActionControl::Halt { rollback: true })
            });
        let mut host = host_with(action);

        let mounted = host.mount(&engine, MountedAction::new("stop")).unwrap();
        assert_eq!(mounted, MountOutcome::AwaitingModal);

        let outcome = host.call_mounted_action(&engine, Value::Null).unwrap();
        assert_eq!(outcome, CallOutcome::Halted);
        assert!(store.list("post").unwrap().is_empty());
        assert_eq!(store.transaction_depth(), 0);
        // Halting leaves the action mounted.
        assert_eq!(host.stack().len(), 1);
    }

    #[test]
    fn halt_without_rollback_commits_the_transaction() {
        let (store, _, engine) = engine();
        let action = named("pause")
            .modal(ModalConfig::new("Confirm"))
            .action(|run| {
                let mut record = Record::new("post");
                run.store.save(&mut record).map_err(|e| e.to_string())?;
                Ok(ActionControl::Halt { rollback: false })
            });
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("pause")).unwrap();

        let outcome = host.call_mounted_action(&engine, Value::Null).unwrap();
        assert_eq!(outcome, CallOutcome::Halted);
        assert_eq!(store.list("post").unwrap().len(), 1);
        assert_eq!(store.transaction_depth(), 0);
        assert_eq!(host.stack().len(), 1);
    }

    #[test]
    fn cancel_commits_and_optionally_unmounts() {
        let (store, _, engine) = engine();
        let action = named("keep")
            .modal(ModalConfig::new("Confirm"))
            .action(|run| {
                let mut record = Record::new("post");
                run.store.save(&mut record).map_err(|e| e.to_string())?;
                Ok(ActionControl::Cancel {
                    rollback: false,
                    unmount: true,
                })
            });
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("keep")).unwrap();

        let outcome = host.call_mounted_action(&engine, Value::Null).unwrap();
        assert_eq!(outcome, CallOutcome::Cancelled { unmounted: true });
        assert_eq!(store.list("post").unwrap().len(), 1);
        assert_eq!(store.transaction_depth(), 0);
        assert!(host.stack().is_empty());
    }

    #[test]
    fn validation_failure_rolls_back_and_stays_mounted() {
        let (store, _, engine) = engine();
        let action = named("save")
            .modal(ModalConfig::new("Edit").form(|| {
                let mut tree = SchemaTree::new();
                let root = tree.root();
                tree.attach(root, Component::new("title").rule(Rule::Required));
                tree
            }))
            .action(|_| Ok(ActionControl::Success(None)));
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("save")).unwrap();

        let outcome = host.call_mounted_action(&engine, Value::Null);
        assert!(matches!(outcome, Err(CallError::Validation(_))));
        assert_eq!(store.transaction_depth(), 0);
        assert_eq!(host.stack().len(), 1);
    }

    #[test]
    fn validated_form_state_merges_into_data() {
        let (_, _, engine) = engine();
        let action = named("save")
            .modal(ModalConfig::new("Edit").form(|| {
                let mut tree = SchemaTree::new();
                let root = tree.root();
                tree.attach(root, Component::new("title").rule(Rule::Required));
                tree
            }))
            .action(|run| Ok(ActionControl::Success(run.data("title"))));
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("save")).unwrap();
        host.restore_stack(vec![{
            let mut m = MountedAction::new("save");
            m.data = json!({"title": "Hello"});
            m
        }]);

        let outcome = host.call_mounted_action(&engine, Value::Null).unwrap();
        let CallOutcome::Completed(outcome) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.result, Some(json!("Hello")));
    }

    #[test]
    fn fatal_callback_errors_roll_back_and_propagate() {
        let (store, _, engine) = engine();
        let action = named("boom").action(|run| {
            let mut record = Record::new("post");
            run.store.save(&mut record).map_err(|e| e.to_string())?;
            Err("exploded".to_string())
        });
        let mut host = host_with(action);

        let outcome = host.mount(&engine, MountedAction::new("boom"));
        assert!(matches!(
            outcome,
            Err(CallError::Fatal(ref message)) if message == "exploded"
        ));
        assert!(store.list("post").unwrap().is_empty());
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn after_hook_overrides_the_result() {
        let (_, _, engine) = engine();
        let action = named("layered")
            .action(|_| Ok(ActionControl::Success(Some(json!("inner")))))
            .after(|_| Ok(ActionControl::Success(Some(json!("outer")))));
        let mut host = host_with(action);

        let outcome = host.mount(&engine, MountedAction::new("layered")).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.result, Some(json!("outer")));
    }

    #[test]
    fn success_and_failure_notifications_and_redirects() {
        let (_, notifier, engine) = engine();
        let action = named("publish")
            .success_notification("Published")
            .success_redirect("/posts")
            .action(|_| Ok(ActionControl::Success(None)));
        let mut host = host_with(action);

        let outcome = host.mount(&engine, MountedAction::new("publish")).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.redirect.as_deref(), Some("/posts"));
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Published");
        assert_eq!(sent[0].severity, Severity::Success);

        notifier.clear();
        let action = named("fail")
            .failure_notification("Failed")
            .action(|_| Ok(ActionControl::Failure(None)));
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("fail")).unwrap();
        assert_eq!(notifier.sent()[0].severity, Severity::Danger);
    }

    #[test]
    fn rate_limited_calls_notify_and_abort() {
        let (_, notifier, engine) = engine();
        let action = named("spam")
            .modal(ModalConfig::new("Confirm"))
            .rate_limit(RateLimit::per_minute(1))
            .action(|_| Ok(ActionControl::Success(None)));
        let mut host = host_with(action);
        host.mount(&engine, MountedAction::new("spam")).unwrap();

        let first = host.call_mounted_action(&engine, Value::Null).unwrap();
        assert!(matches!(first, CallOutcome::Completed(_)));

        host.mount(&engine, MountedAction::new("spam")).unwrap();
        let second = host.call_mounted_action(&engine, Value::Null).unwrap();
        assert!(matches!(second, CallOutcome::RateLimited(_)));
        let sent = notifier.sent();
        assert_eq!(sent.last().unwrap().title, "Too many attempts");
        assert!(sent.last().unwrap().persistent);
        // The refused call leaves the action mounted.
        assert_eq!(host.stack().len(), 1);
    }

    #[test]
    fn nested_unmount_cancels_back_to_the_named_ancestor() {
        let (_, _, engine) = engine();
        let c = named("c")
            .modal(ModalConfig::new("C"))
            .cancel_parents(CancelParents::To("a".to_string()));
        let b = named("b").modal(ModalConfig::new("B")).modal_action(c);
        let a = named("a").modal(ModalConfig::new("A")).modal_action(b);
        let mut host = host_with(a);

        host.mount(&engine, MountedAction::new("a")).unwrap();
        host.mount(&engine, MountedAction::new("b")).unwrap();
        host.mount(&engine, MountedAction::new("c")).unwrap();
        assert_eq!(host.stack().len(), 3);

        let popped = host.unmount(&engine);
        assert_eq!(popped, vec!["c".to_string(), "b".to_string()]);
        let names: Vec<&str> = host.stack().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn emptying_the_stack_resets_url_params() {
        let (_, _, engine) = engine();
        let mut host = host_with(named("open").modal(ModalConfig::new("Open")));
        host.set_url_param("action", json!("open"));

        host.mount(&engine, MountedAction::new("open")).unwrap();
        host.unmount(&engine);
        assert!(host.stack().is_empty());
        assert!(host.url_params().is_empty());
    }

    #[test]
    fn exposed_component_state_is_gathered_into_data() {
        let (_, _, engine) = engine();
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("note").expose_state_to_actions());
        let capture = named("peek").action(|run| Ok(ActionControl::Success(run.data("note"))));
        tree.attach(root, Component::container().key("host").register_action(capture));

        let state = StateTree::new();
        state.set("note", json!("remember me"));
        let mut host = ActionHost::new(tree).state(state);

        let outcome = host.mount(&engine, MountedAction::new("peek")).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.result, Some(json!("remember me")));
    }

    #[test]
    fn invalid_exposed_state_blocks_the_mount() {
        let (_, _, engine) = engine();
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("note")
                .expose_state_to_actions()
                .rule(Rule::Required),
        );
        tree.attach(
            root,
            Component::container().key("host").register_action(named("go")),
        );
        let mut host = ActionHost::new(tree);

        let outcome = host.mount(&engine, MountedAction::new("go"));
        assert!(matches!(outcome, Err(CallError::Validation(_))));
        assert!(host.stack().is_empty());
    }

    struct LockGate;

    impl Gate for LockGate {
        fn check(&self, _: &str, record: Option<&Record>, _: &[Value]) -> AuthorizationResponse {
            match record.and_then(|r| r.attribute("locked")) {
                Some(v) if v == json!(true) => {
                    AuthorizationResponse::deny_with_message("This record is locked.")
                }
                _ => AuthorizationResponse::allow(),
            }
        }
    }

    #[test]
    fn bulk_calls_filter_and_report() {
        let store = Arc::new(InMemoryRecordStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = Engine::new(store.clone())
            .with_gate(Arc::new(LockGate))
            .with_notifier(notifier.clone());

        let mut keys = Vec::new();
        for locked in [false, true, true] {
            let mut record = Record::new("post");
            record.fill(&json!({"locked": locked}));
            store.save(&mut record).unwrap();
            keys.push(record.key.unwrap());
        }

        let delete = named("delete")
            .bulk(
                BulkConfig::default()
                    .authorize_individual(AuthorizationRule::Single("delete".to_string())),
            )
            .action(|run| {
                for record in &run.records {
                    if let Some(key) = &record.key {
                        run.store.delete(&record.model, key).map_err(|e| e.to_string())?;
                    }
                }
                Ok(ActionControl::Success(Some(json!(run.records.len()))))
            });
        let table = Table::new("post").bulk_action(delete);
        let mut host = ActionHost::new(SchemaTree::new()).table(table);

        let descriptor = MountedAction::new("delete")
            .arguments(json!({"selected": keys}))
            .context(MountContext {
                table: true,
                bulk: true,
                ..MountContext::default()
            });
        let outcome = host.mount(&engine, descriptor).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.result, Some(json!(1)));
        assert_eq!(store.list("post").unwrap().len(), 2);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.as_ref().unwrap().contains("This record is locked."));
    }

    #[test]
    fn bulk_summaries_count_processing_failures_with_denials() {
        let store = Arc::new(InMemoryRecordStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = Engine::new(store.clone())
            .with_gate(Arc::new(LockGate))
            .with_notifier(notifier.clone());

        let mut keys = Vec::new();
        for n in 0..10 {
            let mut record = Record::new("post");
            record.fill(&json!({"locked": n == 2 || n == 6, "n": n}));
            store.save(&mut record).unwrap();
            keys.push(record.key.unwrap());
        }

        // Record 4 passes authorization but fails in the callback, with
        // no message; it must still count against the aggregate.
        let delete = named("delete")
            .bulk(
                BulkConfig::default()
                    .authorize_individual(AuthorizationRule::Single("delete".to_string())),
            )
            .action(|run| {
                let records = run.records.clone();
                let mut processed = 0;
                for record in &records {
                    if record.attribute("n") == Some(json!(4)) {
                        run.fail_processing(None);
                        continue;
                    }
                    if let Some(key) = &record.key {
                        run.store.delete(&record.model, key).map_err(|e| e.to_string())?;
                        processed += 1;
                    }
                }
                Ok(ActionControl::Success(Some(json!(processed))))
            });
        let table = Table::new("post").bulk_action(delete);
        let mut host = ActionHost::new(SchemaTree::new()).table(table);

        let descriptor = MountedAction::new("delete")
            .arguments(json!({"selected": keys}))
            .context(MountContext {
                table: true,
                bulk: true,
                ..MountContext::default()
            });
        let outcome = host.mount(&engine, descriptor).unwrap();
        let MountOutcome::Called(CallOutcome::Completed(outcome)) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outcome.result, Some(json!(7)));
        assert_eq!(store.list("post").unwrap().len(), 3);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let body = sent[0].body.as_ref().unwrap();
        assert!(body.contains("This record is locked. (2 of 10)"));
        assert!(body.contains("1 of 10 selected records could not be processed."));
    }
}
