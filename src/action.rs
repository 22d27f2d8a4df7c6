//! # Actions
//!
//! An action is a named, configurable operation a user can invoke against
//! an interaction: a lifecycle of hooks around one core callback, plus
//! authorization, visibility, rate limiting, an optional modal with its
//! own form schema, and notification templates for the terminal states.
//!
//! Control flow out of callbacks is data, not unwinding: a callback
//! returns an [`ActionControl`] and the lifecycle controller interprets
//! it, resolving the open transaction on every variant.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::authorize::AuthorizationRule;
use crate::bulk::BulkReport;
use crate::errors::ConfigError;
use crate::eval::Dynamic;
use crate::rate_limit::RateLimit;
use crate::record::{Record, RecordStore};
use crate::schema::SchemaTree;
use crate::state::data_set;

/// Terminal status of a completed action call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The call completed and the success notification applies.
    Success,
    /// The call completed but reported failure.
    Failure,
}

/// What a callback tells the lifecycle controller to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionControl {
    /// Proceed; the call succeeded, optionally carrying a result value.
    Success(Option<Value>),
    /// Proceed; the call failed, optionally carrying a result value.
    Failure(Option<Value>),
    /// Stop the call silently. The transaction commits or rolls back per
    /// the flag; the action stays mounted.
    Halt {
        /// Roll back instead of committing.
        rollback: bool,
    },
    /// Stop the call silently, optionally unmounting the action.
    Cancel {
        /// Roll back instead of committing.
        rollback: bool,
        /// Pop the action off the stack as well.
        unmount: bool,
    },
}

/// How far `unmount` pops the stack from this action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CancelParents {
    /// Pop this action only.
    #[default]
    One,
    /// Clear the entire stack.
    All,
    /// Pop until the named ancestor is on top.
    To(String),
}

/// The mutable context handed to an action's callbacks.
pub struct ActionRun<'a> {
    /// The action's merged arguments.
    pub arguments: Value,
    /// The action's working data, carried between hooks.
    pub data: Value,
    /// The record the action operates on, if resolution attached one.
    pub record: Option<Record>,
    /// For bulk calls, the individually authorized selected records.
    pub records: Vec<Record>,
    /// For bulk calls, the running failure aggregate. Seeded with the
    /// authorization denials; callbacks add processing failures through
    /// [`ActionRun::fail_processing`]. The lifecycle controller composes
    /// the summary notification from it after the hooks finish.
    pub bulk_report: Option<BulkReport>,
    /// The backing store, for callbacks that persist.
    pub store: &'a dyn RecordStore,
}

impl ActionRun<'_> {
    /// Reads an argument by dotted path.
    pub fn argument(&self, path: &str) -> Option<Value> {
        crate::state::data_get(&self.arguments, path).cloned()
    }

    /// Reads working data by dotted path.
    pub fn data(&self, path: &str) -> Option<Value> {
        crate::state::data_get(&self.data, path).cloned()
    }

    /// Writes working data by dotted path.
    pub fn set_data(&mut self, path: &str, value: Value) {
        data_set(&mut self.data, path, value);
    }

    /// Records one record that failed while the callback was processing
    /// it, keyed by the message if one is given. Outside a bulk call this
    /// is a no-op.
    pub fn fail_processing(&mut self, message: Option<&str>) {
        if let Some(report) = &mut self.bulk_report {
            report.fail_processing(message);
        }
    }
}

/// The core callback and before/after hooks.
pub type ActionCallback =
    Arc<dyn Fn(&mut ActionRun<'_>) -> Result<ActionControl, String> + Send + Sync>;

/// Mount-phase hooks, which cannot fail.
pub type MountHook = Arc<dyn Fn(&mut ActionRun<'_>) + Send + Sync>;

/// A builder for the form schema an action presents in its modal.
pub type FormBuilder = Arc<dyn Fn() -> SchemaTree + Send + Sync>;

/// Modal configuration: presence alone means mounting pauses for user
/// interaction instead of calling immediately.
#[derive(Clone)]
pub struct ModalConfig {
    pub(crate) heading: String,
    pub(crate) form: Option<FormBuilder>,
}

impl ModalConfig {
    /// A modal with a heading and no form.
    pub fn new(heading: impl Into<String>) -> Self {
        ModalConfig {
            heading: heading.into(),
            form: None,
        }
    }

    /// Attaches a form schema builder to the modal.
    pub fn form(mut self, builder: impl Fn() -> SchemaTree + Send + Sync + 'static) -> Self {
        self.form = Some(Arc::new(builder));
        self
    }

    /// The modal heading.
    pub fn heading(&self) -> &str {
        &self.heading
    }
}

/// Notification titles for the terminal states; absent titles send
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct NotificationTemplates {
    pub(crate) success_title: Option<String>,
    pub(crate) failure_title: Option<String>,
}

/// Per-reason bulk denial message templates, keyed by the denial message
/// the gate returns. Templates may use `:count`, `:total`, and `:isAll`.
pub type DenialTemplates = HashMap<String, String>;

/// Bulk behavior for actions operating over a selected-record set.
#[derive(Clone, Default)]
pub struct BulkConfig {
    pub(crate) authorize_individual: Option<AuthorizationRule>,
    pub(crate) denial_templates: DenialTemplates,
}

impl BulkConfig {
    /// Requires each selected record to pass the rule individually.
    pub fn authorize_individual(mut self, rule: AuthorizationRule) -> Self {
        self.authorize_individual = Some(rule);
        self
    }

    /// Registers a message template for a denial reason.
    pub fn denial_template(
        mut self,
        reason: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.denial_templates.insert(reason.into(), template.into());
        self
    }
}

////////////////////////////////////////////// Action //////////////////////////////////////////////////

/// A named, invokable operation.
///
/// Built fluently; registered on components, tables, or other actions'
/// modals. Cloning an action shares its callbacks.
#[derive(Clone)]
pub struct Action {
    name: String,
    pub(crate) arguments: Value,
    pub(crate) hidden: Dynamic<bool>,
    pub(crate) disabled: Dynamic<bool>,
    pub(crate) authorization: Option<AuthorizationRule>,
    pub(crate) authorization_message: Option<String>,
    pub(crate) notifies_unauthorized: bool,
    pub(crate) rate_limit: Option<RateLimit>,
    pub(crate) modal: Option<ModalConfig>,
    pub(crate) modal_actions: HashMap<String, Action>,
    pub(crate) cancel_parents: CancelParents,
    pub(crate) notifications: NotificationTemplates,
    pub(crate) success_redirect: Option<String>,
    pub(crate) failure_redirect: Option<String>,
    pub(crate) bulk: Option<BulkConfig>,
    pub(crate) before_form_filled: Option<MountHook>,
    pub(crate) fill_form: Option<MountHook>,
    pub(crate) after_form_filled: Option<MountHook>,
    pub(crate) before: Option<ActionCallback>,
    pub(crate) callback: Option<ActionCallback>,
    pub(crate) after: Option<ActionCallback>,
}

impl Action {
    /// Creates an action. Blank or whitespace-containing names are a
    /// configuration error.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidActionName(name));
        }
        Ok(Action {
            name,
            arguments: Value::Object(serde_json::Map::new()),
            hidden: Dynamic::literal(false),
            disabled: Dynamic::literal(false),
            authorization: None,
            authorization_message: None,
            notifies_unauthorized: false,
            rate_limit: None,
            modal: None,
            modal_actions: HashMap::new(),
            cancel_parents: CancelParents::One,
            notifications: NotificationTemplates::default(),
            success_redirect: None,
            failure_redirect: None,
            bulk: None,
            before_form_filled: None,
            fill_form: None,
            after_form_filled: None,
            before: None,
            callback: None,
            after: None,
        })
    }

    /// The action's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets default arguments merged under any submitted ones.
    pub fn arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets the hidden condition.
    pub fn hidden(mut self, hidden: impl Into<Dynamic<bool>>) -> Self {
        self.hidden = hidden.into();
        self
    }

    /// Sets the disabled condition.
    pub fn disabled(mut self, disabled: impl Into<Dynamic<bool>>) -> Self {
        self.disabled = disabled.into();
        self
    }

    /// Attaches an authorization rule.
    pub fn authorize(mut self, rule: AuthorizationRule) -> Self {
        self.authorization = Some(rule);
        self
    }

    /// Sets a fallback message for denials that carry none.
    pub fn authorization_message(mut self, message: impl Into<String>) -> Self {
        self.authorization_message = Some(message.into());
        self
    }

    /// Sends a danger notification (rather than failing silently) when a
    /// mount is denied.
    pub fn notify_unauthorized(mut self) -> Self {
        self.notifies_unauthorized = true;
        self
    }

    /// Declares a rate limit on calls.
    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Attaches a modal; mounting will pause for user interaction.
    pub fn modal(mut self, modal: ModalConfig) -> Self {
        self.modal = Some(modal);
        self
    }

    /// Registers a nested action openable from this action's modal.
    pub fn modal_action(mut self, action: Action) -> Self {
        self.modal_actions.insert(action.name.clone(), action);
        self
    }

    /// Declares how far `unmount` pops the stack from this action.
    pub fn cancel_parents(mut self, policy: CancelParents) -> Self {
        self.cancel_parents = policy;
        self
    }

    /// Sets the success notification title.
    pub fn success_notification(mut self, title: impl Into<String>) -> Self {
        self.notifications.success_title = Some(title.into());
        self
    }

    /// Sets the failure notification title.
    pub fn failure_notification(mut self, title: impl Into<String>) -> Self {
        self.notifications.failure_title = Some(title.into());
        self
    }

    /// Redirect target on success.
    pub fn success_redirect(mut self, url: impl Into<String>) -> Self {
        self.success_redirect = Some(url.into());
        self
    }

    /// Redirect target on failure.
    pub fn failure_redirect(mut self, url: impl Into<String>) -> Self {
        self.failure_redirect = Some(url.into());
        self
    }

    /// Configures bulk behavior over a selected-record set.
    pub fn bulk(mut self, config: BulkConfig) -> Self {
        self.bulk = Some(config);
        self
    }

    /// Hook before the modal form is filled at mount.
    pub fn before_form_filled(mut self, hook: impl Fn(&mut ActionRun<'_>) + Send + Sync + 'static) -> Self {
        self.before_form_filled = Some(Arc::new(hook));
        self
    }

    /// The mount callback that fills the modal form.
    pub fn fill_form(mut self, hook: impl Fn(&mut ActionRun<'_>) + Send + Sync + 'static) -> Self {
        self.fill_form = Some(Arc::new(hook));
        self
    }

    /// Hook after the modal form is filled at mount.
    pub fn after_form_filled(mut self, hook: impl Fn(&mut ActionRun<'_>) + Send + Sync + 'static) -> Self {
        self.after_form_filled = Some(Arc::new(hook));
        self
    }

    /// Hook before the core callback, after validation.
    pub fn before(
        mut self,
        hook: impl Fn(&mut ActionRun<'_>) -> Result<ActionControl, String> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    /// The core callback.
    pub fn action(
        mut self,
        callback: impl Fn(&mut ActionRun<'_>) -> Result<ActionControl, String> + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Hook after the core callback; a non-success control from it
    /// overrides the callback's.
    pub fn after(
        mut self,
        hook: impl Fn(&mut ActionRun<'_>) -> Result<ActionControl, String> + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(hook));
        self
    }

    /// Whether mounting should pause for a modal instead of calling
    /// immediately.
    pub fn has_modal(&self) -> bool {
        self.modal.is_some()
    }

    /// The registered modal actions by name.
    pub fn modal_actions(&self) -> &HashMap<String, Action> {
        &self.modal_actions
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("has_modal", &self.has_modal())
            .finish_non_exhaustive()
    }
}
