//! # Dynamic Values and Evaluation Context
//!
//! Almost every knob on a schema component or action can be either a plain
//! value or a computation over the surrounding context: the bound record,
//! the current operation, and scoped access to the state tree. This module
//! provides `Dynamic<T>`, the tagged variant holding one or the other, and
//! `EvalCx`, the context handed to computed values when they run.
//!
//! Closure identity is observable through [`Dynamic::closure_id`] so the
//! visibility cache can memoize one closure shared across many components
//! (for example a table column's visibility rule cloned into every row).
//!
//! ## Usage Examples
//!
//! ```rust
//! use formwork::{Dynamic, EvalCx, EvalSession, Operation, StateTree};
//! use serde_json::json;
//!
//! let state = StateTree::new();
//! state.set("post.published", json!(true));
//! let session = EvalSession::new(state, None, Operation::Edit);
//! let cx = EvalCx::new(&session, "post");
//!
//! let literal = Dynamic::literal(false);
//! let computed = Dynamic::computed(|cx: &EvalCx<'_>| cx.get("published") == json!(true));
//!
//! assert!(!literal.evaluate(&cx));
//! assert!(computed.evaluate(&cx));
//! ```

use std::cell::RefCell;
use std::sync::Arc;

use serde_json::Value;

use crate::record::Record;
use crate::state::{StateTree, path_join};
use crate::visibility::VisibilityCache;

/// The operation the surrounding schema is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Creating a new record.
    Create,
    /// Editing an existing record.
    Edit,
    /// Read-only display.
    View,
}

/// Per-request evaluation session: the bound record, the operation, the
/// live state tree, and the request-scoped caches.
///
/// A session is created per render or call round-trip and discarded at the
/// end of it. The visibility cache inside is only ever touched from the
/// request's own thread, hence `RefCell` rather than a lock.
pub struct EvalSession {
    /// The live state tree backing the schema.
    pub state: StateTree,
    /// The record bound to the root schema, if any.
    pub record: Option<Record>,
    /// The operation being performed.
    pub operation: Operation,
    /// Visibility memoization for the current render pass.
    pub visibility_cache: RefCell<VisibilityCache>,
}

impl EvalSession {
    /// Creates a session over a state tree.
    pub fn new(state: StateTree, record: Option<Record>, operation: Operation) -> Self {
        EvalSession {
            state,
            record,
            operation,
            visibility_cache: RefCell::new(VisibilityCache::new()),
        }
    }
}

/// The context passed to computed values: scoped state access plus the
/// session's record and operation.
#[derive(Clone, Copy)]
pub struct EvalCx<'a> {
    session: &'a EvalSession,
    scope: &'a str,
}

impl<'a> EvalCx<'a> {
    /// Creates a context scoped to a state path prefix.
    pub fn new(session: &'a EvalSession, scope: &'a str) -> Self {
        EvalCx { session, scope }
    }

    /// The session this context evaluates within.
    pub fn session(&self) -> &'a EvalSession {
        self.session
    }

    /// The scope prefix relative paths resolve against.
    pub fn scope(&self) -> &str {
        self.scope
    }

    /// The record bound to the session, if any.
    pub fn record(&self) -> Option<&'a Record> {
        self.session.record.as_ref()
    }

    /// The operation being performed.
    pub fn operation(&self) -> Operation {
        self.session.operation
    }

    /// Resolves a relative path against this context's scope.
    pub fn absolute_path(&self, relative: &str) -> String {
        path_join(self.scope, relative)
    }

    /// Reads state at a path relative to this context's scope. Missing
    /// paths read as JSON null.
    pub fn get(&self, relative: &str) -> Value {
        self.session
            .state
            .get(&self.absolute_path(relative))
            .unwrap_or(Value::Null)
    }

    /// Returns true if state exists at the relative path.
    pub fn has(&self, relative: &str) -> bool {
        self.session.state.has(&self.absolute_path(relative))
    }

    /// Writes state at a path relative to this context's scope.
    pub fn set(&self, relative: &str, value: Value) {
        self.session.state.set(&self.absolute_path(relative), value);
    }
}

/////////////////////////////////////////////// Dynamic ////////////////////////////////////////////////

/// A value that is either a literal or a computation over an [`EvalCx`].
///
/// This is the single place value-or-closure discrimination happens; every
/// configurable field on components and actions is one of these.
pub enum Dynamic<T> {
    /// A plain value, returned verbatim.
    Literal(T),
    /// A computation invoked with the evaluation context.
    Computed(Arc<dyn Fn(&EvalCx<'_>) -> T + Send + Sync>),
}

impl<T> Dynamic<T> {
    /// Wraps a literal value.
    pub fn literal(value: T) -> Self {
        Dynamic::Literal(value)
    }

    /// Wraps a computation.
    pub fn computed(f: impl Fn(&EvalCx<'_>) -> T + Send + Sync + 'static) -> Self {
        Dynamic::Computed(Arc::new(f))
    }

    /// Returns the literal value, if this is one.
    pub fn as_literal(&self) -> Option<&T> {
        match self {
            Dynamic::Literal(value) => Some(value),
            Dynamic::Computed(_) => None,
        }
    }

    /// A stable identity for the underlying closure, shared by clones of
    /// this `Dynamic`. Literals have no identity.
    pub fn closure_id(&self) -> Option<usize> {
        match self {
            Dynamic::Literal(_) => None,
            Dynamic::Computed(f) => Some(Arc::as_ptr(f) as *const () as usize),
        }
    }
}

impl<T: Clone> Dynamic<T> {
    /// Resolves the value: literals verbatim, computations invoked with
    /// the given context.
    pub fn evaluate(&self, cx: &EvalCx<'_>) -> T {
        match self {
            Dynamic::Literal(value) => value.clone(),
            Dynamic::Computed(f) => f(cx),
        }
    }
}

impl<T: Clone> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        match self {
            Dynamic::Literal(value) => Dynamic::Literal(value.clone()),
            Dynamic::Computed(f) => Dynamic::Computed(f.clone()),
        }
    }
}

impl<T: Default> Default for Dynamic<T> {
    fn default() -> Self {
        Dynamic::Literal(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dynamic::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Dynamic::Computed(_) => f.debug_tuple("Computed").field(&"<closure>").finish(),
        }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        Dynamic::Literal(value)
    }
}
