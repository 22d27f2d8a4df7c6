//! # Formwork: Schema Component State, Visibility, and Action Resolution
//!
//! Formwork is an engine for server-driven forms and record interfaces. A
//! schema is a tree of components; components carry state paths, visibility
//! conditions, validation rules, relationship bindings, and registered
//! actions. The engine keeps a live state tree for each interaction,
//! bridges component state to stored records, and runs a full action
//! lifecycle with authorization, rate limiting, modal forms, and
//! transactional commits.
//!
//! This crate provides:
//!
//! - **Schema Trees**: Arena-allocated component trees with nested child
//!   schemas, dot-joined state paths, and per-component configuration
//! - **Live State**: A shared JSON state tree with dot-path access, plus
//!   hydration and dehydration between component defaults, relationships,
//!   and stored records
//! - **Visibility and Authorization**: Cached hidden/visible/disabled
//!   evaluation, concealment by ancestors, and gate-backed authorization
//!   with per-record checks
//! - **Action Lifecycle**: Mount, modal form, validate, call, and unmount
//!   with one transaction per call, halt and cancel as values, and bulk
//!   authorization aggregation
//! - **HTTP API**: RESTful endpoints for managing interactions and
//!   driving mounted actions
//! - **Audit Logging**: Every mount, call, and unmount is logged to JSONL
//!   files for auditability and replay
//!
//! ## Core Concepts
//!
//! ### Schema Trees
//! A [`SchemaTree`] owns every component in an interaction. Components are
//! attached to schemas; container components carry child schemas of their
//! own. State paths compose by dot-joining each level's path, and a
//! component's absolute path is memoized after first use.
//!
//! ### Interactions
//! An [`ActionHost`] pairs a schema tree with live state and a stack of
//! mounted actions. The daemon exposes hosts over HTTP as interactions,
//! instantiated from named blueprints registered at startup.
//!
//! ### Actions
//! Actions are registered on components and resolved by name through the
//! schema tree, a table, or a parent action's modal. Mounting runs the
//! fill hooks and either awaits a modal or calls straight through. Every
//! call runs inside a store transaction that commits on success and rolls
//! back on validation failure, fatal errors, or an explicit halt.
//!
//! ### Persistence
//! Lifecycle events are logged to JSONL (JSON Lines) files, creating an
//! audit trail of what was mounted, called, and unmounted, with statuses
//! and commit outcomes.
//!
//! ## Architecture
//!
//! The system follows a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HTTP API Layer (Axum routes)            │
//! ├─────────────────────────────────────────┤
//! │ Action Lifecycle (mount/call/unmount)   │
//! ├─────────────────────────────────────────┤
//! │ Schema Evaluation (visibility, rules)   │
//! ├─────────────────────────────────────────┤
//! │ Record Bridge (hydrate/dehydrate)       │
//! ├─────────────────────────────────────────┤
//! │ Record Store (trait-based abstraction)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Examples
//!
//! ### Building a Schema and Working with State
//!
//! ```rust
//! # use formwork::{Component, EvalSession, Operation, SchemaTree, StateTree};
//! # use serde_json::json;
//! let mut tree = SchemaTree::new();
//! let root = tree.root();
//! tree.attach(root, Component::new("title"));
//! tree.attach(root, Component::new("body"));
//!
//! let session = EvalSession::new(StateTree::new(), None, Operation::Create);
//! session.state.set("title", json!("Hello"));
//! assert_eq!(session.state.get("title"), Some(json!("Hello")));
//! assert!(session.state.get("body").is_none());
//! ```
//!
//! ### Validation
//!
//! ```rust
//! # use formwork::{AllowAllGate, Component, EvalSession, Operation, Rule, SchemaTree, StateTree, validate};
//! # use serde_json::json;
//! let mut tree = SchemaTree::new();
//! let root = tree.root();
//! tree.attach(root, Component::new("email").rule(Rule::Required));
//!
//! let session = EvalSession::new(StateTree::new(), None, Operation::Create);
//! let failures = validate(&tree, &session, &AllowAllGate, root);
//! assert_eq!(failures.len(), 1);
//! assert_eq!(failures[0].path, "email");
//!
//! session.state.set("email", json!("a@example.com"));
//! assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
//! ```
//!
//! ### Visibility
//!
//! ```rust
//! # use formwork::{AllowAllGate, Component, EvalSession, Operation, SchemaTree, StateTree, is_hidden};
//! let mut tree = SchemaTree::new();
//! let root = tree.root();
//! let secret = tree.attach(root, Component::new("secret").hidden(true));
//! let public = tree.attach(root, Component::new("public"));
//!
//! let session = EvalSession::new(StateTree::new(), None, Operation::Create);
//! assert!(is_hidden(&tree, &session, &AllowAllGate, secret));
//! assert!(!is_hidden(&tree, &session, &AllowAllGate, public));
//! ```
//!
//! ### Mounting and Calling an Action
//!
//! ```rust
//! # use std::sync::Arc;
//! # use formwork::{
//! #     Action, ActionControl, ActionHost, Component, Engine, InMemoryRecordStore,
//! #     MountOutcome, MountedAction, SchemaTree,
//! # };
//! # use serde_json::json;
//! let mut tree = SchemaTree::new();
//! let root = tree.root();
//! let greet = Action::new("greet")
//!     .unwrap()
//!     .action(|_| Ok(ActionControl::Success(Some(json!("hi")))));
//! tree.attach(root, Component::container().key("toolbar").register_action(greet));
//!
//! let engine = Engine::new(Arc::new(InMemoryRecordStore::new()));
//! let mut host = ActionHost::new(tree);
//!
//! // No modal is configured, so mounting calls straight through.
//! let outcome = host.mount(&engine, MountedAction::new("greet")).unwrap();
//! assert!(matches!(outcome, MountOutcome::Called(_)));
//! assert!(host.stack().is_empty());
//! ```

#![deny(missing_docs)]
mod action;
mod audit;
mod authorize;
mod bulk;
mod errors;
mod eval;
mod hydrate;
mod lifecycle;
mod mount;
mod notify;
mod rate_limit;
mod record;
mod relationship;
mod router;
mod schema;
mod state;
mod table;
mod validate;
mod visibility;

// CLI utility modules

/// Command-line interface utilities for program termination and output formatting.
///
/// This module provides common CLI utilities for formwork binaries, including
/// error handling, formatted output, and program termination functions.
pub mod cli_utils;

/// Command-line interface command handlers.
///
/// This module contains organized command handlers for the formctl CLI
/// application, with each command type implemented in a dedicated submodule.
pub mod commands;

/// HTTP client utilities for interacting with formwork services.
///
/// This module provides a standardized HTTP client for communicating with
/// formwork HTTP APIs, handling requests, responses, and error conditions.
pub mod http_utils;

pub use action::{
    Action, ActionCallback, ActionControl, ActionRun, ActionStatus, BulkConfig, CancelParents,
    DenialTemplates, FormBuilder, ModalConfig, MountHook, NotificationTemplates,
};
pub use audit::{
    AuditEntry, AuditOperation, AuditSink, DurableAuditLog, NullAuditLog, RecordingAuditLog,
};
pub use authorize::{
    AllowAllGate, AuthorizationResponse, AuthorizationRule, Gate, MapGate, authorize,
};
pub use bulk::{BulkReport, individually_authorized_records};
pub use errors::{ConfigError, StoreError};
pub use eval::{Dynamic, EvalCx, EvalSession, Operation};
pub use hydrate::{StateCast, dehydrate, hydrate, hydrate_partially};
pub use lifecycle::{ActionHost, ActionOutcome, CallError, CallOutcome, Engine, MountOutcome};
pub use mount::{
    MountContext, MountedAction, ResolveError, ResolvedAction, rate_limit_key,
    resolve_mounted_action, resolve_stack,
};
pub use notify::{
    JsonlNotificationLog, Notification, NotificationDispatcher, NullDispatcher,
    RecordingDispatcher, Severity, render_template,
};
pub use rate_limit::{RateLimit, RateLimiter, RetryAfter};
pub use record::{InMemoryRecordStore, Record, RecordStore, RelationshipDef, RelationshipKind};
pub use relationship::{
    BridgeError, MutateData, RelationshipConfig, components_sharing_relationship,
    fill_from_relationship, save_relationship, save_relationships,
};
pub use router::{
    AppState, BlueprintRegistry, CallRequest, CallResult, CreateInteractionRequest,
    CreateInteractionResponse, InteractionBlueprint, InteractionState, MountResponse,
    SetStateRequest, UnmountResponse, create_interaction_router,
};
pub use schema::{AfterHydrated, Component, ComponentId, Schema, SchemaEntry, SchemaId, SchemaTree};
pub use state::{StateTree, data_forget, data_get, data_set, is_path_or_ancestor, path_join};
pub use table::Table;
pub use validate::{Rule, ValidationFailure, validate};
pub use visibility::{
    VisibilityCache, component_authorization, is_concealed, is_disabled, is_hidden, is_visible,
    with_visibility_cache,
};
