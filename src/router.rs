//! # HTTP API
//!
//! The daemon exposes interactions over a REST surface. An interaction is
//! instantiated from a named blueprint (schema trees carry closures, so
//! they are registered in process, never deserialized), and from then on
//! the wire traffic is plain JSON: state snapshots, mounted-action
//! descriptors, and call outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle::{ActionHost, CallError, CallOutcome, Engine, MountOutcome};
use crate::mount::MountedAction;

/////////////////////////////////////////// BlueprintRegistry //////////////////////////////////////////

/// Builds a fresh [`ActionHost`] for one kind of interaction.
pub type InteractionBlueprint = Arc<dyn Fn() -> ActionHost + Send + Sync>;

/// Named interaction blueprints registered at daemon startup.
#[derive(Default)]
pub struct BlueprintRegistry {
    blueprints: Mutex<HashMap<String, InteractionBlueprint>>,
}

impl BlueprintRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a blueprint under a name.
    pub fn register(&self, name: impl Into<String>, blueprint: impl Fn() -> ActionHost + Send + Sync + 'static) {
        let mut blueprints = self.blueprints.lock().unwrap();
        blueprints.insert(name.into(), Arc::new(blueprint));
    }

    /// Instantiates a host from a named blueprint.
    pub fn instantiate(&self, name: &str) -> Option<ActionHost> {
        let blueprints = self.blueprints.lock().unwrap();
        blueprints.get(name).map(|blueprint| blueprint())
    }

    /// The registered blueprint names, sorted.
    pub fn names(&self) -> Vec<String> {
        let blueprints = self.blueprints.lock().unwrap();
        let mut names: Vec<String> = blueprints.keys().cloned().collect();
        names.sort();
        names
    }
}

///////////////////////////////////////////// Wire Types ///////////////////////////////////////////////

/// Request body for creating an interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInteractionRequest {
    /// The blueprint to instantiate.
    pub blueprint: String,
}

/// Response body for a created interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInteractionResponse {
    /// The assigned interaction id.
    pub id: String,
    /// The blueprint it was built from.
    pub blueprint: String,
}

/// An interaction's wire-visible state: the live state snapshot plus the
/// mounted-action stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionState {
    /// The live state tree, flattened to JSON.
    pub state: Value,
    /// The mounted-action stack, deepest last.
    pub stack: Vec<MountedAction>,
}

/// Request body for replacing an interaction's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    /// The replacement state tree.
    pub state: Value,
    /// When present, replaces the mounted-action stack as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<MountedAction>>,
}

/// Request body for calling the deepest mounted action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallRequest {
    /// Extra arguments merged into the mounted descriptor's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// How a call round ended, flattened for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    /// "completed", "halted", "cancelled", "rate-limited", or "skipped".
    pub outcome: String,
    /// Terminal status for completed calls ("success" or "failure").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The result value, if any callback produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The configured redirect for the terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Whether the action left the stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmounted: Option<bool>,
    /// For rate-limited calls, seconds until another attempt is admitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl CallResult {
    fn from_outcome(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Completed(completed) => CallResult {
                outcome: "completed".to_string(),
                status: Some(
                    match completed.status {
                        crate::action::ActionStatus::Success => "success",
                        crate::action::ActionStatus::Failure => "failure",
                    }
                    .to_string(),
                ),
                result: completed.result,
                redirect: completed.redirect,
                unmounted: Some(completed.unmounted),
                retry_after_secs: None,
            },
            CallOutcome::Halted => CallResult::bare("halted"),
            CallOutcome::Cancelled { unmounted } => CallResult {
                unmounted: Some(unmounted),
                ..CallResult::bare("cancelled")
            },
            CallOutcome::RateLimited(retry) => CallResult {
                retry_after_secs: Some(retry.seconds()),
                ..CallResult::bare("rate-limited")
            },
            CallOutcome::Skipped => CallResult::bare("skipped"),
        }
    }

    fn bare(outcome: &str) -> Self {
        CallResult {
            outcome: outcome.to_string(),
            status: None,
            result: None,
            redirect: None,
            unmounted: None,
            retry_after_secs: None,
        }
    }
}

/// Response body for a mount request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountResponse {
    /// "awaiting-modal", "called", or "abandoned".
    pub outcome: String,
    /// For immediately called actions, how the call ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<CallResult>,
}

/// Response body for an unmount request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountResponse {
    /// The action names popped, deepest first.
    pub popped: Vec<String>,
}

//////////////////////////////////////////////// State /////////////////////////////////////////////////

/// Shared state behind every interaction endpoint.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    blueprints: Arc<BlueprintRegistry>,
    hosts: Arc<Mutex<HashMap<String, ActionHost>>>,
}

impl AppState {
    /// Creates app state over an engine and a blueprint registry.
    pub fn new(engine: Arc<Engine>, blueprints: Arc<BlueprintRegistry>) -> Self {
        AppState {
            engine,
            blueprints,
            hosts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The lifecycle engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

fn generate_interaction_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("interaction_{}", timestamp)
}

fn call_error_response(e: CallError) -> (StatusCode, String) {
    match &e {
        CallError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        CallError::NothingMounted => (StatusCode::CONFLICT, e.to_string()),
        CallError::Store(_) | CallError::Config(_) | CallError::Fatal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/////////////////////////////////////////////// Handlers ///////////////////////////////////////////////

async fn list_blueprints(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.blueprints.names())
}

async fn create_interaction(
    State(state): State<AppState>,
    Json(request): Json<CreateInteractionRequest>,
) -> Result<Json<CreateInteractionResponse>, (StatusCode, String)> {
    let host = state.blueprints.instantiate(&request.blueprint).ok_or((
        StatusCode::NOT_FOUND,
        format!("No blueprint named {:?}", request.blueprint),
    ))?;
    let id = generate_interaction_id();
    let mut hosts = state.hosts.lock().unwrap();
    hosts.insert(id.clone(), host);
    Ok(Json(CreateInteractionResponse {
        id,
        blueprint: request.blueprint,
    }))
}

async fn list_interactions(State(state): State<AppState>) -> Json<Vec<String>> {
    let hosts = state.hosts.lock().unwrap();
    let mut ids: Vec<String> = hosts.keys().cloned().collect();
    ids.sort();
    Json(ids)
}

async fn get_interaction_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InteractionState>, StatusCode> {
    let hosts = state.hosts.lock().unwrap();
    let host = hosts.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(InteractionState {
        state: host.state_tree().snapshot(),
        stack: host.stack().to_vec(),
    }))
}

async fn set_interaction_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetStateRequest>,
) -> Result<Json<InteractionState>, StatusCode> {
    let mut hosts = state.hosts.lock().unwrap();
    let host = hosts.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    host.state_tree().replace(request.state);
    if let Some(stack) = request.stack {
        host.restore_stack(stack);
    }
    Ok(Json(InteractionState {
        state: host.state_tree().snapshot(),
        stack: host.stack().to_vec(),
    }))
}

async fn delete_interaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let mut hosts = state.hosts.lock().unwrap();
    match hosts.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn mount_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(descriptor): Json<MountedAction>,
) -> Result<Json<MountResponse>, (StatusCode, String)> {
    let mut hosts = state.hosts.lock().unwrap();
    let host = hosts
        .get_mut(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("No interaction {:?}", id)))?;
    let outcome = host
        .mount(state.engine(), descriptor)
        .map_err(call_error_response)?;
    let response = match outcome {
        MountOutcome::AwaitingModal => MountResponse {
            outcome: "awaiting-modal".to_string(),
            call: None,
        },
        MountOutcome::Called(call) => MountResponse {
            outcome: "called".to_string(),
            call: Some(CallResult::from_outcome(call)),
        },
        MountOutcome::Abandoned => MountResponse {
            outcome: "abandoned".to_string(),
            call: None,
        },
    };
    Ok(Json(response))
}

async fn call_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallRequest>,
) -> Result<Json<CallResult>, (StatusCode, String)> {
    let mut hosts = state.hosts.lock().unwrap();
    let host = hosts
        .get_mut(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("No interaction {:?}", id)))?;
    let outcome = host
        .call_mounted_action(state.engine(), request.arguments.unwrap_or(Value::Null))
        .map_err(call_error_response)?;
    Ok(Json(CallResult::from_outcome(outcome)))
}

async fn unmount_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnmountResponse>, (StatusCode, String)> {
    let mut hosts = state.hosts.lock().unwrap();
    let host = hosts
        .get_mut(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("No interaction {:?}", id)))?;
    let popped = host.unmount(state.engine());
    Ok(Json(UnmountResponse { popped }))
}

/// Builds the interaction router.
pub fn create_interaction_router(state: AppState) -> Router {
    Router::new()
        .route("/blueprint", get(list_blueprints))
        .route(
            "/interaction",
            get(list_interactions).post(create_interaction),
        )
        .route(
            "/interaction/:id",
            get(get_interaction_state)
                .put(set_interaction_state)
                .delete(delete_interaction),
        )
        .route("/interaction/:id/mount", post(mount_action))
        .route("/interaction/:id/call", post(call_action))
        .route("/interaction/:id/unmount", post(unmount_action))
        .with_state(state)
}
