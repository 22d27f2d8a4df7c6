//! # Interaction Command Handler
//!
//! This module handles interaction-related CLI commands including creation,
//! listing, state inspection and replacement, and deletion of interactions.

use crate::router::{CreateInteractionRequest, CreateInteractionResponse, InteractionState, SetStateRequest};
use crate::{
    cli_utils,
    commands::shared::{
        dispatch_command, parse_json_or_exit, validate_args_count_or_exit,
        validate_interaction_id_or_exit,
    },
    http_utils,
};

const INTERACTION_USAGE: &str =
    "Usage: formctl interaction <create|list|get|set|delete> [args...]";

/// Handles all interaction-related commands.
///
/// # Arguments
/// * `args` - Command arguments (first element is the subcommand)
/// * `client` - HTTP client for API communication
pub async fn handle_interaction_command(args: &[String], client: &http_utils::FormworkClient) {
    dispatch_command!("interaction", INTERACTION_USAGE, args, client, {
        "create" => handle_interaction_create,
        "list" => handle_interaction_list,
        "get" => handle_interaction_get,
        "set" => handle_interaction_set,
        "delete" => handle_interaction_delete,
    });
}

/// Handles interaction creation command.
async fn handle_interaction_create(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        2,
        2,
        "create",
        "Usage: formctl interaction create <blueprint>",
    );
    let request = CreateInteractionRequest {
        blueprint: args[1].clone(),
    };

    let response = http_utils::execute_or_exit(
        || client.post::<CreateInteractionRequest, CreateInteractionResponse>("interaction", &request),
        "Failed to create interaction",
    )
    .await;

    println!("Created interaction: {}", response.id);
}

/// Handles interaction listing command.
async fn handle_interaction_list(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(args, 1, 1, "list", "Usage: formctl interaction list");
    let interactions = http_utils::execute_or_exit(
        || client.get::<Vec<String>>("interaction"),
        "Failed to list interactions",
    )
    .await;

    cli_utils::print_names(&interactions, "No interactions found");
}

/// Handles interaction state retrieval command.
async fn handle_interaction_get(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        2,
        2,
        "get",
        "Usage: formctl interaction get <interaction-id>",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let path = http_utils::FormworkClient::interaction_path(&id, "");
    let state = http_utils::execute_or_exit(
        || client.get::<InteractionState>(&path),
        "Failed to get interaction state",
    )
    .await;

    cli_utils::print_json_or_exit(&state, "interaction state");
}

/// Handles interaction state replacement command.
async fn handle_interaction_set(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        3,
        3,
        "set",
        "Usage: formctl interaction set <interaction-id> <state-json>",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let state = parse_json_or_exit(&args[2], "state");
    let request = SetStateRequest { state, stack: None };

    let path = http_utils::FormworkClient::interaction_path(&id, "");
    let updated = http_utils::execute_or_exit(
        || client.put::<SetStateRequest, InteractionState>(&path, &request),
        "Failed to set interaction state",
    )
    .await;

    cli_utils::print_json_or_exit(&updated, "interaction state");
}

/// Handles interaction deletion command.
async fn handle_interaction_delete(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        2,
        2,
        "delete",
        "Usage: formctl interaction delete <interaction-id>",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let path = http_utils::FormworkClient::interaction_path(&id, "");

    http_utils::execute_or_exit(|| client.delete(&path), "Failed to delete interaction").await;

    println!("Deleted interaction: {}", id);
}
