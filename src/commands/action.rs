//! # Action Command Handler
//!
//! This module handles mounted-action CLI commands: mounting an action on
//! an interaction, calling the deepest mounted action, and unmounting.

use crate::mount::MountedAction;
use crate::router::{CallRequest, CallResult, MountResponse, UnmountResponse};
use crate::{
    cli_utils,
    commands::shared::{
        dispatch_command, parse_json_or_exit, validate_args_count_or_exit,
        validate_interaction_id_or_exit,
    },
    http_utils,
};

const ACTION_USAGE: &str = "Usage: formctl action <mount|call|unmount> [args...]";

/// Handles all action-related commands.
///
/// # Arguments
/// * `args` - Command arguments (first element is the subcommand)
/// * `client` - HTTP client for API communication
pub async fn handle_action_command(args: &[String], client: &http_utils::FormworkClient) {
    dispatch_command!("action", ACTION_USAGE, args, client, {
        "mount" => handle_action_mount,
        "call" => handle_action_call,
        "unmount" => handle_action_unmount,
    });
}

/// Handles action mounting command.
async fn handle_action_mount(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        3,
        4,
        "mount",
        "Usage: formctl action mount <interaction-id> <action-name> [arguments-json]",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let mut descriptor = MountedAction::new(&args[2]);
    if args.len() == 4 {
        descriptor = descriptor.arguments(parse_json_or_exit(&args[3], "arguments"));
    }

    let path = http_utils::FormworkClient::interaction_path(&id, "mount");
    let response = http_utils::execute_or_exit(
        || client.post::<MountedAction, MountResponse>(&path, &descriptor),
        "Failed to mount action",
    )
    .await;

    cli_utils::print_json_or_exit(&response, "mount outcome");
}

/// Handles action calling command.
async fn handle_action_call(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        2,
        3,
        "call",
        "Usage: formctl action call <interaction-id> [arguments-json]",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let request = CallRequest {
        arguments: if args.len() == 3 {
            Some(parse_json_or_exit(&args[2], "arguments"))
        } else {
            None
        },
    };

    let path = http_utils::FormworkClient::interaction_path(&id, "call");
    let result = http_utils::execute_or_exit(
        || client.post::<CallRequest, CallResult>(&path, &request),
        "Failed to call action",
    )
    .await;

    cli_utils::print_json_or_exit(&result, "call result");
}

/// Handles action unmounting command.
async fn handle_action_unmount(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(
        args,
        2,
        2,
        "unmount",
        "Usage: formctl action unmount <interaction-id>",
    );

    let id = validate_interaction_id_or_exit(&args[1]);
    let path = http_utils::FormworkClient::interaction_path(&id, "unmount");
    let response = http_utils::execute_or_exit(
        || client.post_empty::<UnmountResponse>(&path),
        "Failed to unmount action",
    )
    .await;

    if response.popped.is_empty() {
        cli_utils::print_success("Nothing was mounted");
    } else {
        cli_utils::print_success(&format!("Unmounted: {}", response.popped.join(", ")));
    }
}
