//! # Blueprint Command Handler
//!
//! This module handles blueprint inspection commands. Blueprints are
//! registered in the daemon at startup; the CLI can only list them.

use crate::{
    cli_utils,
    commands::shared::{dispatch_command, validate_args_count_or_exit},
    http_utils,
};

const BLUEPRINT_USAGE: &str = "Usage: formctl blueprint <list>";

/// Handles all blueprint-related commands.
///
/// # Arguments
/// * `args` - Command arguments (first element is the subcommand)
/// * `client` - HTTP client for API communication
pub async fn handle_blueprint_command(args: &[String], client: &http_utils::FormworkClient) {
    dispatch_command!("blueprint", BLUEPRINT_USAGE, args, client, {
        "list" => handle_blueprint_list,
    });
}

/// Handles blueprint listing command.
async fn handle_blueprint_list(args: &[String], client: &http_utils::FormworkClient) {
    validate_args_count_or_exit(args, 1, 1, "list", "Usage: formctl blueprint list");
    let blueprints = http_utils::execute_or_exit(
        || client.get::<Vec<String>>("blueprint"),
        "Failed to list blueprints",
    )
    .await;

    cli_utils::print_names(&blueprints, "No blueprints registered");
}
