//! # Shared Command Utilities
//!
//! This module provides shared validation, parsing, and utility functions
//! used across multiple command handlers to reduce code duplication.

use handled::Handle;
use serde_json::Value;

use crate::cli_utils;
use crate::commands::errors::{InteractionIdError, UserError};

/// Validates an interaction ID, exiting with a hint when it is malformed.
///
/// IDs are opaque to the daemon, but every ID it issues carries the
/// `interaction_` prefix, so anything else is a caller mistake worth
/// catching before a confusing 404.
pub fn validate_interaction_id_or_exit(id: &str) -> String {
    if id.starts_with("interaction_") && id.len() > "interaction_".len() {
        return id.to_string();
    }
    let error = InteractionIdError {
        input: id.to_string(),
        reason: "expected the 'interaction_' prefix".to_string(),
    };
    match error.handle() {
        Some(UserError {
            message,
            usage_hint: Some(hint),
        }) => cli_utils::exit_with_usage_error(&message, &hint),
        Some(UserError { message, .. }) => cli_utils::exit_with_error(&message),
        None => cli_utils::exit_with_error(&error.to_string()),
    }
}

/// Parses a JSON argument or exits with a field-specific error message.
pub fn parse_json_or_exit(input: &str, field: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|e| {
        cli_utils::exit_with_error(&format!("Invalid {} JSON: {}", field, e));
    })
}

/// Validates required arguments count and exits with usage error if insufficient.
///
/// # Arguments
/// * `args` - The command arguments array
/// * `required_count` - The minimum number of arguments required
/// * `command` - The command name for error message
/// * `usage` - The usage string to display
pub fn require_args_or_exit(args: &[String], required_count: usize, command: &str, usage: &str) {
    if args.len() < required_count {
        cli_utils::exit_with_usage_error(
            &format!("{} command requires more arguments", command),
            usage,
        );
    }
}

/// Validates both minimum and maximum argument counts.
///
/// # Arguments
/// * `args` - The command arguments array
/// * `min_count` - The minimum number of arguments required (including subcommand)
/// * `max_count` - The maximum number of arguments allowed (including subcommand)
/// * `command` - The command name for error message
/// * `usage` - The usage string to display
pub fn validate_args_count_or_exit(
    args: &[String],
    min_count: usize,
    max_count: usize,
    command: &str,
    usage: &str,
) {
    if args.len() < min_count {
        cli_utils::exit_with_usage_error(
            &format!("{} command requires more arguments", command),
            usage,
        );
    }
    if args.len() > max_count {
        cli_utils::exit_with_usage_error(
            &format!("{} command has too many arguments", command),
            usage,
        );
    }
}

/// Macro to generate command dispatcher boilerplate.
macro_rules! dispatch_command {
    ($command_name:expr, $usage:expr, $args:expr, $client:expr, {
        $($subcommand:expr => $handler:expr),* $(,)?
    }) => {
        if $args.is_empty() {
            crate::cli_utils::exit_with_usage_error(
                &format!("{} command requires a subcommand", $command_name),
                $usage,
            );
        }

        match $args[0].as_str() {
            $(
                $subcommand => $handler($args, $client).await,
            )*
            _ => {
                let available_subcommands = vec![$($subcommand),*];
                crate::cli_utils::exit_with_error(&format!(
                    "Unknown {} subcommand '{}'. Available subcommands: {}",
                    $command_name,
                    $args[0],
                    available_subcommands.join(", ")
                ));
            }
        }
    };
}

pub(crate) use dispatch_command;
