use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use formwork::{
    cli_utils,
    commands::{handle_action_command, handle_blueprint_command, handle_interaction_command},
    http_utils,
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Options {
    #[arrrg(optional, "Base URL of the Formwork API server")]
    base_url: String,
}

const USAGE: &str = r#"Usage: formctl [options] <command> [args...]

Options:
  --base-url <url>     Base URL of the Formwork API server (default: http://localhost:8080)

Commands:
  blueprint list                                      List registered blueprints
  interaction create <blueprint>                      Create an interaction from a blueprint
  interaction list                                    List live interactions
  interaction get <interaction-id>                    Get interaction state and action stack
  interaction set <interaction-id> <state-json>       Replace interaction state
  interaction delete <interaction-id>                 Delete an interaction
  action mount <interaction-id> <name> [args-json]    Mount an action on an interaction
  action call <interaction-id> [args-json]            Call the deepest mounted action
  action unmount <interaction-id>                     Unmount the deepest mounted action"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (options, free) = Options::from_command_line_relaxed("USAGE: formctl <command> [args...]");

    if free.is_empty() {
        cli_utils::exit_with_usage_error("No command specified", USAGE);
    }

    let base_url = if options.base_url.is_empty() {
        "http://localhost:8080".to_string()
    } else {
        options.base_url
    };

    let client = http_utils::FormworkClient::new(base_url.clone());

    match free[0].as_str() {
        "blueprint" => {
            handle_blueprint_command(&free[1..], &client).await;
        }
        "interaction" => {
            handle_interaction_command(&free[1..], &client).await;
        }
        "action" => {
            handle_action_command(&free[1..], &client).await;
        }
        _ => {
            cli_utils::exit_with_error(&format!(
                "Unknown command '{}'. Available commands: blueprint, interaction, action",
                free[0]
            ));
        }
    }

    Ok(())
}
