use std::path::PathBuf;
use std::sync::Arc;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;

use formwork::{
    Action, ActionControl, ActionHost, AppState, BlueprintRegistry, Component, DurableAuditLog,
    Engine, InMemoryRecordStore, JsonlNotificationLog, ModalConfig, Rule,
    create_interaction_router,
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Path to the audit log for durable action records")]
    audit: Option<String>,
    #[arrrg(optional, "Path to the notification log")]
    notifications: Option<String>,
    #[arrrg(optional, "Host to bind the HTTP server")]
    host: Option<String>,
    #[arrrg(optional, "Port to bind the HTTP server")]
    port: Option<u16>,
    #[arrrg(flag, "Enable verbose logging")]
    verbose: bool,
}

const HELP_TEXT: &str = r#"formworkd - Formwork daemon

USAGE:
    formworkd [OPTIONS]

OPTIONS:
    --audit <PATH>           Path to the audit log for durable action records [default: formwork.jsonl]
    --notifications <PATH>   Path to the notification log [default: formwork_notifications.jsonl]
    --host <HOST>            Host to bind the HTTP server [default: 127.0.0.1]
    --port <PORT>            Port to bind the HTTP server [default: 8080]
    --verbose                Enable verbose logging

DESCRIPTION:
    Runs the Formwork daemon with interaction and action lifecycle
    endpoints mounted under /api/v1/

    The server supports graceful shutdown via SIGTERM or Ctrl+C.

API ENDPOINTS:
    Blueprints:
      GET    /api/v1/blueprint                      List registered blueprints

    Interactions:
      GET    /api/v1/interaction                    List live interactions
      POST   /api/v1/interaction                    Create an interaction from a blueprint
      GET    /api/v1/interaction/{id}               Get interaction state and action stack
      PUT    /api/v1/interaction/{id}               Replace interaction state
      DELETE /api/v1/interaction/{id}               Delete an interaction

    Actions:
      POST   /api/v1/interaction/{id}/mount         Mount an action
      POST   /api/v1/interaction/{id}/call          Call the deepest mounted action
      POST   /api/v1/interaction/{id}/unmount       Unmount the deepest mounted action"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = Args::from_command_line("USAGE: formworkd [OPTIONS]");

    if !free.is_empty() && free[0] == "help" {
        println!("{}", HELP_TEXT);
        return Ok(());
    }

    let config = ServerConfig::from_args(args);

    if config.verbose {
        println!("Formwork daemon starting with configuration:");
        println!("  Audit log: {}", config.audit_path.display());
        println!("  Bind address: {}:{}", config.host, config.port);
    }

    // Initialize the record store, logs, and lifecycle engine
    let store = Arc::new(InMemoryRecordStore::new());
    let audit = Arc::new(DurableAuditLog::new(config.audit_path.clone()));
    let notifier = Arc::new(JsonlNotificationLog::new(config.notifications_path.clone()));
    let engine = Arc::new(
        Engine::new(store.clone())
            .with_audit(audit)
            .with_notifier(notifier),
    );

    let blueprints = Arc::new(BlueprintRegistry::new());
    register_demo_blueprints(&blueprints);

    if config.verbose {
        println!("Initialized record store and audit log");
        println!("Registered blueprints: {}", blueprints.names().join(", "));
    }

    let state = AppState::new(engine, blueprints);
    let app = Router::new().nest("/api/v1", create_interaction_router(state));

    // Bind to address
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    println!("🚀 Formwork daemon started successfully!");
    println!("📡 Server listening on: http://{}", addr);
    println!("💾 Audit log: {}", config.audit_path.display());
    println!("🔄 Ready to accept API requests");

    if config.verbose {
        print_api_endpoints();
    }

    println!("💡 Use Ctrl+C or send SIGTERM for graceful shutdown");
    println!();

    // Set up graceful shutdown
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    // Run server with graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                eprintln!("❌ Server error: {}", e);
                std::process::exit(1);
            }
        }
        () = shutdown_signal => {
            println!();
            println!("🛑 Shutdown signal received, stopping server gracefully...");

            if config.verbose {
                println!("📊 Final statistics:");
                println!("   Audit log: {}", config.audit_path.display());
                println!("   Shutdown completed successfully");
            }

            println!("👋 Formwork daemon stopped");
        }
    }

    Ok(())
}

/// Registers the built-in demonstration blueprints.
///
/// Blueprints carry closures, so they live in daemon code rather than in
/// any serialized configuration. Deployments embedding formwork as a
/// library register their own.
fn register_demo_blueprints(blueprints: &BlueprintRegistry) {
    blueprints.register("post-editor", || {
        let mut tree = formwork::SchemaTree::new();
        let root = tree.root();

        tree.attach(
            root,
            Component::new("title")
                .rule(Rule::Required)
                .rule(Rule::String),
        );
        tree.attach(root, Component::new("body").rule(Rule::String));

        let publish = Action::new("publish")
            .unwrap()
            .modal(ModalConfig::new("Publish this post?"))
            .success_notification("Published")
            .action(|run| {
                run.set_data("publishedAt", json!(chrono::Utc::now().to_rfc3339()));
                Ok(ActionControl::Success(None))
            });
        tree.attach(
            root,
            Component::container().key("toolbar").register_action(publish),
        );

        ActionHost::new(tree)
    });
}

struct ServerConfig {
    audit_path: PathBuf,
    notifications_path: PathBuf,
    host: String,
    port: u16,
    verbose: bool,
}

impl ServerConfig {
    fn from_args(args: Args) -> Self {
        Self {
            audit_path: args
                .audit
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("formwork.jsonl")),
            notifications_path: args
                .notifications
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("formwork_notifications.jsonl")),
            host: args.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: args.port.unwrap_or(8080),
            verbose: args.verbose,
        }
    }
}

fn print_api_endpoints() {
    println!();
    println!("📋 Available API endpoints:");
    println!();
    println!("  Blueprints:");
    println!("    GET    /api/v1/blueprint                List registered blueprints");
    println!();
    println!("  Interactions:");
    println!("    GET    /api/v1/interaction              List live interactions");
    println!("    POST   /api/v1/interaction              Create an interaction from a blueprint");
    println!("    GET    /api/v1/interaction/{{id}}         Get interaction state and action stack");
    println!("    PUT    /api/v1/interaction/{{id}}         Replace interaction state");
    println!("    DELETE /api/v1/interaction/{{id}}         Delete an interaction");
    println!();
    println!("  Actions:");
    println!("    POST   /api/v1/interaction/{{id}}/mount   Mount an action");
    println!("    POST   /api/v1/interaction/{{id}}/call    Call the deepest mounted action");
    println!("    POST   /api/v1/interaction/{{id}}/unmount Unmount the deepest mounted action");
    println!();
}
