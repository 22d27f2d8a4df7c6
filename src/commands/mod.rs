//! # Command Handlers
//!
//! This module contains organized command handlers for the formctl CLI
//! application. Each command type is implemented in a dedicated submodule
//! for better organization and maintainability.
//!
//! ## Structure
//!
//! - `blueprint` - Blueprint inspection commands (list)
//! - `interaction` - Interaction management commands (create, list, get, set, delete)
//! - `action` - Mounted-action commands (mount, call, unmount)
//! - `shared` - Shared utilities and validation functions

pub mod action;
pub mod blueprint;
pub mod errors;
pub mod interaction;
pub mod shared;

pub use action::handle_action_command;
pub use blueprint::handle_blueprint_command;
pub use interaction::handle_interaction_command;
