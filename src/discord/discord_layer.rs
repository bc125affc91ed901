// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "moderation/moderation_adapters.rs"]
pub mod moderation;

// Re-export command types for convenience
pub use commands::moderation::{Data, Error};
