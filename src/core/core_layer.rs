// The core module contains all business logic.
// It knows nothing about Discord or SQLite; both plug in through the ports.

#[path = "moderation/mod.rs"]
pub mod moderation;
