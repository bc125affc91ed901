// Core moderation module - the message moderation pipeline.
// Leaf components first, the service that wires them together last.

pub mod action_dispatcher;
pub mod action_plan;
pub mod message_history;
pub mod moderation_models;
pub mod moderation_ports;
pub mod moderation_service;
pub mod ng_words;
pub mod rule_evaluator;

pub use action_dispatcher::ModerationPorts;
pub use moderation_models::*;
pub use moderation_ports::*;
pub use moderation_service::*;
pub use ng_words::{NgWordLists, NgWordMatcher};
