// Discord side of the moderation pipeline: the port implementations and the
// message event hook.

pub mod gateway;
pub mod message_handler;

pub use gateway::DiscordGateway;
