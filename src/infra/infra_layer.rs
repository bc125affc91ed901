// The infra module contains implementations of core traits.
// Storage backends and seed-file loading for the moderation pipeline.

#[path = "moderation/mod.rs"]
pub mod moderation;
