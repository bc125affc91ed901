// Store implementations for the moderation pipeline.

pub mod in_memory;
pub mod seed_files;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryModerationStore;
pub use sqlite_store::SqliteModerationStore;
