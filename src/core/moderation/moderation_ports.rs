// Ports for the moderation pipeline.
//
// The core defines WHAT it needs from the outside world (storage, Discord
// actions) as traits. `infra/` provides the stores, `discord/` provides the
// gateway. The pipeline only ever sees these traits.

use super::moderation_models::{AuditLogEntry, ModerationStats, NewRule, Rule};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    /// Malformed rule or action spec.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Discord refused the action (missing role hierarchy or permission).
    #[error("Missing permission: {0}")]
    Permission(String),

    /// A notification or single removal did not go through.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A batch removal was rejected as a whole.
    #[error("Bulk operation failed: {0}")]
    BulkOperation(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

// ============================================================================
// STORAGE PORTS
// ============================================================================

/// Source of moderation rules. List order is match precedence.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules, ordered by id.
    async fn list_rules(&self) -> Result<Vec<Rule>, ModerationError>;

    /// Enabled rules in precedence order.
    async fn enabled_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        Ok(self
            .list_rules()
            .await?
            .into_iter()
            .filter(|rule| rule.enabled)
            .collect())
    }

    async fn get_rule(&self, id: i64) -> Result<Option<Rule>, ModerationError>;

    async fn create_rule(&self, rule: NewRule) -> Result<Rule, ModerationError>;

    /// Replace a rule's fields, keeping its id. Returns `None` if no rule
    /// has this id.
    async fn update_rule(&self, id: i64, rule: NewRule) -> Result<Option<Rule>, ModerationError>;

    /// Returns the updated rule, or `None` if no rule has this id.
    async fn set_rule_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> Result<Option<Rule>, ModerationError>;

    /// Returns `false` if no rule had this id.
    async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Store an entry and return it with its assigned id.
    async fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, ModerationError>;

    /// Most recent entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, ModerationError>;
}

#[async_trait]
pub trait Counters: Send + Sync {
    async fn increment_monitored(&self, n: u64) -> Result<(), ModerationError>;
    async fn increment_deleted(&self, n: u64) -> Result<(), ModerationError>;
    async fn increment_warnings(&self, n: u64) -> Result<(), ModerationError>;
    async fn snapshot(&self) -> Result<ModerationStats, ModerationError>;
}

/// Convenience bound for stores that back all three storage ports.
pub trait ModerationStore: RuleStore + AuditSink + Counters {}

impl<T: RuleStore + AuditSink + Counters> ModerationStore for T {}

// ============================================================================
// PLATFORM PORTS
// ============================================================================

/// Direct messages to users. Failure is normal (DMs closed).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_direct(&self, user_id: u64, text: &str) -> Result<(), ModerationError>;
}

#[async_trait]
pub trait ChannelMessageRemover: Send + Sync {
    /// Remove many messages in one request. Subject to platform limits on
    /// batch size and message age.
    async fn bulk_remove(&self, channel_id: u64, message_ids: &[u64])
        -> Result<(), ModerationError>;

    async fn single_remove(&self, channel_id: u64, message_id: u64)
        -> Result<(), ModerationError>;
}

/// Member-level sanctions. Both may fail on insufficient permission.
#[async_trait]
pub trait MemberModeration: Send + Sync {
    async fn mute(
        &self,
        guild_id: u64,
        user_id: u64,
        minutes: u32,
        reason: &str,
    ) -> Result<(), ModerationError>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ModerationError>;
}
