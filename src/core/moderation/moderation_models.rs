// Moderation domain models - data structures for the moderation pipeline.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts incoming messages into `MessageEvent`s and
// turns directives back into Discord API calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the rule backed by the banned-word matcher.
pub const INAPPROPRIATE_LANGUAGE_RULE: &str = "inappropriate-language";
/// Name of the rule that configures the repeat-flooding response.
pub const SPAM_PREVENTION_RULE: &str = "spam-prevention";
/// Name of the rule that flags shouting.
pub const EXCESS_CAPS_RULE: &str = "excess-caps";
/// Name of the rule that flags server invite links.
pub const PROMOTIONAL_LINKS_RULE: &str = "promotional-links";

/// A configured moderation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    /// Comma-separated literal or wildcard (`*`) terms.
    pub keyword_spec: String,
    /// Free text encoding one or more directives, e.g. `delete + mute(10)`.
    pub action_spec: String,
    pub enabled: bool,
}

/// Input for creating a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(alias = "keywords")]
    pub keyword_spec: String,
    #[serde(alias = "action")]
    pub action_spec: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Partial edit of an existing rule; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub keyword_spec: Option<String>,
    pub action_spec: Option<String>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.keyword_spec.is_none() && self.action_spec.is_none()
    }

    /// The full rule after this edit. The enabled flag is left alone.
    pub fn merged_with(self, current: &Rule) -> NewRule {
        NewRule {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            keyword_spec: self
                .keyword_spec
                .unwrap_or_else(|| current.keyword_spec.clone()),
            action_spec: self.action_spec.unwrap_or_else(|| current.action_spec.clone()),
            enabled: current.enabled,
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl NewRule {
    pub fn new(name: &str, keyword_spec: &str, action_spec: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            keyword_spec: keyword_spec.to_string(),
            action_spec: action_spec.to_string(),
            enabled,
        }
    }

    /// The rules a fresh store starts with.
    pub fn defaults() -> Vec<NewRule> {
        vec![
            NewRule::new(
                INAPPROPRIATE_LANGUAGE_RULE,
                "built-in word list",
                "delete + warn",
                true,
            ),
            NewRule::new(SPAM_PREVENTION_RULE, "same message 5+ times", "delete", true),
            NewRule::new(
                PROMOTIONAL_LINKS_RULE,
                "discord.gg/*,invite/*",
                "delete + mute(10)",
                true,
            ),
            NewRule::new(EXCESS_CAPS_RULE, "70%+ uppercase", "warn", false),
        ]
    }
}

/// Read-only snapshot of an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub channel_id: u64,
    /// `None` for direct messages; mutes need a guild.
    pub guild_id: Option<u64>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Composite key for per-author, per-channel state.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct HistoryKey {
    pub author_id: u64,
    pub channel_id: u64,
}

impl HistoryKey {
    pub fn of(event: &MessageEvent) -> Self {
        Self {
            author_id: event.author_id,
            channel_id: event.channel_id,
        }
    }
}

/// Repeat-tracking state for one (author, channel) pair.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub content: String,
    pub count: usize,
    pub last_seen_at: DateTime<Utc>,
    /// Always `count` long, oldest first.
    pub message_ids: Vec<u64>,
}

impl HistoryEntry {
    pub fn start(content: &str, message_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            content: content.to_string(),
            count: 1,
            last_seen_at: now,
            message_ids: vec![message_id],
        }
    }
}

/// Result of feeding one message to the history tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamCheckResult {
    pub is_spam: bool,
    /// Every message in the current repeat run, set only when `is_spam`.
    pub message_ids: Option<Vec<u64>>,
}

impl SpamCheckResult {
    /// Create a "not spam" result
    pub fn ok() -> Self {
        Self {
            is_spam: false,
            message_ids: None,
        }
    }

    /// Create a spam result carrying the ids to remove
    pub fn spam(message_ids: Vec<u64>) -> Self {
        Self {
            is_spam: true,
            message_ids: Some(message_ids),
        }
    }
}

/// One remediation step parsed from a rule's action spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionDirective {
    Delete,
    Warn,
    Mute { minutes: u32 },
    Ban,
}

impl std::fmt::Display for ActionDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionDirective::Delete => write!(f, "delete"),
            ActionDirective::Warn => write!(f, "warn"),
            ActionDirective::Mute { minutes } => write!(f, "mute({})", minutes),
            ActionDirective::Ban => write!(f, "ban"),
        }
    }
}

/// Append-only record of a moderation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by the sink; `None` before it is stored.
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub user_id: u64,
    pub username: String,
    pub action: String,
    pub reason: String,
    pub message_content: Option<String>,
}

impl AuditLogEntry {
    pub fn new(
        user_id: u64,
        username: &str,
        action: impl Into<String>,
        reason: impl Into<String>,
        message_content: Option<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            user_id,
            username: username.to_string(),
            action: action.into(),
            reason: reason.into(),
            message_content,
        }
    }
}

/// Running counters shown by `/modstats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationStats {
    pub messages_monitored: u64,
    pub messages_deleted: u64,
    pub warnings_issued: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Tunables for the moderation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationConfig {
    /// Identical consecutive messages needed to count as flooding
    pub spam_threshold: usize,
    /// How long a repeat run stays alive without a new message
    pub history_ttl: Duration,
    /// How often stale history entries are swept
    pub sweep_interval: Duration,
    /// Mute length when a rule says `mute` without minutes
    pub default_mute_minutes: u32,
    /// Upper bound for any single Discord/storage call made by the dispatcher
    pub external_call_timeout: Duration,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            spam_threshold: 5,
            history_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5 * 60),
            default_mute_minutes: 10,
            external_call_timeout: Duration::from_secs(10),
        }
    }
}
