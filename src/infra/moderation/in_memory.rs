// In-memory moderation store. Nothing survives a restart; used when
// MODERATION_STORE=memory and handy for trying rules out.

use crate::core::moderation::{
    AuditLogEntry, AuditSink, Counters, ModerationError, ModerationStats, NewRule, Rule, RuleStore,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

pub struct InMemoryModerationStore {
    rules: DashMap<i64, Rule>,
    next_rule_id: AtomicI64,
    logs: RwLock<Vec<AuditLogEntry>>,
    stats: RwLock<ModerationStats>,
}

impl InMemoryModerationStore {
    pub fn new(seed: Vec<NewRule>) -> Self {
        let store = Self {
            rules: DashMap::new(),
            next_rule_id: AtomicI64::new(1),
            logs: RwLock::new(Vec::new()),
            stats: RwLock::new(ModerationStats::default()),
        };
        for rule in seed {
            store.insert(rule);
        }
        store
    }

    fn insert(&self, rule: NewRule) -> Rule {
        let id = self.next_rule_id.fetch_add(1, Ordering::SeqCst);
        let rule = Rule {
            id,
            name: rule.name,
            keyword_spec: rule.keyword_spec,
            action_spec: rule.action_spec,
            enabled: rule.enabled,
        };
        self.rules.insert(id, rule.clone());
        rule
    }

    async fn bump(&self, update: impl FnOnce(&mut ModerationStats)) {
        let mut stats = self.stats.write().await;
        update(&mut stats);
        stats.last_updated = Some(Utc::now());
    }
}

impl Default for InMemoryModerationStore {
    fn default() -> Self {
        Self::new(NewRule::defaults())
    }
}

#[async_trait]
impl RuleStore for InMemoryModerationStore {
    async fn list_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        let mut rules: Vec<Rule> = self.rules.iter().map(|entry| entry.clone()).collect();
        rules.sort_by_key(|rule| rule.id);
        Ok(rules)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<Rule>, ModerationError> {
        Ok(self.rules.get(&id).map(|entry| entry.clone()))
    }

    async fn create_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
        Ok(self.insert(rule))
    }

    async fn update_rule(&self, id: i64, rule: NewRule) -> Result<Option<Rule>, ModerationError> {
        Ok(self.rules.get_mut(&id).map(|mut entry| {
            entry.name = rule.name;
            entry.keyword_spec = rule.keyword_spec;
            entry.action_spec = rule.action_spec;
            entry.enabled = rule.enabled;
            entry.clone()
        }))
    }

    async fn set_rule_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> Result<Option<Rule>, ModerationError> {
        Ok(self.rules.get_mut(&id).map(|mut entry| {
            entry.enabled = enabled;
            entry.clone()
        }))
    }

    async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError> {
        Ok(self.rules.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditSink for InMemoryModerationStore {
    async fn append(&self, mut entry: AuditLogEntry) -> Result<AuditLogEntry, ModerationError> {
        let mut logs = self.logs.write().await;
        entry.id = Some(logs.len() as i64 + 1);
        logs.push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, ModerationError> {
        let logs = self.logs.read().await;
        let mut entries: Vec<AuditLogEntry> = logs.clone();
        // Stable sort keeps insertion order for equal timestamps; reversing
        // afterwards puts the latest append first.
        entries.sort_by_key(|entry| entry.timestamp);
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl Counters for InMemoryModerationStore {
    async fn increment_monitored(&self, n: u64) -> Result<(), ModerationError> {
        self.bump(|s| s.messages_monitored += n).await;
        Ok(())
    }

    async fn increment_deleted(&self, n: u64) -> Result<(), ModerationError> {
        self.bump(|s| s.messages_deleted += n).await;
        Ok(())
    }

    async fn increment_warnings(&self, n: u64) -> Result<(), ModerationError> {
        self.bump(|s| s.warnings_issued += n).await;
        Ok(())
    }

    async fn snapshot(&self) -> Result<ModerationStats, ModerationError> {
        Ok(self.stats.read().await.clone())
    }
}
