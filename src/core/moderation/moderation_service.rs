// Moderation service - the message pipeline plus moderator operations.
//
// This service handles:
// - Repeat-flood detection (history tracker, checked first)
// - Rule evaluation against the enabled rules
// - Dispatching remediation for whichever of the two fired
// - Rule management and manual warn/ban/purge for the command layer
//
// NO Discord dependencies here - everything external goes through ports.

use super::action_dispatcher::{ActionDispatcher, DispatchReport, ModerationPorts};
use super::action_plan::ActionPlan;
use super::message_history::MessageHistoryTracker;
use super::moderation_models::{
    AuditLogEntry, HistoryKey, MessageEvent, ModerationConfig, ModerationStats, NewRule, Rule,
    RuleUpdate, SPAM_PREVENTION_RULE,
};
use super::moderation_ports::{ModerationError, RuleStore};
use super::ng_words::NgWordMatcher;
use super::rule_evaluator::RuleEvaluator;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// What the pipeline did with one message.
#[derive(Debug)]
pub enum ModerationOutcome {
    /// Malformed event, dropped before any processing.
    Discarded,
    NoAction,
    Spam {
        message_ids: Vec<u64>,
        report: DispatchReport,
    },
    RuleViolation {
        rule: Rule,
        term: Option<String>,
        report: DispatchReport,
    },
}

type KeyLocks = DashMap<HistoryKey, Arc<tokio::sync::Mutex<()>>>;

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService {
    rules: Arc<dyn RuleStore>,
    tracker: Arc<MessageHistoryTracker>,
    evaluator: RuleEvaluator,
    dispatcher: ActionDispatcher,
    /// One async lock per (author, channel) so a key's messages are handled
    /// strictly one after another.
    key_locks: Arc<KeyLocks>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    config: ModerationConfig,
}

impl ModerationService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ports: ModerationPorts,
        ng_words: NgWordMatcher,
        config: ModerationConfig,
    ) -> Self {
        let tracker = Arc::new(MessageHistoryTracker::new(
            config.spam_threshold,
            config.history_ttl,
        ));
        let dispatcher = ActionDispatcher::new(ports, config.external_call_timeout);

        Self {
            rules,
            tracker,
            evaluator: RuleEvaluator::new(ng_words, config.default_mute_minutes),
            dispatcher,
            key_locks: Arc::new(DashMap::new()),
            sweeper: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Run one inbound message through the pipeline.
    ///
    /// Never fails: every problem on the way is logged and, where relevant,
    /// recorded in the returned report.
    pub async fn handle_message(&self, event: MessageEvent) -> ModerationOutcome {
        if event.content.is_empty() || event.author_id == 0 {
            tracing::debug!(
                message_id = event.message_id,
                "Discarding message without content or author"
            );
            return ModerationOutcome::Discarded;
        }

        let key = HistoryKey::of(&event);
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        self.count_monitored().await;

        // Flooding is checked before any rule.
        let check = self.tracker.record(&event);
        if check.is_spam {
            if let Some(message_ids) = check.message_ids {
                return self.handle_spam(&event, key, message_ids).await;
            }
        }

        let rules = match self
            .dispatcher
            .guarded("load rules", self.rules.enabled_rules())
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load rules, skipping evaluation");
                return ModerationOutcome::NoAction;
            }
        };

        let Some(hit) = self.evaluator.evaluate(&event.content, &rules) else {
            return ModerationOutcome::NoAction;
        };

        tracing::info!(
            user_id = event.author_id,
            channel_id = event.channel_id,
            rule = %hit.rule.name,
            term = ?hit.term,
            "Rule violated"
        );
        let report = self
            .dispatcher
            .apply(&event, &hit.rule, &hit.plan, hit.term.as_deref())
            .await;

        ModerationOutcome::RuleViolation {
            rule: hit.rule,
            term: hit.term,
            report,
        }
    }

    async fn handle_spam(
        &self,
        event: &MessageEvent,
        key: HistoryKey,
        message_ids: Vec<u64>,
    ) -> ModerationOutcome {
        tracing::info!(
            user_id = event.author_id,
            channel_id = event.channel_id,
            count = message_ids.len(),
            "Repeat flooding detected"
        );

        let rule = self.spam_rule().await;
        let plan = self.evaluator.plan_for(&rule);
        let report = self
            .dispatcher
            .apply_bulk(event, &message_ids, &rule, &plan)
            .await;
        self.tracker.clear(&key);

        ModerationOutcome::Spam {
            message_ids,
            report,
        }
    }

    /// The `spam-prevention` rule supplies the flood response whether or not
    /// it is enabled; without it, flooding is only deleted.
    async fn spam_rule(&self) -> Rule {
        let stored = self
            .dispatcher
            .guarded("load rules", self.rules.list_rules())
            .await
            .map(|rules| rules.into_iter().find(|r| r.name == SPAM_PREVENTION_RULE));

        match stored {
            Ok(Some(rule)) => rule,
            Ok(None) => builtin_spam_rule(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load spam rule, using built-in response");
                builtin_spam_rule()
            }
        }
    }

    /// Count a message that is seen but not moderated, such as a text
    /// command.
    pub async fn note_unmoderated(&self) {
        self.count_monitored().await;
    }

    async fn count_monitored(&self) {
        let monitored = self
            .dispatcher
            .guarded(
                "monitored counter",
                self.dispatcher.ports().counters.increment_monitored(1),
            )
            .await;
        if let Err(e) = monitored {
            tracing::warn!(error = %e, "Failed to update monitored counter");
        }
    }

    fn key_lock(&self, key: HistoryKey) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------------
    // Rule management
    // ------------------------------------------------------------------------

    pub async fn list_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        self.rules.list_rules().await
    }

    /// The parsed form of a rule's action spec.
    pub fn action_plan(&self, rule: &Rule) -> Arc<ActionPlan> {
        self.evaluator.plan_for(rule)
    }

    /// Validate and store a new rule. Names must be unique since the
    /// built-in detectors are looked up by name.
    pub async fn add_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
        let rule = self.checked_rule(rule, None).await?;

        let created = self.rules.create_rule(rule).await?;
        tracing::info!(rule_id = created.id, rule = %created.name, "Rule created");
        Ok(created)
    }

    /// Change a rule's name, keywords or action. Same checks as `add_rule`;
    /// cached keyword lists and plans are rebuilt on next use.
    pub async fn update_rule(&self, id: i64, update: RuleUpdate) -> Result<Rule, ModerationError> {
        if update.is_empty() {
            return Err(ModerationError::Validation(
                "nothing to change: give a new name, keywords or action".to_string(),
            ));
        }

        let current = self
            .rules
            .get_rule(id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;
        let rule = self.checked_rule(update.merged_with(&current), Some(id)).await?;

        let updated = self
            .rules
            .update_rule(id, rule)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;
        tracing::info!(rule_id = id, rule = %updated.name, "Rule updated");
        Ok(updated)
    }

    /// Trim the fields, then reject an empty name, an action with no
    /// directive, or a name already used by another rule.
    async fn checked_rule(
        &self,
        mut rule: NewRule,
        own_id: Option<i64>,
    ) -> Result<NewRule, ModerationError> {
        rule.name = rule.name.trim().to_string();
        rule.keyword_spec = rule.keyword_spec.trim().to_string();
        rule.action_spec = rule.action_spec.trim().to_string();

        if rule.name.is_empty() {
            return Err(ModerationError::Validation(
                "rule name must not be empty".to_string(),
            ));
        }
        ActionPlan::validate(&rule.action_spec, self.config.default_mute_minutes)?;

        let existing = self.rules.list_rules().await?;
        let taken = existing
            .iter()
            .any(|r| Some(r.id) != own_id && r.name.eq_ignore_ascii_case(&rule.name));
        if taken {
            return Err(ModerationError::Validation(format!(
                "a rule named \"{}\" already exists",
                rule.name
            )));
        }

        Ok(rule)
    }

    /// Delete a rule, returning what was deleted.
    pub async fn remove_rule(&self, id: i64) -> Result<Rule, ModerationError> {
        let rule = self
            .rules
            .get_rule(id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;

        if !self.rules.delete_rule(id).await? {
            return Err(ModerationError::NotFound(format!("rule {}", id)));
        }
        self.evaluator.forget_rule(id);

        tracing::info!(rule_id = id, rule = %rule.name, "Rule removed");
        Ok(rule)
    }

    pub async fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<Rule, ModerationError> {
        let rule = self
            .rules
            .set_rule_enabled(id, enabled)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;

        tracing::info!(rule_id = id, rule = %rule.name, enabled, "Rule toggled");
        Ok(rule)
    }

    // ------------------------------------------------------------------------
    // Manual moderator actions
    // ------------------------------------------------------------------------

    /// Warn a member by DM. Returns whether the DM was delivered; the
    /// warning is counted and logged either way.
    pub async fn warn_member(
        &self,
        user_id: u64,
        username: &str,
        reason: &str,
    ) -> Result<bool, ModerationError> {
        let ports = self.dispatcher.ports();
        let text = format!("You have been warned by a moderator: {}", reason);
        let delivered = self.try_notify(user_id, &text).await;

        self.dispatcher
            .guarded("warning counter", ports.counters.increment_warnings(1))
            .await?;
        self.append_audit(AuditLogEntry::new(user_id, username, "warn", reason, None))
            .await?;

        Ok(delivered)
    }

    /// DM the member, then ban them. Returns whether the DM was delivered.
    /// A failed ban is returned as an error and nothing is logged.
    pub async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        username: &str,
        reason: &str,
    ) -> Result<bool, ModerationError> {
        // The DM has to go first: after the ban the bot shares no server with them.
        let text = format!("You have been banned from the server. Reason: {}", reason);
        let delivered = self.try_notify(user_id, &text).await;

        self.dispatcher
            .guarded(
                "ban",
                self.dispatcher
                    .ports()
                    .members
                    .ban(guild_id, user_id, reason),
            )
            .await?;

        tracing::info!(guild_id, user_id, reason, "Member banned");
        self.append_audit(AuditLogEntry::new(user_id, username, "ban", reason, None))
            .await?;

        Ok(delivered)
    }

    /// Remove the given messages from a channel on a moderator's behalf.
    /// Returns how many were removed.
    pub async fn purge_messages(
        &self,
        channel_id: u64,
        message_ids: &[u64],
        moderator_id: u64,
        moderator_name: &str,
    ) -> Result<u64, ModerationError> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let (removed, mut errors) = self
            .dispatcher
            .remove_messages(channel_id, message_ids)
            .await;
        if removed == 0 && !errors.is_empty() {
            return Err(errors.remove(0));
        }

        self.dispatcher
            .guarded(
                "deleted counter",
                self.dispatcher.ports().counters.increment_deleted(removed),
            )
            .await?;
        self.append_audit(AuditLogEntry::new(
            moderator_id,
            moderator_name,
            "purge",
            format!("Removed {} messages in channel {}", removed, channel_id),
            None,
        ))
        .await?;

        Ok(removed)
    }

    async fn try_notify(&self, user_id: u64, text: &str) -> bool {
        match self
            .dispatcher
            .guarded(
                "direct message",
                self.dispatcher.ports().notifier.send_direct(user_id, text),
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Could not send DM");
                false
            }
        }
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, ModerationError> {
        self.dispatcher
            .guarded("audit log", self.dispatcher.ports().audit.append(entry))
            .await
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    pub async fn stats(&self) -> Result<ModerationStats, ModerationError> {
        self.dispatcher.ports().counters.snapshot().await
    }

    /// Newest audit entries first.
    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<AuditLogEntry>, ModerationError> {
        self.dispatcher.ports().audit.recent(limit).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the periodic sweep of stale history entries and idle key locks.
    /// Calling it again replaces the running sweeper.
    pub fn spawn_sweeper(&self) {
        let tracker = Arc::clone(&self.tracker);
        let key_locks = Arc::clone(&self.key_locks);
        let interval = self.config.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = tracker.sweep_expired();
                // A lock only referenced by the map is not held by anyone.
                key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                tracing::debug!(
                    removed,
                    remaining = tracker.len(),
                    locks = key_locks.len(),
                    "History sweep finished"
                );
            }
        });

        let mut slot = self.sweeper.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the sweeper and drop all in-memory history.
    pub fn shutdown(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        self.tracker.clear_all();
        self.key_locks.clear();
        tracing::info!("Moderation service stopped");
    }

    /// Author/channel pairs with live repeat history.
    pub fn tracked_keys(&self) -> usize {
        self.tracker.len()
    }
}

fn builtin_spam_rule() -> Rule {
    Rule {
        id: 0,
        name: SPAM_PREVENTION_RULE.to_string(),
        keyword_spec: String::new(),
        action_spec: "delete".to_string(),
        enabled: true,
    }
}

// ============================================================================
// TESTS
// ============================================================================
