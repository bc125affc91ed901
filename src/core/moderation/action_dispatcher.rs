// Action dispatcher - turns a matched rule into side effects.
//
// Every side effect (remove, DM, timeout, counter, audit) is best effort:
// it runs under a timeout, failures are logged and collected in the
// `DispatchReport`, and the next step runs regardless. Exactly one audit
// entry is written per dispatch.

use super::action_plan::{describe_directives, ActionPlan};
use super::moderation_models::{
    ActionDirective, AuditLogEntry, MessageEvent, Rule, INAPPROPRIATE_LANGUAGE_RULE,
};
use super::moderation_ports::{
    AuditSink, ChannelMessageRemover, Counters, MemberModeration, ModerationError, Notifier,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything the dispatcher talks to.
#[derive(Clone)]
pub struct ModerationPorts {
    pub remover: Arc<dyn ChannelMessageRemover>,
    pub notifier: Arc<dyn Notifier>,
    pub members: Arc<dyn MemberModeration>,
    pub audit: Arc<dyn AuditSink>,
    pub counters: Arc<dyn Counters>,
}

/// What happened during one dispatch. Informational only.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Directives that were executed, in order.
    pub attempted: Vec<ActionDirective>,
    /// Directives whose main effect did not happen.
    pub failed: Vec<ActionDirective>,
    /// Directives this path does not execute.
    pub skipped: Vec<ActionDirective>,
    /// Every error met on the way, including notifications and counters.
    pub errors: Vec<ModerationError>,
    pub messages_deleted: u64,
    pub audit_entry: Option<AuditLogEntry>,
}

impl DispatchReport {
    fn fail(&mut self, directive: ActionDirective, error: ModerationError) {
        self.failed.push(directive);
        self.errors.push(error);
    }

    /// Text stored as the audit entry's action, e.g. `delete + mute(10) (failed: mute(10))`.
    pub fn describe(&self) -> String {
        let mut text = describe_directives(&self.attempted);
        if !self.failed.is_empty() {
            text.push_str(&format!(" (failed: {})", describe_directives(&self.failed)));
        }
        if !self.skipped.is_empty() {
            text.push_str(&format!(" (skipped: {})", describe_directives(&self.skipped)));
        }
        text
    }
}

pub struct ActionDispatcher {
    ports: ModerationPorts,
    call_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(ports: ModerationPorts, call_timeout: Duration) -> Self {
        Self {
            ports,
            call_timeout,
        }
    }

    pub fn ports(&self) -> &ModerationPorts {
        &self.ports
    }

    /// Run an external call under the configured timeout.
    pub async fn guarded<T, F>(&self, what: &str, call: F) -> Result<T, ModerationError>
    where
        F: Future<Output = Result<T, ModerationError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ModerationError::Timeout(what.to_string(), self.call_timeout)),
        }
    }

    /// Remediate a single message that violated `rule`, following `plan`
    /// (the rule's parsed action spec).
    ///
    /// `term` is the offending word or link, used in the DM for language
    /// violations.
    pub async fn apply(
        &self,
        event: &MessageEvent,
        rule: &Rule,
        plan: &ActionPlan,
        term: Option<&str>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        if plan.is_empty() {
            tracing::warn!(
                rule = %rule.name,
                action = %rule.action_spec,
                "Rule action has no recognised directive"
            );
        }

        for directive in plan.directives() {
            match *directive {
                ActionDirective::Delete => {
                    report.attempted.push(ActionDirective::Delete);
                    self.delete_single(event, rule, term, &mut report).await;
                }
                ActionDirective::Warn => self.warn(event, rule, &mut report).await,
                ActionDirective::Mute { minutes } => {
                    self.mute(event, rule, minutes, &mut report).await
                }
                ActionDirective::Ban => self.skip_ban(rule, &mut report),
            }
        }

        self.write_audit(event, rule, Some(event.content.clone()), &mut report)
            .await;
        report
    }

    /// Remediate a run of repeated messages: remove all of them, then apply
    /// the rule's other directives once.
    pub async fn apply_bulk(
        &self,
        event: &MessageEvent,
        message_ids: &[u64],
        rule: &Rule,
        plan: &ActionPlan,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        report.attempted.push(ActionDirective::Delete);
        self.delete_bulk(event, message_ids, &mut report).await;

        for directive in plan.directives() {
            match *directive {
                // Already handled by the bulk removal above.
                ActionDirective::Delete => {}
                ActionDirective::Warn => self.warn(event, rule, &mut report).await,
                ActionDirective::Mute { minutes } => {
                    self.mute(event, rule, minutes, &mut report).await
                }
                ActionDirective::Ban => self.skip_ban(rule, &mut report),
            }
        }

        let snapshot = format!("repeated x{}: {}", message_ids.len(), event.content);
        self.write_audit(event, rule, Some(snapshot), &mut report)
            .await;
        report
    }

    async fn delete_single(
        &self,
        event: &MessageEvent,
        rule: &Rule,
        term: Option<&str>,
        report: &mut DispatchReport,
    ) {
        let removed = self
            .guarded(
                "delete message",
                self.ports
                    .remover
                    .single_remove(event.channel_id, event.message_id),
            )
            .await;

        if let Err(e) = removed {
            tracing::warn!(
                message_id = event.message_id,
                channel_id = event.channel_id,
                error = %e,
                "Failed to delete message"
            );
            report.fail(ActionDirective::Delete, e);
            return;
        }

        report.messages_deleted += 1;
        self.count_deleted(1, report).await;

        if rule.name == INAPPROPRIATE_LANGUAGE_RULE {
            if let Some(term) = term {
                let text = format!(
                    "Your message was removed because it contained the banned word \"{}\".",
                    term
                );
                self.notify(event.author_id, &text, report).await;
            }
        }
    }

    /// Remove `message_ids` with one batch call, falling back to one call per
    /// message when the batch is rejected. Returns how many were removed and
    /// every error met.
    pub async fn remove_messages(
        &self,
        channel_id: u64,
        message_ids: &[u64],
    ) -> (u64, Vec<ModerationError>) {
        let mut errors = Vec::new();
        let bulk = self
            .guarded(
                "bulk delete",
                self.ports.remover.bulk_remove(channel_id, message_ids),
            )
            .await;

        match bulk {
            Ok(()) => {
                tracing::info!(channel_id, count = message_ids.len(), "Bulk removed messages");
                (message_ids.len() as u64, errors)
            }
            Err(e) => {
                tracing::warn!(
                    channel_id,
                    error = %e,
                    "Bulk delete rejected, removing messages one by one"
                );
                errors.push(e);

                let mut removed = 0u64;
                for &message_id in message_ids {
                    match self
                        .guarded(
                            "delete message",
                            self.ports.remover.single_remove(channel_id, message_id),
                        )
                        .await
                    {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            tracing::warn!(message_id, error = %e, "Failed to delete message");
                            errors.push(e);
                        }
                    }
                }
                (removed, errors)
            }
        }
    }

    async fn delete_bulk(&self, event: &MessageEvent, message_ids: &[u64], report: &mut DispatchReport) {
        let (removed, errors) = self.remove_messages(event.channel_id, message_ids).await;
        report.errors.extend(errors);

        if removed == 0 && !message_ids.is_empty() {
            report.failed.push(ActionDirective::Delete);
        }
        report.messages_deleted += removed;
        self.count_deleted(message_ids.len() as u64, report).await;

        let text = format!(
            "Your last {} messages were removed for repeating the same text. \
             Please avoid sending the same message over and over.",
            message_ids.len()
        );
        self.notify(event.author_id, &text, report).await;
    }

    async fn warn(&self, event: &MessageEvent, rule: &Rule, report: &mut DispatchReport) {
        report.attempted.push(ActionDirective::Warn);

        let text = format!("Warning: your message broke the \"{}\" rule.", rule.name);
        if let Err(e) = self
            .guarded(
                "warning DM",
                self.ports.notifier.send_direct(event.author_id, &text),
            )
            .await
        {
            tracing::warn!(user_id = event.author_id, error = %e, "Could not deliver warning");
            report.fail(ActionDirective::Warn, e);
        }

        if let Err(e) = self
            .guarded("warning counter", self.ports.counters.increment_warnings(1))
            .await
        {
            tracing::warn!(error = %e, "Failed to update warnings counter");
            report.errors.push(e);
        }
    }

    async fn mute(&self, event: &MessageEvent, rule: &Rule, minutes: u32, report: &mut DispatchReport) {
        let directive = ActionDirective::Mute { minutes };
        report.attempted.push(directive);

        let Some(guild_id) = event.guild_id else {
            report.fail(
                directive,
                ModerationError::Validation("cannot mute outside a guild".to_string()),
            );
            return;
        };

        let reason = format!("Violated rule: {}", rule.name);
        let muted = self
            .guarded(
                "mute",
                self.ports
                    .members
                    .mute(guild_id, event.author_id, minutes, &reason),
            )
            .await;

        match muted {
            Ok(()) => {
                tracing::info!(
                    user_id = event.author_id,
                    minutes,
                    rule = %rule.name,
                    "Muted user"
                );
            }
            Err(e) => {
                tracing::warn!(user_id = event.author_id, error = %e, "Unable to mute member");
                report.fail(directive, e);
                self.notify(
                    event.author_id,
                    "Muting you failed. Please contact a server administrator.",
                    report,
                )
                .await;
            }
        }
    }

    fn skip_ban(&self, rule: &Rule, report: &mut DispatchReport) {
        tracing::info!(
            rule = %rule.name,
            "Ban directive skipped; bans are only issued through the ban command"
        );
        report.skipped.push(ActionDirective::Ban);
    }

    async fn notify(&self, user_id: u64, text: &str, report: &mut DispatchReport) {
        if let Err(e) = self
            .guarded("direct message", self.ports.notifier.send_direct(user_id, text))
            .await
        {
            tracing::warn!(user_id, error = %e, "Could not send DM");
            report.errors.push(e);
        }
    }

    async fn count_deleted(&self, n: u64, report: &mut DispatchReport) {
        if let Err(e) = self
            .guarded("deleted counter", self.ports.counters.increment_deleted(n))
            .await
        {
            tracing::warn!(error = %e, "Failed to update deleted counter");
            report.errors.push(e);
        }
    }

    async fn write_audit(
        &self,
        event: &MessageEvent,
        rule: &Rule,
        snapshot: Option<String>,
        report: &mut DispatchReport,
    ) {
        let entry = AuditLogEntry::new(
            event.author_id,
            &event.author_name,
            report.describe(),
            rule.name.clone(),
            snapshot,
        );

        match self
            .guarded("audit log", self.ports.audit.append(entry))
            .await
        {
            Ok(stored) => report.audit_entry = Some(stored),
            Err(e) => {
                tracing::error!(
                    user_id = event.author_id,
                    rule = %rule.name,
                    error = %e,
                    "Failed to write audit log entry"
                );
                report.errors.push(e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Recording fakes for the moderation ports.

    use super::*;
    use crate::core::moderation::moderation_models::ModerationStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        BulkRemove(u64, Vec<u64>),
        SingleRemove(u64, u64),
        Dm(u64, String),
        Mute(u64, u64, u32),
        Ban(u64, u64),
    }

    #[derive(Default)]
    pub struct FakePlatform {
        pub calls: Mutex<Vec<Call>>,
        pub fail_bulk: AtomicBool,
        pub fail_single: Mutex<Vec<u64>>,
        pub fail_dm: AtomicBool,
        pub fail_mute: AtomicBool,
        pub hang_dm: AtomicBool,
    }

    impl FakePlatform {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ChannelMessageRemover for FakePlatform {
        async fn bulk_remove(
            &self,
            channel_id: u64,
            message_ids: &[u64],
        ) -> Result<(), ModerationError> {
            self.push(Call::BulkRemove(channel_id, message_ids.to_vec()));
            if self.fail_bulk.load(Ordering::SeqCst) {
                return Err(ModerationError::BulkOperation("too old".to_string()));
            }
            Ok(())
        }

        async fn single_remove(&self, channel_id: u64, message_id: u64) -> Result<(), ModerationError> {
            self.push(Call::SingleRemove(channel_id, message_id));
            if self.fail_single.lock().unwrap().contains(&message_id) {
                return Err(ModerationError::Delivery("unknown message".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for FakePlatform {
        async fn send_direct(&self, user_id: u64, text: &str) -> Result<(), ModerationError> {
            if self.hang_dm.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.push(Call::Dm(user_id, text.to_string()));
            if self.fail_dm.load(Ordering::SeqCst) {
                return Err(ModerationError::Delivery("DMs closed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MemberModeration for FakePlatform {
        async fn mute(
            &self,
            guild_id: u64,
            user_id: u64,
            minutes: u32,
            _reason: &str,
        ) -> Result<(), ModerationError> {
            self.push(Call::Mute(guild_id, user_id, minutes));
            if self.fail_mute.load(Ordering::SeqCst) {
                return Err(ModerationError::Permission("missing MODERATE_MEMBERS".to_string()));
            }
            Ok(())
        }

        async fn ban(&self, guild_id: u64, user_id: u64, _reason: &str) -> Result<(), ModerationError> {
            self.push(Call::Ban(guild_id, user_id));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeLedger {
        pub entries: Mutex<Vec<AuditLogEntry>>,
        pub monitored: AtomicU64,
        pub deleted: AtomicU64,
        pub warnings: AtomicU64,
    }

    impl FakeLedger {
        pub fn entries(&self) -> Vec<AuditLogEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditSink for FakeLedger {
        async fn append(&self, mut entry: AuditLogEntry) -> Result<AuditLogEntry, ModerationError> {
            let mut entries = self.entries.lock().unwrap();
            entry.id = Some(entries.len() as i64 + 1);
            entries.push(entry.clone());
            Ok(entry)
        }

        async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, ModerationError> {
            Ok(self.entries().into_iter().rev().take(limit).collect())
        }
    }

    #[async_trait]
    impl Counters for FakeLedger {
        async fn increment_monitored(&self, n: u64) -> Result<(), ModerationError> {
            self.monitored.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }

        async fn increment_deleted(&self, n: u64) -> Result<(), ModerationError> {
            self.deleted.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }

        async fn increment_warnings(&self, n: u64) -> Result<(), ModerationError> {
            self.warnings.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }

        async fn snapshot(&self) -> Result<ModerationStats, ModerationError> {
            Ok(ModerationStats {
                messages_monitored: self.monitored.load(Ordering::SeqCst),
                messages_deleted: self.deleted.load(Ordering::SeqCst),
                warnings_issued: self.warnings.load(Ordering::SeqCst),
                last_updated: None,
            })
        }
    }

    pub fn ports(platform: &Arc<FakePlatform>, ledger: &Arc<FakeLedger>) -> ModerationPorts {
        ModerationPorts {
            remover: platform.clone(),
            notifier: platform.clone(),
            members: platform.clone(),
            audit: ledger.clone(),
            counters: ledger.clone(),
        }
    }

    pub fn event(message_id: u64, content: &str) -> MessageEvent {
        MessageEvent {
            message_id,
            author_id: 42,
            author_name: "spammer".to_string(),
            channel_id: 7,
            guild_id: Some(1),
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn plan_of(rule: &Rule) -> ActionPlan {
        ActionPlan::parse(&rule.action_spec, 10)
    }

    pub fn rule(name: &str, action: &str) -> Rule {
        Rule {
            id: 1,
            name: name.to_string(),
            keyword_spec: String::new(),
            action_spec: action.to_string(),
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::core::moderation::moderation_models::{PROMOTIONAL_LINKS_RULE, SPAM_PREVENTION_RULE};
    use std::sync::atomic::Ordering;

    fn dispatcher(platform: &Arc<FakePlatform>, ledger: &Arc<FakeLedger>) -> ActionDispatcher {
        ActionDispatcher::new(ports(platform, ledger), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_promotional_link_delete_and_mute() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule(PROMOTIONAL_LINKS_RULE, "delete+mute(10)");

        let report = dispatcher(&platform, &ledger)
            .apply(
                &event(100, "join discord.gg/xyz"),
                &rule,
                &plan_of(&rule),
                Some("discord.gg/xyz"),
            )
            .await;

        assert_eq!(
            platform.calls(),
            vec![Call::SingleRemove(7, 100), Call::Mute(1, 42, 10)]
        );
        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, PROMOTIONAL_LINKS_RULE);
        assert_eq!(entries[0].action, "delete + mute(10)");
        assert_eq!(entries[0].message_content.as_deref(), Some("join discord.gg/xyz"));
        assert_eq!(ledger.deleted.load(Ordering::SeqCst), 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_language_violation_dm_names_word() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule(INAPPROPRIATE_LANGUAGE_RULE, "delete + warn");

        dispatcher(&platform, &ledger)
            .apply(&event(5, "you fuck"), &rule, &plan_of(&rule), Some("fuck"))
            .await;

        let calls = platform.calls();
        assert_eq!(calls[0], Call::SingleRemove(7, 5));
        assert!(matches!(&calls[1], Call::Dm(42, text) if text.contains("\"fuck\"")));
        assert!(matches!(&calls[2], Call::Dm(42, text) if text.starts_with("Warning")));
        assert_eq!(ledger.warnings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_steps() {
        let platform = Arc::new(FakePlatform::default());
        platform.fail_single.lock().unwrap().push(9);
        platform.fail_mute.store(true, Ordering::SeqCst);
        platform.fail_dm.store(true, Ordering::SeqCst);
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule("custom", "delete + warn + mute(5)");

        let report = dispatcher(&platform, &ledger)
            .apply(&event(9, "bad"), &rule, &plan_of(&rule), None)
            .await;

        assert!(platform.calls().contains(&Call::Mute(1, 42, 5)));
        assert_eq!(ledger.deleted.load(Ordering::SeqCst), 0);
        // Warning counter still moves when the DM bounces.
        assert_eq!(ledger.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(
            report.failed,
            vec![
                ActionDirective::Delete,
                ActionDirective::Warn,
                ActionDirective::Mute { minutes: 5 }
            ]
        );
        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].action.contains("failed"));
    }

    #[tokio::test]
    async fn test_ban_directive_is_not_executed_by_rules() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule("custom", "ban");

        let report = dispatcher(&platform, &ledger)
            .apply(&event(1, "x"), &rule, &plan_of(&rule), None)
            .await;

        assert!(platform.calls().is_empty());
        assert_eq!(report.skipped, vec![ActionDirective::Ban]);
        assert_eq!(ledger.entries()[0].action, "none (skipped: ban)");
    }

    #[tokio::test]
    async fn test_bulk_delete_happy_path() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule(SPAM_PREVENTION_RULE, "delete");
        let ids = vec![1, 2, 3, 4, 5];

        let report = dispatcher(&platform, &ledger)
            .apply_bulk(&event(5, "spam"), &ids, &rule, &plan_of(&rule))
            .await;

        let calls = platform.calls();
        assert_eq!(calls[0], Call::BulkRemove(7, ids.clone()));
        assert!(matches!(&calls[1], Call::Dm(42, text) if text.contains("5 messages")));
        assert_eq!(report.messages_deleted, 5);
        assert_eq!(ledger.deleted.load(Ordering::SeqCst), 5);
        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, SPAM_PREVENTION_RULE);
        assert_eq!(entries[0].message_content.as_deref(), Some("repeated x5: spam"));
    }

    #[tokio::test]
    async fn test_bulk_delete_falls_back_to_single_removal() {
        let platform = Arc::new(FakePlatform::default());
        platform.fail_bulk.store(true, Ordering::SeqCst);
        platform.fail_single.lock().unwrap().push(2);
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule(SPAM_PREVENTION_RULE, "delete + warn");

        let report = dispatcher(&platform, &ledger)
            .apply_bulk(&event(3, "spam"), &[1, 2, 3], &rule, &plan_of(&rule))
            .await;

        let removals: Vec<_> = platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::SingleRemove(..)))
            .collect();
        assert_eq!(
            removals,
            vec![
                Call::SingleRemove(7, 1),
                Call::SingleRemove(7, 2),
                Call::SingleRemove(7, 3)
            ]
        );
        assert_eq!(report.messages_deleted, 2);
        assert!(report.failed.is_empty());
        assert_eq!(ledger.deleted.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_notification_times_out() {
        let platform = Arc::new(FakePlatform::default());
        platform.hang_dm.store(true, Ordering::SeqCst);
        let ledger = Arc::new(FakeLedger::default());
        let rule = rule("custom", "warn");

        let report = dispatcher(&platform, &ledger)
            .apply(&event(1, "x"), &rule, &plan_of(&rule), None)
            .await;

        assert!(matches!(report.errors[0], ModerationError::Timeout(..)));
        assert_eq!(ledger.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_mute_needs_a_guild() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(FakeLedger::default());
        let mut message = event(1, "x");
        message.guild_id = None;
        let rule = rule("custom", "mute");

        let report = dispatcher(&platform, &ledger)
            .apply(&message, &rule, &plan_of(&rule), None)
            .await;

        assert_eq!(report.failed, vec![ActionDirective::Mute { minutes: 10 }]);
        assert!(platform.calls().is_empty());
    }
}
