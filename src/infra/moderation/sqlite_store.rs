// SQLite-backed moderation store.
//
// Tables:
// - rules: Moderation rules, id order is match precedence
// - moderation_logs: Append-only audit trail
// - moderation_stats: Single row of running counters

use crate::core::moderation::{
    AuditLogEntry, AuditSink, Counters, ModerationError, ModerationStats, NewRule, Rule, RuleStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

fn storage_error(e: sqlx::Error) -> ModerationError {
    ModerationError::Storage(e.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '',
                action TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                action TEXT NOT NULL,
                reason TEXT NOT NULL,
                message_content TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_stats (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                messages_monitored INTEGER NOT NULL DEFAULT 0,
                messages_deleted INTEGER NOT NULL DEFAULT 0,
                warnings_issued INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO moderation_stats (id) VALUES (1)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert `rules` if the rules table is empty. Returns how many were added.
    pub async fn seed_rules(&self, rules: &[NewRule]) -> anyhow::Result<usize> {
        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM rules")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        if existing > 0 {
            return Ok(0);
        }

        for rule in rules {
            self.create_rule(rule.clone()).await?;
        }
        tracing::info!(count = rules.len(), "Seeded moderation rules");
        Ok(rules.len())
    }

    fn rule_from_row(row: &SqliteRow) -> Rule {
        Rule {
            id: row.get("id"),
            name: row.get("name"),
            keyword_spec: row.get("keywords"),
            action_spec: row.get("action"),
            enabled: row.get("enabled"),
        }
    }

    async fn bump(&self, column: &str, n: u64) -> Result<(), ModerationError> {
        // `column` is one of the fixed counter names below, never user input.
        let sql = format!(
            "UPDATE moderation_stats SET {col} = {col} + ?, last_updated = ? WHERE id = 1",
            col = column
        );
        sqlx::query(&sql)
            .bind(n as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for SqliteModerationStore {
    async fn list_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        let rows = sqlx::query("SELECT id, name, keywords, action, enabled FROM rules ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows.iter().map(Self::rule_from_row).collect())
    }

    async fn enabled_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        let rows = sqlx::query(
            "SELECT id, name, keywords, action, enabled FROM rules WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.iter().map(Self::rule_from_row).collect())
    }

    async fn get_rule(&self, id: i64) -> Result<Option<Rule>, ModerationError> {
        let row = sqlx::query("SELECT id, name, keywords, action, enabled FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.as_ref().map(Self::rule_from_row))
    }

    async fn create_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO rules (name, keywords, action, enabled)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.keyword_spec)
        .bind(&rule.action_spec)
        .bind(rule.enabled)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(Rule {
            id: result.last_insert_rowid(),
            name: rule.name,
            keyword_spec: rule.keyword_spec,
            action_spec: rule.action_spec,
            enabled: rule.enabled,
        })
    }

    async fn update_rule(&self, id: i64, rule: NewRule) -> Result<Option<Rule>, ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET name = ?, keywords = ?, action = ?, enabled = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.keyword_spec)
        .bind(&rule.action_spec)
        .bind(rule.enabled)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Rule {
            id,
            name: rule.name,
            keyword_spec: rule.keyword_spec,
            action_spec: rule.action_spec,
            enabled: rule.enabled,
        }))
    }

    async fn set_rule_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> Result<Option<Rule>, ModerationError> {
        let result = sqlx::query("UPDATE rules SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_rule(id).await
    }

    async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditSink for SqliteModerationStore {
    async fn append(&self, mut entry: AuditLogEntry) -> Result<AuditLogEntry, ModerationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO moderation_logs (timestamp, user_id, username, action, reason, message_content)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.user_id as i64)
        .bind(&entry.username)
        .bind(&entry.action)
        .bind(&entry.reason)
        .bind(&entry.message_content)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        entry.id = Some(result.last_insert_rowid());
        Ok(entry)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, user_id, username, action, reason, message_content
            FROM moderation_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp_str: String = row.get("timestamp");
            entries.push(AuditLogEntry {
                id: Some(row.get("id")),
                timestamp: parse_timestamp(&timestamp_str).unwrap_or_else(Utc::now),
                user_id: row.get::<i64, _>("user_id") as u64,
                username: row.get("username"),
                action: row.get("action"),
                reason: row.get("reason"),
                message_content: row.get("message_content"),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl Counters for SqliteModerationStore {
    async fn increment_monitored(&self, n: u64) -> Result<(), ModerationError> {
        self.bump("messages_monitored", n).await
    }

    async fn increment_deleted(&self, n: u64) -> Result<(), ModerationError> {
        self.bump("messages_deleted", n).await
    }

    async fn increment_warnings(&self, n: u64) -> Result<(), ModerationError> {
        self.bump("warnings_issued", n).await
    }

    async fn snapshot(&self) -> Result<ModerationStats, ModerationError> {
        let row = sqlx::query(
            r#"
            SELECT messages_monitored, messages_deleted, warnings_issued, last_updated
            FROM moderation_stats WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(ModerationStats::default());
        };

        Ok(ModerationStats {
            messages_monitored: row.get::<i64, _>("messages_monitored") as u64,
            messages_deleted: row.get::<i64, _>("messages_deleted") as u64,
            warnings_issued: row.get::<i64, _>("warnings_issued") as u64,
            last_updated: row
                .get::<Option<String>, _>("last_updated")
                .as_deref()
                .and_then(parse_timestamp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{PROMOTIONAL_LINKS_RULE, SPAM_PREVENTION_RULE};
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SqliteModerationStore {
        let path = dir.path().join("moderation.db");
        SqliteModerationStore::new(path.to_str().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_seed_only_once() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert_eq!(store.seed_rules(&NewRule::defaults()).await.unwrap(), 4);
        assert_eq!(store.seed_rules(&NewRule::defaults()).await.unwrap(), 0);

        let rules = store.list_rules().await.unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[1].name, SPAM_PREVENTION_RULE);

        // excess-caps starts disabled
        let enabled = store.enabled_rules().await.unwrap();
        assert_eq!(enabled.len(), 3);
        assert_eq!(enabled[2].name, PROMOTIONAL_LINKS_RULE);
    }

    #[tokio::test]
    async fn test_rule_crud() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let rule = store
            .create_rule(NewRule::new("no-cats", "cat,kitten", "delete", true))
            .await
            .unwrap();
        assert_eq!(store.get_rule(rule.id).await.unwrap(), Some(rule.clone()));

        let toggled = store.set_rule_enabled(rule.id, false).await.unwrap().unwrap();
        assert!(!toggled.enabled);
        assert!(store.enabled_rules().await.unwrap().is_empty());
        assert_eq!(store.set_rule_enabled(999, true).await.unwrap(), None);

        let edited = store
            .update_rule(rule.id, NewRule::new("no-pets", "cat,dog*", "delete + warn", false))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.id, rule.id);
        assert_eq!(store.get_rule(rule.id).await.unwrap(), Some(edited));
        assert_eq!(
            store
                .update_rule(999, NewRule::new("x", "x", "warn", true))
                .await
                .unwrap(),
            None
        );

        assert!(store.delete_rule(rule.id).await.unwrap());
        assert!(!store.delete_rule(rule.id).await.unwrap());
        assert_eq!(store.get_rule(rule.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_audit_log_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        for i in 0..3u64 {
            let mut entry = AuditLogEntry::new(i, "user", "delete", "rule", Some(format!("m{}", i)));
            entry.timestamp = Utc::now() + chrono::Duration::seconds(i as i64);
            let stored = store.append(entry).await.unwrap();
            assert!(stored.id.is_some());
        }

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_id, 2);
        assert_eq!(recent[1].user_id, 1);
        assert_eq!(recent[0].message_content.as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn test_counters_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir).await;
            store.increment_monitored(3).await.unwrap();
            store.increment_deleted(2).await.unwrap();
            store.increment_warnings(1).await.unwrap();
        }

        let store = store(&dir).await;
        let stats = store.snapshot().await.unwrap();
        assert_eq!(stats.messages_monitored, 3);
        assert_eq!(stats.messages_deleted, 2);
        assert_eq!(stats.warnings_issued, 1);
        assert!(stats.last_updated.is_some());
    }
}
