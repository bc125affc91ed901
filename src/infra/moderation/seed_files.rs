// Optional JSON files that replace the built-in rule set and word lists.
//
// RULES_SEED_FILE:
//   [{ "name": "no-cats", "keywords": "cat,kitten*", "action": "delete + warn" }]
// NG_WORDS_FILE:
//   { "exact": ["ed"], "banned": ["badword", "other phrase"] }

use crate::core::moderation::{NewRule, NgWordLists};
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Read the rules a fresh store is seeded with.
pub async fn load_rule_seed(path: &Path) -> Result<Vec<NewRule>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read rules seed file {}", path.display()))?;
    let rules: Vec<NewRule> =
        serde_json::from_str(&content).context("Failed to parse rules seed JSON")?;

    for (index, rule) in rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            bail!("Rule #{} in {} has an empty name", index + 1, path.display());
        }
    }

    Ok(rules)
}

/// Read banned-word lists. Either list may be omitted.
pub async fn load_ng_words(path: &Path) -> Result<NgWordLists> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read word list file {}", path.display()))?;
    let lists: NgWordLists =
        serde_json::from_str(&content).context("Failed to parse word list JSON")?;

    if lists.exact.is_empty() && lists.banned.is_empty() {
        tracing::warn!(path = %path.display(), "Word list file has no terms");
    }
    Ok(lists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn json_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_rule_seed_accepts_short_field_names() {
        let file = json_file(
            r#"[
                {"name": "no-cats", "keywords": "cat,kitten*", "action": "delete + warn"},
                {"name": "quiet", "keyword_spec": "shh", "action_spec": "mute(5)", "enabled": false}
            ]"#,
        );

        let rules = load_rule_seed(file.path()).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], NewRule::new("no-cats", "cat,kitten*", "delete + warn", true));
        assert!(!rules[1].enabled);
    }

    #[tokio::test]
    async fn test_rule_seed_rejects_blank_names() {
        let file = json_file(r#"[{"name": " ", "keywords": "x", "action": "delete"}]"#);
        assert!(load_rule_seed(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_word_lists_default_missing_fields() {
        let file = json_file(r#"{"banned": ["heck"]}"#);

        let lists = load_ng_words(file.path()).await.unwrap();
        assert!(lists.exact.is_empty());
        assert_eq!(lists.banned, vec!["heck".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = load_ng_words(Path::new("/definitely/not/here.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read word list file"));
    }
}
