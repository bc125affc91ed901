// Parsing of rule action specs ("delete + mute(10)") into directives.
//
// Parsing is keyword containment, so "Delete the message and warn" works as
// well as "delete+warn". Anything unrecognised is ignored.

use super::moderation_models::ActionDirective;
use super::moderation_ports::ModerationError;
use regex::Regex;
use std::sync::OnceLock;

/// Discord caps timeouts at 28 days.
pub const MAX_MUTE_MINUTES: u32 = 28 * 24 * 60;

fn mute_minutes_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"mute\s*[(（]\s*(\d+)").expect("mute minutes pattern is valid")
    })
}

/// Directives of one action spec, in execution order, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    directives: Vec<ActionDirective>,
}

impl ActionPlan {
    pub fn parse(action_spec: &str, default_mute_minutes: u32) -> Self {
        let spec = action_spec.to_lowercase();
        let mut directives = Vec::new();

        if spec.contains("delete") {
            directives.push(ActionDirective::Delete);
        }
        if spec.contains("warn") {
            directives.push(ActionDirective::Warn);
        }
        if spec.contains("mute") {
            directives.push(ActionDirective::Mute {
                minutes: parse_mute_minutes(&spec, default_mute_minutes),
            });
        }
        if spec.contains("ban") {
            directives.push(ActionDirective::Ban);
        }

        Self { directives }
    }

    /// Like `parse`, but rejects specs that contain no directive at all.
    pub fn validate(action_spec: &str, default_mute_minutes: u32) -> Result<Self, ModerationError> {
        let plan = Self::parse(action_spec, default_mute_minutes);
        if plan.is_empty() {
            return Err(ModerationError::Validation(format!(
                "action \"{}\" contains none of delete, warn, mute(N), ban",
                action_spec
            )));
        }
        Ok(plan)
    }

    pub fn directives(&self) -> &[ActionDirective] {
        &self.directives
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Canonical form, e.g. `delete + mute(10)`.
    pub fn describe(&self) -> String {
        describe_directives(&self.directives)
    }
}

/// Join directives as `delete + mute(10)`; `none` when empty.
pub fn describe_directives(directives: &[ActionDirective]) -> String {
    if directives.is_empty() {
        return "none".to_string();
    }
    directives
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" + ")
}

fn parse_mute_minutes(spec: &str, default_minutes: u32) -> u32 {
    let parsed = mute_minutes_pattern()
        .captures(spec)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    match parsed {
        Some(0) | None => default_minutes,
        Some(minutes) if minutes > MAX_MUTE_MINUTES => {
            tracing::warn!(minutes, max = MAX_MUTE_MINUTES, "Mute too long, clamping");
            MAX_MUTE_MINUTES
        }
        Some(minutes) => minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mute_minutes(spec: &str, default_minutes: u32) -> Option<u32> {
        ActionPlan::parse(spec, default_minutes)
            .directives()
            .iter()
            .find_map(|d| match d {
                ActionDirective::Mute { minutes } => Some(*minutes),
                _ => None,
            })
    }

    #[test]
    fn test_parse_delete_and_mute() {
        let plan = ActionPlan::parse("delete+mute(10)", 10);
        assert_eq!(
            plan.directives(),
            &[ActionDirective::Delete, ActionDirective::Mute { minutes: 10 }]
        );
        assert_eq!(plan.describe(), "delete + mute(10)");
    }

    #[test]
    fn test_mute_minutes_parsing() {
        assert_eq!(mute_minutes("Mute (25)", 10), Some(25));
        assert_eq!(mute_minutes("mute（3）", 10), Some(3));
        assert_eq!(mute_minutes("mute", 10), Some(10));
        assert_eq!(mute_minutes("mute(abc)", 7), Some(7));
        assert_eq!(mute_minutes("mute(0)", 7), Some(7));
        assert_eq!(mute_minutes("mute(999999999)", 7), Some(MAX_MUTE_MINUTES));
        assert_eq!(mute_minutes("delete", 7), None);
    }

    #[test]
    fn test_directives_run_in_fixed_order() {
        let plan = ActionPlan::parse("ban, then warn, then delete", 10);
        assert_eq!(
            plan.directives(),
            &[
                ActionDirective::Delete,
                ActionDirective::Warn,
                ActionDirective::Ban
            ]
        );
    }

    #[test]
    fn test_unknown_text_is_skipped() {
        let plan = ActionPlan::parse("shout at them", 10);
        assert!(plan.is_empty());
        assert_eq!(plan.describe(), "none");
        assert!(matches!(
            ActionPlan::validate("shout at them", 10),
            Err(ModerationError::Validation(_))
        ));
        assert!(ActionPlan::validate("warn", 10).is_ok());
    }
}
