// Rule evaluation - decides which (if any) rule a message violates.
//
// Four rule names get a dedicated detector; every other rule is matched
// against its comma-separated keyword list. Rules are checked in list order
// and the first hit wins. Keyword lists and action plans are parsed once per
// rule revision and cached by rule id.

use super::action_plan::ActionPlan;
use super::moderation_models::{
    Rule, EXCESS_CAPS_RULE, INAPPROPRIATE_LANGUAGE_RULE, PROMOTIONAL_LINKS_RULE,
    SPAM_PREVENTION_RULE,
};
use super::ng_words::NgWordMatcher;
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// Messages at or below this many characters are never flagged for caps.
const CAPS_MIN_LENGTH: usize = 10;
/// Uppercase share (percent) at which a message counts as shouting.
const CAPS_PERCENT_THRESHOLD: usize = 70;
const INVITE_LINK_PATTERN: &str = r"(?i)(?:discord\.gg|invite)/[\w-]+";

/// The rule that fired, the term responsible when one is known, and the
/// rule's parsed action plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: Rule,
    pub term: Option<String>,
    pub plan: Arc<ActionPlan>,
}

/// One entry of a rule's keyword list.
#[derive(Debug, Clone)]
pub enum KeywordTerm {
    Literal(String),
    Wildcard { term: String, regex: Regex },
}

impl KeywordTerm {
    fn matches(&self, lower_content: &str) -> bool {
        match self {
            KeywordTerm::Literal(term) => lower_content.contains(term.as_str()),
            KeywordTerm::Wildcard { regex, .. } => regex.is_match(lower_content),
        }
    }

    fn describe(&self) -> String {
        match self {
            KeywordTerm::Literal(term) | KeywordTerm::Wildcard { term, .. } => term.clone(),
        }
    }
}

/// Split a keyword spec into terms. Blank terms are dropped; `*` means
/// "any run of characters" and everything else is literal.
pub fn compile_keywords(keyword_spec: &str) -> Vec<KeywordTerm> {
    keyword_spec
        .split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .filter_map(|term| {
            if !term.contains('*') {
                return Some(KeywordTerm::Literal(term));
            }

            let pattern = term
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => Some(KeywordTerm::Wildcard { term, regex }),
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "Skipping unusable wildcard keyword");
                    None
                }
            }
        })
        .collect()
}

/// Something built from one of a rule's spec strings, tagged with that string.
struct Compiled<T> {
    spec: String,
    value: Arc<T>,
}

type CompiledCache<T> = DashMap<i64, Compiled<T>>;

/// Cached value for `rule_id`, rebuilt when `spec` no longer matches.
fn compiled<T>(
    cache: &CompiledCache<T>,
    rule_id: i64,
    spec: &str,
    build: impl FnOnce(&str) -> T,
) -> Arc<T> {
    if let Some(cached) = cache.get(&rule_id) {
        if cached.spec == spec {
            return Arc::clone(&cached.value);
        }
    }

    let value = Arc::new(build(spec));
    cache.insert(
        rule_id,
        Compiled {
            spec: spec.to_string(),
            value: Arc::clone(&value),
        },
    );
    value
}

pub struct RuleEvaluator {
    ng_words: NgWordMatcher,
    invite_link: Regex,
    default_mute_minutes: u32,
    keywords: CompiledCache<Vec<KeywordTerm>>,
    plans: CompiledCache<ActionPlan>,
}

impl RuleEvaluator {
    pub fn new(ng_words: NgWordMatcher, default_mute_minutes: u32) -> Self {
        Self {
            ng_words,
            // Constant pattern, covered by tests.
            invite_link: Regex::new(INVITE_LINK_PATTERN).expect("invite link pattern is valid"),
            default_mute_minutes,
            keywords: DashMap::new(),
            plans: DashMap::new(),
        }
    }

    /// Return the first rule in `rules` that `content` violates.
    pub fn evaluate(&self, content: &str, rules: &[Rule]) -> Option<RuleMatch> {
        rules.iter().find_map(|rule| {
            self.check_rule(content, rule).map(|term| RuleMatch {
                rule: rule.clone(),
                term,
                plan: self.plan_for(rule),
            })
        })
    }

    /// The rule's action spec as a plan, parsed on first use.
    pub fn plan_for(&self, rule: &Rule) -> Arc<ActionPlan> {
        compiled(&self.plans, rule.id, &rule.action_spec, |spec| {
            ActionPlan::parse(spec, self.default_mute_minutes)
        })
    }

    /// `Some(term)` if the rule fires; the term is `None` when the detector
    /// has nothing more specific to report.
    fn check_rule(&self, content: &str, rule: &Rule) -> Option<Option<String>> {
        match rule.name.as_str() {
            INAPPROPRIATE_LANGUAGE_RULE => {
                let result = self.ng_words.check(content);
                if result.found {
                    tracing::info!(word = ?result.word, "Banned word detected");
                    Some(result.word)
                } else {
                    None
                }
            }
            // Flooding is detected by the history tracker before rules run.
            SPAM_PREVENTION_RULE => None,
            EXCESS_CAPS_RULE => is_excess_caps(content).then_some(None),
            PROMOTIONAL_LINKS_RULE => self
                .invite_link
                .find(content)
                .map(|m| Some(m.as_str().to_string())),
            _ => self.match_keywords(content, rule).map(Some),
        }
    }

    fn match_keywords(&self, content: &str, rule: &Rule) -> Option<String> {
        let terms = compiled(&self.keywords, rule.id, &rule.keyword_spec, compile_keywords);
        let lower_content = content.to_lowercase();
        terms
            .iter()
            .find(|term| term.matches(&lower_content))
            .map(KeywordTerm::describe)
    }

    /// Drop everything cached for a rule that no longer exists.
    pub fn forget_rule(&self, rule_id: i64) {
        self.keywords.remove(&rule_id);
        self.plans.remove(&rule_id);
    }
}

/// True for messages longer than 10 characters where at least 70% of the
/// characters are ASCII capitals. Other scripts never count as shouting.
pub fn is_excess_caps(content: &str) -> bool {
    let total = content.chars().count();
    if total <= CAPS_MIN_LENGTH {
        return false;
    }
    let upper = content.chars().filter(|c| c.is_ascii_uppercase()).count();
    upper * 100 >= total * CAPS_PERCENT_THRESHOLD
}
