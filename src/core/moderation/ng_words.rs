// Banned-word matching for the `inappropriate-language` rule.
//
// Two passes:
// 1. Whole-token comparison against a short exact-match list. These are terms
//    that would cause false positives as substrings ("ed" inside "edited").
// 2. Substring scan of the whole message against the broad list.

use serde::{Deserialize, Serialize};

/// Terms only matched as complete whitespace-separated tokens.
const DEFAULT_EXACT_WORDS: &[&str] = &["ed", "v豚", "黒人", "ゲイ"];

/// Terms matched anywhere in the message, checked in this order.
const DEFAULT_BANNED_WORDS: &[&str] = &[
    "nigger",
    "niggers",
    "dead",
    "negro",
    "neger",
    "negar",
    "fuck",
    "shit",
    "cunt",
    "suck",
    "asshole",
    "bitch",
    "bullshit",
    "cock",
    "damn it",
    "erection",
    "fuck you",
    "fucking",
    "give a fuck",
    "kkkkkk",
    "motherfucker",
    "prick",
    "retarded",
    "screw you",
    "son of a bitch",
    "whore",
    "黒人",
    "ゲイ",
    "ユダヤ教",
    "足の爪",
    "足の爪食ってる",
    "低身長",
    "黒マッシュ",
    "黒マスク",
    "ヤリ目",
    "吐息厨",
    "v豚",
    "低脳",
    "どしイキリ厨",
    "乞食",
    "底辺vtuber",
    "過激派フェミニスト",
    "ヴィーガン",
    "ワキガ",
    "手帳持ち1級",
    "種無し",
    "エイズ",
    "梅毒",
    "皮被り",
    "粗チン",
    "短小xジェンダー",
    "左翼反日",
    "パチカスキレ症",
    "厨二病",
    "ネット恋愛してるポエマー",
    "なんj民",
    "時代遅れ二次元ガチ恋勢",
    "ひろゆきっず",
    "会話否定",
    "鉄オタ",
    "強姦",
    "魔アスぺ",
    "知的障害者",
    "精神疾患",
    "昼夜逆転",
    "ヒキニート",
    "レスバ好き",
    "コミュ障",
    "髪ボサボサ",
    "チー牛",
    "彼女なし",
    "処女厨",
    "差別主義者",
    "熟女リョナntrアナルプレイヤー",
    "たけのこの里派",
    "泣きました",
    "私は黒人",
    "ゲイユダヤ教足の爪食ってる",
    "しまむらファッションツイ廃",
    "低身長黒マッシュ黒マスク",
    "v豚低脳",
    "底辺vtuber過激派",
];

/// Word lists as stored in an `NG_WORDS_FILE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgWordLists {
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub banned: Vec<String>,
}

/// Outcome of [`NgWordMatcher::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgWordMatch {
    pub found: bool,
    pub word: Option<String>,
}

impl NgWordMatch {
    fn hit(word: &str) -> Self {
        Self {
            found: true,
            word: Some(word.to_string()),
        }
    }

    fn miss() -> Self {
        Self {
            found: false,
            word: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NgWordMatcher {
    /// Lowercased.
    exact: Vec<String>,
    /// Original spelling paired with its lowercased form.
    banned: Vec<(String, String)>,
}

impl NgWordMatcher {
    pub fn new(lists: NgWordLists) -> Self {
        let exact = lists
            .exact
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        let banned = lists
            .banned
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .map(|w| {
                let lower = w.to_lowercase();
                (w, lower)
            })
            .collect();

        Self { exact, banned }
    }

    pub fn check(&self, text: &str) -> NgWordMatch {
        for token in text.split_whitespace() {
            let lower = token.to_lowercase();
            if self.exact.iter().any(|w| *w == lower) {
                return NgWordMatch::hit(token);
            }
        }

        let lower_text = text.to_lowercase();
        for (word, lower) in &self.banned {
            if lower_text.contains(lower.as_str()) {
                return NgWordMatch::hit(word);
            }
        }

        NgWordMatch::miss()
    }

    pub fn term_count(&self) -> usize {
        self.exact.len() + self.banned.len()
    }
}

impl Default for NgWordMatcher {
    fn default() -> Self {
        Self::new(NgWordLists {
            exact: DEFAULT_EXACT_WORDS.iter().map(|w| w.to_string()).collect(),
            banned: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(exact: &[&str], banned: &[&str]) -> NgWordMatcher {
        NgWordMatcher::new(NgWordLists {
            exact: exact.iter().map(|w| w.to_string()).collect(),
            banned: banned.iter().map(|w| w.to_string()).collect(),
        })
    }

    #[test]
    fn test_substring_match_returns_term() {
        let matcher = matcher(&[], &["fuck"]);
        let result = matcher.check("you fuck");
        assert!(result.found);
        assert_eq!(result.word.as_deref(), Some("fuck"));
    }

    #[test]
    fn test_exact_word_only_matches_whole_token() {
        let matcher = matcher(&["ed"], &[]);
        assert!(!matcher.check("I edited my post").found);

        let result = matcher.check("hey ED how are you");
        assert!(result.found);
        assert_eq!(result.word.as_deref(), Some("ED"));
    }

    #[test]
    fn test_exact_pass_wins_over_substring_pass() {
        let matcher = matcher(&["ed"], &["shit"]);
        let result = matcher.check("shit ed");
        assert_eq!(result.word.as_deref(), Some("ed"));
    }

    #[test]
    fn test_first_banned_term_in_list_order() {
        let matcher = matcher(&[], &["fuck you", "fuck"]);
        let result = matcher.check("well FUCK YOU then");
        assert_eq!(result.word.as_deref(), Some("fuck you"));
    }

    #[test]
    fn test_clean_text_not_found() {
        let result = NgWordMatcher::default().check("Have a nice day");
        assert_eq!(
            result,
            NgWordMatch {
                found: false,
                word: None
            }
        );
    }

    #[test]
    fn test_default_list_matches_inside_unbroken_text() {
        let matcher = NgWordMatcher::default();
        for (text, term) in [
            ("黒人です", "黒人"),
            ("私はゲイ", "ゲイ"),
            ("you suck", "suck"),
            ("dead", "dead"),
            ("あいつはヒキニートだ", "ヒキニート"),
            ("精神疾患", "精神疾患"),
        ] {
            let result = matcher.check(text);
            assert!(result.found, "{} should match", text);
            assert_eq!(result.word.as_deref(), Some(term));
        }
    }

    #[test]
    fn test_blank_terms_are_ignored() {
        let matcher = matcher(&["  "], &["", "bitch"]);
        assert_eq!(matcher.term_count(), 1);
        assert!(!matcher.check("hello").found);
    }
}
