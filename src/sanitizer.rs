//! Sanitization of email text bound for the inference service
//!
//! [`ContentSanitizer::sanitize_email_content`] rewrites text;
//! [`ContentSanitizer::validate_content_safety`] is an independent gate
//! that callers must treat as a hard rejection when it returns `false`.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Character budget for sanitized email content
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Character budget for sanitized tracking numbers
pub const MAX_TRACKING_NUMBER_CHARS: usize = 50;

/// Word budget enforced by the safety gate
pub const MAX_SAFE_WORDS: usize = 500;

/// Highest tolerated share of symbol characters
pub const MAX_SPECIAL_CHAR_RATIO: f64 = 0.3;

const ELLIPSIS: &str = "...";

/// Prompt-injection phrases removed during sanitization
static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bignore\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|prompts?|rules?)",
        r"(?i)\b(?:disregard|forget|override)\s+(?:all\s+)?(?:the\s+|your\s+)?(?:previous\s+|prior\s+|above\s+)?(?:instructions?|prompts?|rules?)",
        r"(?i)\b(?:act|behave|respond)\s+as\s+(?:an?\s+)?(?:admin|administrator|root|system|developer|superuser)\b",
        r"(?i)\byou\s+are\s+now\s+(?:an?\s+)?(?:admin|administrator|assistant|ai|system|dan|unrestricted|jailbroken)\b",
        r"(?i)\bpretend\s+(?:to\s+be|you\s+are)\b",
        r"(?i)\bnew\s+instructions?\s*:",
        r"(?i)\bsystem\s+prompt\b",
        r"(?i)\b(?:developer|jailbreak|dan)\s+mode\b",
        r"(?i)\[/?(?:inst|system|assistant|user|instructions?)\]",
        r"(?i)<\|?/?(?:im_start|im_end|system|endoftext|assistant|user)\|?>",
        r"(?i)<</?sys>>",
        r"(?i)#{2,}\s*(?:instruction|system|response)s?\b",
        r"(?i)(?:^|\s)(?:system|assistant)\s*:",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Phrases that fail the safety gate outright
const INJECTION_DENYLIST: [&str; 18] = [
    "ignore all previous instructions",
    "ignore previous instructions",
    "ignore the above instructions",
    "disregard previous instructions",
    "disregard all instructions",
    "forget your instructions",
    "forget all instructions",
    "new instructions:",
    "act as admin",
    "act as an admin",
    "act as administrator",
    "you are now an unrestricted",
    "system prompt",
    "developer mode",
    "jailbreak",
    "[inst]",
    "<|im_start|>",
    "<<sys>>",
];

/// Words left dangling at the edges after phrase removal
const STOP_WORDS: [&str; 14] = [
    "and", "or", "but", "the", "to", "a", "an", "of", "please", "then", "now", "all", "also",
    "so",
];

static SYMBOL_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]{4,}").unwrap());

static QUOTE_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["'`]{3,}"#).unwrap());

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Stateless sanitizer; safe to share between threads
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSanitizer;

#[allow(clippy::unused_self)]
impl ContentSanitizer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Strip control characters and injection content, then bound the size
    #[must_use]
    pub fn sanitize_email_content(&self, text: &str) -> String {
        let cleaned = remove_control_chars(text);

        let mut removed = 0usize;
        let mut result = cleaned;
        for pattern in INJECTION_PATTERNS.iter() {
            let count = pattern.find_iter(&result).count();
            if count > 0 {
                removed += count;
                result = pattern.replace_all(&result, " ").into_owned();
            }
        }
        if removed > 0 {
            warn!(
                removed_patterns = removed,
                "Injection patterns removed from email content"
            );
        }

        let result = SYMBOL_RUN_REGEX.replace_all(&result, " ");
        let result = QUOTE_RUN_REGEX.replace_all(&result, " ");
        let result = WHITESPACE_REGEX.replace_all(&result, " ");
        let result = trim_stop_words(result.trim());

        truncate_at_word_boundary(&result, MAX_CONTENT_CHARS)
    }

    /// Keep ASCII letters and digits only, at most 50 of them
    #[must_use]
    pub fn sanitize_tracking_number(&self, text: &str) -> String {
        text.chars()
            .filter(char::is_ascii_alphanumeric)
            .take(MAX_TRACKING_NUMBER_CHARS)
            .collect()
    }

    /// Independent safety gate; `false` rejects the input for inference
    #[must_use]
    pub fn validate_content_safety(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if INJECTION_DENYLIST.iter().any(|phrase| lower.contains(phrase)) {
            return false;
        }

        if text.split_whitespace().count() > MAX_SAFE_WORDS {
            return false;
        }

        special_char_ratio(text) <= MAX_SPECIAL_CHAR_RATIO
    }
}

/// Drop control characters; tab, newline and CR become spaces
fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

fn trim_stop_words(text: &str) -> String {
    let mut words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    while words.first().is_some_and(|w| is_stop_word(w)) {
        words.remove(0);
    }
    while words.last().is_some_and(|w| is_stop_word(w)) {
        words.pop();
    }
    words.join(" ")
}

/// Share of characters that are neither alphanumeric nor whitespace
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn special_char_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();

    special as f64 / total as f64
}

/// Truncate to `max_chars` characters at the last word boundary
#[must_use]
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(idx, _)| idx);
    let head = &text[..cut];
    let head = head.rfind(' ').map_or(head, |pos| &head[..pos]);

    format!("{}{ELLIPSIS}", head.trim_end())
}
