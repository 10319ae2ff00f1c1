//! False-positive predicates for tracking candidates

use crate::carriers::normalize_tracking_number;

/// Shortest candidate worth validating, after normalization
pub const MIN_CANDIDATE_LENGTH: usize = 8;

/// English words the label and context patterns tend to capture
const COMMON_WORDS: [&str; 32] = [
    "tracking",
    "shipment",
    "shipping",
    "shipped",
    "delivered",
    "delivery",
    "package",
    "packages",
    "number",
    "order",
    "orders",
    "information",
    "available",
    "confirmation",
    "notification",
    "estimated",
    "scheduled",
    "processing",
    "customer",
    "service",
    "account",
    "following",
    "transit",
    "carrier",
    "details",
    "arriving",
    "tomorrow",
    "unsubscribe",
    "preferences",
    "receipt",
    "purchase",
    "returns",
];

/// Vocabulary that marks a match as contact data, not a shipment
const NON_TRACKING_TERMS: [&str; 4] = ["email", "phone", "address", "website"];

#[must_use]
pub fn is_common_word(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    COMMON_WORDS.contains(&lower.as_str())
}

#[must_use]
pub fn is_purely_alphabetic(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_alphabetic)
}

#[must_use]
pub fn contains_non_tracking_terms(text: &str) -> bool {
    let lower = text.to_lowercase();
    NON_TRACKING_TERMS.iter().any(|t| lower.contains(t))
}

/// Stage-four filter: true means drop the candidate
#[must_use]
pub fn is_false_positive_candidate(text: &str) -> bool {
    let normalized = normalize_tracking_number(text);
    normalized.len() < MIN_CANDIDATE_LENGTH
        || is_common_word(&normalized)
        || is_purely_alphabetic(&normalized)
        || contains_non_tracking_terms(text)
}

/// Strings shaped like tracking numbers that almost never are
///
/// Covers a single repeated character, a full ascending or descending
/// digit run, and eight-digit calendar dates.
#[must_use]
pub fn is_obvious_false_positive(text: &str) -> bool {
    let normalized = normalize_tracking_number(text);
    if normalized.is_empty() {
        return true;
    }

    let bytes = normalized.as_bytes();
    if bytes.iter().all(|b| *b == bytes[0]) {
        return true;
    }

    if bytes.iter().all(u8::is_ascii_digit) {
        let ascending = bytes
            .windows(2)
            .all(|w| (w[0] - b'0' + 1) % 10 == w[1] - b'0');
        let descending = bytes
            .windows(2)
            .all(|w| (w[1] - b'0' + 1) % 10 == w[0] - b'0');
        if ascending || descending {
            return true;
        }

        if bytes.len() == 8 && looks_like_date(&normalized) {
            return true;
        }
    }

    false
}

fn looks_like_date(digits: &str) -> bool {
    let year: u32 = digits[..4].parse().unwrap_or(0);
    let month: u32 = digits[4..6].parse().unwrap_or(0);
    let day: u32 = digits[6..8].parse().unwrap_or(0);
    (1900..=2100).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day)
}

