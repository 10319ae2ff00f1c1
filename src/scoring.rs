//! Confidence recomputation for validated candidates
//!
//! Scoring starts from the candidate's pattern confidence and applies
//! [`RULES`] in order. The result is clamped to `[0, 1]`.

use crate::carriers::Carrier;
use crate::filter::{is_obvious_false_positive, is_purely_alphabetic};
use crate::types::TrackingCandidate;

/// Offsets below this count as "near the top of the email"
pub const EARLY_POSITION_LIMIT: usize = 1000;

/// How a rule changes the running score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Add(f64),
    Multiply(f64),
}

impl Adjustment {
    #[must_use]
    pub fn apply(self, score: f64) -> f64 {
        match self {
            Self::Add(delta) => score + delta,
            Self::Multiply(factor) => score * factor,
        }
    }
}

/// Named, independently testable scoring rule
#[derive(Debug, Clone, Copy)]
pub struct ScoringRule {
    pub name: &'static str,
    pub applies: fn(&TrackingCandidate, Carrier) -> bool,
    pub adjustment: Adjustment,
}

impl ScoringRule {
    /// Apply this rule to `score` if it matches
    #[must_use]
    pub fn evaluate(&self, candidate: &TrackingCandidate, carrier: Carrier, score: f64) -> f64 {
        if (self.applies)(candidate, carrier) {
            self.adjustment.apply(score)
        } else {
            score
        }
    }
}

pub const RULES: [ScoringRule; 6] = [
    // A carrier-specific pattern agreeing with the validator is strong evidence.
    ScoringRule {
        name: "carrier_match",
        applies: carrier_match,
        adjustment: Adjustment::Add(0.2),
    },
    // Numbers quoted next to the word "tracking" are usually the real one.
    ScoringRule {
        name: "tracking_context",
        applies: tracking_context,
        adjustment: Adjustment::Add(0.1),
    },
    // Notification emails put the number near the top; footers hold noise.
    ScoringRule {
        name: "early_position",
        applies: early_position,
        adjustment: Adjustment::Add(0.1),
    },
    // Letters only: a word, not a number.
    ScoringRule {
        name: "purely_alphabetic",
        applies: purely_alphabetic,
        adjustment: Adjustment::Multiply(0.1),
    },
    // Repeated digits, digit runs and dates.
    ScoringRule {
        name: "obvious_false_positive",
        applies: obvious_false_positive,
        adjustment: Adjustment::Multiply(0.01),
    },
    // Carrier formats always include digits.
    ScoringRule {
        name: "missing_digits",
        applies: missing_digits,
        adjustment: Adjustment::Multiply(0.1),
    },
];

fn carrier_match(candidate: &TrackingCandidate, carrier: Carrier) -> bool {
    candidate.carrier == Some(carrier)
}

fn tracking_context(candidate: &TrackingCandidate, _carrier: Carrier) -> bool {
    candidate.context.to_lowercase().contains("tracking")
}

const fn early_position(candidate: &TrackingCandidate, _carrier: Carrier) -> bool {
    candidate.position < EARLY_POSITION_LIMIT
}

fn purely_alphabetic(candidate: &TrackingCandidate, _carrier: Carrier) -> bool {
    is_purely_alphabetic(&candidate.text)
}

fn obvious_false_positive(candidate: &TrackingCandidate, _carrier: Carrier) -> bool {
    is_obvious_false_positive(&candidate.text)
}

fn missing_digits(candidate: &TrackingCandidate, carrier: Carrier) -> bool {
    carrier.expects_digits() && !candidate.text.chars().any(|c| c.is_ascii_digit())
}

/// Clamp into the valid confidence range; NaN becomes 0
#[must_use]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Recompute confidence for `candidate` validated as `carrier`
#[must_use]
pub fn score(candidate: &TrackingCandidate, carrier: Carrier) -> f64 {
    let raw = RULES
        .iter()
        .fold(candidate.confidence, |acc, rule| {
            rule.evaluate(candidate, carrier, acc)
        });
    clamp_confidence(raw)
}
