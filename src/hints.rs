//! Carrier hints from sender, subject and body

use regex::Regex;
use std::sync::LazyLock;

use crate::carriers::{Carrier, MARKETPLACE_CARRIER};
use crate::types::{CarrierHint, EmailAddress, HintSource};

pub const SENDER_WEIGHT: f64 = 0.9;
pub const SUBJECT_NAME_WEIGHT: f64 = 0.8;
pub const SUBJECT_KEYWORD_WEIGHT: f64 = 0.7;
pub const BODY_BASE_WEIGHT: f64 = 0.5;
pub const BODY_OCCURRENCE_WEIGHT: f64 = 0.1;
pub const BODY_MAX_WEIGHT: f64 = 0.8;

/// Sender domains owned by each carrier
const CARRIER_DOMAINS: [(Carrier, &[&str]); 7] = [
    (Carrier::Ups, &["ups.com"]),
    (Carrier::Usps, &["usps.com", "usps.gov"]),
    (Carrier::Fedex, &["fedex.com"]),
    (Carrier::Dhl, &["dhl.com", "dhl.de", "dhl.co.uk"]),
    (
        Carrier::Amazon,
        &["amazon.com", "amazon.co.uk", "amazon.ca", "amazon.de", "amazonlogistics.com"],
    ),
    (Carrier::Ontrac, &["ontrac.com"]),
    (Carrier::Lasership, &["lasership.com"]),
];

struct CarrierTerms {
    carrier: Carrier,
    /// Brand name, word-bounded
    name: Regex,
    /// Secondary vocabulary, word-bounded
    keywords: Regex,
}

static CARRIER_TERMS: LazyLock<Vec<CarrierTerms>> = LazyLock::new(|| {
    let terms = |carrier, name: &str, keywords: &str| CarrierTerms {
        carrier,
        name: Regex::new(&format!(r"(?i)\b(?:{name})\b")).unwrap(),
        keywords: Regex::new(&format!(r"(?i)\b(?:{keywords})\b")).unwrap(),
    };

    vec![
        terms(
            Carrier::Ups,
            "ups",
            "united parcel service|ups my choice|1z[0-9a-z]{6,}",
        ),
        terms(
            Carrier::Usps,
            "usps",
            "postal service|informed delivery|priority mail|first-class package",
        ),
        terms(
            Carrier::Fedex,
            "fedex",
            "federal express|fedex ground|fedex express|fedex delivery manager",
        ),
        terms(Carrier::Dhl, "dhl", "dhl express|dhl ecommerce|waybill"),
        terms(
            Carrier::Amazon,
            "amazon",
            "amazon logistics|your amazon order|amazon\\.com|prime",
        ),
        terms(Carrier::Ontrac, "ontrac", "on trac"),
        terms(Carrier::Lasership, "lasership", "laser ship|lso"),
    ]
});

/// Marketplace vocabulary in subjects; every branch names the marketplace
static MARKETPLACE_SUBJECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:amazon(?:\.com)?|amazon logistics)\b").unwrap()
});

/// Carrier owning the sender's domain, if any
#[must_use]
pub fn carrier_for_sender(sender: &EmailAddress) -> Option<Carrier> {
    CARRIER_DOMAINS
        .iter()
        .find(|(_, domains)| domains.iter().any(|d| sender.is_from_domain(d)))
        .map(|(carrier, _)| *carrier)
}

/// Whether the sender belongs to a known carrier or marketplace
#[must_use]
pub fn is_known_carrier_sender(from: &str) -> bool {
    EmailAddress::parse(from)
        .as_ref()
        .and_then(carrier_for_sender)
        .is_some()
}

/// Marketplace carrier if the email comes from or names the marketplace
#[must_use]
pub fn marketplace_context(from: &str, subject: &str) -> Option<Carrier> {
    let from_marketplace = EmailAddress::parse(from)
        .as_ref()
        .and_then(carrier_for_sender)
        == Some(MARKETPLACE_CARRIER);

    (from_marketplace || MARKETPLACE_SUBJECT_REGEX.is_match(subject)).then_some(MARKETPLACE_CARRIER)
}

/// Score carrier hints for one email, sorted by descending confidence
#[must_use]
pub fn analyze(from: &str, subject: &str, body: &str) -> Vec<CarrierHint> {
    let mut hints = Vec::new();

    if let Some(sender) = EmailAddress::parse(from)
        && let Some(carrier) = carrier_for_sender(&sender)
    {
        hints.push(CarrierHint {
            carrier,
            confidence: SENDER_WEIGHT,
            source: HintSource::Sender,
            reason: format!("Sender domain {} belongs to {carrier}", sender.domain),
        });
    }

    for terms in CARRIER_TERMS.iter() {
        if terms.name.is_match(subject) {
            hints.push(CarrierHint {
                carrier: terms.carrier,
                confidence: SUBJECT_NAME_WEIGHT,
                source: HintSource::Subject,
                reason: format!("Subject names {}", terms.carrier),
            });
        } else if terms.keywords.is_match(subject) {
            hints.push(CarrierHint {
                carrier: terms.carrier,
                confidence: SUBJECT_KEYWORD_WEIGHT,
                source: HintSource::Subject,
                reason: format!("Subject has {} keywords", terms.carrier),
            });
        }

        let occurrences =
            terms.name.find_iter(body).count() + terms.keywords.find_iter(body).count();
        if occurrences > 0 {
            #[allow(clippy::cast_precision_loss)]
            let confidence = (BODY_OCCURRENCE_WEIGHT.mul_add(occurrences as f64, BODY_BASE_WEIGHT))
                .min(BODY_MAX_WEIGHT);
            hints.push(CarrierHint {
                carrier: terms.carrier,
                confidence,
                source: HintSource::Body,
                reason: format!("Body mentions {} {occurrences} time(s)", terms.carrier),
            });
        }
    }

    hints.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    hints
}

/// Distinct carriers named by `hints`, strongest first
#[must_use]
pub fn hinted_carriers(hints: &[CarrierHint]) -> Vec<Carrier> {
    let mut carriers = Vec::new();
    for hint in hints {
        if !carriers.contains(&hint.carrier) {
            carriers.push(hint.carrier);
        }
    }
    carriers
}
