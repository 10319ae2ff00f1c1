//! Extraction pipeline
//!
//! [`TrackingExtractor::extract`] runs nine sequential stages:
//!
//! 1. preprocess the email
//! 2. analyze carrier hints
//! 3. generate pattern candidates
//! 4. filter false positives
//! 5. validate candidates against carrier formats and rescore them
//! 6. decide whether inference is needed
//! 7. run inference (soft failure)
//! 8. merge regex and inference results
//! 9. apply the confidence threshold and rank
//!
//! No stage fails the call. An empty email or a failed inference call only
//! means fewer results.

use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::carriers::{
    Carrier, CarrierRegistry, MARKETPLACE_CARRIER, STANDARD_CARRIERS, normalize_tracking_number,
    validate_marketplace_code,
};
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::filter::is_false_positive_candidate;
use crate::hints::{analyze, hinted_carriers, is_known_carrier_sender, marketplace_context};
use crate::llm::InferenceExtractor;
use crate::parser::html_to_text;
use crate::patterns::PatternCatalog;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::scoring::score;
use crate::types::{EmailContent, Provenance, TrackingCandidate, TrackingInfo};

/// Below this best regex confidence, inference is consulted
pub const INFERENCE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Bodies longer than this count as complex
pub const COMPLEX_BODY_CHARS: usize = 10_000;

/// Stage summaries at debug level, or info level in debug mode
macro_rules! stage {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

static SUBJECT_PRODUCT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:shipped|ordered|delivered):\s*["\x{201C}]?([^"\x{201D}]+)"#).unwrap()
});

static SUBJECT_SHIPPED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\byour\s+(.+?)\s+(?:has|have)\s+(?:been\s+)?shipped\b").unwrap()
});

/// Subject nouns too vague to describe a product
const GENERIC_SUBJECT_ITEMS: [&str; 7] = [
    "package", "packages", "order", "item", "items", "shipment", "parcel",
];

/// Email fields after stage 1
#[derive(Debug, Clone)]
struct Prepared {
    from: String,
    subject: String,
    body: String,
    html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CandidateKey {
    text: String,
    carrier: Option<Carrier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MergeKey {
    number: String,
    carrier: Carrier,
}

/// Pipeline entry point
///
/// The pattern catalog and carrier registry are shared read-only, so one
/// extractor can serve concurrent calls for independent emails.
pub struct TrackingExtractor {
    config: ExtractorConfig,
    patterns: Arc<PatternCatalog>,
    carriers: Arc<CarrierRegistry>,
    inference: InferenceExtractor,
    limiter: Option<Arc<RateLimiter>>,
}

impl TrackingExtractor {
    /// Regex-only extractor with the standard catalog and validators
    #[must_use]
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            patterns: Arc::new(PatternCatalog::new()),
            carriers: Arc::new(CarrierRegistry::standard()),
            inference: InferenceExtractor::Disabled,
            limiter: None,
        }
    }

    #[must_use]
    pub fn with_inference(mut self, inference: InferenceExtractor) -> Self {
        self.inference = inference;
        self
    }

    /// Gate inference calls through a shared limiter
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<PatternCatalog>) -> Self {
        self.patterns = patterns;
        self
    }

    #[must_use]
    pub fn with_carriers(mut self, carriers: Arc<CarrierRegistry>) -> Self {
        self.carriers = carriers;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    #[must_use]
    pub const fn inference(&self) -> &InferenceExtractor {
        &self.inference
    }

    /// Extract ranked tracking records from one email
    pub async fn extract(&self, email: &EmailContent) -> Result<Vec<TrackingInfo>> {
        let verbose = self.config.debug_mode;

        let prepared = preprocess(email);
        stage!(
            verbose,
            body_len = prepared.body.len(),
            html_len = prepared.html.len(),
            "Preprocessed email"
        );
        if prepared.subject.is_empty() && prepared.body.is_empty() && prepared.html.is_empty() {
            return Ok(Vec::new());
        }

        let hints = analyze(&prepared.from, &prepared.subject, &prepared.body);
        let hinted = hinted_carriers(&hints);
        let marketplace = marketplace_context(&prepared.from, &prepared.subject);
        stage!(verbose, hints = hints.len(), carriers = ?hinted, "Analyzed carrier hints");

        let candidates = self.generate_candidates(&prepared, &hinted);
        stage!(verbose, count = candidates.len(), "Generated candidates");

        let candidates: Vec<TrackingCandidate> = candidates
            .into_iter()
            .filter(|c| !is_false_positive_candidate(&c.text))
            .collect();
        stage!(verbose, count = candidates.len(), "Filtered false positives");

        let regex_results = self.validate_candidates(&candidates, &hinted, marketplace);
        stage!(verbose, count = regex_results.len(), "Validated candidates");

        let inference_results = if self.should_use_inference(&regex_results, email) {
            self.run_inference(email, marketplace).await
        } else {
            Vec::new()
        };

        let mut results = merge_results(regex_results, inference_results);
        for result in &mut results {
            let description = format_description(&result.description, &result.merchant);
            result.description = if description.is_empty() {
                description_from_subject(&prepared.subject)
            } else {
                description
            };
        }

        results.retain(|r| r.confidence >= self.config.min_confidence);
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        stage!(verbose, count = results.len(), "Extraction complete");

        Ok(results)
    }

    /// Stage 6: whether the inference fallback should run
    #[must_use]
    pub fn should_use_inference(&self, results: &[TrackingInfo], email: &EmailContent) -> bool {
        if !self.config.enable_llm || !self.inference.is_enabled() {
            return false;
        }

        let best = results
            .iter()
            .map(|r| r.confidence)
            .fold(f64::NEG_INFINITY, f64::max);

        results.is_empty()
            || best < INFERENCE_CONFIDENCE_THRESHOLD
            || is_complex_email(email)
            || !is_known_carrier_sender(&email.from)
    }

    fn generate_candidates(&self, prepared: &Prepared, hinted: &[Carrier]) -> Vec<TrackingCandidate> {
        let text = format!("{}\n{}", prepared.subject, prepared.body);

        let mut found = Vec::new();
        for carrier in hinted {
            found.extend(self.patterns.extract_for_carrier(&text, *carrier));
        }
        found.extend(self.patterns.extract_generic(&text));
        if !prepared.html.is_empty() {
            found.extend(self.patterns.extract_generic(&prepared.html));
        }

        let mut index: HashMap<CandidateKey, usize> = HashMap::new();
        let mut unique: Vec<TrackingCandidate> = Vec::new();
        for candidate in found {
            let key = CandidateKey {
                text: normalize_tracking_number(&candidate.text),
                carrier: candidate.carrier,
            };
            match index.get(&key).copied() {
                Some(i) if unique[i].confidence < candidate.confidence => unique[i] = candidate,
                Some(_) => {}
                None => {
                    index.insert(key, unique.len());
                    unique.push(candidate);
                }
            }
        }

        unique.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        unique.truncate(self.config.max_candidates);
        unique
    }

    /// Stage 5: first carrier that validates wins, then rescore
    fn validate_candidates(
        &self,
        candidates: &[TrackingCandidate],
        hinted: &[Carrier],
        marketplace: Option<Carrier>,
    ) -> Vec<TrackingInfo> {
        let extracted_at = Utc::now();
        let mut results: Vec<TrackingInfo> = Vec::new();

        for candidate in candidates {
            let normalized = normalize_tracking_number(&candidate.text);
            let Some(carrier) = self.validate_number(&normalized, candidate.carrier, hinted, marketplace)
            else {
                continue;
            };

            let confidence = score(candidate, carrier);
            if confidence < self.config.min_confidence {
                debug!(%carrier, confidence, "Validated candidate below threshold");
                continue;
            }

            if let Some(existing) = results.iter_mut().find(|r| r.number == normalized) {
                if existing.confidence < confidence {
                    existing.carrier = carrier;
                    existing.confidence = confidence;
                    existing.context.clone_from(&candidate.context);
                }
                continue;
            }

            results.push(TrackingInfo {
                number: normalized,
                carrier,
                confidence,
                source: Provenance::Regex,
                description: String::new(),
                merchant: String::new(),
                context: candidate.context.clone(),
                extracted_at,
            });
        }

        results
    }

    fn validate_number(
        &self,
        normalized: &str,
        suggested: Option<Carrier>,
        hinted: &[Carrier],
        marketplace: Option<Carrier>,
    ) -> Option<Carrier> {
        let order = validation_order(suggested, hinted);

        // A marketplace-suggested candidate gets the relaxed rule at its own slot
        if suggested == Some(MARKETPLACE_CARRIER)
            && marketplace == Some(MARKETPLACE_CARRIER)
            && (self.carriers.validate(MARKETPLACE_CARRIER, normalized)
                || validate_marketplace_code(normalized))
        {
            return Some(MARKETPLACE_CARRIER);
        }

        if let Some(carrier) = order
            .iter()
            .copied()
            .find(|c| self.carriers.validate(*c, normalized))
        {
            return Some(carrier);
        }

        marketplace
            .filter(|m| order.contains(m) && validate_marketplace_code(normalized))
    }

    /// Stage 7: inference behind the limiter; failures become no results
    async fn run_inference(
        &self,
        email: &EmailContent,
        marketplace: Option<Carrier>,
    ) -> Vec<TrackingInfo> {
        if let Some(limiter) = &self.limiter
            && let Admission::Denied { wait } = limiter.allow()
        {
            let err = ExtractError::RateLimited { wait };
            warn!(error = %err, "Inference skipped");
            return Vec::new();
        }

        match self.inference.extract(email).await {
            Ok(results) => {
                stage!(self.config.debug_mode, count = results.len(), "Inference extraction done");
                if self.config.use_hybrid_validation {
                    self.validate_inference_results(results, marketplace)
                } else {
                    results
                }
            }
            Err(e) => {
                warn!(error = %e, "Inference extraction failed, using regex results");
                Vec::new()
            }
        }
    }

    /// Cross-check inference results against carrier formats
    ///
    /// Known carriers must validate; `unknown` is resolved to the first
    /// standard carrier that accepts the number.
    #[must_use]
    pub fn validate_inference_results(
        &self,
        results: Vec<TrackingInfo>,
        marketplace: Option<Carrier>,
    ) -> Vec<TrackingInfo> {
        results
            .into_iter()
            .filter_map(|mut result| {
                if result.carrier.is_known() {
                    let relaxed = result.carrier == MARKETPLACE_CARRIER
                        && marketplace == Some(MARKETPLACE_CARRIER)
                        && validate_marketplace_code(&result.number);
                    if self.carriers.validate(result.carrier, &result.number) || relaxed {
                        return Some(result);
                    }
                    debug!(carrier = %result.carrier, "Dropping inference result failing carrier format");
                    return None;
                }

                if let Some(carrier) = STANDARD_CARRIERS
                    .into_iter()
                    .find(|c| self.carriers.validate(*c, &result.number))
                {
                    result.carrier = carrier;
                }
                Some(result)
            })
            .collect()
    }
}

/// Carrier order for stage 5
///
/// The candidate's own carrier, then hinted carriers, then the standard
/// carriers. The marketplace carrier always comes last.
#[must_use]
pub fn validation_order(suggested: Option<Carrier>, hinted: &[Carrier]) -> Vec<Carrier> {
    let mut order: Vec<Carrier> = Vec::with_capacity(Carrier::ALL.len());
    let mut push = |carrier: Carrier| {
        if carrier.is_known() && !order.contains(&carrier) {
            order.push(carrier);
        }
    };

    if let Some(carrier) = suggested {
        push(carrier);
    }
    hinted
        .iter()
        .copied()
        .filter(|c| *c != MARKETPLACE_CARRIER)
        .for_each(&mut push);
    STANDARD_CARRIERS.into_iter().for_each(&mut push);
    push(MARKETPLACE_CARRIER);

    order
}

fn preprocess(email: &EmailContent) -> Prepared {
    let body = if email.plain_text.trim().is_empty() {
        html_to_text(&email.html_text)
    } else {
        email.plain_text.clone()
    };

    Prepared {
        from: email.from.trim().to_lowercase(),
        subject: normalize_whitespace(&email.subject),
        body: normalize_whitespace(&body),
        html: email.html_text.trim().to_string(),
    }
}

/// Collapse whitespace within lines and drop blank lines
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// HTML-dominated, table-based, or very long
#[must_use]
pub fn is_complex_email(email: &EmailContent) -> bool {
    let plain = email.plain_text.trim();
    let html = email.html_text.trim();

    let html_dominated = !html.is_empty() && html.len() > plain.len() * 2;
    let has_table = html.to_ascii_lowercase().contains("<table");
    let too_long = plain.chars().count().max(html.chars().count()) > COMPLEX_BODY_CHARS;

    html_dominated || has_table || too_long
}

/// Stage 8: union by (number, carrier)
///
/// Matching regex and inference entries become one `hybrid` entry with the
/// higher confidence. Inference description and merchant win when inference
/// was more confident or the regex entry has none.
#[must_use]
pub fn merge_results(regex: Vec<TrackingInfo>, inference: Vec<TrackingInfo>) -> Vec<TrackingInfo> {
    let mut index: HashMap<MergeKey, usize> = HashMap::new();
    let mut merged: Vec<TrackingInfo> = Vec::with_capacity(regex.len() + inference.len());

    for result in regex.into_iter().chain(inference) {
        let key = MergeKey {
            number: result.number.clone(),
            carrier: result.carrier,
        };

        let Some(i) = index.get(&key).copied() else {
            index.insert(key, merged.len());
            merged.push(result);
            continue;
        };

        let existing = &mut merged[i];
        if existing.source == result.source {
            if result.confidence > existing.confidence {
                *existing = result;
            }
            continue;
        }

        let inference_wins = result.confidence > existing.confidence;
        if inference_wins || existing.description.is_empty() {
            existing.description = result.description;
        }
        if inference_wins || existing.merchant.is_empty() {
            existing.merchant = result.merchant;
        }
        existing.confidence = existing.confidence.max(result.confidence);
        existing.source = Provenance::Hybrid;
    }

    merged
}

/// Combine description and merchant into one display string
#[must_use]
pub fn format_description(description: &str, merchant: &str) -> String {
    match (description.trim(), merchant.trim()) {
        ("", "") => String::new(),
        ("", merchant) => format!("Package from {merchant}"),
        (description, "") => description.to_string(),
        (description, merchant) => format!("{description} from {merchant}"),
    }
}

/// Product name guessed from a shipping subject line
///
/// Handles `Shipped: "Product..."` style subjects and "Your X has shipped".
/// Text after an elision marker is dropped.
#[must_use]
pub fn description_from_subject(subject: &str) -> String {
    let fragment = SUBJECT_PRODUCT_REGEX
        .captures(subject)
        .or_else(|| SUBJECT_SHIPPED_REGEX.captures(subject))
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str());

    let cut = ["...", "\u{2026}"]
        .iter()
        .filter_map(|marker| fragment.find(marker))
        .min()
        .map_or(fragment, |pos| &fragment[..pos]);

    let product = cut.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let last_word = product.split_whitespace().last().unwrap_or_default();
    if GENERIC_SUBJECT_ITEMS
        .iter()
        .any(|g| last_word.eq_ignore_ascii_case(g))
    {
        return String::new();
    }
    product.to_string()
}
