//! Per-carrier tracking number patterns
//!
//! The catalog is built once and shared read-only between extraction
//! calls. Matching never fails: no hit is an empty result.

use regex::Regex;
use std::collections::HashMap;

use crate::carriers::Carrier;
use crate::types::{ExtractionMethod, TrackingCandidate};

/// Characters of context captured on each side of a match
const CONTEXT_RADIUS: usize = 50;

/// One compiled rule in the catalog
#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub regex: Regex,

    /// `None` for generic, carrier-agnostic rules
    pub carrier: Option<Carrier>,

    /// Short name of the number format this rule targets
    pub format: &'static str,

    pub confidence: f64,

    pub method: ExtractionMethod,

    pub description: &'static str,
}

impl PatternEntry {
    fn new(
        pattern: &str,
        carrier: Option<Carrier>,
        format: &'static str,
        confidence: f64,
        method: ExtractionMethod,
        description: &'static str,
    ) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            carrier,
            format,
            confidence,
            method,
            description,
        }
    }

    /// Run this rule over `text`
    #[must_use]
    pub fn find_candidates(&self, text: &str) -> Vec<TrackingCandidate> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| TrackingCandidate {
                text: m.as_str().trim().to_string(),
                position: m.start(),
                context: context_window(text, m.start(), m.end()),
                carrier: self.carrier,
                confidence: self.confidence,
                method: self.method,
            })
            .filter(|c| !c.text.is_empty())
            .collect()
    }
}

/// Static catalog of carrier and generic rules
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    carriers: HashMap<Carrier, Vec<PatternEntry>>,
    generic: Vec<PatternEntry>,
}

impl PatternCatalog {
    #[must_use]
    pub fn new() -> Self {
        let mut carriers = HashMap::new();
        for carrier in Carrier::ALL {
            carriers.insert(carrier, carrier_entries(carrier));
        }

        Self {
            carriers,
            generic: generic_entries(),
        }
    }

    /// Rules registered for `carrier`, in match order
    #[must_use]
    pub fn entries(&self, carrier: Carrier) -> &[PatternEntry] {
        self.carriers.get(&carrier).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn generic_entries(&self) -> &[PatternEntry] {
        &self.generic
    }

    /// Candidates from one carrier's rules; unknown carriers yield nothing
    #[must_use]
    pub fn extract_for_carrier(&self, text: &str, carrier: Carrier) -> Vec<TrackingCandidate> {
        self.entries(carrier)
            .iter()
            .flat_map(|entry| entry.find_candidates(text))
            .collect()
    }

    /// Candidates from label, table and context rules
    #[must_use]
    pub fn extract_generic(&self, text: &str) -> Vec<TrackingCandidate> {
        self.generic
            .iter()
            .flat_map(|entry| entry.find_candidates(text))
            .collect()
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::too_many_lines)]
fn carrier_entries(carrier: Carrier) -> Vec<PatternEntry> {
    use ExtractionMethod::{Contextual, Direct, Labeled, Spaced};

    let c = Some(carrier);
    match carrier {
        Carrier::Ups => vec![
            PatternEntry::new(
                r"(?i)\b(1Z[0-9A-Z]{15,16})\b",
                c,
                "1z",
                0.95,
                Direct,
                "UPS 1Z shipment number",
            ),
            PatternEntry::new(
                r"\b(1Z[ -]?[0-9A-Z]{3}[ -]?[0-9A-Z]{3}[ -]?[0-9A-Z]{2}[ -]?[0-9A-Z]{4}[ -]?[0-9A-Z]{3,4})\b",
                c,
                "1z",
                0.85,
                Spaced,
                "UPS 1Z number with separators",
            ),
            PatternEntry::new(
                r"\b(T\d{10})\b",
                c,
                "freight",
                0.6,
                Direct,
                "UPS freight/Mail Innovations number",
            ),
        ],
        Carrier::Usps => vec![
            PatternEntry::new(
                r"\b(9[2-5]\d{20})\b",
                c,
                "impb",
                0.9,
                Direct,
                "USPS 22-digit IMpb barcode",
            ),
            PatternEntry::new(
                r"\b(9[2-5]\d{2}(?:[\s-]\d{4}){4}[\s-]\d{2})\b",
                c,
                "impb",
                0.85,
                Spaced,
                "USPS IMpb in 4-digit groups",
            ),
            PatternEntry::new(
                r"(?i)\b([A-Z]{2}\d{9}US)\b",
                c,
                "s10",
                0.85,
                Direct,
                "USPS international S10 number",
            ),
            PatternEntry::new(
                r"(?i)(?:usps|postal service)[^0-9\n]{0,40}(\d{20,22})\b",
                c,
                "impb",
                0.8,
                Contextual,
                "Digits following a USPS mention",
            ),
        ],
        Carrier::Fedex => vec![
            PatternEntry::new(
                r"(?i)fedex[^0-9\n]{0,40}(\d{12}|\d{15})\b",
                c,
                "express",
                0.85,
                Contextual,
                "Digits following a FedEx mention",
            ),
            PatternEntry::new(
                r"\b(\d{4}[\s-]\d{4}[\s-]\d{4})\b",
                c,
                "express",
                0.7,
                Spaced,
                "FedEx 12-digit number in groups",
            ),
            PatternEntry::new(
                r"\b(\d{12})\b",
                c,
                "express",
                0.55,
                Direct,
                "FedEx Express 12-digit number",
            ),
            PatternEntry::new(
                r"\b(\d{15})\b",
                c,
                "ground",
                0.5,
                Direct,
                "FedEx Ground 15-digit number",
            ),
        ],
        Carrier::Dhl => vec![
            PatternEntry::new(
                r"(?i)\b(JJ?D\d{18})\b",
                c,
                "parcel",
                0.9,
                Direct,
                "DHL Parcel JD number",
            ),
            PatternEntry::new(
                r"(?i)\b(GM\d{16,18})\b",
                c,
                "ecommerce",
                0.85,
                Direct,
                "DHL eCommerce GM number",
            ),
            PatternEntry::new(
                r"(?i)(?:dhl|waybill)[^0-9\n]{0,40}(\d{10,11})\b",
                c,
                "express",
                0.85,
                Contextual,
                "Waybill digits following a DHL mention",
            ),
            PatternEntry::new(
                r"\b(\d{10})\b",
                c,
                "express",
                0.4,
                Direct,
                "DHL Express 10-digit waybill",
            ),
        ],
        Carrier::Amazon => vec![
            PatternEntry::new(
                r"(?i)\b(TB[ACM]\d{12})\b",
                c,
                "tba",
                0.95,
                Direct,
                "Amazon Logistics TBA number",
            ),
            PatternEntry::new(
                r"(?i)(?:tracking\s*(?:id|number|#)|shipment\s*id)\s*(?:is)?\s*[:#]?\s*([A-Z0-9]{6,20})\b",
                c,
                "internal",
                0.7,
                Labeled,
                "Labeled Amazon shipment code",
            ),
        ],
        Carrier::Ontrac => vec![PatternEntry::new(
            r"(?i)\b([CD]\d{14})\b",
            c,
            "ontrac",
            0.85,
            Direct,
            "OnTrac C/D number",
        )],
        Carrier::Lasership => vec![
            PatternEntry::new(
                r"(?i)\b(1LS\d{12,15})\b",
                c,
                "1ls",
                0.9,
                Direct,
                "LaserShip 1LS number",
            ),
            PatternEntry::new(
                r"(?i)\b(L[A-Z]\d{8})\b",
                c,
                "legacy",
                0.85,
                Direct,
                "LaserShip two-letter number",
            ),
        ],
        Carrier::Unknown => Vec::new(),
    }
}

fn generic_entries() -> Vec<PatternEntry> {
    use ExtractionMethod::{Contextual, Labeled, Table};

    vec![
        PatternEntry::new(
            r"(?i)tracking\s*(?:number|no\.?|#|id|code)?\s*(?:is)?\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{6,34}[A-Z0-9])\b",
            None,
            "labeled",
            0.6,
            Labeled,
            "Value after a tracking label",
        ),
        PatternEntry::new(
            r"(?i)(?:tracking|shipment)\s*(?:number|#|id)?\s*[|\t]\s*([A-Z0-9]{10,30})\b",
            None,
            "column",
            0.55,
            Table,
            "Value in a tracking column",
        ),
        PatternEntry::new(
            r"(?i)<td[^>]*>\s*([A-Z0-9]{10,30})\s*</td>",
            None,
            "cell",
            0.5,
            Table,
            "Alphanumeric HTML table cell",
        ),
        PatternEntry::new(
            r"(?i)(?:track|shipment|package|parcel)[^.\n]{0,60}?\b([A-Z0-9]{10,30})\b",
            None,
            "nearby",
            0.4,
            Contextual,
            "Code near shipping vocabulary",
        ),
    ]
}

/// Snap a byte index to the nearest valid UTF-8 char boundary (backwards)
const fn snap_to_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while !s.is_char_boundary(i) && i > 0 {
        i -= 1;
    }
    i
}

/// Whitespace-collapsed text around `start..end`
#[must_use]
pub fn context_window(text: &str, start: usize, end: usize) -> String {
    let from = snap_to_char_boundary(text, start.saturating_sub(CONTEXT_RADIUS));
    let to = snap_to_char_boundary(text, (end + CONTEXT_RADIUS).min(text.len()));
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
