//! Carrier identifiers and tracking-number format validation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Shipping provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Ups,
    Usps,
    Fedex,
    Dhl,
    Amazon,
    Ontrac,
    Lasership,
    #[serde(other)]
    Unknown,
}

/// Carriers with public tracking formats, in validation order
pub const STANDARD_CARRIERS: [Carrier; 6] = [
    Carrier::Ups,
    Carrier::Usps,
    Carrier::Fedex,
    Carrier::Dhl,
    Carrier::Ontrac,
    Carrier::Lasership,
];

/// Marketplace-operated carrier with internal shipment codes
pub const MARKETPLACE_CARRIER: Carrier = Carrier::Amazon;

impl Carrier {
    /// Every known carrier, excluding `Unknown`
    pub const ALL: [Self; 7] = [
        Self::Ups,
        Self::Usps,
        Self::Fedex,
        Self::Dhl,
        Self::Amazon,
        Self::Ontrac,
        Self::Lasership,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ups => "ups",
            Self::Usps => "usps",
            Self::Fedex => "fedex",
            Self::Dhl => "dhl",
            Self::Amazon => "amazon",
            Self::Ontrac => "ontrac",
            Self::Lasership => "lasership",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient lookup by id or common name; unrecognized input is `Unknown`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();

        match key.as_str() {
            "ups" | "unitedparcelservice" | "upsmailinnovations" => Self::Ups,
            "usps" | "unitedstatespostalservice" | "postalservice" => Self::Usps,
            "fedex" | "federalexpress" | "fedexground" | "fedexexpress" => Self::Fedex,
            "dhl" | "dhlexpress" | "dhlecommerce" => Self::Dhl,
            "amazon" | "amazonlogistics" | "amzl" | "amazonshipping" => Self::Amazon,
            "ontrac" => Self::Ontrac,
            "lasership" | "lso" => Self::Lasership,
            _ => Self::Unknown,
        }
    }

    /// Whether this carrier's numbers always contain digits
    #[must_use]
    pub const fn expects_digits(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip whitespace, hyphens and underscores, then upper-case
#[must_use]
pub fn normalize_tracking_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Boolean format check for one carrier
pub trait CarrierValidator: Send + Sync {
    fn carrier(&self) -> Carrier;

    /// `normalized` has already been through [`normalize_tracking_number`]
    fn validate_tracking_number(&self, normalized: &str) -> bool;
}

/// Validator accepting any of a list of anchored formats
pub struct FormatValidator {
    carrier: Carrier,
    formats: Vec<Regex>,
}

impl FormatValidator {
    /// Formats are full-string regexes; invalid ones are skipped
    #[must_use]
    pub fn new(carrier: Carrier, formats: &[&str]) -> Self {
        let formats = formats
            .iter()
            .filter_map(|f| match Regex::new(f) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(carrier = %carrier, error = %e, "Skipping invalid carrier format");
                    None
                }
            })
            .collect();
        Self { carrier, formats }
    }
}

impl CarrierValidator for FormatValidator {
    fn carrier(&self) -> Carrier {
        self.carrier
    }

    fn validate_tracking_number(&self, normalized: &str) -> bool {
        self.formats.iter().any(|re| re.is_match(normalized))
    }
}

fn standard_formats(carrier: Carrier) -> &'static [&'static str] {
    match carrier {
        Carrier::Ups => &[r"^1Z[0-9A-Z]{15,16}$", r"^T\d{10}$", r"^(?:H|K)\d{10}$"],
        Carrier::Usps => &[
            r"^9[2-5]\d{20}$",
            r"^9[2-5]\d{24}$",
            r"^82\d{8}$",
            r"^[A-Z]{2}\d{9}US$",
            r"^420\d{5}9[2-5]\d{20}$",
        ],
        Carrier::Fedex => &[r"^\d{12}$", r"^\d{15}$", r"^96\d{20}$", r"^DT\d{12}$"],
        Carrier::Dhl => &[
            r"^\d{10,11}$",
            r"^JJ?D\d{18}$",
            r"^GM\d{16,18}$",
            r"^[A-Z]{3}\d{7}$",
        ],
        Carrier::Amazon => &[r"^TB[ACM]\d{12}$"],
        Carrier::Ontrac => &[r"^[CD]\d{14}$"],
        Carrier::Lasership => &[r"^L[A-Z]\d{8}$", r"^1LS\d{12,15}$"],
        Carrier::Unknown => &[],
    }
}

/// Carrier-id keyed validator factory
pub struct CarrierRegistry {
    validators: HashMap<Carrier, Box<dyn CarrierValidator>>,
}

impl CarrierRegistry {
    /// Empty registry; every lookup fails validation
    #[must_use]
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Registry with format validators for every known carrier
    #[must_use]
    pub fn standard() -> Self {
        Carrier::ALL
            .into_iter()
            .fold(Self::empty(), |registry, carrier| {
                registry.with_validator(FormatValidator::new(carrier, standard_formats(carrier)))
            })
    }

    /// Register or replace the validator for its carrier
    #[must_use]
    pub fn with_validator(mut self, validator: impl CarrierValidator + 'static) -> Self {
        self.validators
            .insert(validator.carrier(), Box::new(validator));
        self
    }

    #[must_use]
    pub fn get(&self, carrier: Carrier) -> Option<&dyn CarrierValidator> {
        self.validators.get(&carrier).map(AsRef::as_ref)
    }

    /// Standard format validation; unregistered carriers never validate
    #[must_use]
    pub fn validate(&self, carrier: Carrier, normalized: &str) -> bool {
        self.get(carrier)
            .is_some_and(|v| v.validate_tracking_number(normalized))
    }
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

const MONTHS: [&str; 12] = [
    "JANUARY", "FEBRUARY", "MARCH", "APRIL", "MAY", "JUNE", "JULY", "AUGUST", "SEPTEMBER",
    "OCTOBER", "NOVEMBER", "DECEMBER",
];

const WEEKDAYS: [&str; 7] = [
    "MONDAY", "TUESDAY", "WEDNESDAY", "THURSDAY", "FRIDAY", "SATURDAY", "SUNDAY",
];

const MARKETPLACE_NOISE_WORDS: [&str; 16] = [
    "TRACKING", "SHIPMENT", "SHIPPED", "DELIVERED", "DELIVERY", "PACKAGE", "ORDER", "NUMBER",
    "CUSTOMER", "ACCOUNT", "AMAZON", "DETAILS", "ARRIVING", "CARRIER", "INVOICE", "RETURN",
];

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[A-Z])(?:19|20)\d{2}(?:$|[A-Z])").unwrap());

/// Embedded `YYYYMMDD` calendar date
static DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:19|20)\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])").unwrap()
});

/// Relaxed acceptance rule for marketplace internal shipment codes
#[must_use]
pub fn validate_marketplace_code(normalized: &str) -> bool {
    let len = normalized.len();
    if !(6..=20).contains(&len) {
        return false;
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    if !normalized.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    let upper = normalized.to_ascii_uppercase();

    if YEAR_REGEX.is_match(&upper) && upper.chars().filter(char::is_ascii_digit).count() == 4 {
        return false;
    }
    if DATE_REGEX.is_match(&upper) {
        return false;
    }

    let starts_with_any = |words: &[&str]| {
        words
            .iter()
            .any(|w| upper.starts_with(w) || (upper.len() <= 6 && upper.starts_with(&w[..3])))
    };
    if starts_with_any(&MONTHS) || starts_with_any(&WEEKDAYS) {
        return false;
    }

    !MARKETPLACE_NOISE_WORDS.iter().any(|w| upper.contains(w))
}
