//! Core types for the extraction pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::carriers::Carrier;

/// A shipment notification email as handed to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailContent {
    /// Sender address, possibly with a display name
    pub from: String,

    /// Subject line
    pub subject: String,

    /// Plain text body
    pub plain_text: String,

    /// HTML body
    pub html_text: String,

    /// Message-ID header value
    pub message_id: String,

    /// Conversation/thread identifier
    pub thread_id: String,

    /// Date sent/received
    pub date: DateTime<Utc>,
}

impl EmailContent {
    /// Build a plain-text email with the current time as its date
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        plain_text: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            plain_text: plain_text.into(),
            html_text: String::new(),
            message_id: String::new(),
            thread_id: String::new(),
            date: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_text = html.into();
        self
    }

    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    /// Parsed sender address, if the `from` field holds one
    #[must_use]
    pub fn sender(&self) -> Option<EmailAddress> {
        EmailAddress::parse(&self.from)
    }
}

/// Email address split into its parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Display name (e.g., "UPS Notifications")
    pub name: Option<String>,

    /// Email address (e.g., "pkginfo@ups.com")
    pub address: String,

    /// Domain extracted from address, lower-cased
    pub domain: String,

    /// Local part (before @)
    pub local_part: String,
}

impl EmailAddress {
    /// Parse an email address from a string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        // Try to match "Name <email@domain.com>" format
        if let Some(start) = s.find('<')
            && let Some(end) = s.find('>')
            && start < end
        {
            let name_part = s[..start].trim().trim_matches('"');
            let address = s[start + 1..end].trim().to_string();

            if let Some((local, domain)) = address.split_once('@') {
                return Some(Self {
                    name: if name_part.is_empty() {
                        None
                    } else {
                        Some(name_part.to_string())
                    },
                    local_part: local.to_string(),
                    domain: domain.to_lowercase(),
                    address,
                });
            }
        }

        // Plain email address
        if let Some((local, domain)) = s.split_once('@')
            && !local.is_empty()
            && !domain.is_empty()
        {
            return Some(Self {
                name: None,
                local_part: local.to_string(),
                domain: domain.to_lowercase(),
                address: s.to_string(),
            });
        }

        None
    }

    /// Check if the domain equals `domain` or is a subdomain of it
    #[must_use]
    pub fn is_from_domain(&self, domain: &str) -> bool {
        self.domain == domain
            || self
                .domain
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Where a carrier hint came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HintSource {
    Sender,
    Subject,
    Body,
}

/// Weighted guess about which carrier an email concerns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierHint {
    pub carrier: Carrier,
    pub confidence: f64,
    pub source: HintSource,
    pub reason: String,
}

/// How a candidate was found in the text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Bare number in carrier format
    Direct,
    /// Preceded by a "tracking number" style label
    Labeled,
    /// Table cell or tab/pipe separated column
    Table,
    /// Carrier format with spaces or hyphens inside
    Spaced,
    /// Found near carrier or shipping vocabulary
    Contextual,
}

/// Substring that might be a tracking number, prior to validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingCandidate {
    /// Matched text as it appears in the source
    pub text: String,

    /// Byte offset of `text` in the searched text
    pub position: usize,

    /// Cleaned surrounding text
    pub context: String,

    /// Carrier whose pattern produced the match
    pub carrier: Option<Carrier>,

    /// Base confidence of the producing pattern
    pub confidence: f64,

    pub method: ExtractionMethod,
}

/// Provenance of a final result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Regex,
    Llm,
    Hybrid,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Regex => "regex",
            Self::Llm => "llm",
            Self::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// Final, confidence-scored tracking record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingInfo {
    /// Upper-cased number with separators stripped
    pub number: String,

    pub carrier: Carrier,

    /// Always within [0, 1]
    pub confidence: f64,

    pub source: Provenance,

    /// Product description, possibly combined with the merchant
    pub description: String,

    pub merchant: String,

    /// Text surrounding the match
    pub context: String,

    pub extracted_at: DateTime<Utc>,
}
