//! Language-model fallback extraction
//!
//! [`InferenceExtractor`] is selected once from [`LlmConfig`]. The disabled
//! variant is the default and the landing spot for unknown providers; it
//! never touches the network and always returns an empty result.
//!
//! Email text passes the [`InputValidator`] and [`ContentSanitizer`] before
//! it is placed in a prompt. Anything the safety gate rejects is reported as
//! [`ExtractError::UnsafeContent`] and never sent.

mod client;
mod prompt;
mod response;

pub use client::{CloudClient, LlmClient, LocalClient};
pub use prompt::{
    DESCRIPTION_BODY_LIMIT, TRACKING_BODY_LIMIT, build_description_prompt, build_tracking_prompt,
    truncate_body,
};
pub use response::{
    DescriptionResult, LlmTrackingNumber, parse_description_response, parse_tracking_response,
    strip_code_fences,
};

use chrono::Utc;
use tracing::{debug, warn};

use crate::carriers::{Carrier, normalize_tracking_number};
use crate::config::LlmConfig;
use crate::error::{ExtractError, Result};
use crate::parser::html_to_text;
use crate::sanitizer::ContentSanitizer;
use crate::scoring::clamp_confidence;
use crate::types::{EmailContent, Provenance, TrackingInfo};
use crate::validator::{InputValidator, ValidationResult};

/// Prompting and reply handling over one transport
pub struct LlmExtractor {
    client: Box<dyn LlmClient>,
    validator: InputValidator,
    sanitizer: ContentSanitizer,
}

impl LlmExtractor {
    pub fn new(client: impl LlmClient + 'static) -> Self {
        Self {
            client: Box::new(client),
            validator: InputValidator::new(),
            sanitizer: ContentSanitizer::new(),
        }
    }

    /// Transport name for logs
    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.client.name()
    }

    pub async fn extract(&self, email: &EmailContent) -> Result<Vec<TrackingInfo>> {
        let (from, subject, body) = self.prepare(email)?;
        let prompt = build_tracking_prompt(&from, &subject, &body);

        let reply = self.client.generate(&prompt).await?;
        let numbers = parse_tracking_response(&reply)?;
        debug!(
            provider = self.provider(),
            count = numbers.len(),
            "Inference returned tracking numbers"
        );

        let extracted_at = Utc::now();
        Ok(numbers
            .into_iter()
            .filter_map(|n| {
                let number =
                    normalize_tracking_number(&self.sanitizer.sanitize_tracking_number(&n.number));
                if number.is_empty() {
                    return None;
                }
                Some(TrackingInfo {
                    number,
                    carrier: Carrier::parse(&n.carrier),
                    confidence: clamp_confidence(n.confidence),
                    source: Provenance::Llm,
                    description: n.description.trim().to_string(),
                    merchant: n.merchant.trim().to_string(),
                    context: String::new(),
                    extracted_at,
                })
            })
            .collect())
    }

    pub async fn extract_description(&self, email: &EmailContent) -> Result<DescriptionResult> {
        let (from, subject, body) = self.prepare(email)?;
        let prompt = build_description_prompt(&from, &subject, &body);

        let reply = self.client.generate(&prompt).await?;
        let mut result = parse_description_response(&reply)?;
        result.description = result.description.trim().to_string();
        result.merchant = result.merchant.trim().to_string();
        result.confidence = clamp_confidence(result.confidence);
        Ok(result)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.client.health_check().await
    }

    /// Validated and sanitized (from, subject, body) for prompting
    fn prepare(&self, email: &EmailContent) -> Result<(String, String, String)> {
        let body = if email.plain_text.trim().is_empty() {
            html_to_text(&email.html_text)
        } else {
            email.plain_text.clone()
        };

        let checked = self.validator.validate_email_content(&body);
        if !checked.is_valid {
            return Err(rejection(checked));
        }

        Ok((
            self.sanitizer.sanitize_email_content(&email.from),
            self.sanitizer.sanitize_email_content(&email.subject),
            checked.sanitized_email,
        ))
    }
}

fn rejection(checked: ValidationResult) -> ExtractError {
    if checked.has_safety_errors() {
        warn!("Email body rejected by the content safety gate");
        ExtractError::UnsafeContent("email body failed the content safety check".into())
    } else {
        ExtractError::InvalidInput(checked.errors)
    }
}

/// Inference strategy chosen from the provider id
pub enum InferenceExtractor {
    Disabled,
    Local(LlmExtractor),
    Cloud(LlmExtractor),
}

impl InferenceExtractor {
    /// Build the extractor named by `config.provider`
    ///
    /// Unknown providers and `enabled = false` yield [`Self::Disabled`].
    /// A known provider that cannot be set up (for example a cloud provider
    /// without an API key) is a configuration error.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::Disabled);
        }

        match config.provider.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Ok(Self::Local(LlmExtractor::new(LocalClient::new(config)?))),
            "openai" | "cloud" => Ok(Self::Cloud(LlmExtractor::new(CloudClient::new(config)?))),
            "" | "disabled" | "none" => Ok(Self::Disabled),
            other => {
                warn!(provider = other, "Unrecognized inference provider, inference disabled");
                Ok(Self::Disabled)
            }
        }
    }

    /// Local-style extractor over a caller-supplied transport
    pub fn with_client(client: impl LlmClient + 'static) -> Self {
        Self::Local(LlmExtractor::new(client))
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    const fn inner(&self) -> Option<&LlmExtractor> {
        match self {
            Self::Disabled => None,
            Self::Local(inner) | Self::Cloud(inner) => Some(inner),
        }
    }

    pub async fn extract(&self, email: &EmailContent) -> Result<Vec<TrackingInfo>> {
        match self.inner() {
            Some(inner) => inner.extract(email).await,
            None => Ok(Vec::new()),
        }
    }

    /// Product description and merchant only
    pub async fn extract_description(&self, email: &EmailContent) -> Result<DescriptionResult> {
        match self.inner() {
            Some(inner) => inner.extract_description(email).await,
            None => Ok(DescriptionResult::default()),
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self.inner() {
            Some(inner) => inner.health_check().await,
            None => Ok(()),
        }
    }
}

impl Default for InferenceExtractor {
    fn default() -> Self {
        Self::Disabled
    }
}

/// Keep results at or above `threshold`, or all of them if none qualify
#[must_use]
pub fn filter_by_confidence(results: Vec<TrackingInfo>, threshold: f64) -> Vec<TrackingInfo> {
    let kept: Vec<TrackingInfo> = results
        .iter()
        .filter(|r| r.confidence >= threshold)
        .cloned()
        .collect();

    if kept.is_empty() { results } else { kept }
}
