//! Decoding structured replies from the inference service

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// One tracking number as reported by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmTrackingNumber {
    pub number: String,
    pub carrier: String,
    pub confidence: f64,
    pub description: String,
    pub merchant: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TrackingReply {
    tracking_numbers: Vec<LlmTrackingNumber>,
}

/// Product description reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionResult {
    pub description: String,
    pub merchant: String,
    pub confidence: f64,
}

/// Remove a surrounding markdown code fence, if any
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence
    let rest = rest.find('\n').map_or("", |pos| &rest[pos + 1..]);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Outermost `{ ... }` span of `text`
fn json_object(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| ExtractError::ResponseParse("no JSON object in response".into()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ExtractError::ResponseParse("unterminated JSON object".into()))?;
    Ok(&text[start..=end])
}

/// Parse a tracking-number reply
pub fn parse_tracking_response(text: &str) -> Result<Vec<LlmTrackingNumber>> {
    let body = json_object(strip_code_fences(text))?;
    let reply: TrackingReply =
        serde_json::from_str(body).map_err(|e| ExtractError::ResponseParse(e.to_string()))?;
    Ok(reply.tracking_numbers)
}

/// Parse a description-only reply
pub fn parse_description_response(text: &str) -> Result<DescriptionResult> {
    let body = json_object(strip_code_fences(text))?;
    serde_json::from_str(body).map_err(|e| ExtractError::ResponseParse(e.to_string()))
}
