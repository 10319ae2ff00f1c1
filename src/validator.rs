//! Structural validation of raw inputs before sanitization

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;

use crate::sanitizer::ContentSanitizer;

pub const MAX_EMAIL_BYTES: usize = 50 * 1024;
pub const MIN_EMAIL_CHARS: usize = 10;
pub const MIN_TRACKING_CHARS: usize = 3;
pub const MAX_TRACKING_CHARS: usize = 100;
pub const MAX_REQUEST_BYTES: usize = 100 * 1024;

/// Sanitized text shorter than this share of the input raises a warning
const CONTENT_LOSS_RATIO: f64 = 0.5;

/// Runs of control characters or NUL bytes that signal binary payloads
static SUSPICIOUS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x00|[\x01-\x08\x0B\x0C\x0E-\x1F\x7F]{3,}|\x{FFFD}{2,}").unwrap()
});

/// Which input a problem was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    Email,
    TrackingNumber,
    Request,
}

impl std::fmt::Display for InputField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::TrackingNumber => "tracking number",
            Self::Request => "request",
        })
    }
}

/// Malformed versus adversarial input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputErrorKind {
    Structural,
    Safety,
}

/// A single validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("{field} is not valid UTF-8")]
    InvalidEncoding { field: InputField },

    #[error("{field} is empty")]
    Empty { field: InputField },

    #[error("{field} is {size} bytes, limit is {limit}")]
    TooLarge {
        field: InputField,
        size: usize,
        limit: usize,
    },

    #[error("{field} is {len} characters, minimum is {min}")]
    TooShort {
        field: InputField,
        len: usize,
        min: usize,
    },

    #[error("{field} is {len} characters, maximum is {max}")]
    TooLong {
        field: InputField,
        len: usize,
        max: usize,
    },

    #[error("{field} contains binary or control-character runs")]
    SuspiciousContent { field: InputField },

    #[error("{field} failed the content safety check")]
    UnsafeContent { field: InputField },
}

impl InputError {
    #[must_use]
    pub const fn kind(&self) -> InputErrorKind {
        match self {
            Self::UnsafeContent { .. } => InputErrorKind::Safety,
            _ => InputErrorKind::Structural,
        }
    }

    #[must_use]
    pub const fn field(&self) -> InputField {
        match self {
            Self::InvalidEncoding { field }
            | Self::Empty { field }
            | Self::TooLarge { field, .. }
            | Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::SuspiciousContent { field }
            | Self::UnsafeContent { field } => *field,
        }
    }
}

/// Outcome of validating one request
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub sanitized_email: String,
    pub sanitized_tracking_number: String,
    pub errors: Vec<InputError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Whether any error came from the safety gate
    #[must_use]
    pub fn has_safety_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind() == InputErrorKind::Safety)
    }
}

/// Validates and sanitizes pipeline inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator {
    sanitizer: ContentSanitizer,
}

impl InputValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sanitizer: ContentSanitizer::new(),
        }
    }

    /// Validate and sanitize an email body and a tracking number together
    pub fn validate_email_processing_input(
        &self,
        email: impl AsRef<[u8]>,
        tracking_number: impl AsRef<[u8]>,
    ) -> ValidationResult {
        let email = check_email_structure(email.as_ref());
        let tracking = check_tracking_structure(tracking_number.as_ref());

        let mut errors = Vec::new();
        let (email, tracking) = match (email, tracking) {
            (Ok(email), Ok(tracking)) => (email, tracking),
            (email, tracking) => {
                errors.extend(email.err());
                errors.extend(tracking.err());
                return ValidationResult {
                    is_valid: false,
                    errors,
                    ..ValidationResult::default()
                };
            }
        };

        let mut result = self.sanitize_email(email);
        result.sanitized_tracking_number = self.sanitizer.sanitize_tracking_number(tracking);
        result
    }

    /// Validate and sanitize an email body on its own
    pub fn validate_email_content(&self, email: impl AsRef<[u8]>) -> ValidationResult {
        match check_email_structure(email.as_ref()) {
            Ok(email) => self.sanitize_email(email),
            Err(error) => ValidationResult {
                is_valid: false,
                errors: vec![error],
                ..ValidationResult::default()
            },
        }
    }

    /// Combined size ceiling across both fields
    #[allow(clippy::unused_self)]
    pub fn validate_request_size(
        &self,
        email: impl AsRef<[u8]>,
        tracking_number: impl AsRef<[u8]>,
    ) -> Result<(), InputError> {
        let size = email.as_ref().len() + tracking_number.as_ref().len();
        if size > MAX_REQUEST_BYTES {
            return Err(InputError::TooLarge {
                field: InputField::Request,
                size,
                limit: MAX_REQUEST_BYTES,
            });
        }
        Ok(())
    }

    fn sanitize_email(&self, email: &str) -> ValidationResult {
        let sanitized = self.sanitizer.sanitize_email_content(email);

        let mut result = ValidationResult {
            is_valid: true,
            ..ValidationResult::default()
        };

        if !self.sanitizer.validate_content_safety(&sanitized) {
            result.is_valid = false;
            result.errors.push(InputError::UnsafeContent {
                field: InputField::Email,
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let retained = sanitized.len() as f64 / email.len() as f64;
        if retained < CONTENT_LOSS_RATIO {
            result.warnings.push(format!(
                "Sanitization kept {} of {} bytes of email content",
                sanitized.len(),
                email.len()
            ));
        }

        result.sanitized_email = sanitized;
        result
    }
}

fn check_email_structure(bytes: &[u8]) -> Result<&str, InputError> {
    let field = InputField::Email;
    if bytes.is_empty() {
        return Err(InputError::Empty { field });
    }
    if bytes.len() > MAX_EMAIL_BYTES {
        return Err(InputError::TooLarge {
            field,
            size: bytes.len(),
            limit: MAX_EMAIL_BYTES,
        });
    }
    let text = std::str::from_utf8(bytes).map_err(|_| InputError::InvalidEncoding { field })?;
    if text.trim().is_empty() {
        return Err(InputError::Empty { field });
    }
    let len = text.chars().count();
    if len < MIN_EMAIL_CHARS {
        return Err(InputError::TooShort {
            field,
            len,
            min: MIN_EMAIL_CHARS,
        });
    }
    if SUSPICIOUS_REGEX.is_match(text) {
        return Err(InputError::SuspiciousContent { field });
    }
    Ok(text)
}

fn check_tracking_structure(bytes: &[u8]) -> Result<&str, InputError> {
    let field = InputField::TrackingNumber;
    let text = std::str::from_utf8(bytes).map_err(|_| InputError::InvalidEncoding { field })?;
    if text.trim().is_empty() {
        return Err(InputError::Empty { field });
    }
    let len = text.chars().count();
    if len < MIN_TRACKING_CHARS {
        return Err(InputError::TooShort {
            field,
            len,
            min: MIN_TRACKING_CHARS,
        });
    }
    if len > MAX_TRACKING_CHARS {
        return Err(InputError::TooLong {
            field,
            len,
            max: MAX_TRACKING_CHARS,
        });
    }
    if SUSPICIOUS_REGEX.is_match(text) {
        return Err(InputError::SuspiciousContent { field });
    }
    Ok(text)
}
