//! Error types for tracking extraction

use std::time::Duration;

use thiserror::Error;

use crate::validator::InputError;

/// Errors that can occur while extracting tracking information
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Failed to parse the raw email structure
    #[error("Failed to parse email structure: {0}")]
    Parse(String),

    /// Input failed structural validation
    #[error("Invalid input: {}", join_errors(.0))]
    InvalidInput(Vec<InputError>),

    /// Input was rejected by the content safety gate
    #[error("Unsafe content rejected: {0}")]
    UnsafeContent(String),

    /// Transport failure talking to the inference service
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Inference service answered with a non-success status
    #[error("Inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Inference reply could not be decoded
    #[error("Failed to parse inference response: {0}")]
    ResponseParse(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiter refused the call
    #[error("Rate limit exceeded, retry in {wait:?}")]
    RateLimited { wait: Duration },

    /// Caller cancelled while waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[InputError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for tracking extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;
