// Enforce at crate level
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]

//! Shipment Tracking Extraction
//!
//! Turns free-form shipment notification emails into confidence-scored
//! tracking records (carrier, tracking number, product description,
//! merchant).
//!
//! # Features
//!
//! - Per-carrier pattern catalog with generic label and table rules
//! - Carrier hints from sender, subject and body
//! - Carrier format validation with a relaxed marketplace rule
//! - Optional language-model fallback behind a sanitizer and rate limiter
//! - Security report over configuration, inputs and endpoint
//!
//! # Example
//!
//! ```rust
//! use tracking_extract::{Carrier, EmailContent, ExtractorConfig, TrackingExtractor};
//!
//! let email = EmailContent::new(
//!     "noreply@ups.com",
//!     "UPS Update: Package Shipped",
//!     "Your package with tracking number 1Z999AA1234567890 has been shipped.",
//! );
//! let extractor = TrackingExtractor::new(ExtractorConfig::default());
//! let results = tokio_test::block_on(extractor.extract(&email)).unwrap();
//!
//! assert_eq!(results[0].number, "1Z999AA1234567890");
//! assert_eq!(results[0].carrier, Carrier::Ups);
//! ```

mod error;
mod types;

pub mod carriers;
pub mod config;
pub mod extractor;
pub mod filter;
pub mod hints;
pub mod llm;
pub mod parser;
pub mod patterns;
pub mod rate_limiter;
pub mod sanitizer;
pub mod scoring;
pub mod security;
pub mod validator;

pub use carriers::{Carrier, CarrierRegistry, CarrierValidator, normalize_tracking_number};
pub use config::{ExtractorConfig, LlmConfig, RateLimitConfig, Settings};
pub use error::{ExtractError, Result};
pub use extractor::TrackingExtractor;
pub use llm::{DescriptionResult, InferenceExtractor, LlmClient, filter_by_confidence};
pub use parser::{html_to_text, parse_email};
pub use patterns::PatternCatalog;
pub use rate_limiter::{Admission, RateLimiter, RateLimiterStats};
pub use sanitizer::ContentSanitizer;
pub use security::{SecurityIssue, SecurityReport, SecurityValidator, SecurityWarning, Severity};
pub use types::*;
pub use validator::{InputError, InputErrorKind, InputValidator, ValidationResult};
