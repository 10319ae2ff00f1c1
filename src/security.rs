//! Aggregate security policy check over configuration and inputs
//!
//! Problems are reported, never raised. The caller reads
//! [`SecurityReport::passed`] and decides whether to proceed.

use serde::Serialize;
use std::collections::HashSet;
use url::{Host, Url};

use crate::config::LlmConfig;
use crate::sanitizer::ContentSanitizer;
use crate::validator::{InputErrorKind, InputValidator};

/// Keys shorter than this are weak
pub const MIN_API_KEY_CHARS: usize = 20;

/// Keys with fewer distinct characters than this are weak
const MIN_API_KEY_DISTINCT_CHARS: usize = 8;

const PLACEHOLDER_FRAGMENTS: [&str; 8] = [
    "test",
    "demo",
    "example",
    "placeholder",
    "change-me",
    "changeme",
    "your-api-key",
    "xxxx",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityIssue {
    pub severity: Severity,
    pub component: String,
    pub description: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityWarning {
    pub component: String,
    pub description: String,
    pub suggestion: String,
}

/// Outcome of one security validation, in the order checks ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityReport {
    pub passed: bool,
    pub issues: Vec<SecurityIssue>,
    pub warnings: Vec<SecurityWarning>,
}

impl SecurityReport {
    const fn new() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record an issue that fails the report
    fn fail(&mut self, severity: Severity, component: &str, description: String, mitigation: &str) {
        self.passed = false;
        self.note(severity, component, description, mitigation);
    }

    /// Record an issue without failing the report
    fn note(&mut self, severity: Severity, component: &str, description: String, mitigation: &str) {
        self.issues.push(SecurityIssue {
            severity,
            component: component.to_string(),
            description,
            mitigation: mitigation.to_string(),
        });
    }

    fn warn(&mut self, component: &str, description: String, suggestion: &str) {
        self.warnings.push(SecurityWarning {
            component: component.to_string(),
            description,
            suggestion: suggestion.to_string(),
        });
    }

    /// Highest severity among the issues
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityValidator {
    validator: InputValidator,
    sanitizer: ContentSanitizer,
}

impl SecurityValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            validator: InputValidator::new(),
            sanitizer: ContentSanitizer::new(),
        }
    }

    /// Check configuration, inputs and endpoint in one pass
    ///
    /// A missing configuration fails immediately without checking inputs.
    #[must_use]
    pub fn validate_system_security(
        &self,
        config: Option<&LlmConfig>,
        email: &str,
        tracking_number: &str,
    ) -> SecurityReport {
        let mut report = SecurityReport::new();

        let Some(config) = config else {
            report.fail(
                Severity::High,
                "configuration",
                "No inference configuration supplied".into(),
                "Provide an LLM configuration before processing input",
            );
            return report;
        };

        self.check_inputs(&mut report, email, tracking_number);
        check_credentials_present(&mut report, config);
        check_endpoint(&mut report, &config.endpoint);
        if let Some(key) = config.api_key.as_deref() {
            check_api_key(&mut report, key);
        }

        report
    }

    fn check_inputs(&self, report: &mut SecurityReport, email: &str, tracking_number: &str) {
        let result = self
            .validator
            .validate_email_processing_input(email, tracking_number);
        for error in &result.errors {
            let severity = match error.kind() {
                InputErrorKind::Structural => Severity::Medium,
                InputErrorKind::Safety => Severity::High,
            };
            report.fail(
                severity,
                "input_validator",
                error.to_string(),
                "Reject the input before it reaches inference",
            );
        }
        for warning in result.warnings {
            report.warn(
                "input_validator",
                warning,
                "Review the email for hidden or injected content",
            );
        }

        if !self.sanitizer.validate_content_safety(email) {
            report.fail(
                Severity::High,
                "content_sanitizer",
                "Email content failed the injection and special-character safety gate".into(),
                "Do not forward this email to the inference service",
            );
        }

        if let Err(error) = self.validator.validate_request_size(email, tracking_number) {
            report.fail(
                Severity::Medium,
                "input_validator",
                error.to_string(),
                "Split or truncate the request",
            );
        }
    }
}

fn check_credentials_present(report: &mut SecurityReport, config: &LlmConfig) {
    let provider = config.provider.trim().to_ascii_lowercase();
    let needs_key = matches!(provider.as_str(), "openai" | "cloud");
    let has_key = config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
    if config.enabled && needs_key && !has_key {
        report.fail(
            Severity::High,
            "configuration",
            format!("Provider {provider} requires an API key but none is configured"),
            "Set api_key or the TRACKING_LLM_API_KEY environment variable",
        );
    }
}

fn check_endpoint(report: &mut SecurityReport, endpoint: &str) {
    let url = match Url::parse(endpoint) {
        Ok(url) => url,
        Err(e) => {
            report.note(
                Severity::Medium,
                "endpoint",
                format!("Endpoint {endpoint:?} is not a valid URL: {e}"),
                "Configure an absolute http(s) URL",
            );
            return;
        }
    };

    if url.scheme() != "https" {
        report.note(
            Severity::Medium,
            "endpoint",
            format!("Endpoint uses {} instead of https", url.scheme()),
            "Use TLS for any endpoint reachable over a network",
        );
    }

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    if loopback {
        report.warn(
            "endpoint",
            "Endpoint points at the local machine".into(),
            "Expected for development; use a reachable host in production",
        );
    }

    if let Some(port) = url.port() {
        report.warn(
            "endpoint",
            format!("Endpoint uses non-standard port {port}"),
            "Confirm the port is intended and firewalled",
        );
    }
}

fn check_api_key(report: &mut SecurityReport, key: &str) {
    if let Some(reason) = weak_key_reason(key) {
        report.note(
            Severity::Medium,
            "api_key",
            format!("API key looks weak: {reason}"),
            "Use the full key issued by the provider",
        );
    }
}

/// Why `key` looks like a placeholder or low-entropy value, if it does
#[must_use]
pub fn weak_key_reason(key: &str) -> Option<&'static str> {
    let key = key.trim();
    let lower = key.to_ascii_lowercase();

    if PLACEHOLDER_FRAGMENTS.iter().any(|p| lower.contains(p)) {
        return Some("contains a placeholder fragment");
    }
    if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) {
        return Some("purely numeric");
    }
    if key.chars().count() < MIN_API_KEY_CHARS {
        return Some("shorter than 20 characters");
    }
    if key.chars().collect::<HashSet<_>>().len() < MIN_API_KEY_DISTINCT_CHARS {
        return Some("too few distinct characters");
    }
    None
}
