use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracking_extract::llm::{
    DESCRIPTION_BODY_LIMIT, LlmExtractor, TRACKING_BODY_LIMIT, build_description_prompt,
    build_tracking_prompt, parse_description_response, parse_tracking_response,
    strip_code_fences, truncate_body,
};
use tracking_extract::{
    Carrier, EmailContent, ExtractError, InferenceExtractor, LlmClient, LlmConfig, Provenance,
    Result, TrackingInfo, filter_by_confidence,
};

/// Canned transport that records what it was asked
#[derive(Clone, Default)]
struct MockClient {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockClient {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or(ExtractError::Status {
            status: 503,
            body: "model loading".into(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

const REPLY: &str = r#"{"tracking_numbers": [{"number": "9400 1118 9922 3197 4284 90", "carrier": "USPS", "confidence": 1.4, "description": "  Wireless Headphones ", "merchant": "Best Buy"}]}"#;

fn order_email() -> EmailContent {
    EmailContent::new(
        "orders@bestbuy.com",
        "Your order has shipped",
        "Your headphones are on the way. USPS tracking 9400 1118 9922 3197 4284 90.",
    )
}

fn info(number: &str, confidence: f64) -> TrackingInfo {
    TrackingInfo {
        number: number.to_string(),
        carrier: Carrier::Ups,
        confidence,
        source: Provenance::Llm,
        description: String::new(),
        merchant: String::new(),
        context: String::new(),
        extracted_at: Utc::now(),
    }
}

// --- Response parsing ---

#[test]
fn test_strip_code_fences() {
    assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
}

#[test]
fn test_parse_tracking_response() {
    let numbers = parse_tracking_response(REPLY).unwrap();

    assert_eq!(numbers.len(), 1);
    assert_eq!(numbers[0].carrier, "USPS");
    assert!((numbers[0].confidence - 1.4).abs() < 1e-9);
}

#[test]
fn test_parse_tracking_response_with_prose() {
    let reply = format!("Sure! Here is the result:\n```json\n{REPLY}\n```\nLet me know.");
    let numbers = parse_tracking_response(&reply).unwrap();
    assert_eq!(numbers.len(), 1);
}

#[test]
fn test_parse_tracking_response_missing_fields() {
    let numbers = parse_tracking_response(r#"{"tracking_numbers": [{"number": "TBA123"}]}"#).unwrap();
    assert_eq!(numbers[0].number, "TBA123");
    assert!(numbers[0].carrier.is_empty());

    assert!(parse_tracking_response("{}").unwrap().is_empty());
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        parse_tracking_response("no tracking numbers here"),
        Err(ExtractError::ResponseParse(_))
    ));
    assert!(matches!(
        parse_tracking_response("} broken {"),
        Err(ExtractError::ResponseParse(_))
    ));
    assert!(matches!(
        parse_tracking_response(r#"{"tracking_numbers": "none"}"#),
        Err(ExtractError::ResponseParse(_))
    ));
}

#[test]
fn test_parse_description_response() {
    let result = parse_description_response(
        r#"{"description": "Anker Charger", "merchant": "Amazon", "confidence": 0.8}"#,
    )
    .unwrap();

    assert_eq!(result.description, "Anker Charger");
    assert_eq!(result.merchant, "Amazon");
}

// --- Prompts ---

#[test]
fn test_truncate_body() {
    assert_eq!(truncate_body("short", 10), "short");
    assert_eq!(truncate_body("abcdefghij", 10), "abcdefghij");
    assert_eq!(truncate_body("abcdefghijk", 10), "abcdefg...");
}

#[test]
fn test_truncate_body_stays_within_limit() {
    let body = "z".repeat(TRACKING_BODY_LIMIT * 2);
    let cut = truncate_body(&body, TRACKING_BODY_LIMIT);

    assert_eq!(cut.chars().count(), TRACKING_BODY_LIMIT);
    assert!(cut.ends_with("..."));
}

#[test]
fn test_tracking_prompt_truncates_body() {
    let body = "x".repeat(TRACKING_BODY_LIMIT + 50);
    let prompt = build_tracking_prompt("a@b.com", "Shipped", &body);

    assert!(prompt.contains(&format!("{}...", "x".repeat(TRACKING_BODY_LIMIT - 3))));
    assert!(!prompt.contains(&"x".repeat(TRACKING_BODY_LIMIT - 2)));
    assert!(prompt.contains("From: a@b.com"));
    assert!(prompt.contains("\"tracking_numbers\""));
}

#[test]
fn test_description_prompt_truncates_body() {
    let body = "y".repeat(DESCRIPTION_BODY_LIMIT + 1);
    let prompt = build_description_prompt("a@b.com", "Shipped", &body);

    assert!(prompt.contains(&format!("{}...", "y".repeat(DESCRIPTION_BODY_LIMIT - 3))));
    assert!(!prompt.contains(&"y".repeat(DESCRIPTION_BODY_LIMIT - 2)));
    assert!(prompt.contains("\"description\""));
}

// --- LlmExtractor ---

#[tokio::test]
async fn test_extract_maps_results() {
    let client = MockClient::replying(REPLY);
    let extractor = LlmExtractor::new(client.clone());

    let results = extractor.extract(&order_email()).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.number, "9400111899223197428490");
    assert_eq!(result.carrier, Carrier::Usps);
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(result.source, Provenance::Llm);
    assert_eq!(result.description, "Wireless Headphones");
    assert_eq!(result.merchant, "Best Buy");

    let prompt = client.last_prompt();
    assert!(prompt.contains("From: orders@bestbuy.com"));
    assert!(prompt.contains("Your headphones are on the way."));
    assert_eq!(extractor.provider(), "mock");
}

#[tokio::test]
async fn test_extract_skips_empty_numbers() {
    let reply = r#"{"tracking_numbers": [{"number": "--- ---", "carrier": "ups", "confidence": 0.9}]}"#;
    let extractor = LlmExtractor::new(MockClient::replying(reply));

    let results = extractor.extract(&order_email()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_extract_unknown_carrier() {
    let reply = r#"{"tracking_numbers": [{"number": "ZX81234567", "carrier": "Pony Express", "confidence": 0.6}]}"#;
    let extractor = LlmExtractor::new(MockClient::replying(reply));

    let results = extractor.extract(&order_email()).await.unwrap();
    assert_eq!(results[0].carrier, Carrier::Unknown);
}

#[tokio::test]
async fn test_html_body_used_when_plain_empty() {
    let client = MockClient::replying(r#"{"tracking_numbers": []}"#);
    let extractor = LlmExtractor::new(client.clone());
    let email = EmailContent::new("orders@shop.com", "Shipped", "")
        .with_html("<p>Your order shipped with tracking <b>1Z999AA1234567890</b></p>");

    extractor.extract(&email).await.unwrap();

    let prompt = client.last_prompt();
    assert!(prompt.contains("1Z999AA1234567890"));
    assert!(!prompt.contains("<b>"));
}

#[tokio::test]
async fn test_unsafe_body_never_sent() {
    let client = MockClient::replying(REPLY);
    let extractor = LlmExtractor::new(client.clone());
    let email = EmailContent::new(
        "orders@shop.com",
        "Shipped",
        "Try this jailbreak on the shipping bot",
    );

    let err = extractor.extract(&email).await.unwrap_err();

    assert!(matches!(err, ExtractError::UnsafeContent(_)));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_body_rejected() {
    let client = MockClient::replying(REPLY);
    let extractor = LlmExtractor::new(client.clone());
    let email = EmailContent::new("orders@shop.com", "Shipped", "hi");

    let err = extractor.extract(&email).await.unwrap_err();

    assert!(matches!(err, ExtractError::InvalidInput(_)));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let extractor = LlmExtractor::new(MockClient::failing());
    let err = extractor.extract(&order_email()).await.unwrap_err();

    assert!(matches!(err, ExtractError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_extract_description() {
    let reply = r#"```json
{"description": " Wireless Headphones ", "merchant": "Best Buy", "confidence": -2}
```"#;
    let extractor = LlmExtractor::new(MockClient::replying(reply));

    let result = extractor.extract_description(&order_email()).await.unwrap();

    assert_eq!(result.description, "Wireless Headphones");
    assert_eq!(result.merchant, "Best Buy");
    assert!(result.confidence.abs() < f64::EPSILON);
}

// --- InferenceExtractor ---

#[test]
fn test_from_config_disabled_when_not_enabled() {
    let config = LlmConfig {
        provider: "ollama".into(),
        enabled: false,
        ..LlmConfig::default()
    };
    let extractor = InferenceExtractor::from_config(&config).unwrap();
    assert!(!extractor.is_enabled());
}

#[test]
fn test_from_config_unknown_provider_disabled() {
    let config = LlmConfig {
        provider: "carrier-pigeon".into(),
        enabled: true,
        ..LlmConfig::default()
    };
    let extractor = InferenceExtractor::from_config(&config).unwrap();
    assert!(matches!(extractor, InferenceExtractor::Disabled));
}

#[test]
fn test_from_config_local() {
    let config = LlmConfig {
        provider: "Ollama".into(),
        enabled: true,
        ..LlmConfig::default()
    };
    let extractor = InferenceExtractor::from_config(&config).unwrap();
    assert!(matches!(extractor, InferenceExtractor::Local(_)));
}

#[test]
fn test_from_config_cloud() {
    let config = LlmConfig {
        provider: "openai".into(),
        endpoint: "https://api.openai.com".into(),
        api_key: Some("sk-live-9fA3kQ7zP2mX8rT5wV1y".into()),
        enabled: true,
        ..LlmConfig::default()
    };
    let extractor = InferenceExtractor::from_config(&config).unwrap();
    assert!(matches!(extractor, InferenceExtractor::Cloud(_)));
}

#[test]
fn test_from_config_cloud_without_key() {
    let config = LlmConfig {
        provider: "cloud".into(),
        enabled: true,
        ..LlmConfig::default()
    };
    let result = InferenceExtractor::from_config(&config);
    assert!(matches!(result, Err(ExtractError::Config(_))));
}

#[tokio::test]
async fn test_disabled_returns_empty() {
    let extractor = InferenceExtractor::default();

    assert!(extractor.extract(&order_email()).await.unwrap().is_empty());
    let description = extractor.extract_description(&order_email()).await.unwrap();
    assert!(description.description.is_empty());
    assert!(extractor.health_check().await.is_ok());
}

#[tokio::test]
async fn test_with_client_delegates() {
    let client = MockClient::replying(REPLY);
    let extractor = InferenceExtractor::with_client(client.clone());

    assert!(extractor.is_enabled());
    let results = extractor.extract(&order_email()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(extractor.health_check().await.is_ok());
}

// --- filter_by_confidence ---

#[test]
fn test_filter_by_confidence() {
    let results = vec![info("A1234567", 0.9), info("B1234567", 0.4)];
    let kept = filter_by_confidence(results, 0.7);

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].number, "A1234567");
}

#[test]
fn test_filter_by_confidence_falls_back_to_all() {
    let results = vec![info("A1234567", 0.3), info("B1234567", 0.4)];
    let kept = filter_by_confidence(results, 0.7);

    assert_eq!(kept.len(), 2);
}
