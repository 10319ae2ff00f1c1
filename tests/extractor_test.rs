use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracking_extract::extractor::{
    description_from_subject, format_description, is_complex_email, merge_results,
    validation_order,
};
use tracking_extract::{
    Carrier, CarrierRegistry, EmailContent, ExtractError, ExtractorConfig, InferenceExtractor,
    LlmClient, Provenance, RateLimiter, Result, TrackingExtractor, TrackingInfo,
};

/// Transport returning one canned reply and counting calls
#[derive(Clone, Default)]
struct MockClient {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockClient {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().ok_or(ExtractError::Status {
            status: 500,
            body: "internal error".into(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn reply(number: &str, carrier: &str, confidence: f64, description: &str, merchant: &str) -> String {
    serde_json::json!({
        "tracking_numbers": [{
            "number": number,
            "carrier": carrier,
            "confidence": confidence,
            "description": description,
            "merchant": merchant,
        }]
    })
    .to_string()
}

fn llm_config() -> ExtractorConfig {
    ExtractorConfig {
        enable_llm: true,
        ..ExtractorConfig::default()
    }
}

fn llm_extractor(client: &MockClient) -> TrackingExtractor {
    TrackingExtractor::new(llm_config())
        .with_inference(InferenceExtractor::with_client(client.clone()))
}

fn ups_email() -> EmailContent {
    EmailContent::new(
        "noreply@ups.com",
        "UPS Update: Package Shipped",
        "Your package with tracking number 1Z999AA1234567890 has been shipped.",
    )
}

/// UPS number sent by a merchant rather than the carrier
fn merchant_ups_email() -> EmailContent {
    EmailContent::new(
        "orders@shop.com",
        "Your order has shipped",
        "Your package with tracking number 1Z999AA1234567890 has been shipped.",
    )
}

/// No number the patterns can find
fn headphones_email() -> EmailContent {
    EmailContent::new(
        "orders@bestbuy.com",
        "Your Wireless Headphones have shipped",
        "Your headphones are on the way and will arrive Friday.",
    )
}

fn info(number: &str, carrier: Carrier, confidence: f64, source: Provenance) -> TrackingInfo {
    TrackingInfo {
        number: number.to_string(),
        carrier,
        confidence,
        source,
        description: String::new(),
        merchant: String::new(),
        context: String::new(),
        extracted_at: Utc::now(),
    }
}

// --- Regex pipeline ---

#[tokio::test]
async fn test_ups_email() {
    let extractor = TrackingExtractor::new(ExtractorConfig::default());
    let results = extractor.extract(&ups_email()).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.number, "1Z999AA1234567890");
    assert_eq!(result.carrier, Carrier::Ups);
    assert_eq!(result.source, Provenance::Regex);
    assert!(result.confidence > 0.99);
    assert!(result.context.contains("tracking number"));
    assert!(result.description.is_empty());
}

#[tokio::test]
async fn test_marketplace_code_accepted() {
    let email = EmailContent::new(
        "shipment-tracking@amazon.com",
        "Your package is on the way",
        "Tracking ID: BqPz3RXRS",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    let results = extractor.extract(&email).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].number, "BQPZ3RXRS");
    assert_eq!(results[0].carrier, Carrier::Amazon);
    assert!(results[0].confidence > 0.99);
}

#[tokio::test]
async fn test_marketplace_code_rejected_outside_marketplace() {
    let email = EmailContent::new(
        "orders@shop.com",
        "Your package is on the way",
        "Tracking ID: BqPz3RXRS",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_tracking_numbers() {
    let email = EmailContent::new(
        "news@store.com",
        "Weekly deals",
        "Save big on everything this weekend.",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_html_only_email() {
    let email = EmailContent::new("noreply@ups.com", "UPS Update", "").with_html(
        "<p>Your package with tracking number <b>1Z999AA1234567890</b> has been shipped.</p>",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    let results = extractor.extract(&email).await.unwrap();
    assert_eq!(results[0].number, "1Z999AA1234567890");
}

#[tokio::test]
async fn test_empty_email_yields_nothing() {
    let email = EmailContent::new("noreply@ups.com", "   ", "\n\n");
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_email_skips_inference() {
    let client = MockClient::replying(&reply("9400111899223197428490", "usps", 0.85, "", ""));
    let email = EmailContent::new("orders@shop.com", "", "");

    let results = llm_extractor(&client).extract(&email).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_retailer_order_subject_is_not_marketplace() {
    let email = EmailContent::new(
        "orders@bestbuy.com",
        "Your order of Sony Headphones has shipped",
        "Tracking: HX7K2MQ9PL",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_marketplace_suggestion_beats_standard_carriers() {
    let email = EmailContent::new(
        "shipment-tracking@amazon.com",
        "Your package is on the way",
        "Tracking ID: T1234567890",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    let results = extractor.extract(&email).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].number, "T1234567890");
    assert_eq!(results[0].carrier, Carrier::Amazon);
}

#[tokio::test]
async fn test_unlabeled_code_keeps_standard_order() {
    let email = EmailContent::new(
        "shipment-tracking@amazon.com",
        "Your package is on the way",
        "Your shipment T1234567890 left the warehouse, see tracking for updates.",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    let results = extractor.extract(&email).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].carrier, Carrier::Ups);
}

#[tokio::test]
async fn test_dated_reference_is_not_marketplace_code() {
    let email = EmailContent::new(
        "shipment-tracking@amazon.com",
        "Your package is on the way",
        "Package ref PKG20241115A.",
    );
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_registry_validates_nothing() {
    let extractor = TrackingExtractor::new(ExtractorConfig::default())
        .with_carriers(Arc::new(CarrierRegistry::empty()));

    assert!(extractor.extract(&ups_email()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_generic_label_validated_by_format() {
    let email = EmailContent::new("orders@shop.com", "Shipped", "Tracking: 9400111899223197428490");
    let extractor = TrackingExtractor::new(ExtractorConfig::default());

    let results = extractor.extract(&email).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].carrier, Carrier::Usps);
    assert!((results[0].confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_min_confidence_threshold() {
    let config = ExtractorConfig {
        min_confidence: 0.9,
        ..ExtractorConfig::default()
    };
    let email = EmailContent::new("orders@shop.com", "Shipped", "Tracking: 9400111899223197428490");

    let extractor = TrackingExtractor::new(config);
    assert!(extractor.extract(&email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shared_between_tasks() {
    let extractor = Arc::new(TrackingExtractor::new(ExtractorConfig::default()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let extractor = Arc::clone(&extractor);
            tokio::spawn(async move { extractor.extract(&ups_email()).await })
        })
        .collect();

    for handle in handles {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(results[0].number, "1Z999AA1234567890");
    }
}

// --- Inference fallback ---

#[tokio::test]
async fn test_inference_result_used() {
    let client = MockClient::replying(&reply(
        "9400111899223197428490",
        "usps",
        0.85,
        "Headphones",
        "Best Buy",
    ));
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&headphones_email()).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.number, "9400111899223197428490");
    assert_eq!(result.carrier, Carrier::Usps);
    assert_eq!(result.source, Provenance::Llm);
    assert_eq!(result.description, "Headphones from Best Buy");
    assert!((result.confidence - 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn test_inference_description_falls_back_to_subject() {
    let client = MockClient::replying(&reply("9400111899223197428490", "usps", 0.85, "", ""));
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&headphones_email()).await.unwrap();

    assert_eq!(results[0].description, "Wireless Headphones");
}

#[tokio::test]
async fn test_inference_not_called_when_llm_disabled() {
    let client = MockClient::replying(&reply("9400111899223197428490", "usps", 0.85, "", ""));
    let extractor = TrackingExtractor::new(ExtractorConfig::default())
        .with_inference(InferenceExtractor::with_client(client.clone()));

    assert!(extractor.extract(&headphones_email()).await.unwrap().is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_confident_carrier_email_skips_inference() {
    let client = MockClient::default();
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&ups_email()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_inference_failure_is_soft() {
    let client = MockClient::default();
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&merchant_ups_email()).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, Provenance::Regex);
}

#[tokio::test]
async fn test_inference_merges_into_hybrid() {
    let client = MockClient::replying(&reply(
        "1Z999AA1234567890",
        "ups",
        0.9,
        "Running Shoes",
        "Nike",
    ));
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&merchant_ups_email()).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.source, Provenance::Hybrid);
    assert_eq!(result.carrier, Carrier::Ups);
    assert!(result.confidence > 0.99);
    assert_eq!(result.description, "Running Shoes from Nike");
}

#[tokio::test]
async fn test_hybrid_validation_drops_carrier_mismatch() {
    let client = MockClient::replying(&reply("1Z999AA1234567890", "fedex", 0.9, "", ""));
    let extractor = llm_extractor(&client);

    assert!(extractor.extract(&headphones_email()).await.unwrap().is_empty());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_hybrid_validation_can_be_disabled() {
    let client = MockClient::replying(&reply("1Z999AA1234567890", "fedex", 0.9, "", ""));
    let config = ExtractorConfig {
        use_hybrid_validation: false,
        ..llm_config()
    };
    let extractor = TrackingExtractor::new(config)
        .with_inference(InferenceExtractor::with_client(client.clone()));

    let results = extractor.extract(&headphones_email()).await.unwrap();
    assert_eq!(results[0].carrier, Carrier::Fedex);
}

#[tokio::test]
async fn test_unknown_inference_carrier_resolved() {
    let client = MockClient::replying(&reply("1Z999AA1234567890", "", 0.9, "", ""));
    let extractor = llm_extractor(&client);

    let results = extractor.extract(&headphones_email()).await.unwrap();
    assert_eq!(results[0].carrier, Carrier::Ups);
}

#[tokio::test]
async fn test_rate_limiter_denies_second_call() {
    let client = MockClient::replying(&reply("9400111899223197428490", "usps", 0.85, "", ""));
    let limiter = Arc::new(RateLimiter::new(
        1,
        Duration::from_secs(60),
        Duration::ZERO,
    ));
    let extractor = llm_extractor(&client).with_rate_limiter(limiter);

    let first = extractor.extract(&headphones_email()).await.unwrap();
    let second = extractor.extract(&headphones_email()).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(client.calls(), 1);
}

#[test]
fn test_rate_limited_error_message() {
    let err = ExtractError::RateLimited {
        wait: Duration::from_secs(5),
    };
    assert_eq!(err.to_string(), "Rate limit exceeded, retry in 5s");
}

// --- validate_inference_results ---

#[test]
fn test_validate_inference_results_marketplace() {
    let extractor = TrackingExtractor::new(ExtractorConfig::default());
    let results = vec![info("BQPZ3RXRS", Carrier::Amazon, 0.8, Provenance::Llm)];

    let kept = extractor.validate_inference_results(results.clone(), Some(Carrier::Amazon));
    assert_eq!(kept.len(), 1);

    let kept = extractor.validate_inference_results(results, None);
    assert!(kept.is_empty());
}

// --- should_use_inference ---

#[test]
fn test_should_use_inference() {
    let extractor = llm_extractor(&MockClient::default());
    let confident = vec![info("1Z999AA1234567890", Carrier::Ups, 0.95, Provenance::Regex)];
    let weak = vec![info("1Z999AA1234567890", Carrier::Ups, 0.6, Provenance::Regex)];

    assert!(!extractor.should_use_inference(&confident, &ups_email()));
    assert!(extractor.should_use_inference(&[], &ups_email()));
    assert!(extractor.should_use_inference(&weak, &ups_email()));
    assert!(extractor.should_use_inference(&confident, &merchant_ups_email()));

    let table = ups_email().with_html("<table><tr><td>1Z999AA1234567890</td></tr></table>");
    assert!(extractor.should_use_inference(&confident, &table));
}

#[test]
fn test_should_use_inference_requires_enabled_backend() {
    let config_off = TrackingExtractor::new(ExtractorConfig::default())
        .with_inference(InferenceExtractor::with_client(MockClient::default()));
    assert!(!config_off.should_use_inference(&[], &ups_email()));

    let backend_off = TrackingExtractor::new(llm_config());
    assert!(!backend_off.should_use_inference(&[], &ups_email()));
}

// --- is_complex_email ---

#[test]
fn test_is_complex_email() {
    assert!(!is_complex_email(&ups_email()));

    let html_heavy = EmailContent::new("a@b.com", "s", "short").with_html("<div>".repeat(10));
    assert!(is_complex_email(&html_heavy));

    let table = EmailContent::new("a@b.com", "s", "x".repeat(200)).with_html("<TABLE></TABLE>");
    assert!(is_complex_email(&table));

    let long = EmailContent::new("a@b.com", "s", "x".repeat(10_001));
    assert!(is_complex_email(&long));
}

// --- validation_order ---

#[test]
fn test_validation_order_default() {
    assert_eq!(
        validation_order(None, &[]),
        vec![
            Carrier::Ups,
            Carrier::Usps,
            Carrier::Fedex,
            Carrier::Dhl,
            Carrier::Ontrac,
            Carrier::Lasership,
            Carrier::Amazon,
        ]
    );
}

#[test]
fn test_validation_order_suggested_and_hinted() {
    assert_eq!(
        validation_order(Some(Carrier::Fedex), &[Carrier::Amazon, Carrier::Dhl]),
        vec![
            Carrier::Fedex,
            Carrier::Dhl,
            Carrier::Ups,
            Carrier::Usps,
            Carrier::Ontrac,
            Carrier::Lasership,
            Carrier::Amazon,
        ]
    );
}

#[test]
fn test_validation_order_skips_unknown() {
    let order = validation_order(Some(Carrier::Unknown), &[Carrier::Unknown]);
    assert!(!order.contains(&Carrier::Unknown));
    assert_eq!(order.len(), 7);
}

// --- merge_results ---

#[test]
fn test_merge_same_source_keeps_higher() {
    let merged = merge_results(
        vec![
            info("1Z999AA1234567890", Carrier::Ups, 0.6, Provenance::Regex),
            info("1Z999AA1234567890", Carrier::Ups, 0.8, Provenance::Regex),
        ],
        Vec::new(),
    );

    assert_eq!(merged.len(), 1);
    assert!((merged[0].confidence - 0.8).abs() < 1e-9);
    assert_eq!(merged[0].source, Provenance::Regex);
}

#[test]
fn test_merge_across_sources_is_hybrid() {
    let regex = vec![info("1Z999AA1234567890", Carrier::Ups, 0.7, Provenance::Regex)];
    let mut llm = info("1Z999AA1234567890", Carrier::Ups, 0.9, Provenance::Llm);
    llm.description = "Shoes".into();
    llm.merchant = "Nike".into();

    let merged = merge_results(regex, vec![llm]);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source, Provenance::Hybrid);
    assert!((merged[0].confidence - 0.9).abs() < 1e-9);
    assert_eq!(merged[0].description, "Shoes");
    assert_eq!(merged[0].merchant, "Nike");
}

#[test]
fn test_merge_keeps_regex_description_when_more_confident() {
    let mut regex = info("1Z999AA1234567890", Carrier::Ups, 0.95, Provenance::Regex);
    regex.description = "Boots".into();
    let mut llm = info("1Z999AA1234567890", Carrier::Ups, 0.8, Provenance::Llm);
    llm.description = "Shoes".into();
    llm.merchant = "Nike".into();

    let merged = merge_results(vec![regex], vec![llm]);

    assert_eq!(merged[0].description, "Boots");
    assert_eq!(merged[0].merchant, "Nike");
    assert!((merged[0].confidence - 0.95).abs() < 1e-9);
}

#[test]
fn test_merge_distinct_carriers_stay_separate() {
    let merged = merge_results(
        vec![info("123456789012", Carrier::Fedex, 0.7, Provenance::Regex)],
        vec![info("123456789012", Carrier::Unknown, 0.6, Provenance::Llm)],
    );
    assert_eq!(merged.len(), 2);
}

// --- Descriptions ---

#[test]
fn test_format_description() {
    assert_eq!(format_description("Shoes", "Nike"), "Shoes from Nike");
    assert_eq!(format_description("", "Nike"), "Package from Nike");
    assert_eq!(format_description(" Shoes ", " "), "Shoes");
    assert_eq!(format_description("", ""), "");
}

#[test]
fn test_description_from_subject() {
    assert_eq!(
        description_from_subject("Shipped: \"Anker USB-C Charger 65W\""),
        "Anker USB-C Charger 65W"
    );
    assert_eq!(
        description_from_subject("Delivered: Kindle Paperwhite (16 GB)..."),
        "Kindle Paperwhite (16 GB)"
    );
    assert_eq!(
        description_from_subject("Your Wireless Headphones have shipped"),
        "Wireless Headphones"
    );
    assert_eq!(description_from_subject("Your Amazon order has shipped"), "");
    assert_eq!(description_from_subject("Your package has been shipped"), "");
    assert_eq!(description_from_subject("Weekly deals"), "");
}
