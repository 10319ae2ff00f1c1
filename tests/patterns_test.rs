use tracking_extract::patterns::context_window;
use tracking_extract::{Carrier, ExtractionMethod, PatternCatalog};

#[test]
fn test_every_known_carrier_has_rules() {
    let catalog = PatternCatalog::new();
    for carrier in Carrier::ALL {
        assert!(
            !catalog.entries(carrier).is_empty(),
            "{carrier} has no rules"
        );
    }
}

#[test]
fn test_unknown_carrier_yields_nothing() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_for_carrier("1Z999AA1234567890", Carrier::Unknown);
    assert!(found.is_empty());
}

#[test]
fn test_entries_carry_their_carrier() {
    let catalog = PatternCatalog::new();
    for carrier in Carrier::ALL {
        assert!(
            catalog
                .entries(carrier)
                .iter()
                .all(|e| e.carrier == Some(carrier))
        );
    }
    assert!(catalog.generic_entries().iter().all(|e| e.carrier.is_none()));
}

#[test]
fn test_ups_direct_match() {
    let catalog = PatternCatalog::new();
    let text = "Your package 1Z999AA1234567890 has shipped.";

    let found = catalog.extract_for_carrier(text, Carrier::Ups);
    let direct = found
        .iter()
        .find(|c| c.method == ExtractionMethod::Direct)
        .unwrap();

    assert_eq!(direct.text, "1Z999AA1234567890");
    assert_eq!(direct.position, text.find("1Z").unwrap());
    assert_eq!(direct.carrier, Some(Carrier::Ups));
    assert!((direct.confidence - 0.95).abs() < f64::EPSILON);
}

#[test]
fn test_ups_spaced_match() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_for_carrier("Tracking: 1Z 999 AA1 23 4567 890", Carrier::Ups);

    assert!(
        found
            .iter()
            .any(|c| c.method == ExtractionMethod::Spaced && c.text == "1Z 999 AA1 23 4567 890")
    );
}

#[test]
fn test_usps_grouped_digits() {
    let catalog = PatternCatalog::new();
    let found =
        catalog.extract_for_carrier("USPS tracking 9400 1118 9922 3197 4284 90", Carrier::Usps);

    assert!(found.iter().any(|c| c.text == "9400 1118 9922 3197 4284 90"));
}

#[test]
fn test_fedex_contextual_match() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_for_carrier("FedEx tracking number: 123456789012", Carrier::Fedex);

    let contextual = found
        .iter()
        .find(|c| c.method == ExtractionMethod::Contextual)
        .unwrap();
    assert_eq!(contextual.text, "123456789012");
}

#[test]
fn test_amazon_labeled_code() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_for_carrier("Tracking ID: BqPz3RXRS", Carrier::Amazon);

    let labeled = found
        .iter()
        .find(|c| c.method == ExtractionMethod::Labeled)
        .unwrap();
    assert_eq!(labeled.text, "BqPz3RXRS");
    assert_eq!(labeled.carrier, Some(Carrier::Amazon));
}

#[test]
fn test_generic_labeled_match() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_generic("Your tracking number is: ABC1234567XYZ");

    assert!(
        found
            .iter()
            .any(|c| c.text == "ABC1234567XYZ" && c.method == ExtractionMethod::Labeled)
    );
}

#[test]
fn test_generic_table_cell() {
    let catalog = PatternCatalog::new();
    let found = catalog.extract_generic("<tr><td>Tracking</td><td> 9261290100130435082427 </td></tr>");

    assert!(
        found
            .iter()
            .any(|c| c.text == "9261290100130435082427" && c.method == ExtractionMethod::Table)
    );
}

#[test]
fn test_no_match_is_empty() {
    let catalog = PatternCatalog::new();
    assert!(catalog.extract_generic("Lunch at noon tomorrow?").is_empty());
    assert!(catalog.extract_for_carrier("", Carrier::Dhl).is_empty());
}

// --- context_window ---

#[test]
fn test_context_window_collapses_whitespace() {
    let text = "Order   shipped.\n\nTracking:\t1Z999AA1234567890\nThanks";
    let start = text.find("1Z").unwrap();

    let context = context_window(text, start, start + 18);

    assert_eq!(context, "Order shipped. Tracking: 1Z999AA1234567890 Thanks");
}

#[test]
fn test_context_window_respects_char_boundaries() {
    let text = format!("{}1Z999AA1234567890", "\u{e9}".repeat(40));
    let start = text.find("1Z").unwrap();

    let context = context_window(&text, start, text.len());

    assert!(context.ends_with("1Z999AA1234567890"));
}
