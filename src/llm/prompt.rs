//! Prompt construction for the inference service

/// Body budget for tracking-number prompts
pub const TRACKING_BODY_LIMIT: usize = 2000;

/// Body budget for description-only prompts
pub const DESCRIPTION_BODY_LIMIT: usize = 1500;

const FEW_SHOT_EXAMPLES: &str = r#"Example 1:
From: pkginfo@ups.com
Subject: UPS Update: Package Scheduled for Delivery Today
Body: Your package 1Z999AA10123456784 from Best Buy is out for delivery.
Output: {"tracking_numbers": [{"number": "1Z999AA10123456784", "carrier": "ups", "confidence": 0.95, "description": "Electronics", "merchant": "Best Buy"}]}

Example 2:
From: shipment-tracking@amazon.com
Subject: Shipped: "Anker USB-C Charger 65W"
Body: Your package is on the way. Carrier: Amazon Logistics. Tracking ID: TBA123456789012
Output: {"tracking_numbers": [{"number": "TBA123456789012", "carrier": "amazon", "confidence": 0.9, "description": "Anker USB-C Charger 65W", "merchant": "Amazon"}]}

Example 3:
From: newsletter@store.example
Subject: Weekly deals
Body: Save 20% on everything this weekend.
Output: {"tracking_numbers": []}"#;

const ELLIPSIS: &str = "...";

/// Truncate to at most `limit` characters, ending in an ellipsis when cut
#[must_use]
pub fn truncate_body(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let cut: String = body
        .chars()
        .take(limit.saturating_sub(ELLIPSIS.len()))
        .collect();
    format!("{cut}{ELLIPSIS}")
}

/// Prompt asking for every tracking number in the email
#[must_use]
pub fn build_tracking_prompt(from: &str, subject: &str, body: &str) -> String {
    let body = truncate_body(body, TRACKING_BODY_LIMIT);
    format!(
        r#"You extract shipment tracking numbers from emails.

Find every package tracking number in the email below. For each one report
the carrier (one of: ups, usps, fedex, dhl, amazon, ontrac, lasership,
unknown), your confidence between 0 and 1, a short description of the
product shipped, and the merchant that sold it. Order numbers, phone numbers
and dates are not tracking numbers.

Respond with JSON only, in exactly this shape:
{{"tracking_numbers": [{{"number": "...", "carrier": "...", "confidence": 0.0, "description": "...", "merchant": "..."}}]}}

{FEW_SHOT_EXAMPLES}

Email:
From: {from}
Subject: {subject}
Body: {body}
Output:"#
    )
}

/// Prompt asking only for the product description and merchant
#[must_use]
pub fn build_description_prompt(from: &str, subject: &str, body: &str) -> String {
    let body = truncate_body(body, DESCRIPTION_BODY_LIMIT);
    format!(
        r#"Identify the product shipped in this order email and the merchant that sold it.
Keep the description under 80 characters. Use an empty string when unknown.

Respond with JSON only, in exactly this shape:
{{"description": "...", "merchant": "...", "confidence": 0.0}}

Email:
From: {from}
Subject: {subject}
Body: {body}
Output:"#
    )
}
