//! Raw RFC 5322 email to pipeline input

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{ExtractError, Result};
use crate::types::EmailContent;

static NUMERIC_ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").unwrap());

/// Parse raw email bytes into [`EmailContent`]
pub fn parse_email(raw: &[u8]) -> Result<EmailContent> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| ExtractError::Parse(e.to_string()))?;
    let headers = &parsed.headers;

    let from = header_value(headers, "from").unwrap_or_default();
    let subject = header_value(headers, "subject").unwrap_or_default();
    let message_id = header_value(headers, "message-id").unwrap_or_default();
    let thread_id = extract_thread_id(headers).unwrap_or_else(|| message_id.clone());
    let date = extract_date(headers);
    let (plain_text, html_text) = extract_body_parts(&parsed);

    debug!(
        plain_len = plain_text.len(),
        html_len = html_text.len(),
        "Parsed email"
    );

    Ok(EmailContent {
        from,
        subject,
        plain_text,
        html_text,
        message_id,
        thread_id,
        date,
    })
}

fn header_value(headers: &[mailparse::MailHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.get_key().eq_ignore_ascii_case(name))
        .map(|h| h.get_value().trim().to_string())
}

/// First `References` entry, else `In-Reply-To`
fn extract_thread_id(headers: &[mailparse::MailHeader]) -> Option<String> {
    header_value(headers, "references")
        .and_then(|refs| refs.split_whitespace().next().map(str::to_string))
        .or_else(|| header_value(headers, "in-reply-to"))
        .filter(|id| !id.is_empty())
}

fn extract_date(headers: &[mailparse::MailHeader]) -> DateTime<Utc> {
    header_value(headers, "date")
        .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

fn extract_body_parts(parsed: &mailparse::ParsedMail) -> (String, String) {
    let mut text = String::new();
    let mut html = String::new();

    if parsed.subparts.is_empty() {
        let content_type = parsed.ctype.mimetype.to_lowercase();
        if let Ok(body) = parsed.get_body() {
            if content_type.contains("text/html") {
                html = body;
            } else {
                text = body;
            }
        }
    } else {
        extract_body_recursive(parsed, &mut text, &mut html);
    }

    (text, html)
}

fn extract_body_recursive(parsed: &mailparse::ParsedMail, text: &mut String, html: &mut String) {
    for part in &parsed.subparts {
        let content_type = part.ctype.mimetype.to_lowercase();

        if part.subparts.is_empty() {
            if let Ok(body) = part.get_body() {
                if content_type.contains("text/plain") && text.is_empty() {
                    *text = body;
                } else if content_type.contains("text/html") && html.is_empty() {
                    *html = body;
                }
            }
        } else {
            extract_body_recursive(part, text, html);
        }
    }
}

/// Convert HTML to plain text without executing anything
///
/// Drops `<script>` and `<style>` content, breaks lines after block
/// elements and table cells, and decodes entities.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let mut result = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_start_idx: usize = 0;

    let lower_chars: Vec<char> = html.to_lowercase().chars().collect();
    let chars: Vec<char> = html.chars().collect();

    // Lower-casing can change the char count for a few scripts
    if lower_chars.len() != chars.len() {
        return html_to_text_fallback(html);
    }

    let mut i = 0;
    while i < chars.len() {
        if !in_tag && chars[i] == '<' {
            tag_start_idx = i;
            let remaining: String = lower_chars[i..chars.len().min(i + 9)].iter().collect();
            if remaining.starts_with("<script") {
                in_script = true;
            } else if remaining.starts_with("<style") {
                in_style = true;
            } else if remaining.starts_with("</script") {
                in_script = false;
            } else if remaining.starts_with("</style") {
                in_style = false;
            }
            in_tag = true;
        } else if in_tag && chars[i] == '>' {
            in_tag = false;
            let tag_content: String = lower_chars[tag_start_idx + 1..i].iter().collect();
            if is_block_boundary(&tag_content) {
                result.push('\n');
            } else if tag_content.starts_with("/td") || tag_content.starts_with("/th") {
                result.push_str(" | ");
            }
        } else if !in_tag && !in_script && !in_style {
            result.push(chars[i]);
        }
        i += 1;
    }

    clean_lines(&decode_entities(&result))
}

fn is_block_boundary(tag: &str) -> bool {
    ["br", "/p", "/div", "/li", "/h", "/tr", "/table", "p "]
        .iter()
        .any(|prefix| tag.starts_with(prefix))
        || tag == "p"
}

fn html_to_text_fallback(html: &str) -> String {
    static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]*>").unwrap()
    });
    clean_lines(&decode_entities(&TAG_REGEX.replace_all(html, "\n")))
}

/// Decode the common named entities and all numeric ones
#[must_use]
pub fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&reg;", "\u{AE}")
        .replace("&trade;", "\u{2122}")
        .replace("&copy;", "\u{A9}");

    let numeric = NUMERIC_ENTITY_REGEX.replace_all(&named, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = code
            .strip_prefix('x')
            .map_or_else(|| code.parse::<u32>().ok(), |hex| u32::from_str_radix(hex, 16).ok());
        value
            .and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), |c| c.to_string())
    });

    // `&amp;` last so encoded entities are not decoded twice
    numeric.replace("&amp;", "&")
}

fn clean_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
