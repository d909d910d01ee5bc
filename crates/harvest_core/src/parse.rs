//! Raw-text parsers applied to attribute values read from the view.
//!
//! Parsers never fail: anything they cannot interpret becomes
//! [`FieldValue::Absent`] and the strategy chain moves on.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::FieldValue;

lazy_static! {
    static ref DECIMAL_REGEX: Regex = Regex::new(r"\d+(?:\.\d+)?").expect("decimal regex");
    static ref PAREN_COUNT_REGEX: Regex =
        Regex::new(r"\((\d{1,3}(?:,\d{3})+|\d+)\)").expect("parenthesised count regex");
    static ref COUNT_REGEX: Regex =
        Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").expect("count regex");
    static ref PHONE_CANDIDATE_REGEX: Regex =
        Regex::new(r"\+?\(?\d[\d\s().-]{7,}\d").expect("phone candidate regex");
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex");
}

/// Label prefixes stripped before searching for a phone number.
const PHONE_PREFIXES: &[&str] = &["tel:", "phone:", "call", "mobile:"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parse {
    /// Trimmed text as-is.
    Text,
    /// First decimal number, e.g. `"4.6 stars"` → `4.6`.
    FirstDecimal,
    /// Review-style count: parenthesised number first, then any number;
    /// thousands separators removed.
    FirstInteger,
    /// Text before the first occurrence of the marker, e.g. the name part
    /// of `"Blue Door 4.5 stars"`.
    BeforeMarker(String),
    /// First phone-like digit run, returned as written.
    PhoneText,
    /// First email address, `mailto:` links included.
    EmailText,
    /// Absolute http(s) URL.
    Url,
}

impl Parse {
    pub fn apply(&self, raw: &str) -> FieldValue {
        let raw = raw.trim();
        match self {
            Parse::Text => FieldValue::text(collapse_whitespace(raw)),
            Parse::FirstDecimal => first_decimal(raw)
                .map(FieldValue::Float)
                .unwrap_or_default(),
            Parse::FirstInteger => first_count(raw)
                .map(FieldValue::Integer)
                .unwrap_or_default(),
            Parse::BeforeMarker(marker) => before_marker(raw, marker)
                .map(FieldValue::Text)
                .unwrap_or_default(),
            Parse::PhoneText => find_phone_candidate(raw)
                .map(FieldValue::Text)
                .unwrap_or_default(),
            Parse::EmailText => find_email(raw).map(FieldValue::Text).unwrap_or_default(),
            Parse::Url => absolute_url(raw).map(FieldValue::Text).unwrap_or_default(),
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn first_decimal(text: &str) -> Option<f64> {
    DECIMAL_REGEX
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn first_count(text: &str) -> Option<i64> {
    let matched = PAREN_COUNT_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .or_else(|| COUNT_REGEX.find(text))?;
    matched.as_str().replace(',', "").parse::<i64>().ok()
}

fn before_marker(text: &str, marker: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let marker = marker.to_lowercase();
    let head = match lower.find(&marker) {
        // Lower-casing can shift byte offsets for non-ASCII text.
        Some(idx) if text.is_char_boundary(idx) && lower.len() == text.len() => &text[..idx],
        Some(_) => return None,
        None => text,
    };
    let head = collapse_whitespace(head);
    if head.is_empty() {
        None
    } else {
        Some(head)
    }
}

/// Finds the first phone-like run of digits with at least ten digits.
pub fn find_phone_candidate(text: &str) -> Option<String> {
    let mut cleaned = text.trim();
    for prefix in PHONE_PREFIXES {
        let matches = cleaned
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            cleaned = cleaned[prefix.len()..].trim_start();
        }
    }
    PHONE_CANDIDATE_REGEX
        .find_iter(cleaned)
        .map(|m| m.as_str().trim())
        .find(|candidate| digit_count(candidate) >= 10)
        .map(ToOwned::to_owned)
}

pub fn find_email(text: &str) -> Option<String> {
    let text = text.trim();
    let text = text
        .get(..7)
        .filter(|head| head.eq_ignore_ascii_case("mailto:"))
        .map(|_| &text[7..])
        .unwrap_or(text);
    EMAIL_REGEX.find(text).map(|m| m.as_str().to_string())
}

fn absolute_url(text: &str) -> Option<String> {
    let url = Url::parse(text).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

pub fn digit_count(text: &str) -> usize {
    text.chars().filter(char::is_ascii_digit).count()
}
