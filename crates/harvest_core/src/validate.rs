use serde::{Deserialize, Serialize};
use url::Url;

use crate::parse::digit_count;
use crate::{FieldValue, PhoneNormalizer};

/// Tokens that mark free text as a street address.
const STREET_TOKENS: &[&str] = &[
    "street", "st", "avenue", "ave", "road", "rd", "lane", "ln", "boulevard", "blvd", "drive",
    "dr", "highway", "hwy", "nagar", "marg",
];

/// Category-specific acceptance test for a parsed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Validity {
    /// Any present value, including empty text.
    Present,
    /// Non-blank text.
    NonEmpty,
    /// Trimmed text with at least this many characters.
    MinChars(usize),
    /// Longer than five characters and containing a digit or a street token.
    Address,
    /// Numeric value within the inclusive range.
    Rating { min: f64, max: f64 },
    /// Non-negative integer.
    Count,
    /// Canonical `+<digits>` number with at least ten digits. Candidates
    /// pass through [`Validity::refine`] first, so raw text that does not
    /// normalize never wins.
    Phone,
    /// `local@domain.tld`.
    Email,
    /// http(s) URL whose host contains none of the excluded fragments.
    Website { excluded: Vec<String> },
}

impl Validity {
    /// Canonicalizes a parsed candidate before it is judged. Only phone
    /// numbers are rewritten.
    pub fn refine(&self, value: FieldValue, phones: &PhoneNormalizer) -> FieldValue {
        if let (Validity::Phone, FieldValue::Text(raw)) = (self, &value) {
            return phones.normalize(raw);
        }
        value
    }

    pub fn accepts(&self, value: &FieldValue) -> bool {
        match self {
            Validity::Present => value.is_present(),
            Validity::NonEmpty => value.as_text().is_some_and(|text| !text.trim().is_empty()),
            Validity::MinChars(min) => value
                .as_text()
                .is_some_and(|text| text.trim().chars().count() >= *min),
            Validity::Address => value.as_text().is_some_and(looks_like_address),
            Validity::Rating { min, max } => value
                .as_f64()
                .is_some_and(|rating| rating.is_finite() && rating >= *min && rating <= *max),
            Validity::Count => value.as_i64().is_some_and(|count| count >= 0),
            Validity::Phone => value.as_text().is_some_and(is_canonical_phone),
            Validity::Email => value.as_text().is_some_and(looks_like_email),
            Validity::Website { excluded } => value
                .as_text()
                .is_some_and(|text| is_external_website(text, excluded)),
        }
    }
}

fn looks_like_address(text: &str) -> bool {
    let text = text.trim();
    if text.chars().count() <= 5 {
        return false;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| STREET_TOKENS.contains(&word))
}

fn is_canonical_phone(text: &str) -> bool {
    text.strip_prefix('+').is_some_and(|digits| {
        digits.chars().all(|c| c.is_ascii_digit()) && digit_count(digits) >= 10
    })
}

fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
}

fn is_external_website(text: &str, excluded: &[String]) -> bool {
    let Ok(url) = Url::parse(text.trim()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    !excluded
        .iter()
        .any(|fragment| host.contains(&fragment.to_ascii_lowercase()))
}
