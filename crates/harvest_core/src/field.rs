use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ItemReference;

/// Name recorded by sources when no real name could be read.
pub const UNKNOWN_NAME: &str = "Unknown Business";

/// A typed optional scalar. `Absent` ("not found") is distinct from
/// `Text("")` ("found empty").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Absent,
    Integer(i64),
    Float(f64),
    Text(String),
    Structured(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or_default()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Absent => write!(f, "-"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Text(text) => write!(f, "{text}"),
            FieldValue::Structured(map) => {
                let mut first = true;
                for (key, value) in map {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}={value}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// Field categories of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Name,
    Address,
    Rating,
    ReviewCount,
    Category,
    Website,
    Phone,
    Email,
    Hours,
    SourceReference,
    QueryContext,
}

impl FieldKey {
    pub const ALL: [FieldKey; 11] = [
        FieldKey::Name,
        FieldKey::Address,
        FieldKey::Rating,
        FieldKey::ReviewCount,
        FieldKey::Category,
        FieldKey::Website,
        FieldKey::Phone,
        FieldKey::Email,
        FieldKey::Hours,
        FieldKey::SourceReference,
        FieldKey::QueryContext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Name => "name",
            FieldKey::Address => "address",
            FieldKey::Rating => "rating",
            FieldKey::ReviewCount => "review_count",
            FieldKey::Category => "category",
            FieldKey::Website => "website",
            FieldKey::Phone => "phone",
            FieldKey::Email => "email",
            FieldKey::Hours => "hours",
            FieldKey::SourceReference => "source_reference",
            FieldKey::QueryContext => "query_context",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat key/value mapping of one extracted item. Every key is present;
/// missing values are [`FieldValue::Absent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<FieldKey, FieldValue>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    pub fn new() -> Self {
        let fields = FieldKey::ALL
            .iter()
            .map(|key| (*key, FieldValue::Absent))
            .collect();
        Self { fields }
    }

    pub fn for_reference(reference: &ItemReference, query: &str) -> Self {
        let mut record = Self::new();
        record.set(FieldKey::SourceReference, FieldValue::text(reference.as_str()));
        if !query.trim().is_empty() {
            record.set(FieldKey::QueryContext, FieldValue::text(query.trim()));
        }
        record
    }

    pub fn get(&self, key: FieldKey) -> &FieldValue {
        // Constructed with every key, so the lookup cannot miss.
        static ABSENT: FieldValue = FieldValue::Absent;
        self.fields.get(&key).unwrap_or(&ABSENT)
    }

    pub fn set(&mut self, key: FieldKey, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub fn with(mut self, key: FieldKey, value: FieldValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (*key, value))
    }

    pub fn name(&self) -> Option<&str> {
        self.get(FieldKey::Name).as_text()
    }

    /// A record is useful when its name is present, non-empty and not a
    /// placeholder for an unknown item.
    pub fn is_useful(&self) -> bool {
        match self.name().map(str::trim) {
            Some(name) => !name.is_empty() && !is_sentinel_name(name),
            None => false,
        }
    }

    /// True when a phone number or an email address was found.
    pub fn has_contact(&self) -> bool {
        self.get(FieldKey::Phone).is_present() || self.get(FieldKey::Email).is_present()
    }
}

fn is_sentinel_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(UNKNOWN_NAME) || name.eq_ignore_ascii_case("unknown")
}
