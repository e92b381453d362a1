//! Scalar property values attached to items.
//!
//! # Responsibility
//! - Represent caller-defined properties as a closed tagged union.
//! - Keep timestamp precision (date / local date-time / zoned date-time)
//!   next to the exact text the timestamp was written with.
//!
//! # Invariants
//! - Property maps are flat: a value is never a map or a list.
//! - `Timestamp::parse(raw).as_str() == raw` for every accepted `raw`.
//! - Filter matching compares timestamps by [`Timestamp::canonical`] and
//!   integers exactly.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Flat property map. Sorted by key so every rendering is deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Parsed point in time with the precision it was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampValue {
    /// Calendar date only, e.g. `2026-01-13`.
    Date(NaiveDate),
    /// Date-time without offset, e.g. `2026-01-13T14:30:00`.
    Local(NaiveDateTime),
    /// Date-time with offset, e.g. `2026-01-13T14:30:00Z`.
    Zoned(DateTime<FixedOffset>),
}

/// ISO-8601 timestamp property.
///
/// Keeps the caller's text verbatim; the parsed value drives humanized
/// rendering and filter equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    text: String,
    value: TimestampValue,
}

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl Timestamp {
    /// Parses ISO-8601 text. Returns `None` for anything that is not a date
    /// or date-time.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = parse_value(raw.trim())?;
        Some(Self {
            text: raw.to_string(),
            value,
        })
    }

    /// Timestamp for an offset date-time produced by this process.
    pub fn from_zoned(zoned: DateTime<FixedOffset>) -> Self {
        Self {
            text: zoned.to_rfc3339(),
            value: TimestampValue::Zoned(zoned),
        }
    }

    /// The text this timestamp was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> TimestampValue {
        self.value
    }

    /// Normalized form used for exact filtering. Two spellings of the same
    /// date, local date-time or offset date-time share one canonical form.
    pub fn canonical(&self) -> String {
        match self.value {
            TimestampValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            TimestampValue::Local(local) => local.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            TimestampValue::Zoned(zoned) => zoned.to_rfc3339(),
        }
    }

    /// Long human-readable form used in searchable text.
    ///
    /// Dates render as `Tuesday January 13 2026`; date-times add
    /// ` at 2:30 PM` in their own offset.
    pub fn humanize(&self) -> String {
        const DATE: &str = "%A %B %-d %Y";
        const DATE_TIME: &str = "%A %B %-d %Y at %-I:%M %p";
        match self.value {
            TimestampValue::Date(date) => date.format(DATE).to_string(),
            TimestampValue::Local(local) => local.format(DATE_TIME).to_string(),
            TimestampValue::Zoned(zoned) => zoned.format(DATE_TIME).to_string(),
        }
    }
}

fn parse_value(text: &str) -> Option<TimestampValue> {
    if text.len() < 10 {
        return None;
    }

    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Some(TimestampValue::Zoned(zoned));
    }

    for format in LOCAL_FORMATS {
        if let Ok(local) = NaiveDateTime::parse_from_str(text, format) {
            return Some(TimestampValue::Local(local));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(TimestampValue::Date)
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// One scalar property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(Timestamp),
}

impl PropertyValue {
    /// Stable storage tag for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Machine-formatted value text, paired with [`PropertyValue::kind`] in
    /// backend metadata.
    pub fn to_raw(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Timestamp(value) => value.as_str().to_string(),
        }
    }

    /// Text compared by exact filters for non-numeric kinds. Equals
    /// [`PropertyValue::to_raw`] except for timestamps, which use their
    /// canonical form.
    pub fn match_text(&self) -> String {
        match self {
            Self::Timestamp(value) => value.canonical(),
            other => other.to_raw(),
        }
    }

    /// Rebuilds a value from its stored `(kind, raw)` pair.
    ///
    /// Returns `None` when the pair is inconsistent (unknown kind or
    /// unparsable raw text).
    pub fn from_raw(kind: &str, raw: &str) -> Option<Self> {
        match kind {
            "text" => Some(Self::Text(raw.to_string())),
            "integer" => raw.parse().ok().map(Self::Integer),
            "float" => raw.parse().ok().map(Self::Float),
            "bool" => match raw {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
            "timestamp" => Timestamp::parse(raw).map(Self::Timestamp),
            _ => None,
        }
    }

    /// Exact-match semantics used by property filters: same variant and same
    /// value, except integers and floats compare numerically and timestamps
    /// compare by their canonical form.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left == right,
            (Self::Integer(integer), Self::Float(float))
            | (Self::Float(float), Self::Integer(integer)) => float_equals_integer(*float, *integer),
            (Self::Timestamp(left), Self::Timestamp(right)) => {
                left.canonical() == right.canonical()
            }
            _ => self == other,
        }
    }
}

/// Exact comparison without rounding the integer through `f64`.
fn float_equals_integer(float: f64, integer: i64) -> bool {
    // 2^63 is exactly representable; `i64::MAX as f64` rounds up to it.
    const UPPER: f64 = 9_223_372_036_854_775_808.0;
    float.fract() == 0.0 && float >= i64::MIN as f64 && float < UPPER && float as i64 == integer
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Timestamp> for PropertyValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

/// Serialized as plain JSON scalars; timestamps keep their original text.
impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => serializer.serialize_str(value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Timestamp(value) => serializer.serialize_str(value.as_str()),
        }
    }
}
