//! Embeds properties into searchable text and strips them on read.
//!
//! # Responsibility
//! - `encode`: append a delimited `label: value` block to item content.
//! - `decode`: return the original content with the block removed.
//! - Validate property maps at the JSON boundary and before encoding.
//!
//! # Invariants
//! - `decode(&encode(c, p)?).content == c` for every content and valid map.
//! - The block never contains a blank line, so it never contains the
//!   delimiter; decode splits on the last delimiter.
//! - The block is write-only: property values are never parsed back from it.

use crate::codec::humanize::{humanize_label, humanize_value};
use crate::model::property::{Properties, PropertyValue, Timestamp};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Separates caller content from the embedded property block.
pub const PROPS_DELIMITER: &str = "\n\n--- properties ---\n";

pub type CodecResult<T> = Result<T, CodecError>;

/// Validation failures detected before any persistence write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Value is not a scalar the backend can store (map, list, null, NaN).
    UnsupportedPropertyType { key: String, found: &'static str },
    /// Key is empty or whitespace only.
    InvalidPropertyKey(String),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPropertyType { key, found } => write!(
                f,
                "unsupported property type for `{key}`: {found} (flatten to string, number, boolean or timestamp)"
            ),
            Self::InvalidPropertyKey(key) => write!(f, "invalid property key: `{key}`"),
        }
    }
}

impl Error for CodecError {}

/// Result of splitting stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<'a> {
    /// Caller content, exactly as supplied to `encode`.
    pub content: &'a str,
    /// Rendered property block, `None` for text that was never encoded.
    pub block: Option<&'a str>,
}

/// Appends the property block to `content`.
///
/// Lines are sorted by key. An empty map yields `content` unchanged, unless
/// the content itself contains the delimiter; then an empty block is still
/// appended so `decode` stays exact.
///
/// # Errors
/// - `InvalidPropertyKey` for empty keys.
/// - `UnsupportedPropertyType` for non-finite floats.
pub fn encode(content: &str, properties: &Properties) -> CodecResult<String> {
    validate_properties(properties)?;

    if properties.is_empty() && !content.contains(PROPS_DELIMITER) {
        return Ok(content.to_string());
    }

    let block = properties
        .iter()
        .map(|(key, value)| format!("{}: {}", humanize_label(key), humanize_value(key, value)))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!("{content}{PROPS_DELIMITER}{block}"))
}

/// Splits stored text into content and block.
///
/// Idempotent for content that does not itself contain the delimiter:
/// decoding already-decoded text returns it unchanged.
pub fn decode(stored: &str) -> Decoded<'_> {
    match stored.rfind(PROPS_DELIMITER) {
        Some(position) => Decoded {
            content: &stored[..position],
            block: Some(&stored[position + PROPS_DELIMITER.len()..]),
        },
        None => Decoded {
            content: stored,
            block: None,
        },
    }
}

/// Shorthand for `decode(stored).content`.
pub fn strip_properties(stored: &str) -> &str {
    decode(stored).content
}

/// Checks keys and values before any write.
pub fn validate_properties(properties: &Properties) -> CodecResult<()> {
    for (key, value) in properties {
        if key.trim().is_empty() {
            return Err(CodecError::InvalidPropertyKey(key.clone()));
        }
        if let PropertyValue::Float(number) = value {
            if !number.is_finite() {
                return Err(CodecError::UnsupportedPropertyType {
                    key: key.clone(),
                    found: "non-finite number",
                });
            }
        }
    }
    Ok(())
}

/// Converts a JSON object into a validated flat property map.
///
/// Strings that parse as ISO-8601 become timestamps; integers stay integers;
/// every other number is a float.
pub fn properties_from_json(map: &Map<String, Value>) -> CodecResult<Properties> {
    let mut properties = Properties::new();
    for (key, value) in map {
        properties.insert(key.clone(), property_from_json(key, value)?);
    }
    validate_properties(&properties)?;
    Ok(properties)
}

/// Converts one JSON value, rejecting non-scalars.
pub fn property_from_json(key: &str, value: &Value) -> CodecResult<PropertyValue> {
    let unsupported = |found: &'static str| CodecError::UnsupportedPropertyType {
        key: key.to_string(),
        found,
    };

    match value {
        Value::String(text) => Ok(match Timestamp::parse(text) {
            Some(timestamp) => PropertyValue::Timestamp(timestamp),
            None => PropertyValue::Text(text.clone()),
        }),
        Value::Bool(flag) => Ok(PropertyValue::Bool(*flag)),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(PropertyValue::Integer(integer))
            } else {
                number
                    .as_f64()
                    .map(PropertyValue::Float)
                    .ok_or_else(|| unsupported("number out of range"))
            }
        }
        Value::Null => Err(unsupported("null")),
        Value::Array(_) => Err(unsupported("list")),
        Value::Object(_) => Err(unsupported("map")),
    }
}
