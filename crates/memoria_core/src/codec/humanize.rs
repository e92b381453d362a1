//! Human-readable rendering of property keys and values.
//!
//! The similarity backend matches on tokens in the document text, so
//! `due_date: 2026-01-13` is rendered as `due date: Tuesday January 13 2026`.

use crate::model::property::{PropertyValue, Timestamp};
use once_cell::sync::Lazy;
use regex::Regex;

static KEY_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[_\-\s]+").expect("valid key separator regex"));

const DATE_KEY_SUFFIXES: &[&str] = &["_date", "_at", "_time", "_due", "_deadline"];
const DATE_KEY_NAMES: &[&str] = &["due", "deadline", "scheduled", "start", "end"];

/// Returns whether a key name conventionally carries a date.
///
/// Case-insensitive. Matches `*_date`, `*_at`, `*_time`, `*_due`,
/// `*_deadline` and the bare names `due`, `deadline`, `scheduled`, `start`,
/// `end`.
pub fn is_date_key(key: &str) -> bool {
    let key = key.trim().to_ascii_lowercase();
    DATE_KEY_NAMES.contains(&key.as_str())
        || DATE_KEY_SUFFIXES
            .iter()
            .any(|suffix| key.len() > suffix.len() && key.ends_with(suffix))
}

/// `due_date` -> `due date`.
pub fn humanize_label(key: &str) -> String {
    single_line(KEY_SEPARATOR_RE.replace_all(key.trim(), " ").trim())
}

/// Renders one value for the searchable block.
///
/// Timestamps always use the long form. Text under a date-like key is
/// humanized too when it parses as ISO-8601; any other text is kept as-is.
pub fn humanize_value(key: &str, value: &PropertyValue) -> String {
    let rendered = match value {
        PropertyValue::Timestamp(timestamp) => timestamp.humanize(),
        PropertyValue::Text(text) if is_date_key(key) => match Timestamp::parse(text) {
            Some(timestamp) => timestamp.humanize(),
            None => text.clone(),
        },
        other => other.to_raw(),
    };
    single_line(&rendered)
}

fn single_line(value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return value.to_string();
    }
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{humanize_label, humanize_value, is_date_key};
    use crate::model::property::PropertyValue;

    #[test]
    fn date_keys_are_recognized() {
        for key in [
            "due_date",
            "start_date",
            "created_at",
            "deleted_at",
            "start_time",
            "task_due",
            "project_deadline",
            "due",
            "deadline",
            "scheduled",
            "start",
            "end",
            "DUE_DATE",
            "Due_Date",
        ] {
            assert!(is_date_key(key), "{key} should be a date key");
        }
        for key in ["status", "priority", "type", "project", "name", "_at"] {
            assert!(!is_date_key(key), "{key} should not be a date key");
        }
    }

    #[test]
    fn labels_drop_separators() {
        assert_eq!(humanize_label("due_date"), "due date");
        assert_eq!(humanize_label("start-time"), "start time");
        assert_eq!(humanize_label("status"), "status");
    }

    #[test]
    fn text_dates_under_date_keys_are_humanized() {
        let raw = PropertyValue::from("2026-01-13");
        assert_eq!(humanize_value("due_date", &raw), "Tuesday January 13 2026");
        assert_eq!(humanize_value("code", &raw), "2026-01-13");
        assert_eq!(
            humanize_value("due_date", &PropertyValue::from("soon")),
            "soon"
        );
    }

    #[test]
    fn multiline_values_are_flattened() {
        let value = PropertyValue::from("first\nsecond");
        assert_eq!(humanize_value("note", &value), "first second");
    }
}
