use memoria_core::codec::humanize::is_date_key;
use memoria_core::{
    decode, encode, properties_from_json, strip_properties, CodecError, Properties,
    PropertyValue, Timestamp, PROPS_DELIMITER,
};
use proptest::prelude::*;
use serde_json::json;

fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn encode_appends_sorted_humanized_block() {
    let properties = props(&[
        ("status", "active".into()),
        ("due_date", Timestamp::parse("2026-01-13").unwrap().into()),
        ("priority", 2_i64.into()),
    ]);

    let encoded = encode("Finish quarterly report", &properties).unwrap();

    assert_eq!(
        encoded,
        format!(
            "Finish quarterly report{PROPS_DELIMITER}due date: Tuesday January 13 2026\npriority: 2\nstatus: active"
        )
    );
    assert_eq!(strip_properties(&encoded), "Finish quarterly report");
}

#[test]
fn decode_returns_original_content_for_awkward_inputs() {
    let properties = props(&[("note", "line one\nline two".into())]);
    for content in [
        "",
        "plain",
        "trailing newline\n",
        "has blank\n\nlines",
        "contains the delimiter\n\n--- properties ---\nfake: block",
    ] {
        let encoded = encode(content, &properties).unwrap();
        assert_eq!(decode(&encoded).content, content, "content {content:?}");
    }
}

#[test]
fn empty_properties_leave_content_unchanged() {
    assert_eq!(encode("Buy milk", &Properties::new()).unwrap(), "Buy milk");

    let tricky = format!("before{PROPS_DELIMITER}after");
    let encoded = encode(&tricky, &Properties::new()).unwrap();
    assert_eq!(strip_properties(&encoded), tricky);
}

#[test]
fn decode_of_legacy_text_is_identity() {
    let decoded = decode("written before properties were embedded");
    assert_eq!(decoded.content, "written before properties were embedded");
    assert_eq!(decoded.block, None);
}

#[test]
fn date_like_text_is_humanized_only_under_date_keys() {
    let encoded = encode(
        "x",
        &props(&[
            ("deadline", "2026-01-13T14:30:00".into()),
            ("code", "2026-01-13-a".into()),
        ]),
    )
    .unwrap();
    let block = decode(&encoded).block.unwrap();

    assert!(block.contains("code: 2026-01-13-a"));
    assert!(block.contains("deadline: Tuesday January 13 2026 at 2:30 PM"));
    assert!(is_date_key("follow_up_date"));
    assert!(!is_date_key("date_format_pref_flag"));
}

#[test]
fn json_boundary_rejects_nested_values() {
    let err = properties_from_json(json!({ "tags": ["a", "b"] }).as_object().unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        CodecError::UnsupportedPropertyType {
            key: "tags".to_string(),
            found: "list",
        }
    );

    let err = properties_from_json(json!({ "": "x" }).as_object().unwrap()).unwrap_err();
    assert_eq!(err, CodecError::InvalidPropertyKey(String::new()));
}

#[test]
fn json_boundary_keeps_scalar_kinds() {
    let properties = properties_from_json(
        json!({
            "status": "active",
            "priority": 3,
            "estimate": 1.5,
            "done": false,
            "due": "2026-01-13",
        })
        .as_object()
        .unwrap(),
    )
    .unwrap();

    assert_eq!(properties["status"], PropertyValue::Text("active".into()));
    assert_eq!(properties["priority"], PropertyValue::Integer(3));
    assert_eq!(properties["estimate"], PropertyValue::Float(1.5));
    assert_eq!(properties["done"], PropertyValue::Bool(false));
    assert_eq!(properties["due"].kind(), "timestamp");
}

fn arb_content() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        (any::<String>(), any::<String>())
            .prop_map(|(head, tail)| format!("{head}{PROPS_DELIMITER}{tail}")),
        (any::<String>(), 1..4_usize).prop_map(|(text, newlines)| format!("{text}{}", "\n".repeat(newlines))),
    ]
}

fn arb_scalar() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        any::<String>().prop_map(PropertyValue::Text),
        any::<i64>().prop_map(PropertyValue::Integer),
        any::<f64>()
            .prop_filter("finite", |number| number.is_finite())
            .prop_map(PropertyValue::Float),
        any::<bool>().prop_map(PropertyValue::Bool),
        Just(PropertyValue::from(Timestamp::parse("2026-01-13 14:30").unwrap())),
    ]
}

fn arb_properties() -> impl Strategy<Value = Properties> {
    prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9_ -]{0,15}", arb_scalar(), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn decode_recovers_any_encoded_content(content in arb_content(), properties in arb_properties()) {
        let encoded = encode(&content, &properties).unwrap();
        prop_assert_eq!(decode(&encoded).content, content.as_str());
        prop_assert_eq!(strip_properties(&encoded), content.as_str());
    }

    #[test]
    fn block_never_contains_a_blank_line(content in arb_content(), properties in arb_properties()) {
        let encoded = encode(&content, &properties).unwrap();
        if let Some(block) = decode(&encoded).block {
            prop_assert!(!block.contains("\n\n"));
        }
    }
}
