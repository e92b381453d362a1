use memoria_core::{
    ContextDocument, InMemoryGateway, PersistenceGateway, PropertyValue, SessionState,
    SqliteGateway, StoreError, CONTEXT_COLLECTION, EMPTY_CONTEXT_PLACEHOLDER,
};
use std::sync::Arc;
use std::thread;

const SCOPE: &str = "global_context";

fn seeded(gateway: &Arc<InMemoryGateway>, lines: &[&str]) -> ContextDocument<Arc<InMemoryGateway>> {
    let document = ContextDocument::open(Arc::clone(gateway), SCOPE).unwrap();
    for line in lines {
        document.append(line).unwrap();
    }
    document
}

fn stored_text(gateway: &impl PersistenceGateway) -> String {
    gateway
        .get_record(CONTEXT_COLLECTION, SCOPE)
        .unwrap()
        .map(|record| record.text)
        .unwrap_or_default()
}

#[test]
fn indices_stay_fixed_within_a_session() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["a", "b", "c"]);

    assert!(document.delete(1).unwrap());
    assert!(document.replace(0, "x").unwrap());
    assert_eq!(document.render(), "x\n\nc");
    assert_eq!(document.append("d").unwrap(), 3);
    assert_eq!(document.line(2).as_deref(), Some("c"));
    assert_eq!(document.state(), SessionState::Dirty);
}

#[test]
fn every_mutation_is_persisted_immediately() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["a", "b"]);
    assert_eq!(stored_text(&gateway), "a\nb");

    document.delete(0).unwrap();
    assert_eq!(stored_text(&gateway), "\nb");
}

#[test]
fn next_session_compacts_and_persists_compacted_form() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["a", "b", "c"]);
    document.delete(1).unwrap();
    document.replace(0, "x").unwrap();
    drop(document);
    assert_eq!(stored_text(&gateway), "x\n\nc");

    let next = ContextDocument::open(Arc::clone(&gateway), SCOPE).unwrap();
    assert_eq!(next.lines(), vec!["x".to_string(), "c".to_string()]);
    assert_eq!(next.state(), SessionState::Loaded);
    assert_eq!(stored_text(&gateway), "x\nc");
    assert_eq!(next.render_numbered(), "0-- x\n1-- c");
}

#[test]
fn compaction_is_idempotent() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["", "a", "", "", "b", ""]);

    let once = document.load().unwrap();
    let twice = document.load().unwrap();
    assert_eq!(once, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(once, twice);
}

#[test]
fn out_of_range_edits_change_nothing() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["a", "b", "c"]);
    let before = stored_text(&gateway);

    assert!(!document.replace(99, "x").unwrap());
    assert!(!document.delete(3).unwrap());
    assert_eq!(document.replace_line(99, "x").unwrap(), None);
    assert_eq!(document.render(), "a\nb\nc");
    assert_eq!(stored_text(&gateway), before);
}

#[test]
fn replace_and_delete_report_previous_content() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["Prefers mornings", "Lives in Lisbon"]);

    assert_eq!(
        document.replace_line(1, "Lives in Porto").unwrap().as_deref(),
        Some("Lives in Lisbon")
    );
    assert_eq!(
        document.delete_line(0).unwrap().as_deref(),
        Some("Prefers mornings")
    );
}

#[test]
fn multi_line_content_occupies_one_index() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &[]);

    let index = document.append("first\nsecond").unwrap();
    assert_eq!(index, 0);
    assert_eq!(document.len(), 1);
    assert_eq!(document.line(0).as_deref(), Some("first second"));
}

#[test]
fn empty_document_renders_placeholder() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["only"]);
    assert_eq!(document.render_numbered(), "0-- only");

    document.delete(0).unwrap();
    assert_eq!(document.render_numbered(), EMPTY_CONTEXT_PLACEHOLDER);
    assert_eq!(document.render(), "");
}

#[test]
fn failed_write_leaves_document_unchanged() {
    let gateway = Arc::new(InMemoryGateway::new());
    let document = seeded(&gateway, &["a", "b"]);
    gateway.set_unavailable(true);

    assert!(matches!(
        document.append("c"),
        Err(StoreError::StorageUnavailable(_))
    ));
    assert!(matches!(
        document.delete(0),
        Err(StoreError::StorageUnavailable(_))
    ));
    assert!(document.load().is_err());

    gateway.set_unavailable(false);
    assert_eq!(document.lines(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(stored_text(&gateway), "a\nb");
    assert_eq!(document.append("c").unwrap(), 2);
}

#[test]
fn record_carries_context_metadata() {
    let gateway = Arc::new(SqliteGateway::open_in_memory().unwrap());
    let document = ContextDocument::open(Arc::clone(&gateway), SCOPE).unwrap();
    document.append("a").unwrap();
    document.append("b").unwrap();
    document.delete(0).unwrap();

    let record = gateway
        .get_record(CONTEXT_COLLECTION, SCOPE)
        .unwrap()
        .unwrap();
    assert_eq!(
        record.metadata.get("item_type"),
        Some(&PropertyValue::Text("global_context".to_string()))
    );
    assert_eq!(
        record.metadata.get("line_count"),
        Some(&PropertyValue::Integer(1))
    );
    assert_eq!(
        record.metadata.get("compacted_at").map(PropertyValue::kind),
        Some("timestamp")
    );
}

#[test]
fn scopes_are_independent() {
    let gateway = Arc::new(InMemoryGateway::new());
    let alice = ContextDocument::open(Arc::clone(&gateway), "alice").unwrap();
    let bob = ContextDocument::open(Arc::clone(&gateway), "bob").unwrap();

    alice.append("likes tea").unwrap();
    assert!(bob.is_empty());
    assert!(bob.load().unwrap().is_empty());
}

#[test]
fn concurrent_appends_are_serialized() {
    let gateway = Arc::new(SqliteGateway::open_in_memory().unwrap());
    let document = Arc::new(ContextDocument::open(Arc::clone(&gateway), SCOPE).unwrap());

    let handles = (0..8)
        .map(|worker| {
            let document = Arc::clone(&document);
            thread::spawn(move || {
                (0..10)
                    .map(|step| document.append(&format!("w{worker}-{step}")).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    let mut indices = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    indices.sort_unstable();
    assert_eq!(indices, (0..80).collect::<Vec<_>>());

    let stored = gateway
        .get_record(CONTEXT_COLLECTION, SCOPE)
        .unwrap()
        .unwrap();
    assert_eq!(stored.text.split('\n').count(), 80);
    assert_eq!(stored.text, document.render());
}
