//! Function-calling schemas advertised to the model.

use serde_json::{json, Value};

const LINE_DESCRIPTION: &str = "The line number (0-indexed, as shown in Global Context)";

/// Chat-completion style `{"type": "function", "function": {...}}` entries,
/// one per [`crate::ToolCall`] variant.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        function(
            "create_item",
            "Create a new item (task, note, reminder, idea, etc.) with content and optional \
             properties. Use this when the user wants to add something to track.",
            json!({
                "content": {
                    "type": "string",
                    "description": "The item's text content (task description, note, etc.)"
                },
                "properties": flat_object(
                    "Optional flat metadata like type, status, due_date, priority, project"
                ),
            }),
            &["content"],
        ),
        function(
            "get_item",
            "Fetch one item by id.",
            json!({ "id": id_property() }),
            &["id"],
        ),
        function(
            "update_item",
            "Update an existing item's content and/or properties. Properties are merged \
             with the existing ones; use remove_item_properties to drop keys.",
            json!({
                "id": id_property(),
                "content": { "type": "string", "description": "New content (optional)" },
                "properties": flat_object("Properties to add or overwrite"),
            }),
            &["id"],
        ),
        function(
            "remove_item_properties",
            "Remove property keys from an item. Unknown keys are ignored.",
            json!({
                "id": id_property(),
                "keys": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Property keys to remove"
                },
            }),
            &["id", "keys"],
        ),
        function(
            "delete_item",
            "Delete an item permanently. Use when the user wants to remove something.",
            json!({ "id": id_property() }),
            &["id"],
        ),
        function(
            "query_items",
            "Search for items by similarity and/or exact property filters. Use this to \
             find, list, or retrieve items.",
            json!({
                "text": {
                    "type": "string",
                    "description": "Search text; matches content and property values"
                },
                "where": flat_object(
                    "Exact-match property filter (e.g. {\"status\": \"active\", \"type\": \"task\"})"
                ),
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Maximum number of results (default 10)"
                },
            }),
            &[],
        ),
        function(
            "load_context",
            "Reload Global Context from storage. Deleted lines are dropped and the \
             remaining lines are renumbered.",
            json!({}),
            &[],
        ),
        function(
            "append_context",
            "Add a new line to Global Context. Use this to record persistent knowledge \
             about the user: preferences, patterns, constraints, or observations.",
            json!({
                "content": {
                    "type": "string",
                    "description": "The knowledge to add (e.g. 'Prefers deep work in mornings')"
                },
            }),
            &["content"],
        ),
        function(
            "replace_context",
            "Update an existing line in Global Context when knowledge needs correcting.",
            json!({
                "line": { "type": "integer", "description": LINE_DESCRIPTION },
                "content": { "type": "string", "description": "The new content for this line" },
            }),
            &["line", "content"],
        ),
        function(
            "delete_context",
            "Remove a line from Global Context. Line numbers of other lines stay the same \
             for the rest of the session.",
            json!({ "line": { "type": "integer", "description": LINE_DESCRIPTION } }),
            &["line"],
        ),
    ]
}

fn function(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

fn id_property() -> Value {
    json!({ "type": "string", "description": "The item's unique identifier" })
}

fn flat_object(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "additionalProperties": {
            "type": ["string", "number", "integer", "boolean"]
        },
    })
}

#[cfg(test)]
mod tests {
    use super::tool_schemas;
    use crate::ToolCall;
    use serde_json::{json, Value};

    #[test]
    fn every_schema_names_a_decodable_call() {
        let schemas = tool_schemas();
        assert_eq!(schemas.len(), 10);

        for schema in &schemas {
            let name = schema["function"]["name"].as_str().unwrap();
            let required = schema["function"]["parameters"]["required"]
                .as_array()
                .unwrap();
            let arguments = required
                .iter()
                .map(|key| {
                    let key = key.as_str().unwrap();
                    let value = match key {
                        "line" => json!(0),
                        "keys" => json!(["status"]),
                        _ => json!("x"),
                    };
                    (key.to_string(), value)
                })
                .collect::<serde_json::Map<_, _>>();

            let call = ToolCall::from_function_call(name, &Value::Object(arguments).to_string())
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            assert_eq!(call.name(), name);
        }
    }
}
