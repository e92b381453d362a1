//! Tool-call dispatch for the agent loop.
//!
//! # Responsibility
//! - Map each `ToolCall` onto one `ItemStore` / `ContextDocument` operation.
//! - Convert every outcome, including storage failures, into a `ToolResponse`.
//!
//! # Invariants
//! - `execute` never panics and never returns `Err`.
//! - Not-found ids and out-of-range lines are `ok: false`, not errors.
//! - Arguments and results are logged at `debug` only.

use log::{debug, info};
use memoria_core::{
    properties_from_json, ContextDocument, InMemoryGateway, Item, ItemId, ItemQuery, ItemStore,
    MemoriaConfig, PersistenceGateway, Properties, SqliteGateway, StoreError, StoreResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// One decoded tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    CreateItem {
        content: String,
        #[serde(default)]
        properties: Option<Map<String, Value>>,
    },
    GetItem {
        id: String,
    },
    UpdateItem {
        id: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        properties: Option<Map<String, Value>>,
    },
    RemoveItemProperties {
        id: String,
        keys: Vec<String>,
    },
    DeleteItem {
        id: String,
    },
    QueryItems {
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "where")]
        filter: Option<Map<String, Value>>,
        #[serde(default)]
        limit: Option<u32>,
    },
    LoadContext {},
    AppendContext {
        content: String,
    },
    ReplaceContext {
        line: i64,
        content: String,
    },
    DeleteContext {
        line: i64,
    },
}

impl ToolCall {
    /// Decodes a function call as chat-completion APIs emit it: the tool
    /// name plus its arguments as a JSON text (empty means `{}`).
    pub fn from_function_call(name: &str, arguments: &str) -> Result<Self, String> {
        let arguments = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str::<Value>(arguments)
                .map_err(|err| format!("invalid arguments for `{name}`: {err}"))?
        };
        serde_json::from_value(json!({ "name": name, "arguments": arguments }))
            .map_err(|err| format!("invalid tool call `{name}`: {err}"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateItem { .. } => "create_item",
            Self::GetItem { .. } => "get_item",
            Self::UpdateItem { .. } => "update_item",
            Self::RemoveItemProperties { .. } => "remove_item_properties",
            Self::DeleteItem { .. } => "delete_item",
            Self::QueryItems { .. } => "query_items",
            Self::LoadContext {} => "load_context",
            Self::AppendContext { .. } => "append_context",
            Self::ReplaceContext { .. } => "replace_context",
            Self::DeleteContext { .. } => "delete_context",
        }
    }
}

/// Response envelope returned for every tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    /// Whether the operation applied.
    pub ok: bool,
    /// Human-readable outcome for the model.
    pub message: String,
    /// Operation payload, `null` on failure.
    pub data: Value,
}

impl ToolResponse {
    fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// One agent session: an item store plus the context document, sharing a
/// gateway.
pub struct ToolSession<G: PersistenceGateway> {
    items: ItemStore<Arc<G>>,
    context: ContextDocument<Arc<G>>,
}

impl ToolSession<SqliteGateway> {
    /// Opens the configured SQLite database and starts a context session.
    pub fn open(config: &MemoriaConfig) -> StoreResult<Self> {
        let gateway = Arc::new(SqliteGateway::open(config.db_path())?);
        let session = Self::new(gateway, &config.context_scope)?;
        Ok(session.with_default_limit(config.query_limit))
    }
}

impl ToolSession<InMemoryGateway> {
    /// Session over a fresh in-memory gateway.
    pub fn ephemeral() -> StoreResult<Self> {
        Self::new(Arc::new(InMemoryGateway::new()), memoria_core::DEFAULT_CONTEXT_SCOPE)
    }
}

impl<G: PersistenceGateway> ToolSession<G> {
    /// Builds a session over `gateway`; loading (and compacting) the
    /// context document for `scope`.
    pub fn new(gateway: Arc<G>, scope: &str) -> StoreResult<Self> {
        let context = ContextDocument::open(Arc::clone(&gateway), scope)?;
        info!(
            "event=tool_session_start module=tools status=ok scope={} context_lines={}",
            scope,
            context.len()
        );
        Ok(Self {
            items: ItemStore::new(gateway),
            context,
        })
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.items = self.items.with_default_limit(limit);
        self
    }

    pub fn items(&self) -> &ItemStore<Arc<G>> {
        &self.items
    }

    pub fn context(&self) -> &ContextDocument<Arc<G>> {
        &self.context
    }

    /// Numbered context view for the system prompt.
    pub fn system_context(&self) -> String {
        self.context.render_numbered()
    }

    /// Decodes and runs a raw function call.
    pub fn execute_raw(&self, name: &str, arguments: &str) -> ToolResponse {
        match ToolCall::from_function_call(name, arguments) {
            Ok(call) => self.execute(&call),
            Err(message) => {
                debug!("event=tool_call module=tools status=invalid name={name}");
                ToolResponse::failure(message)
            }
        }
    }

    /// Runs one call. Never panics.
    pub fn execute(&self, call: &ToolCall) -> ToolResponse {
        debug!("event=tool_call module=tools name={} arguments={:?}", call.name(), call);
        let response = self.dispatch(call).unwrap_or_else(|err| {
            ToolResponse::failure(format!("{} failed: {err}", call.name()))
        });
        debug!(
            "event=tool_result module=tools name={} ok={} data={}",
            call.name(),
            response.ok,
            response.data
        );
        response
    }

    fn dispatch(&self, call: &ToolCall) -> StoreResult<ToolResponse> {
        match call {
            ToolCall::CreateItem {
                content,
                properties,
            } => {
                let properties = to_properties(properties.as_ref())?;
                let item = self.items.create(content, properties)?;
                Ok(ToolResponse::success("Item created.", item_json(&item)))
            }
            ToolCall::GetItem { id } => {
                let Some(id) = parse_id(id) else {
                    return Ok(item_not_found(id));
                };
                Ok(match self.items.get(id)? {
                    Some(item) => ToolResponse::success("Item found.", item_json(&item)),
                    None => item_not_found(&id.to_string()),
                })
            }
            ToolCall::UpdateItem {
                id,
                content,
                properties,
            } => {
                let Some(item_id) = parse_id(id) else {
                    return Ok(item_not_found(id));
                };
                let patch = to_properties(properties.as_ref())?;
                absorb_not_found(
                    self.items.update(item_id, content.as_deref(), patch),
                    "Item updated.",
                )
            }
            ToolCall::RemoveItemProperties { id, keys } => {
                let Some(item_id) = parse_id(id) else {
                    return Ok(item_not_found(id));
                };
                absorb_not_found(
                    self.items.remove_properties(item_id, keys),
                    "Properties removed.",
                )
            }
            ToolCall::DeleteItem { id } => {
                let deleted = match parse_id(id) {
                    Some(item_id) => self.items.delete(item_id)?,
                    None => false,
                };
                Ok(if deleted {
                    ToolResponse::success("Item deleted.", json!({ "deleted": true }))
                } else {
                    item_not_found(id)
                })
            }
            ToolCall::QueryItems {
                text,
                filter,
                limit,
            } => {
                let query = ItemQuery {
                    text: text.clone(),
                    filter: filter.as_ref().map(properties_from_json).transpose()?,
                    limit: *limit,
                };
                let items = self
                    .items
                    .query(&query)?
                    .map(|item| item.map(|item| item_json(&item)))
                    .collect::<StoreResult<Vec<_>>>()?;
                let message = if items.is_empty() {
                    "No results.".to_string()
                } else {
                    format!("Found {} item(s).", items.len())
                };
                Ok(ToolResponse::success(message, Value::Array(items)))
            }
            ToolCall::LoadContext {} => {
                let lines = self.context.load()?;
                Ok(ToolResponse::success(
                    self.context.render_numbered(),
                    json!({ "lines": lines }),
                ))
            }
            ToolCall::AppendContext { content } => {
                let line = self.context.append(content)?;
                Ok(ToolResponse::success(
                    format!("Added line {line}."),
                    json!({ "line": line, "content": self.context.line(line) }),
                ))
            }
            ToolCall::ReplaceContext { line, content } => {
                let previous = match usize::try_from(*line) {
                    Ok(index) => self.context.replace_line(index, content)?,
                    Err(_) => None,
                };
                Ok(match previous {
                    Some(old_content) => ToolResponse::success(
                        format!("Replaced line {line}."),
                        json!({
                            "line": line,
                            "old_content": old_content,
                            "new_content": content,
                        }),
                    ),
                    None => line_out_of_range(*line),
                })
            }
            ToolCall::DeleteContext { line } => {
                let previous = match usize::try_from(*line) {
                    Ok(index) => self.context.delete_line(index)?,
                    Err(_) => None,
                };
                Ok(match previous {
                    Some(deleted_content) => ToolResponse::success(
                        format!("Deleted line {line}."),
                        json!({ "line": line, "deleted_content": deleted_content }),
                    ),
                    None => line_out_of_range(*line),
                })
            }
        }
    }
}

fn to_properties(map: Option<&Map<String, Value>>) -> StoreResult<Properties> {
    Ok(map
        .map(properties_from_json)
        .transpose()?
        .unwrap_or_default())
}

fn absorb_not_found(result: StoreResult<Item>, message: &str) -> StoreResult<ToolResponse> {
    match result {
        Ok(item) => Ok(ToolResponse::success(message, item_json(&item))),
        Err(StoreError::NotFound(id)) => Ok(item_not_found(&id.to_string())),
        Err(err) => Err(err),
    }
}

fn parse_id(raw: &str) -> Option<ItemId> {
    ItemId::parse_str(raw.trim()).ok()
}

fn item_json(item: &Item) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}

fn item_not_found(id: &str) -> ToolResponse {
    ToolResponse::failure(format!("Item not found: {id}"))
}

fn line_out_of_range(line: i64) -> ToolResponse {
    ToolResponse::failure(format!("Line {line} does not exist."))
}

#[cfg(test)]
mod tests {
    use super::{ToolCall, ToolSession};
    use memoria_core::{InMemoryGateway, PersistenceGateway, ITEMS_COLLECTION};
    use serde_json::json;
    use std::sync::Arc;

    fn created_id(session: &ToolSession<InMemoryGateway>, content: &str, props: &str) -> String {
        let response = session.execute_raw(
            "create_item",
            &format!(r#"{{"content": "{content}", "properties": {props}}}"#),
        );
        assert!(response.ok, "{}", response.message);
        response.data["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn create_then_get_returns_plain_content() {
        let session = ToolSession::ephemeral().unwrap();
        let id = created_id(&session, "Buy milk", r#"{"status": "active", "priority": 2}"#);

        let response = session.execute_raw("get_item", &format!(r#"{{"id": "{id}"}}"#));
        assert!(response.ok);
        assert_eq!(response.data["content"], "Buy milk");
        assert_eq!(response.data["properties"]["status"], "active");
        assert_eq!(response.data["properties"]["priority"], 2);
    }

    #[test]
    fn timestamp_properties_come_back_as_written() {
        let session = ToolSession::ephemeral().unwrap();
        for due in [
            "2026-01-13T14:30:00Z",
            "2026-01-13 14:30",
            "2026-01-13T14:30",
            "2026-01-13",
        ] {
            let id = created_id(&session, "Dentist", &format!(r#"{{"due": "{due}"}}"#));
            let response = session.execute_raw("get_item", &format!(r#"{{"id": "{id}"}}"#));
            assert!(response.ok, "{}", response.message);
            assert_eq!(response.data["properties"]["due"], due);
        }
    }

    #[test]
    fn query_filter_on_large_integers_is_exact() {
        let session = ToolSession::ephemeral().unwrap();
        created_id(&session, "big", r#"{"n": 9007199254740992}"#);

        let response = session.execute_raw(
            "query_items",
            r#"{"where": {"n": 9007199254740993}}"#,
        );
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.data.as_array().map(Vec::len), Some(0));

        let response = session.execute_raw(
            "query_items",
            r#"{"where": {"n": 9007199254740992}}"#,
        );
        assert_eq!(response.data.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn unknown_ids_are_negative_results() {
        let session = ToolSession::ephemeral().unwrap();
        for (name, args) in [
            ("get_item", r#"{"id": "not-a-uuid"}"#),
            ("delete_item", r#"{"id": "3f2c6a55-7d0e-4a4b-9a9e-0c7e1d2b9f10"}"#),
            ("update_item", r#"{"id": "3f2c6a55-7d0e-4a4b-9a9e-0c7e1d2b9f10", "content": "x"}"#),
        ] {
            let response = session.execute_raw(name, args);
            assert!(!response.ok, "{name}");
            assert!(response.message.contains("not found"), "{name}");
        }
    }

    #[test]
    fn nested_property_values_are_rejected_before_write() {
        let gateway = Arc::new(InMemoryGateway::new());
        let session = ToolSession::new(Arc::clone(&gateway), "global_context").unwrap();

        let response = session.execute_raw(
            "create_item",
            r#"{"content": "x", "properties": {"tags": ["a", "b"]}}"#,
        );
        assert!(!response.ok);
        assert!(response.message.contains("tags"));
        assert_eq!(gateway.record_count(ITEMS_COLLECTION), 0);
    }

    #[test]
    fn query_uses_where_filter() {
        let session = ToolSession::ephemeral().unwrap();
        created_id(&session, "Write report", r#"{"status": "active"}"#);
        created_id(&session, "File taxes", r#"{"status": "done"}"#);

        let response = session.execute(&ToolCall::QueryItems {
            text: None,
            filter: json!({ "status": "done" }).as_object().cloned(),
            limit: None,
        });
        assert!(response.ok);
        let items = response.data.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["content"], "File taxes");
    }

    #[test]
    fn context_lines_keep_indices_within_session() {
        let session = ToolSession::ephemeral().unwrap();
        session.execute_raw("append_context", r#"{"content": "Prefers mornings"}"#);
        session.execute_raw("append_context", r#"{"content": "Works in Rust"}"#);

        let deleted = session.execute_raw("delete_context", r#"{"line": 0}"#);
        assert!(deleted.ok);
        assert_eq!(deleted.data["deleted_content"], "Prefers mornings");

        let replaced = session.execute_raw(
            "replace_context",
            r#"{"line": 1, "content": "Works in Rust and Go"}"#,
        );
        assert!(replaced.ok);
        assert_eq!(replaced.data["old_content"], "Works in Rust");

        assert!(!session.execute_raw("delete_context", r#"{"line": -1}"#).ok);
        assert!(!session.execute_raw("delete_context", r#"{"line": 5}"#).ok);
        assert_eq!(session.system_context(), "1-- Works in Rust and Go");

        let reloaded = session.execute_raw("load_context", "");
        assert!(reloaded.ok);
        assert_eq!(reloaded.data["lines"], json!(["Works in Rust and Go"]));
    }

    #[test]
    fn storage_failure_is_reported_not_raised() {
        let gateway = Arc::new(InMemoryGateway::new());
        let session = ToolSession::new(Arc::clone(&gateway), "global_context").unwrap();
        gateway.set_unavailable(true);

        let response = session.execute_raw("append_context", r#"{"content": "x"}"#);
        assert!(!response.ok);
        assert!(response.message.contains("append_context failed"));

        gateway.set_unavailable(false);
        assert!(session.context().is_empty());
        assert!(gateway
            .get_record(memoria_core::CONTEXT_COLLECTION, "global_context")
            .unwrap()
            .is_some_and(|record| record.text.is_empty()));
    }

    #[test]
    fn malformed_calls_are_reported() {
        let session = ToolSession::ephemeral().unwrap();
        assert!(!session.execute_raw("launch_rocket", "{}").ok);
        assert!(!session.execute_raw("append_context", "{not json").ok);
        assert!(!session.execute_raw("append_context", "{}").ok);
    }
}
