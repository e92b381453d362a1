//! Agent-facing tool surface over `memoria_core`.
//!
//! # Responsibility
//! - Decode model tool calls into item / context operations.
//! - Return JSON envelopes that never panic and never leak backend detail
//!   beyond a message.

pub mod api;
pub mod schema;

pub use api::{ToolCall, ToolResponse, ToolSession};
pub use schema::tool_schemas;
