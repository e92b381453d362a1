//! Item domain model.
//!
//! # Responsibility
//! - Define the record returned to every ItemStore caller.
//!
//! # Invariants
//! - `id` is assigned at creation and never reused.
//! - `content` is always decoded: it never carries the embedded property block.
//! - `created_at` / `updated_at` are owned by the store, never by callers.
//! - `updated_at >= created_at`.

use crate::model::property::Properties;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Stable identifier of one item.
pub type ItemId = Uuid;

/// A discrete persisted record with free text and flat properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: ItemId,
    /// Caller-authored text, as supplied.
    pub content: String,
    /// Authoritative property values (from backend metadata, never re-parsed
    /// from the searchable block).
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
