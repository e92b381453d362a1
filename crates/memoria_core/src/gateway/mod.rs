//! Persistence gateway contracts.
//!
//! # Responsibility
//! - Define the narrow seam between the item store / context document and a
//!   concrete storage + similarity-search engine.
//! - Keep backend query syntax out of every caller.
//!
//! # Invariants
//! - Records are addressed by `(collection, id)`; collections never share ids.
//! - Metadata is a flat scalar map stored beside the text, never inside it.
//! - Each mutating call is atomic: it fully applies or changes nothing.
//! - `query_similar` ranking is opaque to callers ("most relevant first").

use crate::db::DbError;
use crate::model::property::Properties;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryGateway;
pub use sqlite::{CollectionSummary, SqliteGateway};

/// Collection holding item records.
pub const ITEMS_COLLECTION: &str = "items";
/// Collection holding one context-document record per scope.
pub const CONTEXT_COLLECTION: &str = "global_context";

/// Flat per-record key/value metadata.
pub type Metadata = Properties;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Backend failure surfaced by a gateway.
#[derive(Debug)]
pub enum GatewayError {
    /// Backend cannot serve the call right now.
    Unavailable(String),
    /// SQLite transport failure.
    Db(DbError),
    /// Persisted data violates record invariants.
    InvalidData(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    /// Text indexed by the similarity engine.
    pub text: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by [`PersistenceGateway::update_record`].
///
/// `None` fields keep their stored value; `metadata` replaces the whole map.
#[derive(Debug, Clone, Copy)]
pub struct RecordUpdate<'a> {
    pub text: Option<&'a str>,
    pub metadata: Option<&'a Metadata>,
    pub updated_at: DateTime<Utc>,
    /// When set, the update applies only while the stored `updated_at`
    /// still equals this value.
    pub if_updated_at: Option<DateTime<Utc>>,
}

/// Similarity query over one collection.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityQuery<'a> {
    /// Free text ranked by the engine. `None` (or blank) lists records by
    /// `updated_at DESC, id ASC`.
    pub text: Option<&'a str>,
    /// Exact-match conjunction over raw metadata.
    pub filter: Option<&'a Metadata>,
    pub limit: u32,
}

/// Storage + similarity seam used by the item store and context document.
pub trait PersistenceGateway: Send + Sync {
    /// Inserts a record, or replaces text, metadata and `updated_at` of an
    /// existing one (its `created_at` is kept).
    fn put_record(&self, collection: &str, record: &Record) -> GatewayResult<()>;

    fn get_record(&self, collection: &str, id: &str) -> GatewayResult<Option<Record>>;

    /// Returns `false` when no record exists under `id` or when
    /// `if_updated_at` no longer matches.
    fn update_record(
        &self,
        collection: &str,
        id: &str,
        update: &RecordUpdate<'_>,
    ) -> GatewayResult<bool>;

    /// Returns `false` when no record exists under `id`.
    fn delete_record(&self, collection: &str, id: &str) -> GatewayResult<bool>;

    /// Returns at most `limit` records, most relevant first.
    fn query_similar(
        &self,
        collection: &str,
        query: &SimilarityQuery<'_>,
    ) -> GatewayResult<Vec<Record>>;
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for Arc<G> {
    fn put_record(&self, collection: &str, record: &Record) -> GatewayResult<()> {
        (**self).put_record(collection, record)
    }

    fn get_record(&self, collection: &str, id: &str) -> GatewayResult<Option<Record>> {
        (**self).get_record(collection, id)
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        update: &RecordUpdate<'_>,
    ) -> GatewayResult<bool> {
        (**self).update_record(collection, id, update)
    }

    fn delete_record(&self, collection: &str, id: &str) -> GatewayResult<bool> {
        (**self).delete_record(collection, id)
    }

    fn query_similar(
        &self,
        collection: &str,
        query: &SimilarityQuery<'_>,
    ) -> GatewayResult<Vec<Record>> {
        (**self).query_similar(collection, query)
    }
}

pub(crate) fn to_epoch_ms(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_epoch_ms(value: i64) -> GatewayResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| GatewayError::InvalidData(format!("timestamp out of range: {value}")))
}

/// Query terms with at least one alphanumeric character, lowercased.
pub(crate) fn query_terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(str::to_lowercase)
        .collect()
}
