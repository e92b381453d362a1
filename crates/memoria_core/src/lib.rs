//! Persistent knowledge layer for an assistant agent.
//!
//! Items (content + flat properties) live behind a similarity-search
//! gateway; a line-addressable context document carries durable facts
//! between sessions.

pub mod clock;
pub mod codec;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::property_codec::{
    decode, encode, properties_from_json, property_from_json, strip_properties, CodecError,
    CodecResult, Decoded, PROPS_DELIMITER,
};
pub use config::{ConfigError, MemoriaConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use gateway::{
    CollectionSummary, GatewayError, GatewayResult, InMemoryGateway, Metadata,
    PersistenceGateway, Record, RecordUpdate, SimilarityQuery, SqliteGateway,
    CONTEXT_COLLECTION, ITEMS_COLLECTION,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemId};
pub use model::lines::{LineBuffer, EMPTY_CONTEXT_PLACEHOLDER};
pub use model::property::{Properties, PropertyValue, Timestamp, TimestampValue};
pub use service::context_document::{ContextDocument, SessionState, DEFAULT_CONTEXT_SCOPE};
pub use service::item_store::{
    ItemIter, ItemQuery, ItemStore, ReembedReport, DEFAULT_QUERY_LIMIT,
};
pub use service::{StoreError, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
