//! Item use-case service.
//!
//! # Responsibility
//! - Create, read, update, delete and query items.
//! - Own item identity and timestamps.
//! - Encode content + properties on write, decode on every read.
//!
//! # Invariants
//! - Callers never observe encoded content.
//! - Property values returned come from gateway metadata, never from the
//!   searchable block.
//! - `update` merges properties (add / overwrite, never remove) and bumps
//!   `updated_at` strictly.
//! - Concurrent updates of one item never drop a patch: writes are guarded
//!   on the `updated_at` they were computed from.

use crate::clock::{truncate_to_millis, Clock, SystemClock};
use crate::codec::property_codec::{encode, strip_properties, validate_properties};
use crate::gateway::{
    PersistenceGateway, Record, RecordUpdate, SimilarityQuery, ITEMS_COLLECTION,
};
use crate::model::item::{Item, ItemId};
use crate::model::property::Properties;
use crate::service::{StoreError, StoreResult};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::time::Instant;
use uuid::Uuid;

/// Default number of items returned by [`ItemStore::query`].
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

/// Query options for [`ItemStore::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    /// Similarity text. `None` lists items by most recent update.
    pub text: Option<String>,
    /// Exact-match conjunction over raw property values.
    pub filter: Option<Properties>,
    /// Maximum items. `None` uses the store default.
    pub limit: Option<u32>,
}

impl ItemQuery {
    /// Similarity query with default limit and no filter.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Filter-only query.
    pub fn filter(filter: Properties) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Lazy, finite, single-pass sequence of query results.
///
/// Items are decoded as they are pulled.
#[derive(Debug)]
pub struct ItemIter {
    records: std::vec::IntoIter<Record>,
}

impl Iterator for ItemIter {
    type Item = StoreResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(record_to_item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for ItemIter {}

/// Outcome of [`ItemStore::reembed_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReembedReport {
    /// Records rewritten to the canonical encoding.
    pub migrated: usize,
    /// Records already canonical.
    pub skipped: usize,
}

/// Item store over any persistence gateway.
pub struct ItemStore<G: PersistenceGateway, C: Clock = SystemClock> {
    gateway: G,
    clock: C,
    default_limit: u32,
}

impl<G: PersistenceGateway> ItemStore<G> {
    /// Creates a store using the wall clock.
    pub fn new(gateway: G) -> Self {
        Self::with_clock(gateway, SystemClock)
    }
}

impl<G: PersistenceGateway, C: Clock> ItemStore<G, C> {
    /// Creates a store with an explicit time source.
    pub fn with_clock(gateway: G, clock: C) -> Self {
        Self {
            gateway,
            clock,
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    /// Overrides the limit applied when a query does not set one.
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Creates an item with a generated id.
    ///
    /// # Errors
    /// - `UnsupportedPropertyType` / `InvalidPropertyKey` before any write.
    /// - `StorageUnavailable` when the gateway write fails.
    pub fn create(&self, content: &str, properties: Properties) -> StoreResult<Item> {
        let started_at = Instant::now();
        let text = encode(content, &properties)?;
        let now = self.now();
        let id = Uuid::new_v4();
        let record = Record {
            id: id.to_string(),
            text,
            metadata: properties,
            created_at: now,
            updated_at: now,
        };

        self.gateway.put_record(ITEMS_COLLECTION, &record)?;
        info!(
            "event=item_create module=item_store status=ok item_id={} properties={} duration_ms={}",
            record.id,
            record.metadata.len(),
            started_at.elapsed().as_millis()
        );

        Ok(Item {
            id,
            content: content.to_string(),
            properties: record.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// Gets one item, or `None` when the id is unknown.
    pub fn get(&self, id: ItemId) -> StoreResult<Option<Item>> {
        self.gateway
            .get_record(ITEMS_COLLECTION, &id.to_string())?
            .map(record_to_item)
            .transpose()
    }

    /// Partially updates an item.
    ///
    /// `content: None` keeps the current content. `patch` keys are added or
    /// overwritten; keys absent from `patch` are kept. The stored text is
    /// always re-encoded with the merged property set.
    ///
    /// # Errors
    /// - `NotFound` when the id is unknown.
    /// - `UnsupportedPropertyType` / `InvalidPropertyKey` before any write.
    pub fn update(
        &self,
        id: ItemId,
        content: Option<&str>,
        patch: Properties,
    ) -> StoreResult<Item> {
        validate_properties(&patch)?;
        self.rewrite(id, content, "item_update", |properties| {
            properties.extend(patch.iter().map(|(key, value)| (key.clone(), value.clone())));
        })
    }

    /// Removes property keys from an item. Unknown keys are ignored.
    ///
    /// # Errors
    /// - `NotFound` when the id is unknown.
    pub fn remove_properties(&self, id: ItemId, keys: &[String]) -> StoreResult<Item> {
        self.rewrite(id, None, "item_remove_properties", |properties| {
            for key in keys {
                properties.remove(key);
            }
        })
    }

    /// Permanently deletes an item. Returns whether it existed.
    pub fn delete(&self, id: ItemId) -> StoreResult<bool> {
        let deleted = self
            .gateway
            .delete_record(ITEMS_COLLECTION, &id.to_string())?;
        info!(
            "event=item_delete module=item_store status=ok item_id={} deleted={}",
            id, deleted
        );
        Ok(deleted)
    }

    /// Runs a similarity and/or property-filter query.
    ///
    /// Ordering is the gateway's relevance ranking (most relevant first);
    /// without text, most recently updated first.
    pub fn query(&self, query: &ItemQuery) -> StoreResult<ItemIter> {
        let limit = query.limit.unwrap_or(self.default_limit);
        let records = self.gateway.query_similar(
            ITEMS_COLLECTION,
            &SimilarityQuery {
                text: query.text.as_deref(),
                filter: query.filter.as_ref(),
                limit,
            },
        )?;
        debug!(
            "event=item_query module=item_store status=ok limit={} hits={}",
            limit,
            records.len()
        );
        Ok(ItemIter {
            records: records.into_iter(),
        })
    }

    /// Re-encodes every stored item whose text is not canonical for its
    /// content and metadata (e.g. records written before properties were
    /// embedded). Timestamps are left untouched. Safe to run repeatedly.
    pub fn reembed_all(&self) -> StoreResult<ReembedReport> {
        let records = self.gateway.query_similar(
            ITEMS_COLLECTION,
            &SimilarityQuery {
                text: None,
                filter: None,
                limit: u32::MAX,
            },
        )?;

        let mut report = ReembedReport::default();
        for record in records {
            let canonical = encode(strip_properties(&record.text), &record.metadata)?;
            if canonical == record.text {
                report.skipped += 1;
                continue;
            }

            let applied = self.gateway.update_record(
                ITEMS_COLLECTION,
                &record.id,
                &RecordUpdate {
                    text: Some(&canonical),
                    metadata: None,
                    updated_at: record.updated_at,
                    if_updated_at: Some(record.updated_at),
                },
            )?;
            if applied {
                report.migrated += 1;
            } else {
                // Rewritten concurrently, which always stores the canonical text.
                report.skipped += 1;
            }
        }

        info!(
            "event=item_reembed module=item_store status=ok migrated={} skipped={}",
            report.migrated, report.skipped
        );
        Ok(report)
    }

    /// Read-modify-write guarded on the stored `updated_at`. When another
    /// writer lands between the read and the write, the edit is replayed on
    /// the fresh record so no patch is lost.
    fn rewrite(
        &self,
        id: ItemId,
        content: Option<&str>,
        event: &'static str,
        edit: impl Fn(&mut Properties),
    ) -> StoreResult<Item> {
        let started_at = Instant::now();
        let record_id = id.to_string();
        let mut attempts = 0_u32;
        let (existing, content, properties, updated_at) = loop {
            attempts += 1;
            let existing = self
                .gateway
                .get_record(ITEMS_COLLECTION, &record_id)?
                .ok_or(StoreError::NotFound(id))?;

            let content = content
                .map(str::to_string)
                .unwrap_or_else(|| strip_properties(&existing.text).to_string());
            let mut properties = existing.metadata.clone();
            edit(&mut properties);
            let text = encode(&content, &properties)?;
            let updated_at = self.next_updated_at(existing.updated_at);

            let applied = self.gateway.update_record(
                ITEMS_COLLECTION,
                &record_id,
                &RecordUpdate {
                    text: Some(&text),
                    metadata: Some(&properties),
                    updated_at,
                    if_updated_at: Some(existing.updated_at),
                },
            )?;
            if applied {
                break (existing, content, properties, updated_at);
            }
            debug!(
                "event={} module=item_store status=retry item_id={} attempt={}",
                event, id, attempts
            );
        };

        info!(
            "event={} module=item_store status=ok item_id={} properties={} duration_ms={}",
            event,
            id,
            properties.len(),
            started_at.elapsed().as_millis()
        );

        Ok(Item {
            id,
            content,
            properties,
            created_at: existing.created_at,
            updated_at,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(self.clock.now())
    }

    /// `max(now, previous + 1ms)`, so every update is observable.
    fn next_updated_at(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        self.now().max(previous + Duration::milliseconds(1))
    }
}

fn record_to_item(record: Record) -> StoreResult<Item> {
    Ok(Item {
        id: parse_item_id(&record.id)?,
        content: strip_properties(&record.text).to_string(),
        properties: record.metadata,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

fn parse_item_id(raw: &str) -> StoreResult<ItemId> {
    Uuid::parse_str(raw)
        .map_err(|_| StoreError::InvalidData(format!("invalid item id `{raw}`")))
}
