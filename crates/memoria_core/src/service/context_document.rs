//! Line-addressable context document lifecycle.
//!
//! # Responsibility
//! - Load the scope's blob once per session and compact it.
//! - Apply append / replace / delete against stable in-session indices.
//! - Persist the full blob after every successful mutation.
//!
//! # Invariants
//! - Indices handed out during a session never shift until the next `load`.
//! - A mutation is committed in memory only after the gateway write succeeds.
//! - Mutations on one document are serialized by its mutex.

use crate::clock::{truncate_to_millis, Clock, SystemClock};
use crate::gateway::{Metadata, PersistenceGateway, Record, CONTEXT_COLLECTION};
use crate::model::lines::LineBuffer;
use crate::model::property::{PropertyValue, Timestamp};
use crate::service::StoreResult;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Record id used when no scope is configured.
pub const DEFAULT_CONTEXT_SCOPE: &str = "global_context";

/// Where the document is within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Freshly loaded and compacted; no edits yet.
    Loaded,
    /// At least one edit has been persisted since the last load.
    Dirty,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Dirty => "dirty",
        }
    }
}

#[derive(Debug)]
struct DocumentState {
    lines: LineBuffer,
    session: SessionState,
    compacted_at: DateTime<Utc>,
}

/// Session-scoped view over one persisted context blob.
///
/// Share across threads with `Arc<ContextDocument<_>>`.
pub struct ContextDocument<G: PersistenceGateway, C: Clock = SystemClock> {
    gateway: G,
    clock: C,
    scope: String,
    state: Mutex<DocumentState>,
}

impl<G: PersistenceGateway> ContextDocument<G> {
    /// Opens `scope` and runs the session-start load.
    pub fn open(gateway: G, scope: impl Into<String>) -> StoreResult<Self> {
        Self::open_with_clock(gateway, SystemClock, scope)
    }
}

impl<G: PersistenceGateway, C: Clock> ContextDocument<G, C> {
    /// Opens `scope` with an explicit time source and runs the session-start
    /// load.
    pub fn open_with_clock(gateway: G, clock: C, scope: impl Into<String>) -> StoreResult<Self> {
        let now = truncate_to_millis(clock.now());
        let document = Self {
            gateway,
            clock,
            scope: scope.into(),
            state: Mutex::new(DocumentState {
                lines: LineBuffer::new(),
                session: SessionState::Loaded,
                compacted_at: now,
            }),
        };
        document.load()?;
        Ok(document)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Starts a new session: reads the stored blob, drops tombstones,
    /// persists the compacted blob and returns the live lines.
    ///
    /// A missing record loads as an empty document and is created.
    ///
    /// # Errors
    /// - `StorageUnavailable` when the read or the compacted write fails.
    ///   The in-memory document is left unchanged.
    pub fn load(&self) -> StoreResult<Vec<String>> {
        let mut state = self.lock();
        let stored = self.gateway.get_record(CONTEXT_COLLECTION, &self.scope)?;
        let raw = stored
            .map(|record| LineBuffer::from_blob(&record.text))
            .unwrap_or_default();
        let compacted = raw.compacted();
        let now = self.now();
        self.persist(&compacted, now)?;

        info!(
            "event=context_load module=context_document status=ok scope={} lines={} dropped={}",
            self.scope,
            compacted.len(),
            raw.len() - compacted.len()
        );

        state.lines = compacted;
        state.session = SessionState::Loaded;
        state.compacted_at = now;
        Ok(state.lines.lines().to_vec())
    }

    /// Adds a line at the end and returns its 0-based index.
    ///
    /// Line breaks inside `content` are folded into spaces.
    pub fn append(&self, content: &str) -> StoreResult<usize> {
        self.mutate("context_append", |lines| Some(lines.push(content)))
            .map(|index| index.unwrap_or_default())
    }

    /// Overwrites line `index`. `Ok(false)` when out of range.
    pub fn replace(&self, index: usize, content: &str) -> StoreResult<bool> {
        self.replace_line(index, content).map(|prev| prev.is_some())
    }

    /// Overwrites line `index` and returns its previous content, or `None`
    /// when out of range. Nothing is written when out of range.
    pub fn replace_line(&self, index: usize, content: &str) -> StoreResult<Option<String>> {
        self.mutate("context_replace", |lines| lines.replace(index, content))
    }

    /// Tombstones line `index`. `Ok(false)` when out of range.
    pub fn delete(&self, index: usize) -> StoreResult<bool> {
        self.delete_line(index).map(|prev| prev.is_some())
    }

    /// Tombstones line `index` and returns its previous content, or `None`
    /// when out of range. Later indices keep their positions until the next
    /// `load`.
    pub fn delete_line(&self, index: usize) -> StoreResult<Option<String>> {
        self.mutate("context_delete", |lines| lines.tombstone(index))
    }

    /// Lines joined by newlines, tombstones included as empty lines.
    pub fn render(&self) -> String {
        self.lock().lines.render()
    }

    /// `"{i}-- {line}"` per live line, or a placeholder when none remain.
    pub fn render_numbered(&self) -> String {
        self.lock().lines.render_numbered()
    }

    pub fn line(&self, index: usize) -> Option<String> {
        self.lock().lines.get(index).map(str::to_string)
    }

    /// Snapshot of every in-session line, tombstones included.
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.lines().to_vec()
    }

    /// Number of in-session slots, tombstones included.
    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    pub fn state(&self) -> SessionState {
        self.lock().session
    }

    fn mutate<T>(
        &self,
        event: &'static str,
        edit: impl FnOnce(&mut LineBuffer) -> Option<T>,
    ) -> StoreResult<Option<T>> {
        let mut state = self.lock();
        let mut next = state.lines.clone();
        let Some(outcome) = edit(&mut next) else {
            debug!(
                "event={} module=context_document status=out_of_range scope={} lines={}",
                event,
                self.scope,
                state.lines.len()
            );
            return Ok(None);
        };

        self.persist(&next, state.compacted_at)?;
        info!(
            "event={} module=context_document status=ok scope={} lines={}",
            event,
            self.scope,
            next.len()
        );
        state.lines = next;
        state.session = SessionState::Dirty;
        Ok(Some(outcome))
    }

    fn persist(&self, lines: &LineBuffer, compacted_at: DateTime<Utc>) -> StoreResult<()> {
        let now = self.now();
        let mut metadata = Metadata::new();
        metadata.insert(
            "item_type".to_string(),
            PropertyValue::Text(DEFAULT_CONTEXT_SCOPE.to_string()),
        );
        metadata.insert(
            "compacted_at".to_string(),
            PropertyValue::Timestamp(Timestamp::from_zoned(compacted_at.fixed_offset())),
        );
        metadata.insert(
            "line_count".to_string(),
            PropertyValue::Integer(lines.live_count() as i64),
        );

        self.gateway.put_record(
            CONTEXT_COLLECTION,
            &Record {
                id: self.scope.clone(),
                text: lines.render(),
                metadata,
                created_at: now,
                updated_at: now,
            },
        )?;
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(self.clock.now())
    }

    // Committed state is only ever replaced wholesale, so a poisoned guard
    // still holds a consistent document.
    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextDocument, SessionState};
    use crate::gateway::{InMemoryGateway, PersistenceGateway, CONTEXT_COLLECTION};
    use std::sync::Arc;

    #[test]
    fn open_creates_empty_record() {
        let gateway = Arc::new(InMemoryGateway::new());
        let document = ContextDocument::open(Arc::clone(&gateway), "scope").unwrap();

        assert!(document.is_empty());
        assert_eq!(document.state(), SessionState::Loaded);
        let record = gateway.get_record(CONTEXT_COLLECTION, "scope").unwrap();
        assert_eq!(record.map(|record| record.text), Some(String::new()));
    }

    #[test]
    fn out_of_range_mutation_keeps_state_loaded() {
        let document = ContextDocument::open(InMemoryGateway::new(), "scope").unwrap();

        assert!(!document.replace(0, "x").unwrap());
        assert!(!document.delete(3).unwrap());
        assert_eq!(document.state(), SessionState::Loaded);
    }

    #[test]
    fn mutations_mark_dirty_and_reload_resets() {
        let document = ContextDocument::open(InMemoryGateway::new(), "scope").unwrap();
        document.append("a").unwrap();
        assert_eq!(document.state(), SessionState::Dirty);

        document.load().unwrap();
        assert_eq!(document.state(), SessionState::Loaded);
        assert_eq!(document.lines(), vec!["a".to_string()]);
    }
}
