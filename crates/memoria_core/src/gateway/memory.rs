//! In-memory persistence gateway.
//!
//! Backed by a `Mutex<HashMap>`; similarity is the number of distinct query
//! terms found in the record text. Intended for tests and ephemeral sessions.

use crate::gateway::{
    query_terms, GatewayError, GatewayResult, PersistenceGateway, Record, RecordUpdate,
    SimilarityQuery,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

type RecordKey = (String, String);

/// In-memory gateway with optional fault injection.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: Mutex<HashMap<RecordKey, Record>>,
    unavailable: AtomicBool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `GatewayError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records stored in `collection`.
    pub fn record_count(&self, collection: &str) -> usize {
        self.records
            .lock()
            .map(|records| records.keys().filter(|(name, _)| name == collection).count())
            .unwrap_or_default()
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, HashMap<RecordKey, Record>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable(
                "in-memory gateway switched off".to_string(),
            ));
        }
        self.records
            .lock()
            .map_err(|_| GatewayError::Unavailable("in-memory gateway lock poisoned".to_string()))
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn put_record(&self, collection: &str, record: &Record) -> GatewayResult<()> {
        let mut records = self.lock()?;
        let key = (collection.to_string(), record.id.clone());
        let mut stored = record.clone();
        if let Some(existing) = records.get(&key) {
            stored.created_at = existing.created_at;
        }
        records.insert(key, stored);
        Ok(())
    }

    fn get_record(&self, collection: &str, id: &str) -> GatewayResult<Option<Record>> {
        let records = self.lock()?;
        Ok(records
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        update: &RecordUpdate<'_>,
    ) -> GatewayResult<bool> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(&(collection.to_string(), id.to_string())) else {
            return Ok(false);
        };
        if update
            .if_updated_at
            .is_some_and(|expected| expected != record.updated_at)
        {
            return Ok(false);
        }
        if let Some(text) = update.text {
            record.text = text.to_string();
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata.clone();
        }
        record.updated_at = update.updated_at;
        Ok(true)
    }

    fn delete_record(&self, collection: &str, id: &str) -> GatewayResult<bool> {
        let mut records = self.lock()?;
        Ok(records
            .remove(&(collection.to_string(), id.to_string()))
            .is_some())
    }

    fn query_similar(
        &self,
        collection: &str,
        query: &SimilarityQuery<'_>,
    ) -> GatewayResult<Vec<Record>> {
        let records = self.lock()?;
        let terms = query
            .text
            .map(query_terms)
            .filter(|terms| !terms.is_empty());
        if query.text.is_some_and(|text| !text.trim().is_empty()) && terms.is_none() {
            return Ok(Vec::new());
        }

        let mut scored = records
            .iter()
            .filter(|((name, _), _)| name == collection)
            .map(|(_, record)| record)
            .filter(|record| matches_filter(record, query))
            .filter_map(|record| match terms.as_ref() {
                Some(terms) => {
                    let score = similarity(&record.text, terms);
                    (score > 0).then_some((score, record))
                }
                None => Some((0, record)),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .cmp(left_score)
                .then_with(|| right.updated_at.cmp(&left.updated_at))
                .then_with(|| left.id.cmp(&right.id))
        });

        Ok(scored
            .into_iter()
            .take(query.limit as usize)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

fn matches_filter(record: &Record, query: &SimilarityQuery<'_>) -> bool {
    query.filter.map_or(true, |filter| {
        filter.iter().all(|(key, expected)| {
            record
                .metadata
                .get(key)
                .is_some_and(|actual| actual.matches(expected))
        })
    })
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Number of distinct terms whose every token occurs in `text`. A term such
/// as `due-date` is split the same way as the text it is matched against.
fn similarity(text: &str, terms: &[String]) -> usize {
    let text_tokens = tokens(text).collect::<HashSet<_>>();
    terms
        .iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|term| {
            let mut term_tokens = tokens(term).peekable();
            term_tokens.peek().is_some()
                && term_tokens.all(|token| text_tokens.contains(&token))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::similarity;

    #[test]
    fn terms_are_tokenized_like_text() {
        let terms = ["due-date".to_string(), "friday".to_string()];
        assert_eq!(similarity("The due date is Friday.", &terms), 2);
        assert_eq!(similarity("due friday", &terms), 1);
        assert_eq!(similarity("duedate", &terms), 0);
    }
}
