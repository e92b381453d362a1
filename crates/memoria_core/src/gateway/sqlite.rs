//! SQLite + FTS5 implementation of the persistence gateway.
//!
//! # Responsibility
//! - Store records, typed metadata rows and a BM25-ranked text index.
//! - Translate metadata filters into `EXISTS` conjunctions.
//!
//! # Invariants
//! - Every mutation runs in one transaction.
//! - `records_fts` is maintained by triggers only (see migrations).
//! - Connection access is serialized through one mutex, so readers observe
//!   either the pre- or post-write state of a record.

use crate::db::{open_db, open_db_in_memory};
use crate::gateway::{
    from_epoch_ms, query_terms, to_epoch_ms, GatewayError, GatewayResult, Metadata,
    PersistenceGateway, Record, RecordUpdate, SimilarityQuery,
};
use crate::model::property::PropertyValue;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Inventory of one collection, used by operator tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSummary {
    pub name: String,
    pub record_count: u64,
    /// Metadata key -> stored value kinds.
    pub metadata_fields: BTreeMap<String, BTreeSet<String>>,
    /// Most recently updated records.
    pub samples: Vec<Record>,
}

/// SQLite-backed gateway.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> GatewayResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection returned by `open_db` / `open_db_in_memory`.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Lists every non-empty collection with metadata fields and up to
    /// `sample_limit` recent records.
    pub fn describe(&self, sample_limit: u32) -> GatewayResult<Vec<CollectionSummary>> {
        let counts = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT collection, COUNT(*) AS record_count
                 FROM records
                 GROUP BY collection
                 ORDER BY collection ASC;",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let counts = rows.collect::<Result<Vec<_>, _>>()?;
            counts
        };

        let mut summaries = Vec::with_capacity(counts.len());
        for (name, record_count) in counts {
            let metadata_fields = self.metadata_fields(&name)?;
            let samples = if sample_limit == 0 {
                Vec::new()
            } else {
                self.query_similar(
                    &name,
                    &SimilarityQuery {
                        text: None,
                        filter: None,
                        limit: sample_limit,
                    },
                )?
            };
            summaries.push(CollectionSummary {
                name,
                record_count: u64::try_from(record_count).unwrap_or_default(),
                metadata_fields,
                samples,
            });
        }
        Ok(summaries)
    }

    fn metadata_fields(&self, collection: &str) -> GatewayResult<BTreeMap<String, BTreeSet<String>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT key, kind
             FROM record_metadata
             WHERE collection = ?1
             ORDER BY key ASC, kind ASC;",
        )?;
        let mut rows = stmt.query([collection])?;
        let mut fields: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            fields
                .entry(row.get("key")?)
                .or_default()
                .insert(row.get("kind")?);
        }
        Ok(fields)
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl PersistenceGateway for SqliteGateway {
    fn put_record(&self, collection: &str, record: &Record) -> GatewayResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records (collection, id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at;",
            params![
                collection,
                record.id.as_str(),
                record.text.as_str(),
                to_epoch_ms(record.created_at),
                to_epoch_ms(record.updated_at),
            ],
        )?;
        replace_metadata(&tx, collection, &record.id, &record.metadata)?;
        tx.commit()?;
        Ok(())
    }

    fn get_record(&self, collection: &str, id: &str) -> GatewayResult<Option<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, created_at, updated_at
             FROM records
             WHERE collection = ?1 AND id = ?2;",
        )?;
        let mut rows = stmt.query(params![collection, id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_record_row(&conn, collection, row)?)),
            None => Ok(None),
        }
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        update: &RecordUpdate<'_>,
    ) -> GatewayResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE records
             SET content = COALESCE(?3, content), updated_at = ?4
             WHERE collection = ?1 AND id = ?2
               AND (?5 IS NULL OR updated_at = ?5);",
            params![
                collection,
                id,
                update.text,
                to_epoch_ms(update.updated_at),
                update.if_updated_at.map(to_epoch_ms)
            ],
        )?;

        if changed == 0 {
            return Ok(false);
        }

        if let Some(metadata) = update.metadata {
            replace_metadata(&tx, collection, id, metadata)?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn delete_record(&self, collection: &str, id: &str) -> GatewayResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2;",
            params![collection, id],
        )?;
        Ok(changed > 0)
    }

    fn query_similar(
        &self,
        collection: &str,
        query: &SimilarityQuery<'_>,
    ) -> GatewayResult<Vec<Record>> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let match_expr = match query.text.map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => match build_match_expression(text) {
                Some(expr) => Some(expr),
                // Text without searchable terms matches nothing.
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut bind_values: Vec<Value> = Vec::new();
        let mut sql = match match_expr.as_ref() {
            Some(expr) => {
                bind_values.push(Value::Text(expr.clone()));
                String::from(
                    "SELECT r.id AS id, r.content AS content,
                            r.created_at AS created_at, r.updated_at AS updated_at
                     FROM records_fts
                     JOIN records r ON r.rowid = records_fts.rowid
                     WHERE records_fts MATCH ?",
                )
            }
            None => String::from(
                "SELECT r.id AS id, r.content AS content,
                        r.created_at AS created_at, r.updated_at AS updated_at
                 FROM records r
                 WHERE 1 = 1",
            ),
        };

        sql.push_str(" AND r.collection = ?");
        bind_values.push(Value::Text(collection.to_string()));

        if let Some(filter) = query.filter {
            for (key, value) in filter {
                push_filter_clause(&mut sql, &mut bind_values, key, value);
            }
        }

        if match_expr.is_some() {
            sql.push_str(" ORDER BY bm25(records_fts), r.updated_at DESC, r.id ASC");
        } else {
            sql.push_str(" ORDER BY r.updated_at DESC, r.id ASC");
        }
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(query.limit)));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(&conn, collection, row)?);
        }

        debug!(
            "event=gateway_query module=gateway status=ok collection={} ranked={} filtered={} hits={}",
            collection,
            match_expr.is_some(),
            query.filter.is_some_and(|filter| !filter.is_empty()),
            records.len()
        );
        Ok(records)
    }
}

fn push_filter_clause(sql: &mut String, bind_values: &mut Vec<Value>, key: &str, value: &PropertyValue) {
    sql.push_str(
        " AND EXISTS (
            SELECT 1 FROM record_metadata m
            WHERE m.collection = r.collection
              AND m.record_id = r.id
              AND m.key = ?",
    );
    bind_values.push(Value::Text(key.to_string()));

    let number = match value {
        PropertyValue::Integer(integer) => Some(Value::Integer(*integer)),
        PropertyValue::Float(float) => Some(Value::Real(*float)),
        _ => None,
    };

    match number {
        // SQLite compares INTEGER with REAL exactly, so neither side is
        // rounded through a double.
        Some(number) => {
            sql.push_str(
                " AND ((m.kind = 'integer' AND CAST(m.value AS INTEGER) = ?)
                    OR (m.kind = 'float' AND CAST(m.value AS REAL) = ?)))",
            );
            bind_values.push(number.clone());
            bind_values.push(number);
        }
        None => {
            sql.push_str(" AND m.kind = ? AND m.match_value = ?)");
            bind_values.push(Value::Text(value.kind().to_string()));
            bind_values.push(Value::Text(value.match_text()));
        }
    }
}

fn replace_metadata(
    tx: &Transaction<'_>,
    collection: &str,
    id: &str,
    metadata: &Metadata,
) -> GatewayResult<()> {
    tx.execute(
        "DELETE FROM record_metadata WHERE collection = ?1 AND record_id = ?2;",
        params![collection, id],
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO record_metadata (collection, record_id, key, kind, value, match_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )?;
    for (key, value) in metadata {
        stmt.execute(params![
            collection,
            id,
            key,
            value.kind(),
            value.to_raw(),
            value.match_text()
        ])?;
    }
    Ok(())
}

fn load_metadata(conn: &Connection, collection: &str, id: &str) -> GatewayResult<Metadata> {
    let mut stmt = conn.prepare(
        "SELECT key, kind, value
         FROM record_metadata
         WHERE collection = ?1 AND record_id = ?2;",
    )?;
    let mut rows = stmt.query(params![collection, id])?;
    let mut metadata = Metadata::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get("key")?;
        let kind: String = row.get("kind")?;
        let raw: String = row.get("value")?;
        let value = PropertyValue::from_raw(&kind, &raw).ok_or_else(|| {
            GatewayError::InvalidData(format!(
                "metadata `{key}` of record `{id}` has kind `{kind}` but value `{raw}`"
            ))
        })?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

fn parse_record_row(conn: &Connection, collection: &str, row: &Row<'_>) -> GatewayResult<Record> {
    let id: String = row.get("id")?;
    let metadata = load_metadata(conn, collection, &id)?;
    Ok(Record {
        text: row.get("content")?,
        created_at: from_epoch_ms(row.get("created_at")?)?,
        updated_at: from_epoch_ms(row.get("updated_at")?)?,
        metadata,
        id,
    })
}

/// OR-combines quoted terms so BM25 ranks partial matches below full ones.
fn build_match_expression(text: &str) -> Option<String> {
    let terms = query_terms(text)
        .iter()
        .map(|term| escape_fts_term(term))
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" OR "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::build_match_expression;

    #[test]
    fn match_expression_quotes_and_or_combines_terms() {
        assert_eq!(
            build_match_expression("due Tuesday").as_deref(),
            Some("\"due\" OR \"tuesday\"")
        );
        assert_eq!(
            build_match_expression("say \"hi\"").as_deref(),
            Some("\"say\" OR \"\"\"hi\"\"\"")
        );
        assert_eq!(build_match_expression(" -- ! "), None);
    }
}
