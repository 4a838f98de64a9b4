//! Chunked statements over the `records` table.
//!
//! [`RecordDatabase`] borrows a connection or an open transaction (through
//! `Deref`) and never commits on its own.

use std::collections::BTreeSet;

use graphcache_core::{CacheKey, Record};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use super::schema;
use super::SqlCacheError;

/// Date columns written alongside a batch of records.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RowDates {
    /// Epoch millis.
    pub updated: i64,
    /// Epoch seconds.
    pub received: Option<i64>,
    /// Epoch seconds.
    pub expiration: Option<i64>,
}

pub(crate) struct RecordDatabase<'c> {
    conn: &'c Connection,
    max_parameters: usize,
    track_dates: bool,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn dedup(keys: &[CacheKey]) -> Vec<&str> {
    let unique: BTreeSet<&str> = keys.iter().map(CacheKey::as_str).collect();
    unique.into_iter().collect()
}

impl<'c> RecordDatabase<'c> {
    pub fn new(conn: &'c Connection, max_parameters: usize, track_dates: bool) -> Self {
        Self {
            conn,
            max_parameters: max_parameters.max(1),
            track_dates,
        }
    }

    pub fn select_records(&self, keys: &[CacheKey]) -> Result<Vec<Record>, SqlCacheError> {
        let keys = dedup(keys);
        let mut records = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.max_parameters) {
            let sql = format!(
                "SELECT key, type, blob FROM records WHERE key IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (key, type_name, blob) = row?;
                records.push(schema::decode(key, type_name, &blob)?);
            }
        }
        Ok(records)
    }

    pub fn select_all(&self) -> Result<Vec<Record>, SqlCacheError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, type, blob FROM records ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (key, type_name, blob) = row?;
            records.push(schema::decode(key, type_name, &blob)?);
        }
        Ok(records)
    }

    /// Insert or update `records`. With `overlay` the stored blob is kept and
    /// the incoming fields are laid over it inside SQLite.
    pub fn upsert(
        &self,
        records: &[Record],
        dates: RowDates,
        overlay: bool,
    ) -> Result<(), SqlCacheError> {
        let mut columns = vec!["key", "type", "blob", "updated_date"];
        if self.track_dates {
            columns.extend(schema::DATE_COLUMNS);
        }
        let blob_update = if overlay {
            format!("{}(records.blob, excluded.blob)", schema::OVERLAY_FUNCTION)
        } else {
            "excluded.blob".to_string()
        };
        let updates: Vec<String> = columns[1..]
            .iter()
            .map(|column| match *column {
                "blob" => format!("blob = {blob_update}"),
                other => format!("{other} = excluded.{other}"),
            })
            .collect();

        let row = format!("({})", placeholders(columns.len()));
        let rows_per_chunk = (self.max_parameters / columns.len()).max(1);
        for chunk in records.chunks(rows_per_chunk) {
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * columns.len());
            for record in chunk {
                values.push(Value::Text(record.key.as_str().to_string()));
                values.push(Value::Text(record.type_name.clone()));
                values.push(Value::Text(schema::encode(record)?));
                values.push(Value::Integer(dates.updated));
                if self.track_dates {
                    values.push(optional(dates.received.or_else(|| record.received_date())));
                    values.push(optional(
                        dates.expiration.or_else(|| record.expiration_date()),
                    ));
                }
            }
            let sql = format!(
                "INSERT INTO records ({}) VALUES {} ON CONFLICT(key) DO UPDATE SET {}",
                columns.join(", "),
                vec![row.as_str(); chunk.len()].join(", "),
                updates.join(", ")
            );
            self.conn.execute(&sql, params_from_iter(values))?;
        }
        Ok(())
    }

    /// Every key reachable from `keys` through references, `keys` included.
    /// Loads one frontier at a time and never revisits a key.
    pub fn reachable_keys(&self, keys: &[CacheKey]) -> Result<Vec<CacheKey>, SqlCacheError> {
        let mut visited: BTreeSet<CacheKey> = keys.iter().cloned().collect();
        let mut frontier: Vec<CacheKey> = visited.iter().cloned().collect();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for record in self.select_records(&frontier)? {
                for reference in record.referenced_keys() {
                    if visited.insert(reference.clone()) {
                        next.push(reference);
                    }
                }
            }
            frontier = next;
        }
        Ok(visited.into_iter().collect())
    }

    pub fn delete_keys(&self, keys: &[CacheKey]) -> Result<usize, SqlCacheError> {
        let keys = dedup(keys);
        let mut removed = 0;
        for chunk in keys.chunks(self.max_parameters) {
            let sql = format!(
                "DELETE FROM records WHERE key IN ({})",
                placeholders(chunk.len())
            );
            removed += self.conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(removed)
    }

    pub fn delete_matching(&self, glob: &str) -> Result<usize, SqlCacheError> {
        Ok(self
            .conn
            .execute("DELETE FROM records WHERE key GLOB ?1", params![glob])?)
    }

    pub fn delete_types(&self, types: &[&str]) -> Result<usize, SqlCacheError> {
        let mut removed = 0;
        for chunk in types.chunks(self.max_parameters) {
            let sql = format!(
                "DELETE FROM records WHERE type IN ({})",
                placeholders(chunk.len())
            );
            removed += self.conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(removed)
    }

    pub fn delete_all(&self) -> Result<usize, SqlCacheError> {
        Ok(self.conn.execute("DELETE FROM records", [])?)
    }

    /// Delete the `count` least recently updated rows, ties broken by
    /// insertion order.
    pub fn delete_oldest(&self, count: usize) -> Result<usize, SqlCacheError> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        Ok(self.conn.execute(
            "DELETE FROM records WHERE rowid IN (
                SELECT rowid FROM records ORDER BY updated_date ASC, rowid ASC LIMIT ?1
            )",
            params![limit],
        )?)
    }

    pub fn count(&self) -> Result<u64, SqlCacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// On-disk size: `page_count * page_size`.
    pub fn size_bytes(&self) -> Result<u64, SqlCacheError> {
        let pages: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((pages * page_size).max(0) as u64)
    }

    /// Must run outside any transaction.
    pub fn vacuum(&self) -> Result<(), SqlCacheError> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn optional(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
