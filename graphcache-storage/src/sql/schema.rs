//! Table layout and row codec of the persistent tier.
//!
//! ```text
//! records
//! ├── key              TEXT PRIMARY KEY
//! ├── type             TEXT NOT NULL
//! ├── blob             TEXT NOT NULL      fields + metadata + mutation id (JSON)
//! ├── updated_date     INTEGER NOT NULL   epoch millis, orders trimming
//! ├── received_date    INTEGER            only with date tracking
//! └── expiration_date  INTEGER            only with date tracking
//! ```

use std::collections::BTreeMap;

use graphcache_core::{CacheKey, FieldMetadata, Record, RecordValue};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SqlCacheError;

/// Optional columns added when date tracking is enabled.
pub const DATE_COLUMNS: [&str; 2] = ["received_date", "expiration_date"];

/// SQL function overlaying an incoming blob onto a stored one.
pub const OVERLAY_FUNCTION: &str = "graphcache_overlay";

/// Create the table, indexes and SQL functions.
pub fn initialize(conn: &Connection, track_dates: bool) -> Result<(), SqlCacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            key TEXT PRIMARY KEY NOT NULL,
            type TEXT NOT NULL,
            blob TEXT NOT NULL,
            updated_date INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_updated_date ON records(updated_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_type ON records(type)",
        [],
    )?;

    if track_dates {
        let existing = column_names(conn)?;
        for column in DATE_COLUMNS {
            if !existing.iter().any(|name| name == column) {
                conn.execute(&format!("ALTER TABLE records ADD COLUMN {column} INTEGER"), [])?;
            }
        }
    }

    register_functions(conn)
}

fn column_names(conn: &Connection) -> Result<Vec<String>, SqlCacheError> {
    let mut stmt = conn.prepare("PRAGMA table_info(records)")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn register_functions(conn: &Connection) -> Result<(), SqlCacheError> {
    conn.create_scalar_function(
        OVERLAY_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let stored: String = ctx.get(0)?;
            let incoming: String = ctx.get(1)?;
            overlay(&stored, &incoming)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
        },
    )?;
    Ok(())
}

#[derive(Serialize)]
struct BlobRef<'a> {
    fields: &'a BTreeMap<String, RecordValue>,
    metadata: &'a BTreeMap<String, FieldMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mutation_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize)]
struct Blob {
    fields: BTreeMap<String, RecordValue>,
    #[serde(default)]
    metadata: BTreeMap<String, FieldMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mutation_id: Option<Uuid>,
}

/// Serialize the stored part of a record.
pub fn encode(record: &Record) -> Result<String, serde_json::Error> {
    serde_json::to_string(&BlobRef {
        fields: &record.fields,
        metadata: &record.metadata,
        mutation_id: record.mutation_id,
    })
}

/// Rebuild a record from one row.
pub fn decode(key: String, type_name: String, blob: &str) -> Result<Record, SqlCacheError> {
    let Blob {
        fields,
        metadata,
        mutation_id,
    } = serde_json::from_str(blob).map_err(|e| SqlCacheError::Corrupted {
        key: key.clone(),
        reason: e.to_string(),
    })?;
    Ok(Record {
        key: CacheKey::new(key),
        type_name,
        fields,
        metadata,
        mutation_id,
    })
}

/// Incoming fields and metadata entries replace stored ones; stored-only
/// fields survive.
fn overlay(stored: &str, incoming: &str) -> Result<String, serde_json::Error> {
    let mut base: Blob = serde_json::from_str(stored)?;
    let update: Blob = serde_json::from_str(incoming)?;
    base.fields.extend(update.fields);
    for (field, entries) in update.metadata {
        base.metadata.entry(field).or_default().extend(entries);
    }
    base.mutation_id = update.mutation_id;
    serde_json::to_string(&base)
}
