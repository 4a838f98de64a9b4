//! [`NormalizedCache`] implementation over SQLite.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use graphcache_core::headers::{
    DO_NOT_STORE, ERRORS_REPLACE_CACHED_VALUES, EVICT_AFTER_READ, EXPIRATION_DATE,
    MEMORY_CACHE_ONLY, RECEIVED_DATE,
};
use graphcache_core::{
    CacheHeaders, CacheKey, CacheResult, KeyPattern, MergeContext, Record, RecordMerger,
    SqlCacheConfig, StorageError,
};
use rusqlite::Connection;
use tracing::debug;

use super::database::{RecordDatabase, RowDates};
use super::{schema, SqlCacheError};
use crate::hook;
use crate::traits::{CacheDump, NormalizedCache};

/// Tier name reported in dumps.
pub const SQL_TIER: &str = "sql";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed record store.
///
/// # Example
///
/// ```ignore
/// use graphcache_core::{CacheHeaders, DefaultRecordMerger, Record, SqlCacheConfig};
/// use graphcache_storage::{NormalizedCache, SqlNormalizedCache};
///
/// let cache = SqlNormalizedCache::open("/tmp/graphcache/records.db", SqlCacheConfig::default())?;
/// let record = Record::new("user:1", "User").with_field("name", "Ada");
/// cache.merge(record, &CacheHeaders::none(), &DefaultRecordMerger);
/// ```
pub struct SqlNormalizedCache {
    conn: Mutex<Connection>,
    config: SqlCacheConfig,
}

impl SqlNormalizedCache {
    /// Open or create a database file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The parent directory cannot be created
    /// - SQLite cannot open the file or create the schema
    pub fn open<P: AsRef<Path>>(path: P, config: SqlCacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        Self::try_open(path, config).map_err(|e| {
            StorageError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Private in-memory database.
    pub fn in_memory(config: SqlCacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Connection::open_in_memory()
            .map_err(SqlCacheError::from)
            .and_then(|conn| Self::with_connection(conn, config))
            .map_err(|e| {
                StorageError::OpenFailed {
                    path: ":memory:".to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Open `config.path`, or an in-memory database when it is unset.
    pub fn from_config(config: SqlCacheConfig) -> CacheResult<Self> {
        match config.path.clone() {
            Some(path) => Self::open(path, config),
            None => Self::in_memory(config),
        }
    }

    fn try_open(path: &Path, config: SqlCacheConfig) -> Result<Self, SqlCacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: SqlCacheConfig) -> Result<Self, SqlCacheError> {
        schema::initialize(&conn, config.track_dates)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    pub fn config(&self) -> &SqlCacheConfig {
        &self.config
    }

    /// Current database size in bytes.
    pub fn size(&self) -> CacheResult<u64> {
        let conn = self.connection();
        Ok(self.database(&conn).size_bytes()?)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> CacheResult<u64> {
        let conn = self.connection();
        Ok(self.database(&conn).count()?)
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn database<'c>(&self, conn: &'c Connection) -> RecordDatabase<'c> {
        RecordDatabase::new(conn, self.config.max_parameters, self.config.track_dates)
    }

    /// Run `f` on the connection. Failures go to the error hook and degrade to
    /// the default value.
    fn run<T: Default>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Connection) -> Result<T, SqlCacheError>,
    ) -> T {
        let result = f(&mut *self.connection());
        match result {
            Ok(value) => value,
            Err(e) => {
                hook::report(operation, &e.into());
                T::default()
            }
        }
    }

    fn row_dates(headers: &CacheHeaders) -> RowDates {
        let received = headers.header_i64(RECEIVED_DATE);
        RowDates {
            updated: received
                .map(|seconds| seconds.saturating_mul(1000))
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
            received,
            expiration: headers.header_i64(EXPIRATION_DATE),
        }
    }

    fn merge_in(
        &self,
        conn: &mut Connection,
        records: &[Record],
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> Result<BTreeSet<String>, SqlCacheError> {
        let dates = Self::row_dates(headers);
        let tx = conn.transaction()?;
        let db = self.database(&tx);

        if merger.is_field_overwrite() && headers.has_header(ERRORS_REPLACE_CACHED_VALUES) {
            db.upsert(records, dates, true)?;
            tx.commit()?;
            return Ok(records.iter().flat_map(Record::field_keys).collect());
        }

        let keys: Vec<CacheKey> = records.iter().map(|r| r.key.clone()).collect();
        let mut current: HashMap<CacheKey, Record> = db
            .select_records(&keys)?
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();

        let mut changed = BTreeSet::new();
        let mut dirty: BTreeMap<CacheKey, Record> = BTreeMap::new();
        for incoming in records {
            let merged = match current.get(&incoming.key) {
                None => {
                    changed.extend(incoming.field_keys());
                    incoming.clone()
                }
                Some(existing) => {
                    let (merged, delta) =
                        merger.merge(MergeContext::new(existing, incoming, headers));
                    changed.extend(delta);
                    // Unchanged values still carry fresh dates and mutation ids.
                    if merged.is_empty() {
                        continue;
                    }
                    merged
                }
            };
            current.insert(merged.key.clone(), merged.clone());
            dirty.insert(merged.key.clone(), merged);
        }

        let dirty: Vec<Record> = dirty.into_values().collect();
        db.upsert(&dirty, dates, false)?;
        tx.commit()?;
        debug!(
            tier = SQL_TIER,
            records = records.len(),
            written = dirty.len(),
            changed = changed.len(),
            "merged records"
        );
        Ok(changed)
    }

    fn trim_to(&self, max_size_bytes: u64, trim_factor: f32) -> Result<u64, SqlCacheError> {
        let mut conn = self.connection();
        let size = self.database(&conn).size_bytes()?;
        if size < max_size_bytes {
            return Ok(size);
        }

        let tx = conn.transaction()?;
        let db = self.database(&tx);
        let count = db.count()?;
        let factor = f64::from(trim_factor).clamp(0.0, 1.0);
        let doomed = ((count as f64) * factor).ceil() as usize;
        let removed = db.delete_oldest(doomed)?;
        tx.commit()?;

        let db = self.database(&conn);
        db.vacuum()?;
        let trimmed = db.size_bytes()?;
        debug!(
            tier = SQL_TIER,
            before = size,
            after = trimmed,
            removed,
            "trimmed persistent tier"
        );
        Ok(trimmed)
    }
}

impl NormalizedCache for SqlNormalizedCache {
    fn name(&self) -> &'static str {
        SQL_TIER
    }

    fn load_record(&self, key: &CacheKey, headers: &CacheHeaders) -> Option<Record> {
        self.load_records(std::slice::from_ref(key), headers)
            .into_iter()
            .next()
    }

    fn load_records(&self, keys: &[CacheKey], headers: &CacheHeaders) -> Vec<Record> {
        if headers.has_header(MEMORY_CACHE_ONLY) || keys.is_empty() {
            return Vec::new();
        }
        let evict = headers.has_header(EVICT_AFTER_READ);
        self.run("load_records", |conn| {
            let tx = conn.transaction()?;
            let db = self.database(&tx);
            let mut found: HashMap<CacheKey, Record> = db
                .select_records(keys)?
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect();
            if evict && !found.is_empty() {
                let served: Vec<CacheKey> = found.keys().cloned().collect();
                db.delete_keys(&served)?;
            }
            tx.commit()?;
            Ok(keys.iter().filter_map(|key| found.remove(key)).collect())
        })
    }

    fn merge_records(
        &self,
        records: Vec<Record>,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        if headers.has_header(DO_NOT_STORE) || records.is_empty() {
            return BTreeSet::new();
        }
        if headers.has_header(MEMORY_CACHE_ONLY) {
            debug!(tier = SQL_TIER, "memory-only write skipped");
            return BTreeSet::new();
        }
        let records: Vec<Record> = if self.config.track_dates {
            records
                .into_iter()
                .map(|record| {
                    record.with_dates(
                        headers.header_i64(RECEIVED_DATE),
                        headers.header_i64(EXPIRATION_DATE),
                    )
                })
                .collect()
        } else {
            records
        };
        self.run("merge_records", |conn| {
            self.merge_in(conn, &records, headers, merger)
        })
    }

    fn remove_keys(&self, keys: &[CacheKey], cascade: bool) -> usize {
        self.run("remove_keys", |conn| {
            let tx = conn.transaction()?;
            let db = self.database(&tx);
            let targets = if cascade {
                db.reachable_keys(keys)?
            } else {
                keys.to_vec()
            };
            let removed = db.delete_keys(&targets)?;
            tx.commit()?;
            debug!(tier = SQL_TIER, removed, cascade, "removed records");
            Ok(removed)
        })
    }

    fn remove_matching(&self, pattern: &str) -> CacheResult<usize> {
        let glob = KeyPattern::parse(pattern)?.to_sql_glob();
        Ok(self.run("remove_matching", |conn| {
            self.database(conn).delete_matching(&glob)
        }))
    }

    fn remove_by_types(&self, types: &[&str]) -> usize {
        if types.is_empty() {
            return 0;
        }
        self.run("remove_by_types", |conn| {
            let tx = conn.transaction()?;
            let removed = self.database(&tx).delete_types(types)?;
            tx.commit()?;
            Ok(removed)
        })
    }

    fn clear_all(&self) {
        self.run("clear_all", |conn| {
            self.database(conn).delete_all()?;
            Ok(())
        });
    }

    fn dump(&self) -> CacheDump {
        let records = self.run("dump", |conn| self.database(conn).select_all());
        let mut dump = CacheDump::new();
        dump.insert(
            SQL_TIER,
            records
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        );
        dump
    }

    fn trim(&self, max_size_bytes: u64, trim_factor: f32) -> Option<u64> {
        match self.trim_to(max_size_bytes, trim_factor) {
            Ok(size) => Some(size),
            Err(e) => {
                hook::report("trim", &e.into());
                None
            }
        }
    }
}
