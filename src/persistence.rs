//! # Persistence
//!
//! Key-value storage for ride history, plus the typed record layer on top.
//!
//! ## Layout
//!
//! | Key                    | Value                          |
//! |------------------------|--------------------------------|
//! | `ridelog:current`      | current ride id (plain string) |
//! | `ridelog:index`        | JSON array of `IndexEntry`     |
//! | `ridelog:last_cleanup` | last sweep timestamp, ms       |
//! | `ridelog:ride:<id>`    | JSON `Ride`                    |
//! | `<id>_<NNN>`           | JSON array of `TrackPoint`     |
//!
//! Values that are missing or fail to parse read back as absent.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::warn;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{HistoryError, Result};

// ============================================================================
// Keys
// ============================================================================

/// Well-known keys and key builders.
pub mod keys {
    pub const CURRENT_RIDE: &str = "ridelog:current";
    pub const INDEX: &str = "ridelog:index";
    pub const LAST_CLEANUP: &str = "ridelog:last_cleanup";
    pub const RIDE_PREFIX: &str = "ridelog:ride:";

    pub fn ride(ride_id: &str) -> String {
        format!("{}{}", RIDE_PREFIX, ride_id)
    }

    /// Chunk key: `<ride-id>_<3-digit sequence>`, so lexical order is write order.
    pub fn chunk(ride_id: &str, seq: usize) -> String {
        format!("{}_{:03}", ride_id, seq)
    }

    /// Sequence number of a chunk key belonging to `ride_id`, if it is one.
    pub fn chunk_seq(ride_id: &str, key: &str) -> Option<usize> {
        let suffix = key.strip_prefix(ride_id)?.strip_prefix('_')?;
        if suffix.len() < 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// A single write within a multi-key commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: String },
    Remove { key: String },
}

/// Durable string-to-string storage.
///
/// `commit` applies all operations or, on error, none of them as far as the
/// backend can guarantee. Both shipped backends are transactional.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn commit(&mut self, ops: &[WriteOp]) -> Result<()>;

    /// All keys starting with `prefix`, in lexical order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.commit(&[WriteOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        }])
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.commit(&[WriteOp::Remove {
            key: key.to_string(),
        }])
    }
}

// ============================================================================
// SQLite Store
// ============================================================================

/// SQLite-backed store. One row per key; `commit` runs in a transaction.
pub struct SqliteStore {
    db: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
    }

    /// Number of stored keys.
    pub fn key_count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<()> {
        let tx = self.db.transaction()?;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO kv_store (key, value, updated_at)
                         VALUES (?1, ?2, strftime('%s', 'now'))
                         ON CONFLICT(key) DO UPDATE SET
                             value = excluded.value,
                             updated_at = excluded.updated_at",
                        params![key, value],
                    )?;
                }
                WriteOp::Remove { key } => {
                    tx.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory store. Clones share the same data, so a test can drop an engine
/// and reopen another over the same contents to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every key, for assertions.
    pub fn keys(&self) -> Vec<String> {
        self.data
            .lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.lock().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(data.get(key).cloned())
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| HistoryError::LockPoisoned)?;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                WriteOp::Remove { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.lock().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

// ============================================================================
// Typed Records
// ============================================================================

/// Read and decode a JSON record. Missing and malformed values are `None`;
/// only storage failures are errors.
pub(crate) fn read_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("[RideHistory] Ignoring malformed record '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Read a plain string value, treating empty as absent.
pub(crate) fn read_string(store: &dyn KeyValueStore, key: &str) -> Result<Option<String>> {
    Ok(store.get(key)?.filter(|v| !v.trim().is_empty()))
}

/// Read an epoch-millisecond timestamp stored as a decimal string.
pub(crate) fn read_timestamp(store: &dyn KeyValueStore, key: &str) -> Result<Option<i64>> {
    Ok(read_string(store, key)?.and_then(|v| match v.trim().parse() {
        Ok(ts) => Some(ts),
        Err(_) => {
            warn!("[RideHistory] Ignoring malformed timestamp '{}' under '{}'", v, key);
            None
        }
    }))
}

/// Accumulates writes so a mutation lands in one `commit`.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_record<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)?;
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value,
        });
        Ok(())
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::Remove { key: key.into() });
    }

    pub fn commit(self, store: &mut dyn KeyValueStore) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        store.commit(&self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &mut dyn KeyValueStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.put("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store
            .commit(&[
                WriteOp::Put {
                    key: "a".to_string(),
                    value: "2".to_string(),
                },
                WriteOp::Put {
                    key: "ride_1_000".to_string(),
                    value: "[]".to_string(),
                },
                WriteOp::Put {
                    key: "ride_1_001".to_string(),
                    value: "[]".to_string(),
                },
                WriteOp::Put {
                    key: "ride_10_000".to_string(),
                    value: "[]".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(
            store.keys_with_prefix("ride_1_").unwrap(),
            vec!["ride_1_000".to_string(), "ride_1_001".to_string()]
        );

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // Removing an absent key is fine
        store.remove("a").unwrap();
    }

    #[test]
    fn test_sqlite_store() {
        let mut store = SqliteStore::in_memory().unwrap();
        exercise_store(&mut store);
        assert_eq!(store.key_count().unwrap(), 3);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        exercise_store(&mut store);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_memory_store_clones_share_data() {
        let mut a = MemoryStore::new();
        let b = a.clone();
        a.put("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_sqlite_persists_across_connections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("history.db");
        let path = path.to_str().unwrap();

        {
            let mut store = SqliteStore::new(path).unwrap();
            store.put(keys::CURRENT_RIDE, "ride_1_1").unwrap();
        }

        let store = SqliteStore::new(path).unwrap();
        assert_eq!(
            store.get(keys::CURRENT_RIDE).unwrap().as_deref(),
            Some("ride_1_1")
        );
    }

    #[test]
    fn test_malformed_record_reads_as_absent() {
        let mut store = MemoryStore::new();
        store.put(keys::INDEX, "{not json").unwrap();
        let index: Option<Vec<u32>> = read_record(&store, keys::INDEX).unwrap();
        assert!(index.is_none());

        store.put(keys::LAST_CLEANUP, "yesterday").unwrap();
        assert_eq!(read_timestamp(&store, keys::LAST_CLEANUP).unwrap(), None);
    }

    #[test]
    fn test_chunk_keys() {
        assert_eq!(keys::chunk("ride_5_1", 0), "ride_5_1_000");
        assert_eq!(keys::chunk("ride_5_1", 12), "ride_5_1_012");
        assert_eq!(keys::chunk_seq("ride_5_1", "ride_5_1_012"), Some(12));
        assert_eq!(keys::chunk_seq("ride_5_1", "ride_5_12_000"), None);
        assert_eq!(keys::chunk_seq("ride_5_1", "ride_5_1_x"), None);
    }

    #[test]
    fn test_batch_commits_all_ops() {
        let mut store = MemoryStore::new();
        store.put("old", "x").unwrap();

        let mut batch = Batch::new();
        batch.put_record("list", &vec![1, 2, 3]).unwrap();
        batch.put_string("plain", "value");
        batch.remove("old");
        batch.commit(&mut store).unwrap();

        let list: Option<Vec<i32>> = read_record(&store, "list").unwrap();
        assert_eq!(list, Some(vec![1, 2, 3]));
        assert_eq!(read_string(&store, "plain").unwrap().as_deref(), Some("value"));
        assert_eq!(store.get("old").unwrap(), None);
    }
}
