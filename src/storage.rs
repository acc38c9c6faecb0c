use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};

use crate::record::Record;

/// Fixed logical name of the record collection.
pub const DEFAULT_COLLECTION: &str = "greenlens_detections";

const SCHEMA_VERSION: i64 = 1;

/// Append-only record store shared by the pipeline and the aggregation engine.
///
/// Implementations serialise writes internally so concurrent appends never
/// overwrite one another.
pub trait RecordStore: Send + Sync {
    /// Persist a record and return it as stored.
    fn append(&self, record: Record) -> Result<Record>;

    /// All records, oldest first.
    fn list_all(&self) -> Result<Vec<Record>>;

    /// Value that changes on every successful append.
    fn version(&self) -> Result<u64>;
}

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    collection: String,
}

impl SqliteRecordStore {
    pub fn open(db_path: &str) -> Result<Self> {
        Self::open_collection(db_path, DEFAULT_COLLECTION)
    }

    pub fn open_collection(db_path: &str, collection: &str) -> Result<Self> {
        if collection.trim().is_empty() {
            return Err(anyhow!("record collection name must not be empty"));
        }
        let conn = crate::open_db_connection(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("record store connection lock poisoned"))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS records (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              collection TEXT NOT NULL,
              record_id TEXT NOT NULL UNIQUE,
              created_at INTEGER NOT NULL,
              payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, seq);
            "#,
        )?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        } else if version != SCHEMA_VERSION {
            return Err(anyhow!(
                "record store schema version {} not supported (expected {})",
                version,
                SCHEMA_VERSION
            ));
        }
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn append(&self, record: Record) -> Result<Record> {
        record.validate()?;
        let created_at = i64::try_from(record.created_at)
            .map_err(|_| anyhow!("record created_at exceeds i64 range"))?;
        let payload_json = serde_json::to_string(&record)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO records(collection, record_id, created_at, payload_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![self.collection, record.id, created_at, payload_json],
        )?;
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<Record>> {
        let payloads = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT payload_json FROM records WHERE collection = ?1 ORDER BY seq ASC",
            )?;
            let mut rows = stmt.query(params![self.collection])?;
            let mut payloads = Vec::new();

            while let Some(row) = rows.next()? {
                let payload: String = row.get(0)?;
                payloads.push(payload);
            }

            payloads
        };

        let mut out = Vec::with_capacity(payloads.len());
        for payload in payloads {
            out.push(serde_json::from_str(&payload)?);
        }
        Ok(out)
    }

    fn version(&self) -> Result<u64> {
        let conn = self.conn()?;
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM records WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(seq as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, Vec<Record>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("in-memory record store lock poisoned"))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append(&self, record: Record) -> Result<Record> {
        record.validate()?;
        let mut records = self.records()?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(anyhow!("record {} already stored", record.id));
        }
        records.push(record.clone());
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<Record>> {
        Ok(self.records()?.clone())
    }

    fn version(&self) -> Result<u64> {
        Ok(self.records()?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::WasteCategory;

    fn record(id: &str, category: WasteCategory) -> Record {
        Record {
            id: id.to_string(),
            category,
            confidence: 0.9,
            lat: 51.5074,
            lng: -0.1278,
            created_at: 1_700_000_000_000,
            description: None,
        }
    }

    fn stores() -> Vec<Box<dyn RecordStore>> {
        vec![
            Box::new(SqliteRecordStore::open(&crate::shared_memory_uri()).unwrap()),
            Box::new(InMemoryRecordStore::new()),
        ]
    }

    #[test]
    fn empty_store_lists_empty() {
        for store in stores() {
            assert!(store.list_all().unwrap().is_empty());
            assert_eq!(store.version().unwrap(), 0);
        }
    }

    #[test]
    fn list_all_preserves_insertion_order() {
        for store in stores() {
            store.append(record("c", WasteCategory::Cup)).unwrap();
            store.append(record("a", WasteCategory::Bottle)).unwrap();
            store.append(record("b", WasteCategory::Can)).unwrap();
            let ids: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.id).collect();
            assert_eq!(ids, vec!["c", "a", "b"]);
        }
    }

    #[test]
    fn malformed_and_duplicate_records_are_rejected_without_side_effects() {
        for store in stores() {
            store.append(record("a", WasteCategory::Bottle)).unwrap();
            let version = store.version().unwrap();

            let mut bad = record("b", WasteCategory::Can);
            bad.lng = 200.0;
            assert!(store.append(bad).is_err());
            assert!(store.append(record("a", WasteCategory::Cup)).is_err());

            assert_eq!(store.list_all().unwrap().len(), 1);
            assert_eq!(store.version().unwrap(), version);
        }
    }

    #[test]
    fn version_advances_on_append() {
        for store in stores() {
            let before = store.version().unwrap();
            store.append(record("x", WasteCategory::Trash)).unwrap();
            assert!(store.version().unwrap() > before);
        }
    }

    #[test]
    fn collections_are_isolated() {
        let uri = crate::shared_memory_uri();
        let primary = SqliteRecordStore::open(&uri).unwrap();
        let other = SqliteRecordStore::open_collection(&uri, "greenlens_archive").unwrap();
        primary.append(record("p", WasteCategory::Bottle)).unwrap();
        assert_eq!(primary.list_all().unwrap().len(), 1);
        assert!(other.list_all().unwrap().is_empty());
    }
}
