//! Redb-backed durable storage.
//!
//! Two tables: a single-row state snapshot (key 1, updated-at plus the JSON
//! domain tree) and an append-only traffic log keyed by a monotonic counter.
//! Redb gives ACID transactions with copy-on-write, so a crash mid-write
//! never corrupts the previous snapshot.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use opsim_core::{DomainMap, PersistError, Persistence, TrafficRecord};

/// Table: state snapshot. Key: always 1. Value: JSON [`StateSnapshotRow`].
const STATE: TableDefinition<u64, &[u8]> = TableDefinition::new("state_snapshot");

/// Table: traffic log. Key: monotonic counter. Value: JSON traffic record.
const TRAFFIC: TableDefinition<u64, &[u8]> = TableDefinition::new("traffic");

const SNAPSHOT_KEY: u64 = 1;

/// Persisted snapshot row.
#[derive(Debug, Serialize, Deserialize)]
struct StateSnapshotRow {
    updated_at: String,
    state: DomainMap,
}

/// Durable storage backed by redb. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
    next_traffic_id: Arc<AtomicU64>,
}

impl RedbStorage {
    /// Open or create the database and its tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(STATE).map_err(io_err)?;
            let _ = txn.open_table(TRAFFIC).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        let next_traffic_id = {
            let txn = db.begin_read().map_err(io_err)?;
            let table = txn.open_table(TRAFFIC).map_err(io_err)?;
            let last = table.last().map_err(io_err)?;
            last.map_or(0, |(key, _)| key.value() + 1)
        };

        Ok(Self { db: Arc::new(db), next_traffic_id: Arc::new(AtomicU64::new(next_traffic_id)) })
    }
}

impl Persistence for RedbStorage {
    fn load_state(&self) -> Result<Option<DomainMap>, PersistError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(STATE).map_err(io_err)?;
        let Some(value) = table.get(SNAPSHOT_KEY).map_err(io_err)? else {
            return Ok(None);
        };
        let row: StateSnapshotRow = serde_json::from_slice(value.value())
            .map_err(|e| PersistError::Decode(e.to_string()))?;
        Ok(Some(row.state))
    }

    fn save_state(&self, domains: &DomainMap) -> Result<(), PersistError> {
        let row = StateSnapshotRow {
            updated_at: chrono::Utc::now().to_rfc3339(),
            state: domains.clone(),
        };
        let bytes = serde_json::to_vec(&row).map_err(|e| PersistError::Decode(e.to_string()))?;

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(STATE).map_err(io_err)?;
            table.insert(SNAPSHOT_KEY, bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn append_traffic(&self, record: &TrafficRecord) -> Result<(), PersistError> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| PersistError::Decode(e.to_string()))?;
        let id = self.next_traffic_id.fetch_add(1, Ordering::SeqCst);

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(TRAFFIC).map_err(io_err)?;
            table.insert(id, bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;
        Ok(())
    }
}

fn io_err(err: impl std::fmt::Display) -> PersistError {
    PersistError::Io(err.to_string())
}
