//! Persisted state
//!
//! Single SQLite file under the daemon-home data directory, guarded by one
//! connection behind a mutex (single-writer, as spec'd for the store). All
//! multi-row mutations go through `with_tx`, which opens an IMMEDIATE
//! transaction and commits only if the closure succeeds.

mod containers;
mod networks;
mod schema;
mod volumes;

pub use containers::{ContainerRow, MountRow, NetworkAttachmentRow, PortMappingRow};
pub use networks::{IpAllocationRow, NetworkRow};
pub use volumes::VolumeRow;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StateResult<T> = Result<T, StateError>;

/// Single-writer SQLite-backed state store.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;

        tracing::info!(path = %path.display(), "state store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a single IMMEDIATE transaction, committing on success
    /// and rolling back on error. Used for multi-table writes (e.g. a
    /// container's row plus its network attachment rows).
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StateResult<T>,
    ) -> StateResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run `f` with a read-only borrow of the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StateResult<T>) -> StateResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_migrates() {
        let store = StateStore::open_in_memory().unwrap();
        let version: i64 = store
            .with_conn(|c| {
                Ok(c.query_row("SELECT version FROM meta", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }
}
