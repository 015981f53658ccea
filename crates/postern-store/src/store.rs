//! [`NodeStore`] implementation over rusqlite.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};

use crate::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// One persisted node registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    /// Unique node label; primary identity.
    pub label: String,
    /// The serialized ConnInfo envelope, uninterpreted.
    pub obm_info: Vec<u8>,
    /// Monotonic registration version.
    pub version: u64,
}

/// SQLite-backed persistence for the `nodes` table.
///
/// Access is serialized through an internal mutex; every call is a single
/// short statement, so holding it across a call is cheap.
pub struct NodeStore {
    conn: Mutex<Connection>,
}

impl NodeStore {
    /// Open (or create) a store at the given path. The schema is created
    /// idempotently.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory store. Useful for tests and `:memory:`
    /// deployments where persistence across restarts is not needed.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                label TEXT PRIMARY KEY,
                obm_info BLOB NOT NULL,
                version INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load every registered node.
    pub fn load_all(&self) -> Result<Vec<NodeRow>> {
        let conn = self.conn.lock().expect("node store lock poisoned");
        let mut stmt = conn.prepare("SELECT label, obm_info, version FROM nodes")?;
        let rows = stmt.query_map([], |row| {
            Ok(NodeRow {
                label: row.get(0)?,
                obm_info: row.get(1)?,
                version: row.get::<_, i64>(2)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Insert a new registration. The caller has already established that
    /// the label is free.
    pub fn insert(&self, label: &str, obm_info: &[u8], version: u64) -> Result<()> {
        let conn = self.conn.lock().expect("node store lock poisoned");
        conn.execute(
            "INSERT INTO nodes (label, obm_info, version) VALUES (?1, ?2, ?3)",
            params![label, obm_info, version as i64],
        )?;
        Ok(())
    }

    /// Persist a new version for `label`.
    pub fn set_version(&self, label: &str, version: u64) -> Result<()> {
        let conn = self.conn.lock().expect("node store lock poisoned");
        conn.execute(
            "UPDATE nodes SET version = ?1 WHERE label = ?2",
            params![version as i64, label],
        )?;
        Ok(())
    }

    /// Delete the registration for `label`. A no-op if it is absent.
    pub fn delete(&self, label: &str) -> Result<()> {
        let conn = self.conn.lock().expect("node store lock poisoned");
        conn.execute("DELETE FROM nodes WHERE label = ?1", params![label])?;
        Ok(())
    }
}
