pub mod handle;
pub mod schema;

pub use handle::{HandleState, StoreHandle, StoreLocation};

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the SQLite-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("failed to create store directory: {0}")]
  Io(#[from] std::io::Error),
  #[error("failed to encode record: {0}")]
  Json(#[from] serde_json::Error),
  #[error("failed to decode record: {0}")]
  Hex(#[from] hex::FromHexError),
  #[error("store initialization task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
  #[error("lock poisoned")]
  Poisoned,
}

/// SQLite connection wrapper. Every operation runs as its own transaction.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path` and apply `schema`.
  pub fn open(path: &Path, schema: &str) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn, schema)
  }

  /// Open a private in-memory database, used by tests and dry runs.
  pub fn open_in_memory(schema: &str) -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?, schema)
  }

  fn with_connection(conn: Connection, schema: &str) -> Result<Self, StoreError> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(schema)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Run `f` inside a transaction, committing only if it returns `Ok`.
  pub fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
  where
    F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
  {
    let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
  }
}
