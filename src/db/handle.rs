//! Process-wide, lazily opened handle to the outbox database.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{schema, Database, StoreError};

/// Where the outbox database lives.
#[derive(Debug, Clone)]
pub enum StoreLocation {
  File(PathBuf),
  Memory,
}

/// Observable lifecycle of a [`StoreHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
  Uninitialized,
  Initializing,
  Ready,
}

/// Shared handle to the outbox database.
///
/// The database is opened on first use. Concurrent first accesses wait on the same
/// initialization; a failed initialization leaves the handle uninitialized so the
/// next access tries again. Once ready, the handle is never torn down.
pub struct StoreHandle {
  location: StoreLocation,
  db: OnceCell<Arc<Database>>,
  initializing: AtomicBool,
}

impl StoreHandle {
  pub fn new(location: StoreLocation) -> Self {
    Self {
      location,
      db: OnceCell::new(),
      initializing: AtomicBool::new(false),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(StoreLocation::Memory)
  }

  pub fn state(&self) -> HandleState {
    if self.db.initialized() {
      HandleState::Ready
    } else if self.initializing.load(Ordering::Acquire) {
      HandleState::Initializing
    } else {
      HandleState::Uninitialized
    }
  }

  /// Get the database, opening it if this is the first access.
  pub async fn get(&self) -> Result<Arc<Database>, StoreError> {
    let db = self
      .db
      .get_or_try_init(|| async {
        let _initializing = Initializing::enter(&self.initializing);
        let location = self.location.clone();
        let opened = tokio::task::spawn_blocking(move || open(&location)).await;

        let db = opened??;
        tracing::debug!(location = ?self.location, "outbox store ready");
        Ok::<_, StoreError>(Arc::new(db))
      })
      .await?;

    Ok(Arc::clone(db))
  }
}

/// Marks a handle as initializing until dropped, including when the caller gives up
/// on `get` mid-open.
struct Initializing<'a>(&'a AtomicBool);

impl<'a> Initializing<'a> {
  fn enter(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::Release);
    Self(flag)
  }
}

impl Drop for Initializing<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

fn open(location: &StoreLocation) -> Result<Database, StoreError> {
  match location {
    StoreLocation::File(path) => Database::open(path, schema::SCHEMA),
    StoreLocation::Memory => Database::open_in_memory(schema::SCHEMA),
  }
}
