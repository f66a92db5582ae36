//! Connectivity-trigger registrations persisted next to the outbox.

use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;

use super::{RegistrationError, SyncRegistrar};
use crate::db::{StoreError, StoreHandle};

/// Records registrations in the outbox database so a later `sync` run knows which
/// channels are waiting for connectivity.
#[derive(Clone)]
pub struct SqliteRegistrar {
  store: Arc<StoreHandle>,
}

impl SqliteRegistrar {
  pub fn new(store: Arc<StoreHandle>) -> Self {
    Self { store }
  }

  /// Tags registered and not yet fired, oldest first.
  pub async fn pending(&self) -> Result<Vec<String>, StoreError> {
    let db = self.store.get().await?;
    db.transaction(|tx| {
      let mut stmt = tx.prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, tag")?;
      let tags = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
      Ok(tags)
    })
  }

  /// Drop a registration once its trigger has been delivered.
  pub async fn complete(&self, tag: &str) -> Result<(), StoreError> {
    let db = self.store.get().await?;
    db.transaction(|tx| {
      tx.execute("DELETE FROM sync_registrations WHERE tag = ?", params![tag])?;
      Ok(())
    })
  }
}

#[async_trait]
impl SyncRegistrar for SqliteRegistrar {
  async fn register(&self, tag: &str) -> Result<(), RegistrationError> {
    let db = self
      .store
      .get()
      .await
      .map_err(|e| RegistrationError(e.to_string()))?;

    db.transaction(|tx| {
      tx.execute(
        "INSERT OR IGNORE INTO sync_registrations (tag) VALUES (?)",
        params![tag],
      )?;
      Ok(())
    })
    .map_err(|e| RegistrationError(e.to_string()))
  }
}
