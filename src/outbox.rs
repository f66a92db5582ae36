//! Durable queue of form submissions waiting for connectivity.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

use crate::db::{StoreError, StoreHandle};
use crate::form::FormFields;

/// A queued submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxEntry {
  /// Assigned by the store; strictly increasing and never reused
  pub id: i64,
  pub created_at: DateTime<Utc>,
  /// Path the original request was posted to
  pub target_path: String,
  pub payload: FormFields,
}

/// Typed operations over the outbox table.
///
/// Every operation is its own transaction. There is no locking across entries.
#[derive(Clone)]
pub struct Outbox {
  store: Arc<StoreHandle>,
}

impl Outbox {
  pub fn new(store: Arc<StoreHandle>) -> Self {
    Self { store }
  }

  /// Persist a submission and return its id once committed.
  pub async fn enqueue(&self, target_path: &str, payload: &FormFields) -> Result<i64, StoreError> {
    let db = self.store.get().await?;
    let data = serde_json::to_string(payload)?;
    let created_at = Utc::now().to_rfc3339();

    let id = db.transaction(|tx| {
      tx.execute(
        "INSERT INTO outbox (created_at, path, data) VALUES (?, ?, ?)",
        params![created_at, target_path, data],
      )?;
      Ok(tx.last_insert_rowid())
    })?;

    tracing::info!(id, path = target_path, fields = payload.len(), "queued submission");
    Ok(id)
  }

  /// Snapshot of all entries, oldest first.
  ///
  /// Rows that cannot be decoded are logged and left in place.
  pub async fn list_ordered(&self) -> Result<Vec<OutboxEntry>, StoreError> {
    let db = self.store.get().await?;

    let rows = db.transaction(|tx| {
      let mut stmt = tx.prepare("SELECT id, created_at, path, data FROM outbox ORDER BY id")?;
      let rows = stmt
        .query_map([], |row| {
          Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
          ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
      Ok(rows)
    })?;

    let entries = rows
      .into_iter()
      .filter_map(|(id, created_at, target_path, data)| {
        let created_at = match DateTime::parse_from_rfc3339(&created_at) {
          Ok(dt) => dt.with_timezone(&Utc),
          Err(e) => {
            tracing::warn!(id, error = %e, "skipping outbox entry with bad timestamp");
            return None;
          }
        };
        let payload = match serde_json::from_str(&data) {
          Ok(payload) => payload,
          Err(e) => {
            tracing::warn!(id, error = %e, "skipping outbox entry with bad payload");
            return None;
          }
        };
        Some(OutboxEntry {
          id,
          created_at,
          target_path,
          payload,
        })
      })
      .collect();

    Ok(entries)
  }

  /// Remove an entry. Removing an unknown id is not an error.
  pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
    let db = self.store.get().await?;
    let removed = db.transaction(|tx| Ok(tx.execute("DELETE FROM outbox WHERE id = ?", params![id])?))?;
    if removed > 0 {
      tracing::debug!(id, "removed outbox entry");
    }
    Ok(())
  }

  pub async fn len(&self) -> Result<usize, StoreError> {
    let db = self.store.get().await?;
    db.transaction(|tx| {
      let count: i64 = tx.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
      Ok(count as usize)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::StoreLocation;

  fn fields(pairs: &[(&str, &str)]) -> FormFields {
    let mut fields = FormFields::new();
    for (k, v) in pairs {
      fields.set(*k, *v);
    }
    fields
  }

  #[tokio::test]
  async fn test_entries_listed_oldest_first() {
    let outbox = Outbox::new(Arc::new(StoreHandle::in_memory()));

    let a = outbox.enqueue("/add", &fields(&[("amount", "1")])).await.unwrap();
    let b = outbox.enqueue("/add", &fields(&[("amount", "2")])).await.unwrap();
    let c = outbox.enqueue("/add", &fields(&[("amount", "3")])).await.unwrap();
    assert!(a < b && b < c);

    let entries = outbox.list_ordered().await.unwrap();
    let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![a, b, c]);
    assert_eq!(entries[1].payload.get("amount"), Some("2"));
    assert_eq!(entries[1].target_path, "/add");
  }

  #[tokio::test]
  async fn test_delete_is_idempotent() {
    let outbox = Outbox::new(Arc::new(StoreHandle::in_memory()));
    let id = outbox.enqueue("/add", &FormFields::new()).await.unwrap();

    outbox.delete(id).await.unwrap();
    outbox.delete(id).await.unwrap();
    outbox.delete(9999).await.unwrap();
    assert_eq!(outbox.len().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_ids_are_never_reused() {
    let outbox = Outbox::new(Arc::new(StoreHandle::in_memory()));
    let first = outbox.enqueue("/add", &FormFields::new()).await.unwrap();
    outbox.delete(first).await.unwrap();

    let second = outbox.enqueue("/add", &FormFields::new()).await.unwrap();
    assert!(second > first);
  }

  #[tokio::test]
  async fn test_racing_enqueues_get_distinct_ids() {
    let outbox = Outbox::new(Arc::new(StoreHandle::in_memory()));
    let payload = FormFields::new();

    let (a, b, c) = tokio::join!(
      outbox.enqueue("/add", &payload),
      outbox.enqueue("/add", &payload),
      outbox.enqueue("/add", &payload),
    );
    let mut ids = vec![a.unwrap(), b.unwrap(), c.unwrap()];
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
  }

  #[tokio::test]
  async fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.db");

    let id = {
      let outbox = Outbox::new(Arc::new(StoreHandle::new(StoreLocation::File(path.clone()))));
      outbox
        .enqueue("/add", &fields(&[("note", "Miete")]))
        .await
        .unwrap()
    };

    let reopened = Outbox::new(Arc::new(StoreHandle::new(StoreLocation::File(path))));
    let entries = reopened.list_ordered().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].payload.get("note"), Some("Miete"));
  }
}
