//! Generation storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use std::path::Path;

use super::generation::{CachedResponse, GenerationInfo, GenerationState};
use crate::db::{Database, StoreError};

/// Trait for cache generation backends.
pub trait GenerationStorage: Send + Sync + 'static {
  /// Write a complete generation in one transaction.
  ///
  /// Writing an existing tag replaces its entries and keeps its state.
  fn put_generation(&self, tag: &str, entries: &[CachedResponse]) -> Result<(), StoreError>;

  /// All stored generations, oldest first.
  fn generations(&self) -> Result<Vec<GenerationInfo>, StoreError>;

  /// Make `tag` the only generation and mark it active.
  ///
  /// Returns the tags that were deleted, or `None` (and changes nothing) if `tag`
  /// was never written.
  fn promote(&self, tag: &str) -> Result<Option<Vec<String>>, StoreError>;

  /// Tag of the active generation, if any.
  fn active_tag(&self) -> Result<Option<String>, StoreError>;

  /// Look up a URL cache key in the active generation.
  fn lookup(&self, url: &str) -> Result<Option<CachedResponse>, StoreError>;
}

/// SQLite-based generation storage. Bodies are stored once per content hash.
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    Ok(Self {
      db: Database::open(path, CACHE_SCHEMA)?,
    })
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Ok(Self {
      db: Database::open_in_memory(CACHE_SCHEMA)?,
    })
  }
}

/// Schema for generation tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    tag TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Content-addressed response bodies (sha256, hex)
CREATE TABLE IF NOT EXISTS blobs (
    hash TEXT PRIMARY KEY,
    body BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS generation_entries (
    tag TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    blob_hash TEXT NOT NULL,
    PRIMARY KEY (tag, url),
    FOREIGN KEY (tag) REFERENCES generations(tag) ON DELETE CASCADE,
    FOREIGN KEY (blob_hash) REFERENCES blobs(hash)
);

CREATE INDEX IF NOT EXISTS idx_generation_entries_blob ON generation_entries(blob_hash);
"#;

impl GenerationStorage for SqliteStorage {
  fn put_generation(&self, tag: &str, entries: &[CachedResponse]) -> Result<(), StoreError> {
    self.db.transaction(|tx| {
      tx.execute(
        "INSERT OR IGNORE INTO generations (tag, state, created_at) VALUES (?, ?, ?)",
        params![tag, GenerationState::Installed.as_str(), Utc::now().to_rfc3339()],
      )?;
      tx.execute(
        "DELETE FROM generation_entries WHERE tag = ?",
        params![tag],
      )?;

      for entry in entries {
        let hash = entry.body_hash();
        let headers = encode_headers(&entry.headers)?;

        tx.execute(
          "INSERT OR IGNORE INTO blobs (hash, body) VALUES (?, ?)",
          params![hash, entry.body],
        )?;
        tx.execute(
          "INSERT OR REPLACE INTO generation_entries (tag, url, status, headers, blob_hash)
           VALUES (?, ?, ?, ?, ?)",
          params![tag, entry.url, entry.status, headers, hash],
        )?;
      }

      collect_garbage(tx)?;
      Ok(())
    })
  }

  fn generations(&self) -> Result<Vec<GenerationInfo>, StoreError> {
    self.db.transaction(|tx| {
      let mut stmt = tx.prepare(
        "SELECT g.tag, g.state, g.created_at, COUNT(e.url)
         FROM generations g
         LEFT JOIN generation_entries e ON e.tag = g.tag
         GROUP BY g.tag
         ORDER BY g.created_at, g.tag",
      )?;

      let rows = stmt
        .query_map([], |row| {
          Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
          ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

      let generations = rows
        .into_iter()
        .filter_map(|(tag, state, created_at, entries)| {
          let Some(state) = GenerationState::parse(&state) else {
            tracing::warn!(tag = %tag, state = %state, "skipping generation with unknown state");
            return None;
          };
          Some(GenerationInfo {
            tag,
            state,
            created_at: parse_datetime(&created_at),
            entries: entries as usize,
          })
        })
        .collect();

      Ok(generations)
    })
  }

  fn promote(&self, tag: &str) -> Result<Option<Vec<String>>, StoreError> {
    self.db.transaction(|tx| {
      let exists = tx
        .query_row(
          "SELECT 1 FROM generations WHERE tag = ?",
          params![tag],
          |_| Ok(()),
        )
        .optional()?
        .is_some();
      if !exists {
        return Ok(None);
      }

      let stale: Vec<String> = {
        let mut stmt = tx.prepare("SELECT tag FROM generations WHERE tag != ? ORDER BY tag")?;
        let tags = stmt
          .query_map(params![tag], |row| row.get(0))?
          .collect::<Result<Vec<_>, _>>()?;
        tags
      };

      tx.execute("DELETE FROM generations WHERE tag != ?", params![tag])?;
      tx.execute(
        "UPDATE generations SET state = ? WHERE tag = ?",
        params![GenerationState::Active.as_str(), tag],
      )?;
      collect_garbage(tx)?;

      Ok(Some(stale))
    })
  }

  fn active_tag(&self) -> Result<Option<String>, StoreError> {
    self.db.transaction(|tx| {
      let tag = tx
        .query_row(
          "SELECT tag FROM generations WHERE state = ?",
          params![GenerationState::Active.as_str()],
          |row| row.get(0),
        )
        .optional()?;
      Ok(tag)
    })
  }

  fn lookup(&self, url: &str) -> Result<Option<CachedResponse>, StoreError> {
    self.db.transaction(|tx| {
      let row: Option<(u16, String, Vec<u8>)> = tx
        .query_row(
          "SELECT e.status, e.headers, b.body
           FROM generation_entries e
           INNER JOIN generations g ON g.tag = e.tag
           INNER JOIN blobs b ON b.hash = e.blob_hash
           WHERE g.state = ? AND e.url = ?",
          params![GenerationState::Active.as_str(), url],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

      match row {
        Some((status, headers, body)) => Ok(Some(CachedResponse {
          url: url.to_string(),
          status,
          headers: decode_headers(&headers)?,
          body,
        })),
        None => Ok(None),
      }
    })
  }
}

/// Delete bodies no generation refers to any more.
fn collect_garbage(tx: &Transaction<'_>) -> Result<usize, StoreError> {
  let removed = tx.execute(
    "DELETE FROM blobs WHERE hash NOT IN (SELECT blob_hash FROM generation_entries)",
    [],
  )?;
  if removed > 0 {
    tracing::debug!(removed, "collected unreferenced blobs");
  }
  Ok(removed)
}

/// Headers are stored as JSON `[name, hex value]` pairs.
fn encode_headers(headers: &[(String, Vec<u8>)]) -> Result<String, StoreError> {
  let pairs: Vec<(&str, String)> = headers
    .iter()
    .map(|(name, value)| (name.as_str(), hex::encode(value)))
    .collect();
  Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(json: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
  let pairs: Vec<(String, String)> = serde_json::from_str(json)?;
  pairs
    .into_iter()
    .map(|(name, value)| -> Result<_, StoreError> { Ok((name, hex::decode(value)?)) })
    .collect()
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_datetime(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_default()
}
