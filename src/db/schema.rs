/// Schema for the outbox database.
pub const SCHEMA: &str = r#"
-- Queued submissions, replayed oldest first
CREATE TABLE IF NOT EXISTS outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    path TEXT NOT NULL,
    data TEXT NOT NULL
);

-- Connectivity trigger registrations requested by the worker
CREATE TABLE IF NOT EXISTS sync_registrations (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
