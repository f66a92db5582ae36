//! Versioned, content-addressed cache of precached shell resources.
//!
//! Each generation is written in full at install time under a version tag and is
//! never modified afterwards. Activation promotes one generation and deletes all
//! others; lookups only ever consult the active generation.

mod generation;
mod storage;

pub use generation::{cache_key, CachedResponse, GenerationInfo, GenerationState};
pub use storage::{GenerationStorage, SqliteStorage};
