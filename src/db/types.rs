//! Types shared by the local SQLite store.

use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Local store schema v{found} is newer than this RIVUS supports (v{supported}); update RIVUS")]
    SchemaTooNew { found: i32, supported: i32 },
}

/// A row from the `kv` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DbEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
