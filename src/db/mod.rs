//! SQLite-backed local storage.
//!
//! The database lives at `~/.rivus/rivus.db` and holds the client-local copy of
//! the aggregate state and the theme preference, keyed by name. It is the
//! backing store of the local gateway when no hosted service is configured.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::storage::LocalStorage;

pub mod types;
pub use types::*;

pub struct LocalDb {
    conn: Mutex<Connection>,
}

impl LocalDb {
    /// Open (or create) the database at `~/.rivus/rivus.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn)?;

        log::debug!("Opened local store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Resolve the default database path: `~/.rivus/rivus.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".rivus").join("rivus.db"))
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<DbEntry>, DbError> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT key, value, updated_at FROM kv WHERE key = ?1",
                params![key],
                |row| {
                    Ok(DbEntry {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    pub fn put_entry(&self, key: &str, value: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn delete_entry(&self, key: &str) -> Result<(), DbError> {
        self.conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl LocalStorage for LocalDb {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.get_entry(key)?.map(|e| e.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        Ok(self.put_entry(key, value)?)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        Ok(self.delete_entry(key)?)
    }
}

/// Open the on-disk store, falling back to no-op storage when the disk is
/// unavailable (no home directory, read-only filesystem).
pub fn open_local_storage(path: Option<&Path>) -> std::sync::Arc<dyn LocalStorage> {
    let opened = match path {
        Some(p) => LocalDb::open_at(p.to_path_buf()),
        None => LocalDb::open(),
    };
    match opened {
        Ok(db) => std::sync::Arc::new(db),
        Err(e) => {
            log::warn!("Failed to open local store: {e}. Local persistence disabled.");
            std::sync::Arc::new(crate::storage::NoopStorage)
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::LocalDb;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the test.
    pub fn test_db() -> LocalDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        LocalDb::open_at(path).expect("Failed to open test database")
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;
    use crate::storage::{THEME_KEY, USER_STATE_KEY};

    #[test]
    fn test_open_creates_kv_table() {
        let db = test_db();
        let count: i32 = db
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .expect("kv table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_put_and_get_entry() {
        let db = test_db();
        db.put_entry(THEME_KEY, "light").unwrap();
        let entry = db.get_entry(THEME_KEY).unwrap().expect("entry");
        assert_eq!(entry.value, "light");
        assert!(!entry.updated_at.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let db = test_db();
        db.set(USER_STATE_KEY, "{\"a\":1}").unwrap();
        db.set(USER_STATE_KEY, "{\"a\":2}").unwrap();
        assert_eq!(db.get(USER_STATE_KEY).unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[test]
    fn test_missing_key_returns_none() {
        let db = test_db();
        assert_eq!(db.get("nope").unwrap(), None);
    }

    #[test]
    fn test_delete_entry() {
        let db = test_db();
        db.set(THEME_KEY, "dark").unwrap();
        db.remove(THEME_KEY).unwrap();
        assert_eq!(db.get(THEME_KEY).unwrap(), None);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rivus.db");
        {
            let db = LocalDb::open_at(path.clone()).unwrap();
            db.set(THEME_KEY, "light").unwrap();
        }
        let db = LocalDb::open_at(path).unwrap();
        assert_eq!(db.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn test_open_local_storage_falls_back_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent "directory" is a regular file, so the open must fail.
        let storage = open_local_storage(Some(&blocker.join("rivus.db")));
        storage.set(THEME_KEY, "light").unwrap();
        assert_eq!(storage.get(THEME_KEY).unwrap(), None);
    }
}
