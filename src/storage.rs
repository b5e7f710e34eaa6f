//! Client-local key/value storage capability.
//!
//! Selected once at startup and injected wherever local persistence is
//! needed. Implementations: [`crate::db::LocalDb`] (SQLite on disk),
//! [`MemoryStorage`], and [`NoopStorage`] for non-interactive contexts.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::AppError;

/// Key holding the serialized aggregate `UserState`.
pub const USER_STATE_KEY: &str = "rivus-user-state";

/// Key holding the theme preference.
pub const THEME_KEY: &str = "rivus-theme";

/// Key holding the hosted service session (identity and tokens).
pub const SESSION_KEY: &str = "rivus-session";

pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Process-lifetime storage. Used in tests and when no disk is available.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Storage that never holds anything.
pub struct NoopStorage;

impl LocalStorage for NoopStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), AppError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), AppError> {
        Ok(())
    }
}
