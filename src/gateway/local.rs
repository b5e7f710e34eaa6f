//! Client-local gateway used when no hosted service is configured.
//!
//! The whole aggregate is one JSON document under [`USER_STATE_KEY`];
//! the theme sits under [`THEME_KEY`]. History is owned by
//! `append_history`, so `save_state` keeps whatever history is stored.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{IdentityId, PersistenceGateway};
use crate::error::AppError;
use crate::storage::{LocalStorage, THEME_KEY, USER_STATE_KEY};
use crate::types::{HistoryEntry, Theme, UserState};

pub const LOCAL_IDENTITY: &str = "local";

pub struct LocalGateway {
    storage: Arc<dyn LocalStorage>,
    /// Serializes read-modify-write on the stored document.
    write_lock: Mutex<()>,
}

impl LocalGateway {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn read_state(&self) -> Result<Option<UserState>, AppError> {
        let Some(raw) = self.storage.get(USER_STATE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<UserState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => Err(AppError::Load(format!("stored state is unreadable: {e}"))),
        }
    }

    fn write_state(&self, state: &UserState) -> Result<(), AppError> {
        let raw = serde_json::to_string(state)
            .map_err(|e| AppError::Save(format!("failed to serialize state: {e}")))?;
        self.storage.set(USER_STATE_KEY, &raw)
    }
}

#[async_trait]
impl PersistenceGateway for LocalGateway {
    async fn ensure_identity(&self) -> Result<IdentityId, AppError> {
        Ok(IdentityId::new(LOCAL_IDENTITY))
    }

    async fn load_state(&self, _id: &IdentityId) -> Result<Option<UserState>, AppError> {
        Ok(self.read_state()?.map(UserState::normalize_loaded))
    }

    async fn save_state(&self, _id: &IdentityId, state: &UserState) -> Result<(), AppError> {
        let _guard = self.write_lock.lock();
        let stored_history = match self.read_state() {
            Ok(stored) => stored.map(|s| s.history).unwrap_or_default(),
            Err(e) => {
                log::warn!("Overwriting unreadable local state: {e}");
                Vec::new()
            }
        };
        let mut next = state.clone();
        next.history = stored_history;
        self.write_state(&next)
            .map_err(|e| AppError::Save(e.to_string()))
    }

    async fn append_history(
        &self,
        _id: &IdentityId,
        entry: &HistoryEntry,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock();
        let mut stored = self
            .read_state()
            .map_err(|e| AppError::Save(e.to_string()))?
            .unwrap_or_default();
        stored.history.insert(0, entry.clone());
        self.write_state(&stored)
            .map_err(|e| AppError::Save(e.to_string()))
    }

    async fn save_theme(&self, _id: &IdentityId, theme: Theme) -> Result<(), AppError> {
        self.storage.set(THEME_KEY, theme.as_str())
    }

    async fn load_theme(&self, _id: &IdentityId) -> Theme {
        match self.storage.get(THEME_KEY) {
            Ok(value) => Theme::from_stored(value.as_deref()),
            Err(e) => {
                log::warn!("Reading theme failed, using dark: {e}");
                Theme::default()
            }
        }
    }
}
