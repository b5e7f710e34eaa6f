//! Persistence gateway: identity plus read/replace of the aggregate state.
//!
//! The contract is abstract over the underlying store. Two implementations:
//! - [`supabase::SupabaseGateway`]: hosted auth + PostgREST tables
//! - [`local::LocalGateway`]: client-local fallback when no service is configured
//!
//! Row types mirror the hosted tables 1:1 (snake_case) and convert to and
//! from the domain types here, so both the remote gateway and tests share
//! the same assembly rules.

pub mod local;
pub mod supabase;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;
use crate::types::{HistoryEntry, LifeArea, SmartTask, Theme, UserState, Weekday};

/// Opaque identity the store keys every row by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Return the session identity, provisioning an anonymous one if needed.
    /// Repeated calls within a session return the same identity.
    async fn ensure_identity(&self) -> Result<IdentityId, AppError>;

    /// Load the aggregate. `Ok(None)` means the identity has never saved anything.
    async fn load_state(&self, id: &IdentityId) -> Result<Option<UserState>, AppError>;

    /// Replace profile, current wheel and tasks wholesale. History is untouched.
    async fn save_state(&self, id: &IdentityId, state: &UserState) -> Result<(), AppError>;

    /// Insert one immutable history row.
    async fn append_history(&self, id: &IdentityId, entry: &HistoryEntry)
        -> Result<(), AppError>;

    async fn save_theme(&self, id: &IdentityId, theme: Theme) -> Result<(), AppError>;

    /// Stored theme, or dark when nothing (or nothing readable) is stored.
    async fn load_theme(&self, id: &IdentityId) -> Theme;
}

// =============================================================================
// Rows
// =============================================================================

/// A row from `user_profiles` (one per identity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRow {
    pub user_id: String,
    #[serde(default)]
    pub has_completed_onboarding: bool,
    #[serde(default)]
    pub ai_insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A row from `life_areas`. Only rows with `is_current` form the current wheel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifeAreaRow {
    pub user_id: String,
    pub area_id: String,
    pub name: String,
    #[serde(deserialize_with = "de_number")]
    pub score: f64,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

/// A row from `smart_tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRow {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub why_smart: Option<String>,
    #[serde(default)]
    pub scheduled_day: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

/// A row from `wheel_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    pub user_id: String,
    pub date: String,
    #[serde(deserialize_with = "de_number")]
    pub avg_score: f64,
    pub wheel_data: Vec<LifeArea>,
}

/// Numeric columns may come back as JSON numbers or as strings.
fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(f64),
        Str(String),
    }
    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl LifeAreaRow {
    pub fn current(user_id: &IdentityId, area: &LifeArea) -> Self {
        Self {
            user_id: user_id.to_string(),
            area_id: area.id.clone(),
            name: area.name.clone(),
            score: area.score(),
            icon: Some(area.icon.clone()),
            description: Some(area.description.clone()),
            color: Some(area.color.clone()),
            is_current: true,
        }
    }

    pub fn into_area(self) -> LifeArea {
        LifeArea::from_stored(
            self.area_id,
            self.name,
            self.score,
            self.icon.unwrap_or_default(),
            self.description.unwrap_or_default(),
            self.color.unwrap_or_default(),
        )
    }
}

impl TaskRow {
    pub fn from_task(user_id: &IdentityId, task: &SmartTask) -> Self {
        Self {
            id: Some(task.id.clone()),
            user_id: user_id.to_string(),
            title: task.title.clone(),
            description: Some(task.description.clone()),
            category: Some(task.category.clone()),
            completed: task.completed,
            why_smart: Some(task.why_smart.clone()),
            scheduled_day: task.scheduled_day.map(|d| d.as_str().to_string()),
            scheduled_time: task.scheduled_time.clone(),
        }
    }

    pub fn into_task(self) -> SmartTask {
        let scheduled_day = self.scheduled_day.as_deref().and_then(|d| {
            let parsed = Weekday::parse(d);
            if parsed.is_none() {
                log::warn!("Ignoring unknown scheduled day {d:?} on task {:?}", self.id);
            }
            parsed
        });
        let scheduled_time = self
            .scheduled_time
            .as_deref()
            .and_then(|t| crate::types::validate_time(t).ok());
        SmartTask {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: self.title,
            description: self.description.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            completed: self.completed,
            why_smart: self.why_smart.unwrap_or_default(),
            // A day without a time (or vice versa) is not a schedule.
            scheduled_day: scheduled_day.filter(|_| scheduled_time.is_some()),
            scheduled_time: scheduled_time.filter(|_| scheduled_day.is_some()),
        }
    }
}

impl HistoryRow {
    pub fn from_entry(user_id: &IdentityId, entry: &HistoryEntry) -> Self {
        Self {
            user_id: user_id.to_string(),
            date: entry.date.to_rfc3339(),
            avg_score: entry.avg_score,
            wheel_data: entry.wheel.clone(),
        }
    }

    pub fn into_entry(self) -> Option<HistoryEntry> {
        match DateTime::parse_from_rfc3339(&self.date) {
            Ok(date) => Some(HistoryEntry {
                date: date.with_timezone(&Utc),
                avg_score: self.avg_score,
                wheel: self.wheel_data,
            }),
            Err(e) => {
                log::warn!("Skipping history row with unreadable date {:?}: {e}", self.date);
                None
            }
        }
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Treat a failed section read as empty, logging it.
fn section_or_empty<T: Default>(section: &str, result: Result<T, AppError>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Load of {section} failed, treating as empty: {e}");
            T::default()
        }
    }
}

/// Build a `UserState` from the four independently fetched sections.
///
/// Returns `None` when there is neither a profile nor a current wheel: the
/// identity is new. A failed section never aborts the whole load.
pub fn assemble_state(
    profile: Result<Option<ProfileRow>, AppError>,
    areas: Result<Vec<LifeAreaRow>, AppError>,
    tasks: Result<Vec<TaskRow>, AppError>,
    history: Result<Vec<HistoryRow>, AppError>,
) -> Option<UserState> {
    let profile = section_or_empty("profile", profile);
    let mut areas = section_or_empty("current wheel", areas);
    let tasks = section_or_empty("tasks", tasks);
    let history = section_or_empty("history", history);

    areas.retain(|a| a.is_current);

    if profile.is_none() && areas.is_empty() {
        return None;
    }

    areas.sort_by(|a, b| match (a.area_id.parse::<u32>(), b.area_id.parse::<u32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.area_id.cmp(&b.area_id),
    });

    let mut history: Vec<HistoryEntry> = history
        .into_iter()
        .filter_map(HistoryRow::into_entry)
        .collect();
    history.sort_by(|a, b| b.date.cmp(&a.date));

    let state = UserState {
        has_completed_onboarding: profile
            .as_ref()
            .map(|p| p.has_completed_onboarding)
            .unwrap_or(false),
        current_wheel: areas.into_iter().map(LifeAreaRow::into_area).collect(),
        daily_tasks: tasks.into_iter().map(TaskRow::into_task).collect(),
        ai_insight: profile.and_then(|p| p.ai_insight).unwrap_or_default(),
        history,
    };

    Some(state.normalize_loaded())
}


#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::local::LocalGateway;
    use super::*;
    use crate::storage::MemoryStorage;

    /// Local gateway that counts calls and can be told to fail or stall.
    pub struct RecordingGateway {
        pub inner: LocalGateway,
        pub saves: AtomicUsize,
        pub history_appends: AtomicUsize,
        pub fail_identity: AtomicBool,
        pub fail_load: AtomicBool,
        pub save_delay_ms: AtomicU64,
        pub load_delay_ms: AtomicU64,
    }

    impl RecordingGateway {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: LocalGateway::new(Arc::new(MemoryStorage::default())),
                saves: AtomicUsize::new(0),
                history_appends: AtomicUsize::new(0),
                fail_identity: AtomicBool::new(false),
                fail_load: AtomicBool::new(false),
                save_delay_ms: AtomicU64::new(0),
                load_delay_ms: AtomicU64::new(0),
            })
        }

        pub fn saves(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        pub async fn stored(&self) -> Option<UserState> {
            self.inner
                .load_state(&IdentityId::new(super::local::LOCAL_IDENTITY))
                .await
                .ok()
                .flatten()
        }
    }

    #[async_trait]
    impl PersistenceGateway for RecordingGateway {
        async fn ensure_identity(&self) -> Result<IdentityId, AppError> {
            if self.fail_identity.load(Ordering::SeqCst) {
                return Err(AppError::Auth("service unreachable".to_string()));
            }
            self.inner.ensure_identity().await
        }

        async fn load_state(&self, id: &IdentityId) -> Result<Option<UserState>, AppError> {
            let delay = self.load_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            if self.fail_load.load(Ordering::SeqCst) {
                return Err(AppError::Load("service unreachable".to_string()));
            }
            self.inner.load_state(id).await
        }

        async fn save_state(&self, id: &IdentityId, state: &UserState) -> Result<(), AppError> {
            let delay = self.save_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save_state(id, state).await
        }

        async fn append_history(
            &self,
            id: &IdentityId,
            entry: &HistoryEntry,
        ) -> Result<(), AppError> {
            self.history_appends.fetch_add(1, Ordering::SeqCst);
            self.inner.append_history(id, entry).await
        }

        async fn save_theme(&self, id: &IdentityId, theme: Theme) -> Result<(), AppError> {
            self.inner.save_theme(id, theme).await
        }

        async fn load_theme(&self, id: &IdentityId) -> Theme {
            self.inner.load_theme(id).await
        }
    }
}
