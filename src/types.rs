use std::collections::HashSet;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Number of life areas on every wheel.
pub const WHEEL_SIZE: usize = 8;

/// Highest score an area can hold.
pub const MAX_SCORE: f64 = 10.0;

/// Score granularity accepted while onboarding.
pub const ONBOARDING_STEP: f64 = 0.5;

/// Score granularity accepted in the weekly review.
pub const REVIEW_STEP: f64 = 0.1;

/// Insight shown before the first guidance is generated.
pub const DEFAULT_INSIGHT: &str =
    "Your journey starts here. Rate your areas to receive personalized guidance.";

/// Configuration stored in ~/.rivus/config.json
///
/// Every field has a default so a missing or partial file still yields a
/// usable config. Environment variables override the file (see `state::load_config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the hosted auth/database service. `None` selects the local gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_anon_key: Option<String>,
    /// Generative API key. `None` leaves the guide unconfigured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// How many history rows a load fetches (newest first).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gemini_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_history_limit() -> usize {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            history_limit: default_history_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// True when both the remote URL and its publishable key are present.
    pub fn remote_configured(&self) -> bool {
        non_empty(&self.supabase_url) && non_empty(&self.supabase_anon_key)
    }

    pub fn ai_configured(&self) -> bool {
        non_empty(&self.gemini_api_key)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

// =============================================================================
// Views
// =============================================================================

/// Screens the controller sequences between.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Landing,
    Login,
    Onboarding,
    Daily,
    Weekly,
    History,
    Profile,
    Support,
}

/// Color scheme preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Parse a stored theme name. Anything unrecognized falls back to dark.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }
}

// =============================================================================
// Wheel of Life
// =============================================================================

/// Validate a score against the [0, 10] range and the given step size.
pub fn validate_score(score: f64, step: f64) -> Result<f64, AppError> {
    if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
        return Err(AppError::Validation(format!(
            "score {score} must be between 0 and {MAX_SCORE}"
        )));
    }
    let units = score / step;
    if (units - units.round()).abs() > 1e-6 {
        return Err(AppError::Validation(format!(
            "score {score} must be a multiple of {step}"
        )));
    }
    Ok(score)
}

/// One of the eight rated areas. Identity (`id`, `name`) is fixed; the score
/// only changes through [`LifeArea::set_score`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifeArea {
    pub id: String,
    pub name: String,
    score: f64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

impl LifeArea {
    pub fn new(
        id: &str,
        name: &str,
        score: f64,
        icon: &str,
        description: &str,
        color: &str,
    ) -> Result<Self, AppError> {
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(AppError::Validation(
                "life area needs an id and a name".to_string(),
            ));
        }
        validate_score(score, REVIEW_STEP)?;
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            score,
            icon: icon.to_string(),
            description: description.to_string(),
            color: color.to_string(),
        })
    }

    /// Rebuild an area from a stored row. The score is trusted here and
    /// repaired later by [`UserState::normalize_loaded`].
    pub(crate) fn from_stored(
        id: String,
        name: String,
        score: f64,
        icon: String,
        description: String,
        color: String,
    ) -> Self {
        Self {
            id,
            name,
            score,
            icon,
            description,
            color,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Set the score, rejecting values outside [0, 10] or off the step grid.
    pub fn set_score(&mut self, score: f64, step: f64) -> Result<(), AppError> {
        self.score = validate_score(score, step)?;
        Ok(())
    }

    /// Clamp a score that arrived from storage. Returns true if it changed.
    pub(crate) fn clamp_loaded_score(&mut self) -> bool {
        let clamped = if self.score.is_finite() {
            self.score.clamp(0.0, MAX_SCORE)
        } else {
            0.0
        };
        let changed = clamped != self.score;
        self.score = clamped;
        changed
    }
}

const DEFAULT_AREAS: [(&str, &str, &str, &str, &str); WHEEL_SIZE] = [
    ("1", "Career", "work", "Work and professional purpose", "#3b82f6"),
    ("2", "Health", "fitness_center", "Body and vital energy", "#10b981"),
    ("3", "Finances", "savings", "Money management and freedom", "#f59e0b"),
    ("4", "Relationships", "favorite", "Social life and family", "#ef4444"),
    ("5", "Spirituality", "self_improvement", "Balance and connection", "#8b5cf6"),
    ("6", "Leisure", "sports_esports", "Fun and joy", "#ec4899"),
    ("7", "Mind", "psychology", "Continuous learning", "#06b6d4"),
    ("8", "Environment", "home", "Your physical space", "#78350f"),
];

/// The eight fixed areas, all at score 5.
pub fn default_wheel() -> Vec<LifeArea> {
    DEFAULT_AREAS
        .iter()
        .map(|(id, name, icon, description, color)| LifeArea {
            id: id.to_string(),
            name: name.to_string(),
            score: 5.0,
            icon: icon.to_string(),
            description: description.to_string(),
            color: color.to_string(),
        })
        .collect()
}

/// Arithmetic mean of the wheel's scores (0.0 for an empty wheel).
pub fn mean_score(wheel: &[LifeArea]) -> f64 {
    if wheel.is_empty() {
        return 0.0;
    }
    wheel.iter().map(|a| a.score).sum::<f64>() / wheel.len() as f64
}

// =============================================================================
// SMART tasks
// =============================================================================

/// Day a task is scheduled for. Legacy rows stored Portuguese day names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Weekday {
    #[serde(alias = "Segunda-feira")]
    Monday,
    #[serde(alias = "Terça-feira")]
    Tuesday,
    #[serde(alias = "Quarta-feira")]
    Wednesday,
    #[serde(alias = "Quinta-feira")]
    Thursday,
    #[serde(alias = "Sexta-feira")]
    Friday,
    #[serde(alias = "Sábado")]
    Saturday,
    #[serde(alias = "Domingo")]
    Sunday,
}

impl Weekday {
    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }

    /// Parse a stored day name (English or legacy Portuguese).
    pub fn parse(value: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(value.trim().to_string())).ok()
    }
}

/// Validate a 24h `HH:MM` time string.
pub fn validate_time(value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.len() != 5 || NaiveTime::parse_from_str(trimmed, "%H:%M").is_err() {
        return Err(AppError::Validation(format!(
            "time \"{value}\" must be HH:MM"
        )));
    }
    Ok(trimmed.to_string())
}

/// A Specific, Measurable, Achievable, Relevant, Time-bound task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmartTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub why_smart: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_day: Option<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
}

impl SmartTask {
    /// Create an unscheduled, incomplete task with a fresh id.
    pub fn new(
        title: &str,
        description: &str,
        category: &str,
        why_smart: &str,
    ) -> Result<Self, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("task title is empty".to_string()));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.trim().to_string(),
            category: category.trim().to_string(),
            completed: false,
            why_smart: why_smart.trim().to_string(),
            scheduled_day: None,
            scheduled_time: None,
        })
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_day.is_some() && self.scheduled_time.is_some()
    }

    /// Assign a day and time. A task can only be scheduled once.
    pub fn schedule(&mut self, day: Weekday, time: &str) -> Result<(), AppError> {
        if self.is_scheduled() {
            return Err(AppError::Validation(format!(
                "task {} is already scheduled",
                self.id
            )));
        }
        let time = validate_time(time)?;
        self.scheduled_day = Some(day);
        self.scheduled_time = Some(time);
        Ok(())
    }
}

/// Re-evaluation is allowed only once the current cycle has nothing pending.
pub fn weekly_gate(tasks: &[SmartTask]) -> bool {
    tasks.iter().all(|t| t.completed)
}

// =============================================================================
// History
// =============================================================================

/// Immutable snapshot of a wheel at the moment a cycle started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub avg_score: f64,
    pub wheel: Vec<LifeArea>,
}

impl HistoryEntry {
    pub fn snapshot(wheel: &[LifeArea]) -> Self {
        Self::snapshot_at(wheel, Utc::now())
    }

    pub fn snapshot_at(wheel: &[LifeArea], date: DateTime<Utc>) -> Self {
        Self {
            date,
            avg_score: mean_score(wheel),
            wheel: wheel.to_vec(),
        }
    }
}

// =============================================================================
// Aggregate state
// =============================================================================

/// Everything a user has: the single aggregate the controller owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(default)]
    pub has_completed_onboarding: bool,
    #[serde(default = "default_wheel")]
    pub current_wheel: Vec<LifeArea>,
    #[serde(default)]
    pub daily_tasks: Vec<SmartTask>,
    #[serde(default)]
    pub ai_insight: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            has_completed_onboarding: false,
            current_wheel: default_wheel(),
            daily_tasks: Vec::new(),
            ai_insight: DEFAULT_INSIGHT.to_string(),
            history: Vec::new(),
        }
    }
}

impl UserState {
    pub fn weekly_gate_open(&self) -> bool {
        weekly_gate(&self.daily_tasks)
    }

    pub fn completed_count(&self) -> usize {
        self.daily_tasks.iter().filter(|t| t.completed).count()
    }

    pub fn find_task(&self, id: &str) -> Option<&SmartTask> {
        self.daily_tasks.iter().find(|t| t.id == id)
    }

    /// Check the structural invariants every stored state must satisfy.
    pub fn check_invariants(&self) -> Result<(), AppError> {
        if !all_unique(self.current_wheel.iter().map(|a| a.id.as_str())) {
            return Err(AppError::Validation("area ids must be unique".to_string()));
        }
        if !all_unique(self.daily_tasks.iter().map(|t| t.id.as_str())) {
            return Err(AppError::Validation("task ids must be unique".to_string()));
        }
        for area in &self.current_wheel {
            if !(0.0..=MAX_SCORE).contains(&area.score) {
                return Err(AppError::Validation(format!(
                    "area {} has score {} outside [0, {MAX_SCORE}]",
                    area.id, area.score
                )));
            }
        }
        if self.has_completed_onboarding {
            if self.current_wheel.len() != WHEEL_SIZE {
                return Err(AppError::Validation(format!(
                    "wheel must have {WHEEL_SIZE} areas, found {}",
                    self.current_wheel.len()
                )));
            }
        } else if !self.daily_tasks.is_empty() || !self.history.is_empty() {
            return Err(AppError::Validation(
                "tasks and history require a completed onboarding".to_string(),
            ));
        }
        Ok(())
    }

    /// Repair a snapshot that came back from storage so it satisfies
    /// [`UserState::check_invariants`]. Every repair is logged.
    pub fn normalize_loaded(mut self) -> Self {
        let ids_unique = all_unique(self.current_wheel.iter().map(|a| a.id.as_str()));
        if self.current_wheel.len() != WHEEL_SIZE || !ids_unique {
            log::warn!(
                "Loaded wheel has {} areas (unique ids: {ids_unique}); filling from defaults",
                self.current_wheel.len()
            );
            let loaded = std::mem::take(&mut self.current_wheel);
            self.current_wheel = default_wheel()
                .into_iter()
                .map(|d| loaded.iter().find(|a| a.id == d.id).cloned().unwrap_or(d))
                .collect();
        }
        for area in &mut self.current_wheel {
            if area.clamp_loaded_score() {
                log::warn!("Loaded area {} had an out-of-range score; clamped", area.id);
            }
        }
        if !self.has_completed_onboarding
            && (!self.daily_tasks.is_empty() || !self.history.is_empty())
        {
            log::warn!("Loaded state is not onboarded but carries tasks/history; dropping them");
            self.daily_tasks.clear();
            self.history.clear();
        }
        self
    }
}

fn all_unique<'a>(ids: impl Iterator<Item = &'a str>) -> bool {
    let mut seen = HashSet::new();
    ids.into_iter().all(|id| seen.insert(id))
}

/// Partial update merged shallowly over the current state.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub has_completed_onboarding: Option<bool>,
    pub current_wheel: Option<Vec<LifeArea>>,
    pub daily_tasks: Option<Vec<SmartTask>>,
    pub ai_insight: Option<String>,
    pub history: Option<Vec<HistoryEntry>>,
}

impl StatePatch {
    pub fn tasks(tasks: Vec<SmartTask>) -> Self {
        Self {
            daily_tasks: Some(tasks),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.has_completed_onboarding.is_none()
            && self.current_wheel.is_none()
            && self.daily_tasks.is_none()
            && self.ai_insight.is_none()
            && self.history.is_none()
    }

    /// Reject changes to what is fixed once created: area identity
    /// (`id`, `name`) and recorded history. History may only grow at the
    /// front, with entries whose average matches their wheel.
    pub fn check_against(&self, current: &UserState) -> Result<(), AppError> {
        if let Some(wheel) = &self.current_wheel {
            let identity = |w: &[LifeArea]| {
                let mut pairs: Vec<(String, String)> =
                    w.iter().map(|a| (a.id.clone(), a.name.clone())).collect();
                pairs.sort();
                pairs
            };
            if identity(wheel) != identity(&current.current_wheel) {
                return Err(AppError::Validation(
                    "life areas cannot be added, removed or renamed".to_string(),
                ));
            }
        }
        if let Some(history) = &self.history {
            if !history.ends_with(&current.history) {
                return Err(AppError::Validation(
                    "history entries cannot be edited or removed".to_string(),
                ));
            }
            let added = &history[..history.len() - current.history.len()];
            for entry in added {
                if entry.wheel.len() != WHEEL_SIZE {
                    return Err(AppError::Validation(format!(
                        "history entry must hold {WHEEL_SIZE} areas, found {}",
                        entry.wheel.len()
                    )));
                }
                if (entry.avg_score - mean_score(&entry.wheel)).abs() > 1e-9 {
                    return Err(AppError::Validation(format!(
                        "history average {} does not match its wheel",
                        entry.avg_score
                    )));
                }
            }
        }
        Ok(())
    }

    /// Produce a new state: fields present in the patch replace the base's.
    pub fn apply(self, base: &UserState) -> UserState {
        UserState {
            has_completed_onboarding: self
                .has_completed_onboarding
                .unwrap_or(base.has_completed_onboarding),
            current_wheel: self
                .current_wheel
                .unwrap_or_else(|| base.current_wheel.clone()),
            daily_tasks: self.daily_tasks.unwrap_or_else(|| base.daily_tasks.clone()),
            ai_insight: self.ai_insight.unwrap_or_else(|| base.ai_insight.clone()),
            history: self.history.unwrap_or_else(|| base.history.clone()),
        }
    }
}
