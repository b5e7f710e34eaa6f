//! Hosted gateway: anonymous GoTrue session + PostgREST tables.
//!
//! Auth goes to `{base}/auth/v1/signup` and `{base}/auth/v1/token`, data to
//! `{base}/rest/v1/<table>`. Every request carries the publishable key as
//! `apikey`; data requests carry the session token as the bearer.
//!
//! The session is kept in local storage so the same anonymous identity comes
//! back on the next run. Access tokens are refreshed shortly before expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    assemble_state, HistoryRow, IdentityId, LifeAreaRow, PersistenceGateway, ProfileRow, TaskRow,
};
use crate::error::AppError;
use crate::storage::{LocalStorage, SESSION_KEY};
use crate::types::{Config, HistoryEntry, Theme, UserState};

const PROFILES: &str = "user_profiles";
const LIFE_AREAS: &str = "life_areas";
const TASKS: &str = "smart_tasks";
const HISTORY: &str = "wheel_history";

/// Treat tokens as expired this long before they actually are.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    user_id: String,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS))
    }
}

/// Body returned by both sign-up and token refresh.
#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl AuthResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            user_id: self.user.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

enum RefreshError {
    /// The service answered and refused the refresh token.
    Rejected(String),
    /// The service could not be reached or answered with a server error.
    Unavailable(String),
}

pub struct SupabaseGateway {
    client: reqwest::Client,
    base_url: Url,
    anon_key: String,
    history_limit: usize,
    storage: Arc<dyn LocalStorage>,
    /// Held across sign-up and refresh so concurrent callers share one identity.
    session: tokio::sync::Mutex<Option<Session>>,
}

impl SupabaseGateway {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        storage: Arc<dyn LocalStorage>,
    ) -> Result<Self, String> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| format!("Invalid service URL {base_url}: {e}"))?;
        // Url::join drops the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            anon_key: anon_key.to_string(),
            history_limit: 50,
            storage,
            session: tokio::sync::Mutex::new(None),
        })
    }

    /// Build from config. `None` when the URL or key is missing.
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn LocalStorage>,
    ) -> Option<Result<Self, String>> {
        if !config.remote_configured() {
            return None;
        }
        let url = config.supabase_url.as_deref()?;
        let key = config.supabase_anon_key.as_deref()?;
        Some(Self::new(url, key, storage).map(|mut gw| {
            gw.history_limit = config.history_limit;
            gw.client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|e| {
                    log::warn!("Falling back to default HTTP client: {e}");
                    reqwest::Client::new()
                });
            gw
        }))
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url
            .join(path)
            .map_err(|e| format!("Failed to build URL for {path}: {e}"))
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> Result<Url, String> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Bearer for data requests, refreshing an expiring session first.
    async fn token(&self) -> String {
        let mut session = self.session.lock().await;
        let Some(current) = session.as_ref() else {
            return self.anon_key.clone();
        };
        if current.is_expired(Utc::now()) {
            match self.refresh(current).await {
                Ok(fresh) => {
                    self.store_session(&fresh);
                    *session = Some(fresh);
                }
                Err(RefreshError::Rejected(e)) | Err(RefreshError::Unavailable(e)) => {
                    log::warn!("Token refresh failed, using current token: {e}");
                }
            }
        }
        session
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let token = self.token().await;
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
    }

    async fn send(req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response, String> {
        let resp = req
            .send()
            .await
            .map_err(|e| format!("{what} request failed: {e}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("{what} error {status}: {text}"));
        }
        Ok(resp)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, String> {
        let url = self.table_url(table, query)?;
        let resp = Self::send(self.request(reqwest::Method::GET, url).await, table).await?;
        resp.json()
            .await
            .map_err(|e| format!("Failed to parse {table} rows: {e}"))
    }

    async fn upsert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<(), String> {
        let url = self.table_url(table, &[("on_conflict", on_conflict.to_string())])?;
        let req = self
            .request(reqwest::Method::POST, url)
            .await
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(body);
        Self::send(req, table).await.map(|_| ())
    }

    async fn insert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<(), String> {
        let url = self.table_url(table, &[])?;
        let req = self
            .request(reqwest::Method::POST, url)
            .await
            .header("Prefer", "return=minimal")
            .json(body);
        Self::send(req, table).await.map(|_| ())
    }

    async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<(), String> {
        let url = self.table_url(table, filters)?;
        let req = self
            .request(reqwest::Method::PATCH, url)
            .await
            .header("Prefer", "return=minimal")
            .json(body);
        Self::send(req, table).await.map(|_| ())
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), String> {
        let url = self.table_url(table, filters)?;
        Self::send(self.request(reqwest::Method::DELETE, url).await, table)
            .await
            .map(|_| ())
    }

    async fn sign_up_anonymously(&self) -> Result<Session, String> {
        let url = self.endpoint("auth/v1/signup")?;
        let req = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({}));
        let resp = Self::send(req, "Sign-up").await?;
        let body: AuthResponse = resp
            .json()
            .await
            .map_err(|e| format!("Failed to parse sign-up response: {e}"))?;
        Ok(body.into_session(Utc::now()))
    }

    async fn refresh(&self, session: &Session) -> Result<Session, RefreshError> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or_else(|| RefreshError::Rejected("session has no refresh token".to_string()))?;
        let mut url = self
            .endpoint("auth/v1/token")
            .map_err(RefreshError::Unavailable)?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Unavailable(format!("Token refresh request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("Token refresh error {status}: {text}");
            return Err(if status.is_client_error() {
                RefreshError::Rejected(message)
            } else {
                RefreshError::Unavailable(message)
            });
        }
        let body: AuthResponse = resp.json().await.map_err(|e| {
            RefreshError::Unavailable(format!("Failed to parse token response: {e}"))
        })?;
        Ok(body.into_session(Utc::now()))
    }

    fn restore_session(&self) -> Option<Session> {
        let raw = match self.storage.get(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Reading saved session failed: {e}");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| log::warn!("Ignoring unreadable saved session: {e}"))
            .ok()
    }

    fn store_session(&self, session: &Session) {
        let stored = serde_json::to_string(session)
            .map_err(|e| e.to_string())
            .and_then(|json| self.storage.set(SESSION_KEY, &json).map_err(|e| e.to_string()));
        if let Err(e) = stored {
            log::warn!("Session not saved; the next run will sign up again: {e}");
        }
    }

    fn forget_session(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            log::warn!("Clearing saved session failed: {e}");
        }
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl PersistenceGateway for SupabaseGateway {
    /// Reuse the session held in memory or saved by an earlier run; sign up
    /// only when there is none or the service refuses to refresh it.
    async fn ensure_identity(&self) -> Result<IdentityId, AppError> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref() {
            return Ok(IdentityId::new(s.user_id.clone()));
        }

        if let Some(saved) = self.restore_session() {
            if !saved.is_expired(Utc::now()) {
                log::info!("Restored anonymous identity {}", saved.user_id);
                let id = IdentityId::new(saved.user_id.clone());
                *session = Some(saved);
                return Ok(id);
            }
            match self.refresh(&saved).await {
                Ok(fresh) => {
                    log::info!("Refreshed session for {}", fresh.user_id);
                    self.store_session(&fresh);
                    let id = IdentityId::new(fresh.user_id.clone());
                    *session = Some(fresh);
                    return Ok(id);
                }
                Err(RefreshError::Unavailable(e)) => {
                    log::warn!("Session refresh failed: {e}");
                    return Err(AppError::Auth(e));
                }
                Err(RefreshError::Rejected(e)) => {
                    log::warn!("Saved session for {} rejected ({e}); signing up", saved.user_id);
                    self.forget_session();
                }
            }
        }

        let created = self.sign_up_anonymously().await.map_err(|e| {
            log::warn!("Anonymous sign-up failed: {e}");
            AppError::Auth(e)
        })?;
        log::info!("Provisioned anonymous identity {}", created.user_id);
        self.store_session(&created);
        let id = IdentityId::new(created.user_id.clone());
        *session = Some(created);
        Ok(id)
    }

    async fn load_state(&self, id: &IdentityId) -> Result<Option<UserState>, AppError> {
        let user = || ("user_id", eq(id));

        let profile = self
            .select::<ProfileRow>(PROFILES, &[user(), ("limit", "1".to_string())])
            .await
            .map(|rows| rows.into_iter().next())
            .map_err(AppError::Load);
        let areas = self
            .select::<LifeAreaRow>(
                LIFE_AREAS,
                &[user(), ("is_current", eq(true)), ("order", "area_id".to_string())],
            )
            .await
            .map_err(AppError::Load);
        let tasks = self
            .select::<TaskRow>(TASKS, &[user(), ("order", "created_at.asc".to_string())])
            .await
            .map_err(AppError::Load);
        let history = self
            .select::<HistoryRow>(
                HISTORY,
                &[
                    user(),
                    ("order", "date.desc".to_string()),
                    ("limit", self.history_limit.to_string()),
                ],
            )
            .await
            .map_err(AppError::Load);

        Ok(assemble_state(profile, areas, tasks, history))
    }

    async fn save_state(&self, id: &IdentityId, state: &UserState) -> Result<(), AppError> {
        let user = || ("user_id", eq(id));
        let mut failures: Vec<String> = Vec::new();

        let profile = ProfileRow {
            user_id: id.to_string(),
            has_completed_onboarding: state.has_completed_onboarding,
            ai_insight: Some(state.ai_insight.clone()),
            theme: None,
            updated_at: Some(Utc::now().to_rfc3339()),
        };
        if let Err(e) = self.upsert(PROFILES, "user_id", &profile).await {
            log::warn!("Saving profile failed: {e}");
            failures.push(e);
        }

        match self
            .update(
                LIFE_AREAS,
                &[user(), ("is_current", eq(true))],
                &serde_json::json!({ "is_current": false }),
            )
            .await
        {
            Ok(()) if !state.current_wheel.is_empty() => {
                let rows: Vec<LifeAreaRow> = state
                    .current_wheel
                    .iter()
                    .map(|a| LifeAreaRow::current(id, a))
                    .collect();
                if let Err(e) = self
                    .upsert(LIFE_AREAS, "user_id,area_id,is_current", &rows)
                    .await
                {
                    log::warn!("Saving current wheel failed: {e}");
                    failures.push(e);
                }
            }
            Ok(()) => {}
            Err(e) => {
                log::warn!("Deactivating previous wheel failed, new wheel not written: {e}");
                failures.push(e);
            }
        }

        match self.delete(TASKS, &[user()]).await {
            Ok(()) if !state.daily_tasks.is_empty() => {
                let rows: Vec<TaskRow> = state
                    .daily_tasks
                    .iter()
                    .map(|t| TaskRow::from_task(id, t))
                    .collect();
                if let Err(e) = self.insert(TASKS, &rows).await {
                    log::warn!("Saving tasks failed: {e}");
                    failures.push(e);
                }
            }
            Ok(()) => {}
            Err(e) => {
                log::warn!("Clearing tasks failed, new tasks not written: {e}");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            log::debug!("Saved state for {id}");
            Ok(())
        } else {
            Err(AppError::Save(failures.join("; ")))
        }
    }

    async fn append_history(
        &self,
        id: &IdentityId,
        entry: &HistoryEntry,
    ) -> Result<(), AppError> {
        self.insert(HISTORY, &HistoryRow::from_entry(id, entry))
            .await
            .map_err(|e| {
                log::warn!("Appending history failed: {e}");
                AppError::Save(e)
            })
    }

    async fn save_theme(&self, id: &IdentityId, theme: Theme) -> Result<(), AppError> {
        let body = serde_json::json!({
            "user_id": id.as_str(),
            "theme": theme.as_str(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.upsert(PROFILES, "user_id", &body)
            .await
            .map_err(|e| {
                log::warn!("Saving theme failed: {e}");
                AppError::Save(e)
            })
    }

    async fn load_theme(&self, id: &IdentityId) -> Theme {
        #[derive(Deserialize)]
        struct ThemeRow {
            theme: Option<String>,
        }
        match self
            .select::<ThemeRow>(
                PROFILES,
                &[
                    ("select", "theme".to_string()),
                    ("user_id", eq(id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await
        {
            Ok(rows) => Theme::from_stored(rows.first().and_then(|r| r.theme.as_deref())),
            Err(e) => {
                log::warn!("Loading theme failed, using dark: {e}");
                Theme::default()
            }
        }
    }
}
