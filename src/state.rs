use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::error::{AppError, ErrorNotice};
use crate::gateway::local::LocalGateway;
use crate::gateway::supabase::SupabaseGateway;
use crate::gateway::{IdentityId, PersistenceGateway};
use crate::intelligence::Guide;
use crate::persist::Persister;
use crate::types::{Config, StatePatch, Theme, UserState, View};
use crate::workflow::onboarding::OnboardingFlow;
use crate::workflow::week::WeeklyDraft;

/// Text of the generic alert raised when a user-triggered flow got no guidance.
pub const AI_UNAVAILABLE_NOTICE: &str =
    "Could not reach the AI. Your progress was kept; try again later.";

/// Current screen plus a counter bumped on every change of screen.
/// Async intents compare epochs to drop results for a screen the user left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub view: View,
    pub epoch: u64,
}

/// Application state shared by every intent.
///
/// The aggregate is only ever replaced wholesale under the write lock;
/// readers clone the `Arc` and never observe a half-applied change.
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub guide: Guide,
    store: RwLock<Arc<UserState>>,
    changes: watch::Sender<Arc<UserState>>,
    view: Mutex<ViewState>,
    identity: Mutex<Option<IdentityId>>,
    theme: Mutex<Theme>,
    loading: AtomicBool,
    generating: AtomicBool,
    pub(crate) onboarding: Mutex<Option<OnboardingFlow>>,
    pub(crate) weekly: Mutex<Option<WeeklyDraft>>,
    notices: Mutex<Vec<ErrorNotice>>,
    cheers: AtomicUsize,
    pub(crate) persister: Persister,
}

/// Clears an in-flight flag when dropped.
pub struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn PersistenceGateway>, guide: Guide) -> Self {
        let initial = Arc::new(UserState::default());
        let (changes, _) = watch::channel(initial.clone());
        Self {
            config,
            persister: Persister::new(gateway.clone()),
            gateway,
            guide,
            store: RwLock::new(initial),
            changes,
            view: Mutex::new(ViewState {
                view: View::Landing,
                epoch: 0,
            }),
            identity: Mutex::new(None),
            theme: Mutex::new(Theme::default()),
            loading: AtomicBool::new(false),
            generating: AtomicBool::new(false),
            onboarding: Mutex::new(None),
            weekly: Mutex::new(None),
            notices: Mutex::new(Vec::new()),
            cheers: AtomicUsize::new(0),
        }
    }

    /// Wire up gateway and guide from config. The hosted gateway is used when
    /// configured and keeps its session in local storage; otherwise the
    /// aggregate itself lives there. Local storage is at `storage_path`
    /// (default `~/.rivus/rivus.db`).
    pub fn from_config(config: Config, storage_path: Option<&Path>) -> Self {
        let storage = crate::db::open_local_storage(storage_path);
        let gateway: Arc<dyn PersistenceGateway> =
            match SupabaseGateway::from_config(&config, storage.clone()) {
                Some(Ok(gw)) => {
                    log::info!("Using hosted persistence");
                    Arc::new(gw)
                }
                Some(Err(e)) => {
                    log::warn!("Hosted persistence misconfigured ({e}); using local storage");
                    Arc::new(LocalGateway::new(storage))
                }
                None => {
                    log::info!("No hosted service configured; using local storage");
                    Arc::new(LocalGateway::new(storage))
                }
            };
        let guide = Guide::from_config(&config);
        Self::new(config, gateway, guide)
    }

    // =========================================================================
    // Aggregate
    // =========================================================================

    pub fn snapshot(&self) -> Arc<UserState> {
        self.store.read().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<UserState>> {
        self.changes.subscribe()
    }

    /// Replace the aggregate, notify subscribers and queue a save.
    /// Rejected if the new state breaks an invariant.
    pub(crate) fn replace_state(&self, next: UserState) -> Result<Arc<UserState>, AppError> {
        let mut store = self.store.write();
        self.commit(&mut store, next)
    }

    /// Derive the next aggregate from the current one under the write lock,
    /// so concurrent intents never overwrite each other's changes.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&UserState) -> Result<(UserState, T), AppError>,
    ) -> Result<(Arc<UserState>, T), AppError> {
        let mut store = self.store.write();
        let (next, out) = f(&store)?;
        let next = self.commit(&mut store, next)?;
        Ok((next, out))
    }

    /// Like [`AppState::mutate`] for intents expressed as a patch. The patch
    /// is checked against the state it is merged over.
    pub(crate) fn update_with<T>(
        &self,
        f: impl FnOnce(&UserState) -> Result<(StatePatch, T), AppError>,
    ) -> Result<(Arc<UserState>, T), AppError> {
        let mut store = self.store.write();
        let (patch, out) = f(&store)?;
        if patch.is_empty() {
            return Ok((store.clone(), out));
        }
        patch.check_against(&store)?;
        let next = patch.apply(&store);
        let next = self.commit(&mut store, next)?;
        Ok((next, out))
    }

    /// Merge a patch over the current aggregate (the view-facing update).
    pub(crate) fn apply_patch(&self, patch: StatePatch) -> Result<Arc<UserState>, AppError> {
        self.update_with(|_| Ok((patch, ()))).map(|(next, ())| next)
    }

    fn commit(
        &self,
        store: &mut Arc<UserState>,
        next: UserState,
    ) -> Result<Arc<UserState>, AppError> {
        next.check_invariants()?;
        let next = Arc::new(next);
        *store = next.clone();
        self.changes.send_replace(next.clone());
        self.persister.request(next.clone());
        Ok(next)
    }

    // =========================================================================
    // Gates
    // =========================================================================

    /// Fail with `Busy` while the initial load or an AI-bound intent runs.
    pub fn ensure_idle(&self) -> Result<(), AppError> {
        if self.loading.load(Ordering::SeqCst) || self.generating.load(Ordering::SeqCst) {
            return Err(AppError::Busy);
        }
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_loading(&self) -> Result<FlagGuard<'_>, AppError> {
        Self::acquire(&self.loading)
    }

    /// Claim the in-flight slot for an AI-bound intent.
    pub(crate) fn begin_generation(&self) -> Result<FlagGuard<'_>, AppError> {
        if self.loading.load(Ordering::SeqCst) {
            return Err(AppError::Busy);
        }
        Self::acquire(&self.generating)
    }

    fn acquire(flag: &AtomicBool) -> Result<FlagGuard<'_>, AppError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| FlagGuard(flag))
            .map_err(|_| AppError::Busy)
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub fn view(&self) -> View {
        self.view.lock().view
    }

    pub fn view_state(&self) -> ViewState {
        *self.view.lock()
    }

    /// Switch screens. The epoch only moves when the screen actually changes.
    pub(crate) fn set_view(&self, view: View) -> ViewState {
        let mut current = self.view.lock();
        if current.view != view {
            log::debug!("View {:?} -> {:?}", current.view, view);
            current.view = view;
            current.epoch += 1;
        }
        *current
    }

    /// True if the screen changed since `captured` was taken.
    pub(crate) fn is_stale(&self, captured: ViewState) -> bool {
        self.view.lock().epoch != captured.epoch
    }

    pub fn identity(&self) -> Option<IdentityId> {
        self.identity.lock().clone()
    }

    pub(crate) fn set_identity(&self, id: IdentityId) {
        *self.identity.lock() = Some(id);
    }

    pub fn theme(&self) -> Theme {
        *self.theme.lock()
    }

    pub(crate) fn set_theme(&self, theme: Theme) {
        *self.theme.lock() = theme;
    }

    pub(crate) fn next_cheer(&self) -> &'static str {
        crate::workflow::today::cheer_message(self.cheers.fetch_add(1, Ordering::SeqCst))
    }

    // =========================================================================
    // Notices
    // =========================================================================

    pub(crate) fn push_notice(&self, err: &AppError) {
        log::info!("Queued notice: {err}");
        self.notices.lock().push(ErrorNotice::from(err));
    }

    pub fn take_notices(&self) -> Vec<ErrorNotice> {
        std::mem::take(&mut *self.notices.lock())
    }

    /// Wait for queued saves to reach the gateway.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Path to ~/.rivus/config.json
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".rivus").join("config.json"))
}

/// Load configuration from ~/.rivus/config.json plus environment overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_config() -> Result<Config, String> {
    let config = load_config_from(&config_path()?)?;
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::debug!("No config at {}; using defaults", path.display());
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Environment variables win over the file. Empty values are ignored.
pub fn apply_env_overrides(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Config {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(url) = get("RIVUS_SUPABASE_URL") {
        config.supabase_url = Some(url);
    }
    if let Some(key) = get("RIVUS_SUPABASE_ANON_KEY") {
        config.supabase_anon_key = Some(key);
    }
    if let Some(key) = get("GEMINI_API_KEY") {
        config.gemini_api_key = Some(key);
    }
    if let Some(model) = get("RIVUS_GEMINI_MODEL") {
        config.gemini_model = model;
    }
    config
}

/// Create or update ~/.rivus/config.json.
///
/// Reads the existing file (or defaults), applies the mutator and writes it
/// back, creating ~/.rivus/ if needed.
pub fn create_or_update_config(mutator: impl FnOnce(&mut Config)) -> Result<Config, String> {
    create_or_update_config_at(&config_path()?, mutator)
}

pub fn create_or_update_config_at(
    path: &Path,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut config = load_config_from(path)?;
    mutator(&mut config);

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(config)
}
