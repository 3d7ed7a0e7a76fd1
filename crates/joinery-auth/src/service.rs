//! Authentication facade.
//!
//! [`AuthService`] is the single entry point the rest of Joinery talks to. It
//! ties together the OAuth client, the credential store, the session monitor
//! and the observable [`AuthState`], and decides when to fall back to demo
//! mode.
//!
//! The service is cheap to clone; all clones share one session.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use joinery_vault::TieredStorage;
use tokio::sync::{Mutex, broadcast, watch};

use crate::config::{AuthConfig, Settings};
use crate::demo::DemoAuth;
use crate::error::{AuthError, Result};
use crate::monitor::{ActivityEvent, EndReason, MonitorPhase, SessionHooks, SessionMonitor};
use crate::notify::{Notice, Notifier};
use crate::oauth::OAuthClient;
use crate::state::{AuthSnapshot, AuthState};
use crate::token_store::CredentialStore;
use crate::types::{AuthMode, SessionRecord, User};

/// What a login attempt turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Send the user to the identity provider.
    Redirect(String),
    /// OAuth is unavailable; signed in as the demo user.
    Demo(User),
}

struct Inner {
    config: AuthConfig,
    oauth: OAuthClient,
    store: CredentialStore,
    demo: DemoAuth,
    state: AuthState,
    monitor: SessionMonitor,
    notifier: Notifier,
    /// Serializes refreshes so concurrent 401s trigger one backend call.
    refresh_lock: Mutex<()>,
}

/// The authentication facade.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<Inner>,
}

impl AuthService {
    /// Build a service without touching storage. Call [`AuthService::init`]
    /// before use, or use [`AuthService::bootstrap`].
    pub fn new(settings: Settings, storage: TieredStorage) -> Self {
        Self::with_http(settings, storage, reqwest::Client::new())
    }

    pub fn with_http(settings: Settings, storage: TieredStorage, http: reqwest::Client) -> Self {
        let notifier = Notifier::default();
        let Settings { auth, session } = settings;

        let inner = Inner {
            oauth: OAuthClient::with_http(auth.clone(), storage.clone(), http),
            store: CredentialStore::new(storage.clone())
                .with_refresh_window(session.refresh_lead()),
            demo: DemoAuth::new(storage),
            state: AuthState::new(),
            monitor: SessionMonitor::new(session, notifier.clone()),
            notifier,
            refresh_lock: Mutex::new(()),
            config: auth,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Build a service and restore whatever session is stored.
    pub async fn bootstrap(settings: Settings, storage: TieredStorage) -> Result<Self> {
        let service = Self::new(settings, storage);
        service.init().await?;
        Ok(service)
    }

    // -- Observation --------------------------------------------------------

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.current_user()
    }

    pub fn mode(&self) -> Option<AuthMode> {
        self.inner.state.mode()
    }

    /// The stored access token, if any.
    pub fn token(&self) -> Result<Option<String>> {
        self.inner.store.token()
    }

    /// Idle warnings and idle logout notices.
    pub fn notifications(&self) -> broadcast::Receiver<Notice> {
        self.inner.notifier.subscribe()
    }

    pub fn monitor_phase(&self) -> MonitorPhase {
        self.inner.monitor.phase()
    }

    /// Forward a user interaction to the session monitor.
    pub fn record_activity(&self, event: ActivityEvent) -> bool {
        self.inner.monitor.record_activity(event)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Restore the stored session, if any.
    ///
    /// A valid OAuth session is resumed (and refreshed first when close to
    /// expiry); otherwise a stored demo flag signs in the demo user;
    /// otherwise the state is cleared.
    pub async fn init(&self) -> Result<AuthSnapshot> {
        let validation = self.inner.store.read()?;

        if let (true, Some(user)) = (validation.is_valid, validation.user) {
            tracing::info!(user_id = %user.id, "restoring stored session");
            self.inner.state.set_authenticated(user, AuthMode::OAuth);
            self.start_monitoring();

            let mut expiry = validation.expiry;
            if validation.needs_refresh {
                tracing::info!("stored token is close to expiry, refreshing");
                if let Some((_, refreshed)) = self.refresh_inner().await {
                    expiry = Some(refreshed);
                }
            }
            if let Some(expiry) = expiry {
                self.inner.monitor.schedule_refresh(expiry);
            }
        } else if self.inner.demo.is_demo_authentication()? {
            tracing::info!("restoring demo session");
            self.inner
                .state
                .set_authenticated(DemoAuth::mock_user(), AuthMode::Demo);
        } else {
            self.inner.state.clear();
        }

        Ok(self.snapshot())
    }

    /// Start a login.
    ///
    /// Returns the provider URL to open, or signs in the demo user straight
    /// away when OAuth is not configured.
    pub async fn login_with_provider(&self, persistent: bool) -> Result<LoginOutcome> {
        match self.inner.oauth.initiate() {
            Ok(request) => {
                self.inner.store.remember_persistence(persistent)?;
                Ok(LoginOutcome::Redirect(request.url))
            }
            Err(AuthError::NotConfigured) => {
                tracing::warn!("GitHub OAuth not configured, using demo login");
                let user = self.demo_login(persistent)?;
                Ok(LoginOutcome::Demo(user))
            }
            Err(e) => Err(e),
        }
    }

    /// Complete a login with the `code` and `state` the provider sent back.
    ///
    /// When the backend cannot be reached and demo mode is enabled, signs in
    /// the demo user instead. Every other failure is returned for display.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<User> {
        let persistent = self.inner.store.is_persistent()?;

        let response = match self.inner.oauth.exchange_code(code, state).await {
            Ok(response) => response,
            Err(e) if e.is_network() && self.inner.config.is_demo_enabled() => {
                tracing::warn!(error = %e, "backend not available, using demo authentication");
                return self.demo_login(persistent);
            }
            Err(e) => {
                tracing::error!(error = %e, "OAuth callback failed");
                return Err(e);
            }
        };

        let record = SessionRecord::from_token_response(response, persistent).inspect_err(|e| {
            tracing::error!(error = %e, "OAuth callback returned an unusable token");
        })?;
        let user = record.user.clone().ok_or(AuthError::Unauthorized)?;
        self.inner.store.store(&record)?;

        tracing::info!(user_id = %user.id, persistent, "signed in");
        self.inner
            .state
            .set_authenticated(user.clone(), AuthMode::OAuth);
        self.start_monitoring();
        self.inner.monitor.schedule_refresh(record.expiry);
        Ok(user)
    }

    /// Sign out locally, telling the backend when there is something to
    /// revoke.
    ///
    /// Local state is always cleared, even when the backend is unreachable.
    pub async fn logout(&self) -> Result<()> {
        let inner = &self.inner;
        inner.monitor.stop();

        let demo = inner.state.mode() == Some(AuthMode::Demo)
            || inner.demo.is_demo_authentication().unwrap_or(false);
        let token = inner.store.token().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read token for revocation");
            None
        });
        if let (false, Some(token)) = (demo, token) {
            if let Err(e) = inner.oauth.revoke(&token).await {
                tracing::warn!(error = %e, "backend logout failed");
            }
        }

        let purged = inner.store.clear_all();
        inner.state.clear();
        tracing::info!("signed out");
        purged
    }

    /// Trade the refresh token for a new access token and re-arm the refresh
    /// timer.
    ///
    /// Returns `None` in demo mode, without a refresh token, or when the
    /// backend refuses.
    pub async fn refresh_token(&self) -> Option<String> {
        let (token, expiry) = self.refresh_inner().await?;
        self.inner.monitor.schedule_refresh(expiry);
        Some(token)
    }

    /// Sign out when signed in, otherwise sign in as the demo user.
    pub async fn toggle_demo(&self) -> Result<AuthSnapshot> {
        if self.is_authenticated() {
            self.logout().await?;
        } else {
            self.demo_login(false)?;
        }
        Ok(self.snapshot())
    }

    // -- Internal helpers ---------------------------------------------------

    fn demo_login(&self, persistent: bool) -> Result<User> {
        let user = self.inner.demo.perform_mock_login(persistent)?;
        self.inner
            .state
            .set_authenticated(user.clone(), AuthMode::Demo);
        Ok(user)
    }

    fn start_monitoring(&self) {
        let hooks = Arc::new(MonitorHooks {
            inner: Arc::downgrade(&self.inner),
        });
        self.inner.monitor.start(hooks);
    }

    /// Refresh without touching the refresh timer. Returns the new token and
    /// its expiry.
    async fn refresh_inner(&self) -> Option<(String, DateTime<Utc>)> {
        let inner = &self.inner;
        if inner.state.mode() == Some(AuthMode::Demo) {
            return None;
        }

        let before = inner.store.token().ok().flatten();
        let _guard = inner.refresh_lock.lock().await;

        // Another caller refreshed while we waited.
        let current = inner.store.token().ok().flatten();
        if current.is_some() && current != before {
            let expiry = inner.store.read().ok().and_then(|v| v.expiry)?;
            return current.map(|token| (token, expiry));
        }

        let generation = inner.store.generation();
        let refresh_token = match inner.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read refresh token");
                return None;
            }
        };

        let response = match inner.oauth.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "token refresh failed");
                return None;
            }
        };

        match inner.store.update_token(
            &response.access_token,
            response.expires_in,
            response.refresh_token,
            generation,
        ) {
            Ok(true) => {
                let expiry = inner.store.read().ok().and_then(|v| v.expiry)?;
                tracing::info!(expiry = %expiry, "access token refreshed");
                Some((response.access_token, expiry))
            }
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not store refreshed token");
                None
            }
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("snapshot", &self.snapshot())
            .field("monitor", &self.inner.monitor)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Monitor hooks
// ---------------------------------------------------------------------------

/// Routes monitor callbacks back into the service without keeping it alive.
struct MonitorHooks {
    inner: Weak<Inner>,
}

#[async_trait]
impl SessionHooks for MonitorHooks {
    async fn on_session_end(&self, reason: EndReason) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let service = AuthService { inner };
        if let Err(e) = service.logout().await {
            tracing::warn!(error = %e, ?reason, "logout after session end failed");
        }
        match reason {
            EndReason::Idle => tracing::info!("session expired due to inactivity"),
            EndReason::TokenExpired => tracing::info!("session expired with its token"),
        }
    }

    async fn on_refresh_due(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.upgrade()?;
        let service = AuthService { inner };
        service.refresh_inner().await.map(|(_, expiry)| expiry)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::keys;
    use joinery_vault::StorageArea;

    fn unconfigured() -> Settings {
        Settings::default()
    }

    fn configured() -> Settings {
        let mut settings = Settings::default();
        settings.auth.github.client_id = "test-client-id".to_string();
        // Nothing listens here; every backend call fails at connect.
        settings.auth.api_base_url = "http://127.0.0.1:9/api".to_string();
        settings
    }

    fn stored_user() -> User {
        User {
            id: "42".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            avatar: None,
            created_at: Utc::now(),
        }
    }

    fn store_session(storage: &TieredStorage, expires_in: i64) {
        let store = CredentialStore::new(storage.clone());
        store
            .store(&SessionRecord {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                expiry: Utc::now() + chrono::TimeDelta::seconds(expires_in),
                user: Some(stored_user()),
                persistent: true,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn unconfigured_login_signs_in_demo_user() {
        let storage = TieredStorage::in_memory();
        let service = AuthService::new(unconfigured(), storage.clone());

        let outcome = service.login_with_provider(false).await.unwrap();
        let LoginOutcome::Demo(user) = outcome else {
            panic!("expected demo login");
        };
        assert_eq!(user.id, "1");
        assert_eq!(user.email, "john.doe@example.com");
        assert_eq!(
            storage.ephemeral().get(keys::DEMO_AUTH).unwrap().as_deref(),
            Some("true")
        );

        let snapshot = service.snapshot();
        assert!(snapshot.authenticated);
        assert_eq!(snapshot.user, Some(DemoAuth::mock_user()));
        assert_eq!(snapshot.mode, Some(AuthMode::Demo));
    }

    #[tokio::test]
    async fn configured_login_redirects_and_remembers_choice() {
        let storage = TieredStorage::in_memory();
        let service = AuthService::new(configured(), storage.clone());

        let outcome = service.login_with_provider(true).await.unwrap();
        let LoginOutcome::Redirect(url) = outcome else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(storage.durable().get(keys::OAUTH_STATE).unwrap().is_some());
        assert_eq!(
            storage.durable().get(keys::AUTH_PERSISTENT).unwrap().as_deref(),
            Some("true")
        );
        assert!(!service.is_authenticated());
    }

    #[tokio::test]
    async fn init_with_expired_session_clears_everything() {
        let storage = TieredStorage::in_memory();
        store_session(&storage, -1);

        let service = AuthService::bootstrap(configured(), storage.clone())
            .await
            .unwrap();
        assert!(!service.is_authenticated());
        assert!(storage.durable().keys().unwrap().is_empty());
        assert!(storage.ephemeral().keys().unwrap().is_empty());
        assert_eq!(service.monitor_phase(), MonitorPhase::Stopped);
    }

    #[tokio::test]
    async fn init_restores_valid_session_and_monitors_it() {
        let storage = TieredStorage::in_memory();
        store_session(&storage, 3600);

        let service = AuthService::bootstrap(configured(), storage).await.unwrap();
        let snapshot = service.snapshot();
        assert!(snapshot.authenticated);
        assert_eq!(snapshot.user.unwrap().id, "42");
        assert_eq!(snapshot.mode, Some(AuthMode::OAuth));
        assert_eq!(service.monitor_phase(), MonitorPhase::IdleArmed);
        assert_eq!(service.token().unwrap().as_deref(), Some("access"));
    }

    #[tokio::test]
    async fn init_restores_demo_session() {
        let storage = TieredStorage::in_memory();
        DemoAuth::new(storage.clone()).perform_mock_login(true).unwrap();

        let service = AuthService::bootstrap(unconfigured(), storage).await.unwrap();
        assert_eq!(service.mode(), Some(AuthMode::Demo));
        assert_eq!(service.current_user(), Some(DemoAuth::mock_user()));
        assert_eq!(service.monitor_phase(), MonitorPhase::Stopped);
    }

    #[tokio::test]
    async fn logout_without_backend_still_purges() {
        let storage = TieredStorage::in_memory();
        store_session(&storage, 3600);
        let service = AuthService::bootstrap(configured(), storage.clone())
            .await
            .unwrap();
        assert!(service.is_authenticated());

        service.logout().await.unwrap();

        assert!(!service.is_authenticated());
        assert_eq!(service.snapshot(), AuthSnapshot::default());
        assert!(storage.durable().keys().unwrap().is_empty());
        assert!(storage.ephemeral().keys().unwrap().is_empty());
        assert_eq!(service.monitor_phase(), MonitorPhase::Stopped);
    }

    #[tokio::test]
    async fn refresh_is_skipped_in_demo_mode() {
        let service = AuthService::new(unconfigured(), TieredStorage::in_memory());
        service.login_with_provider(true).await.unwrap();
        assert_eq!(service.refresh_token().await, None);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_none() {
        let service = AuthService::new(configured(), TieredStorage::in_memory());
        assert_eq!(service.refresh_token().await, None);
    }

    #[tokio::test]
    async fn toggle_demo_flips_state() {
        let storage = TieredStorage::in_memory();
        let service = AuthService::new(unconfigured(), storage.clone());

        let on = service.toggle_demo().await.unwrap();
        assert!(on.authenticated);
        assert_eq!(on.mode, Some(AuthMode::Demo));

        let off = service.toggle_demo().await.unwrap();
        assert!(!off.authenticated);
        assert!(storage.ephemeral().keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn callback_without_pending_login_is_invalid_state() {
        let service = AuthService::new(configured(), TieredStorage::in_memory());
        let result = service.handle_callback("code", "state").await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
        assert!(!service.is_authenticated());
    }

    #[tokio::test]
    async fn callback_with_unreachable_backend_falls_back_to_demo() {
        let storage = TieredStorage::in_memory();
        let service = AuthService::new(configured(), storage.clone());
        let LoginOutcome::Redirect(_) = service.login_with_provider(false).await.unwrap() else {
            panic!("expected redirect");
        };
        let state = storage.durable().get(keys::OAUTH_STATE).unwrap().unwrap();

        let user = service.handle_callback("code", &state).await.unwrap();
        assert_eq!(user, DemoAuth::mock_user());
        assert_eq!(service.mode(), Some(AuthMode::Demo));
    }

    #[tokio::test]
    async fn callback_with_unreachable_backend_in_production_fails() {
        let storage = TieredStorage::in_memory();
        let mut settings = configured();
        settings.auth.production = true;
        let service = AuthService::new(settings, storage.clone());
        service.login_with_provider(false).await.unwrap();
        let state = storage.durable().get(keys::OAUTH_STATE).unwrap().unwrap();

        let err = service.handle_callback("code", &state).await.unwrap_err();
        assert!(err.is_network());
        assert!(!service.is_authenticated());
    }

    #[test]
    fn service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthService>();
    }
}
