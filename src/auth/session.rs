/// Authentication state shared by every dashboard view
///
/// `AuthSession` is the single writer of [`AuthState`]. Views hold a clone of
/// the handle and either read [`AuthSession::state`] or watch
/// [`AuthSession::subscribe`] for changes.
///
/// Each validation is tagged with the generation current when it started.
/// `initialize`, `login`, `revalidate` and `logout` all start a new
/// generation, so a validation that completes after a newer request is
/// dropped without touching state or storage.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::client::RequestClient;
use crate::config::InvalidationPolicy;
use crate::metrics::METRICS;
use crate::navigation::{LogNavigator, Navigator, Route};
use crate::types::ErrorInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Nothing checked yet
    Unknown,
    /// A validation is in flight
    Checking,
    Authenticated,
    Unauthenticated,
}

impl AuthPhase {
    pub fn is_settled(&self) -> bool {
        matches!(self, AuthPhase::Authenticated | AuthPhase::Unauthenticated)
    }
}

/// Snapshot of the authentication state
#[derive(Clone, PartialEq)]
pub struct AuthState {
    phase: AuthPhase,
    username: Option<String>,
    token: Option<String>,
    last_error: Option<ErrorInfo>,
    validated_at: Option<DateTime<Utc>>,
}

impl AuthState {
    fn unknown() -> Self {
        Self {
            phase: AuthPhase::Unknown,
            username: None,
            token: None,
            last_error: None,
            validated_at: None,
        }
    }

    fn checking(token: String) -> Self {
        Self {
            phase: AuthPhase::Checking,
            token: Some(token),
            ..Self::unknown()
        }
    }

    fn authenticated(token: String, username: String) -> Self {
        Self {
            phase: AuthPhase::Authenticated,
            username: Some(username),
            token: Some(token),
            last_error: None,
            validated_at: Some(Utc::now()),
        }
    }

    fn unauthenticated(token: Option<String>, last_error: Option<ErrorInfo>) -> Self {
        Self {
            phase: AuthPhase::Unauthenticated,
            token,
            last_error,
            ..Self::unknown()
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Why the latest validation failed, if it did
    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }
}

// Tokens stay out of logs
impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("phase", &self.phase)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("last_error", &self.last_error)
            .field("validated_at", &self.validated_at)
            .finish()
    }
}

impl InvalidationPolicy {
    /// Whether a failed validation should drop the persisted token
    pub fn clears_on(&self, error: &ErrorInfo) -> bool {
        match self {
            InvalidationPolicy::AnyError => true,
            InvalidationPolicy::RejectionOnly => error.is_rejection(),
        }
    }
}

struct Inner {
    client: RequestClient,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    policy: InvalidationPolicy,
    /// Held for every state transition; never across an await
    generation: Mutex<u64>,
    state: watch::Sender<AuthState>,
}

/// Owner of the authentication state
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

pub struct AuthSessionBuilder {
    client: RequestClient,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    policy: InvalidationPolicy,
}

impl AuthSessionBuilder {
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn policy(mut self, policy: InvalidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> AuthSession {
        let (state, _) = watch::channel(AuthState::unknown());
        AuthSession {
            inner: Arc::new(Inner {
                client: self.client,
                store: self.store,
                navigator: self.navigator,
                policy: self.policy,
                generation: Mutex::new(0),
                state,
            }),
        }
    }
}

impl AuthSession {
    pub fn builder(client: RequestClient, store: Arc<dyn SessionStore>) -> AuthSessionBuilder {
        AuthSessionBuilder {
            client,
            store,
            navigator: Arc::new(LogNavigator),
            policy: InvalidationPolicy::default(),
        }
    }

    pub fn new(client: RequestClient, store: Arc<dyn SessionStore>) -> Self {
        Self::builder(client, store).build()
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Wait until no validation is pending
    ///
    /// Only resolves once `initialize` or `login` has been called.
    pub async fn settled(&self) -> AuthState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| state.phase.is_settled()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Startup entry point: validate whatever token was persisted
    ///
    /// With no persisted token the session becomes unauthenticated without
    /// any network call.
    pub async fn initialize(&self) -> AuthState {
        info!("Restoring persisted session");
        self.check_persisted().await
    }

    /// Validate the persisted token again on explicit request
    pub async fn revalidate(&self) -> AuthState {
        debug!("Re-validating persisted session");
        self.check_persisted().await
    }

    /// Persist `token` and validate it in the background
    ///
    /// The token is in the store when this returns; the state reads
    /// `Checking` until the returned task completes.
    pub fn login(&self, token: impl Into<String>) -> JoinHandle<AuthState> {
        let token = token.into();

        let generation = {
            let mut current = self.lock_generation();
            *current += 1;

            // Stores read an empty token back as absent
            if token.is_empty() {
                warn!("Refusing to log in with an empty session token");
                if let Err(e) = self.inner.store.clear() {
                    warn!("Failed to clear persisted session: {:#}", e);
                }
                let state = AuthState::unauthenticated(None, None);
                self.publish(state.clone());
                return tokio::spawn(async move { state });
            }

            if let Err(e) = self.inner.store.set(&token) {
                warn!("Failed to persist session token: {:#}", e);
                let state = AuthState::unauthenticated(
                    None,
                    Some(ErrorInfo::storage(format!("Failed to persist session: {}", e))),
                );
                self.publish(state.clone());
                return tokio::spawn(async move { state });
            }

            self.publish(AuthState::checking(token.clone()));
            *current
        };

        info!("Session token stored, validating");
        let session = self.clone();
        tokio::spawn(async move { session.validate(token, generation).await })
    }

    /// Drop the session and return to the landing view
    pub fn logout(&self) {
        {
            let mut current = self.lock_generation();
            *current += 1;

            if let Err(e) = self.inner.store.clear() {
                warn!("Failed to clear persisted session: {:#}", e);
            }
            self.publish(AuthState::unauthenticated(None, None));
        }

        METRICS.logouts_total.inc();
        info!("Logged out");
        self.inner.navigator.navigate(Route::Home);
    }

    pub(crate) fn navigate(&self, route: Route) {
        self.inner.navigator.navigate(route);
    }

    async fn check_persisted(&self) -> AuthState {
        let (token, generation) = {
            let mut current = self.lock_generation();
            *current += 1;

            let persisted = self.inner.store.get().unwrap_or_else(|e| {
                warn!("Failed to read persisted session: {:#}", e);
                None
            });

            match persisted {
                Some(token) => {
                    self.publish(AuthState::checking(token.clone()));
                    (token, *current)
                }
                None => {
                    debug!("No persisted session token");
                    let state = AuthState::unauthenticated(None, None);
                    self.publish(state.clone());
                    return state;
                }
            }
        };

        self.validate(token, generation).await
    }

    async fn validate(&self, token: String, generation: u64) -> AuthState {
        let result = self.inner.client.profile(&token).await;

        let current = self.lock_generation();
        if *current != generation {
            debug!(
                generation,
                current = *current,
                "Discarding superseded validation result"
            );
            METRICS.superseded_validations_total.inc();
            return self.state();
        }

        let state = match result {
            Ok(profile) => {
                info!("✓ Authenticated as {}", profile.data.username);
                METRICS
                    .validations_total
                    .with_label_values(&["authenticated"])
                    .inc();
                AuthState::authenticated(token, profile.data.username)
            }
            Err(error) if self.inner.policy.clears_on(&error) => {
                warn!("Session validation failed {}, clearing session", error);
                METRICS.validations_total.with_label_values(&["cleared"]).inc();
                if let Err(e) = self.inner.store.clear() {
                    warn!("Failed to clear persisted session: {:#}", e);
                }
                AuthState::unauthenticated(None, Some(error))
            }
            Err(error) => {
                warn!("Session validation failed {}, keeping session for retry", error);
                METRICS.validations_total.with_label_values(&["kept"]).inc();
                AuthState::unauthenticated(Some(token), Some(error))
            }
        };

        self.publish(state.clone());
        drop(current);
        state
    }

    fn publish(&self, state: AuthState) {
        debug!(phase = ?state.phase, "Auth state changed");
        self.inner.state.send_replace(state);
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionStore;
    use crate::client::Backend;
    use crate::types::{ApiRequest, ApiResult, ApiSuccess, Endpoint};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Accepts exactly one token
    struct SingleUserBackend;

    #[async_trait]
    impl Backend for SingleUserBackend {
        async fn request(&self, request: ApiRequest) -> ApiResult<Value> {
            assert_eq!(request.endpoint, Endpoint::Profile);
            match request.token.as_deref() {
                Some("good") => Ok(ApiSuccess {
                    message: "Successfully authorized the user.".to_string(),
                    status_code: 200,
                    data: json!({ "username": "alice", "token": "good" }),
                }),
                _ => Err(ErrorInfo::http(401, "invalid token")),
            }
        }
    }

    fn session_with(store: Arc<MemorySessionStore>) -> AuthSession {
        AuthSession::new(RequestClient::new(Arc::new(SingleUserBackend)), store)
    }

    #[test]
    fn test_initial_state_is_unknown() {
        let session = session_with(Arc::new(MemorySessionStore::new()));
        let state = session.state();

        assert_eq!(state.phase(), AuthPhase::Unknown);
        assert!(!state.is_authenticated());
        assert!(state.username().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let state = AuthState::authenticated("secret-jwt".to_string(), "alice".to_string());
        let debug = format!("{:?}", state);

        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn test_invalidation_policy() {
        let rejected = ErrorInfo::http(401, "invalid token");
        let offline = ErrorInfo::network("connection refused");

        assert!(InvalidationPolicy::AnyError.clears_on(&rejected));
        assert!(InvalidationPolicy::AnyError.clears_on(&offline));
        assert!(InvalidationPolicy::RejectionOnly.clears_on(&rejected));
        assert!(!InvalidationPolicy::RejectionOnly.clears_on(&offline));
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let store = Arc::new(MemorySessionStore::new());
        let session = session_with(store.clone());

        let state = session.login("good").await.unwrap();
        assert!(state.is_authenticated());
        assert_eq!(state.username(), Some("alice"));
        assert!(state.validated_at().is_some());

        session.logout();
        let state = session.state();
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
        assert!(state.token().is_none());
        assert!(store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_with_rejected_token() {
        let store = Arc::new(MemorySessionStore::new());
        let session = session_with(store.clone());

        let state = session.login("forged").await.unwrap();
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
        assert_eq!(state.last_error().map(|e| e.is_rejection()), Some(true));
        assert!(store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let session = session_with(Arc::new(MemorySessionStore::with_token("good")));
        let mut rx = session.subscribe();

        session.initialize().await;

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert!(state.is_authenticated());
    }
}
