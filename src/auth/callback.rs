/// Finishes the OAuth redirect: exchanges the authorization code for a
/// session token and hands it to the [`AuthSession`].
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use super::session::AuthSession;
use crate::client::RequestClient;
use crate::metrics::METRICS;
use crate::navigation::Route;
use crate::types::ErrorInfo;

/// Query parameters the provider appends to the redirect URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    /// Parse a raw query string; the first `code` and `state` win
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" if params.code.is_none() => params.code = Some(value.into_owned()),
                "state" if params.state.is_none() => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A session was already authenticated; nothing was exchanged
    AlreadyAuthenticated,
    /// The redirect carried no authorization code
    MissingCode,
    /// The `state` parameter did not match the one we sent
    StateMismatch,
    /// Another exchange is in flight, or this code was already used
    Suppressed,
    /// Token received and handed to the session for validation
    LoggedIn,
    /// The backend answered without a token
    Failed,
    /// The exchange request failed
    ServerError(ErrorInfo),
}

impl CallbackOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            CallbackOutcome::AlreadyAuthenticated => "User already authenticated.",
            CallbackOutcome::MissingCode => "No OAuth code found.",
            CallbackOutcome::StateMismatch => "OAuth state mismatch. Please restart the login.",
            CallbackOutcome::Suppressed => "Authenticating with the server, please wait.",
            CallbackOutcome::LoggedIn => "Successfully authenticated.",
            CallbackOutcome::Failed => "Authentication failed.",
            CallbackOutcome::ServerError(_) => {
                "Authentication failed due to a server error. Please try again later."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::AlreadyAuthenticated => "already_authenticated",
            CallbackOutcome::MissingCode => "missing_code",
            CallbackOutcome::StateMismatch => "state_mismatch",
            CallbackOutcome::Suppressed => "suppressed",
            CallbackOutcome::LoggedIn => "logged_in",
            CallbackOutcome::Failed => "failed",
            CallbackOutcome::ServerError(_) => "server_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CallbackOutcome::LoggedIn | CallbackOutcome::AlreadyAuthenticated
        )
    }
}

impl fmt::Display for CallbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Default)]
struct ExchangeGuard {
    in_flight: bool,
    /// Codes are single-use; each is sent to the backend at most once
    consumed: HashSet<String>,
}

/// Clears the in-flight flag when the exchange ends, even if it is dropped
struct Attempt<'a> {
    guard: &'a Mutex<ExchangeGuard>,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        lock(self.guard).in_flight = false;
    }
}

fn lock(guard: &Mutex<ExchangeGuard>) -> MutexGuard<'_, ExchangeGuard> {
    guard.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct OAuthCallback {
    session: AuthSession,
    client: RequestClient,
    expected_state: Option<String>,
    guard: Mutex<ExchangeGuard>,
}

impl OAuthCallback {
    pub fn new(session: AuthSession, client: RequestClient) -> Self {
        Self {
            session,
            client,
            expected_state: None,
            guard: Mutex::new(ExchangeGuard::default()),
        }
    }

    /// Require the redirect to echo this `state` value
    pub fn with_expected_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    pub async fn handle_url(&self, url: &Url) -> CallbackOutcome {
        self.handle(CallbackParams::from_url(url)).await
    }

    pub async fn handle(&self, params: CallbackParams) -> CallbackOutcome {
        let outcome = self.run(params).await;
        METRICS
            .oauth_callbacks_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        outcome
    }

    async fn run(&self, params: CallbackParams) -> CallbackOutcome {
        if self.session.state().is_authenticated() {
            info!("OAuth callback while already authenticated");
            self.session.navigate(Route::Home);
            return CallbackOutcome::AlreadyAuthenticated;
        }

        let Some(code) = params.code.filter(|code| !code.is_empty()) else {
            info!("OAuth callback without a code");
            return CallbackOutcome::MissingCode;
        };

        if let Some(expected) = &self.expected_state {
            if params.state.as_deref() != Some(expected.as_str()) {
                warn!("OAuth state mismatch - possible CSRF, refusing to exchange code");
                return CallbackOutcome::StateMismatch;
            }
        }

        let Some(_attempt) = self.begin(&code) else {
            debug!("OAuth exchange already attempted, suppressing");
            return CallbackOutcome::Suppressed;
        };

        info!("Exchanging OAuth code for a session token");
        match self.client.oauth(&code).await {
            Ok(response) => match response.data.token.filter(|token| !token.is_empty()) {
                Some(token) => {
                    // Validation continues in the background
                    drop(self.session.login(token));
                    self.session.navigate(Route::Home);
                    CallbackOutcome::LoggedIn
                }
                None => {
                    warn!("OAuth exchange succeeded without a token: {}", response.message);
                    CallbackOutcome::Failed
                }
            },
            Err(error) => {
                warn!("OAuth exchange failed {}", error);
                CallbackOutcome::ServerError(error)
            }
        }
    }

    fn begin(&self, code: &str) -> Option<Attempt<'_>> {
        let mut guard = lock(&self.guard);
        if guard.in_flight || guard.consumed.contains(code) {
            return None;
        }
        guard.in_flight = true;
        guard.consumed.insert(code.to_string());
        Some(Attempt { guard: &self.guard })
    }
}
