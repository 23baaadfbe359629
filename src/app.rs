/// Wires configuration into the session core and the views
use anyhow::Result;
use std::sync::Arc;

use crate::auth::{open_store, AuthSession, OAuthCallback, SessionStore};
use crate::client::RequestClient;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::navigation::Navigator;

pub struct App {
    pub config: Config,
    pub client: RequestClient,
    pub session: AuthSession,
    pub dashboard: Dashboard,
}

impl App {
    pub fn new(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let client = RequestClient::from_config(&config.backend)?;
        let store = open_store(&config.session)?;
        Ok(Self::with_parts(config, client, store, navigator))
    }

    pub fn with_parts(
        config: Config,
        client: RequestClient,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let session = AuthSession::builder(client.clone(), store)
            .navigator(navigator)
            .policy(config.session.invalidation)
            .build();
        let dashboard = Dashboard::new(session.clone(), client.clone());

        Self {
            config,
            client,
            session,
            dashboard,
        }
    }

    /// Callback handler for one login attempt
    pub fn callback(&self, expected_state: Option<String>) -> OAuthCallback {
        let callback = OAuthCallback::new(self.session.clone(), self.client.clone());
        match expected_state {
            Some(state) => callback.with_expected_state(state),
            None => callback,
        }
    }
}
