/// Protected dashboard views: deployments and per-project environment
use thiserror::Error;

use crate::auth::{AuthPhase, AuthSession};
use crate::client::RequestClient;
use crate::navigation::Route;
use crate::types::{Deployment, EnvVar, ErrorInfo};

#[derive(Debug, Error, PartialEq)]
pub enum DashboardError {
    #[error("Not authenticated.")]
    NotAuthenticated,

    #[error("Project name not found.")]
    MissingProjectName,

    #[error("Error fetching {what} {error}")]
    Api {
        what: &'static str,
        error: ErrorInfo,
    },
}

/// What a view should do given the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    /// The session check has not finished yet
    Pending,
    /// Send the browser to the OAuth provider
    RedirectToProvider,
    Redirect(Route),
}

#[derive(Clone)]
pub struct Dashboard {
    session: AuthSession,
    client: RequestClient,
}

impl Dashboard {
    pub fn new(session: AuthSession, client: RequestClient) -> Self {
        Self { session, client }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Redirect policy for unauthenticated visitors
    pub fn guard(&self, route: &Route) -> RouteDecision {
        if !route.requires_auth() {
            return RouteDecision::Render;
        }

        match self.session.state().phase() {
            AuthPhase::Authenticated => RouteDecision::Render,
            AuthPhase::Unknown | AuthPhase::Checking => RouteDecision::Pending,
            AuthPhase::Unauthenticated => match route {
                Route::Home => RouteDecision::RedirectToProvider,
                _ => RouteDecision::Redirect(Route::Home),
            },
        }
    }

    pub fn greeting(&self) -> String {
        match self.session.state().username() {
            Some(username) => format!("Welcome {}!", username),
            None => "Not authenticated.".to_string(),
        }
    }

    pub async fn deployments(&self) -> Result<Vec<Deployment>, DashboardError> {
        let token = self.authenticated_token()?;
        self.client
            .deployments(&token)
            .await
            .map(|response| response.data)
            .map_err(|error| DashboardError::Api {
                what: "deployments",
                error,
            })
    }

    pub async fn project_env(&self, project_name: &str) -> Result<Vec<EnvVar>, DashboardError> {
        let token = self.authenticated_token()?;
        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(DashboardError::MissingProjectName);
        }

        self.client
            .get_env(&token, project_name)
            .await
            .map(|response| response.data)
            .map_err(|error| DashboardError::Api {
                what: "environment variables",
                error,
            })
    }

    fn authenticated_token(&self) -> Result<String, DashboardError> {
        let state = self.session.state();
        match state.token() {
            Some(token) if state.is_authenticated() => Ok(token.to_string()),
            _ => Err(DashboardError::NotAuthenticated),
        }
    }
}
