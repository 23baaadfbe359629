/// Dashboard routes and the navigation seam
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Main view, also the unauthenticated landing view
    Home,
    /// Target of the OAuth provider's redirect
    OAuth,
    /// Environment variables of one project
    Project(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::OAuth => "/oauth".to_string(),
            Route::Project(name) => format!("/projects/{}", urlencoding::encode(name)),
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "" => Some(Route::Home),
            "/oauth" => Some(Route::OAuth),
            other => {
                let name = other.strip_prefix("/projects/")?;
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                let name = urlencoding::decode(name).ok()?;
                Some(Route::Project(name.into_owned()))
            }
        }
    }

    /// Whether the view is useless without an authenticated session
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::OAuth)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Receives navigation requests from the session core
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator for headless front ends: records the request in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route) {
        info!("→ navigate to {}", route);
    }
}
