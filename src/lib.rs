pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod metrics;
pub mod navigation;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use app::App;
pub use auth::{AuthPhase, AuthSession, AuthState, CallbackOutcome, OAuthCallback};
pub use client::{Backend, HttpBackend, RequestClient};
pub use config::Config;
pub use types::{ApiResult, ApiSuccess, Endpoint, ErrorInfo, Method, StatusCode};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
