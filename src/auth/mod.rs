// Session and OAuth modules

pub mod callback;
pub mod keyring;
pub mod oauth;
pub mod session;
pub mod store;

pub use callback::{CallbackOutcome, CallbackParams, OAuthCallback};
pub use keyring::KeyringSessionStore;
pub use oauth::AuthorizeRequest;
pub use session::{AuthPhase, AuthSession, AuthSessionBuilder, AuthState};
pub use store::{open_store, FileSessionStore, MemorySessionStore, SessionStore};
