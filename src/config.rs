use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_callback_bind")]
    pub callback_bind: String,
    /// Attach a random `state` to the authorize URL and verify it on callback
    #[serde(default)]
    pub use_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Origin the persisted token is scoped to
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub store: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
    #[serde(default)]
    pub invalidation: InvalidationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Where the session token is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

/// Which failed validations clear the persisted session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Any error result clears the session, including transport failures
    #[default]
    AnyError,
    /// Only a backend rejection (401/403) clears the session
    RejectionOnly,
}

// Defaults
fn default_backend_url() -> String { "http://localhost:8080".to_string() }
fn default_timeout() -> u64 { 15 }
fn default_authorize_url() -> String { "https://github.com/login/oauth/authorize".to_string() }
fn default_callback_bind() -> String { "127.0.0.1:5173".to_string() }
fn default_origin() -> String { "http://localhost:5173".to_string() }
fn default_storage_key() -> String { "jwt".to_string() }
fn default_keyring_service() -> String { "maintdash".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: default_authorize_url(),
            redirect_uri: None,
            callback_bind: default_callback_bind(),
            use_state: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            store: StoreKind::default(),
            storage_dir: None,
            storage_key: default_storage_key(),
            keyring_service: default_keyring_service(),
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SessionConfig {
    /// Directory holding file-backed sessions
    pub fn storage_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }

        match env::var("XDG_DATA_HOME") {
            Ok(data_home) if !data_home.is_empty() => PathBuf::from(data_home).join("maintdash"),
            _ => PathBuf::from(env::var("HOME").unwrap_or_default())
                .join(".local/share/maintdash"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config_path = env::var("MAINTDASH_CONFIG").ok().or_else(|| {
            let home_config = format!(
                "{}/.config/maintdash/config.toml",
                env::var("HOME").unwrap_or_default()
            );
            let locations = ["./maintdash.toml", "./config.toml", home_config.as_str()];

            locations
                .into_iter()
                .find(|path| Path::new(path).exists())
                .map(str::to_string)
        });

        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a config file, substituting `${VAR}` references
    pub fn from_file(path: &str) -> Result<Self> {
        #[cfg(unix)]
        Self::validate_file_permissions(path)?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&content)?)
    }

    /// Substitute ${VAR_NAME} with environment variable values
    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();
        let mut from = 0;

        while let Some(offset) = result[from..].find("${") {
            let start = from + offset;
            let Some(end) = result[start..].find('}') else {
                break;
            };
            let var_name = &result[start + 2..start + end];
            let value = env::var(var_name).unwrap_or_default();
            result.replace_range(start..start + end + 1, &value);
            from = start + value.len();
        }

        result
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("MAINTDASH_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(origin) = env::var("MAINTDASH_ORIGIN") {
            self.session.origin = origin;
        }
        if let Ok(client_id) = env::var("GH_OAUTH_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }
    }

    /// Warn about settings that will get in the way later
    pub fn validate(&self) {
        if self.oauth.client_id.is_empty() {
            tracing::warn!("oauth.client_id is not set - `login` will not be able to redirect");
        }
        if self.session.invalidation == InvalidationPolicy::AnyError {
            tracing::debug!("Sessions are cleared on any validation error, including network failures");
        }
    }

    /// Validate config file permissions (Unix only)
    #[cfg(unix)]
    fn validate_file_permissions(path: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path_obj = Path::new(path);
        if !path_obj.exists() {
            return Ok(());
        }

        let mode = fs::metadata(path_obj)
            .with_context(|| format!("Failed to read metadata for config file: {}", path))?
            .permissions()
            .mode();

        if mode & 0o044 != 0 {
            tracing::warn!(
                "⚠️  Config file {} is readable by other users (mode: {:o}), recommended: chmod 600",
                path,
                mode & 0o777
            );
        }

        if mode & 0o022 != 0 {
            anyhow::bail!(
                "Config file {} is writable by group or others (mode: {:o}). Run: chmod 600 {}",
                path,
                mode & 0o777,
                path
            );
        }

        Ok(())
    }
}
