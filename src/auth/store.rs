/// Durable session token storage, scoped to an origin
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

use super::KeyringSessionStore;
use crate::config::{SessionConfig, StoreKind};

/// Single-slot token storage
///
/// Implementations are synchronous: a `set` has completed by the time it
/// returns, so any later `get` observes the new token.
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Result<Option<String>>;
    fn set(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Build the store selected by the session config
pub fn open_store(config: &SessionConfig) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store {
        StoreKind::File => Arc::new(FileSessionStore::new(
            &config.storage_dir(),
            &config.origin,
            &config.storage_key,
        )?),
        StoreKind::Keyring => Arc::new(KeyringSessionStore::new(
            &config.keyring_service,
            &config.origin,
            &config.storage_key,
        )?),
        StoreKind::Memory => Arc::new(MemorySessionStore::new()),
    };

    tracing::debug!("Session store: {:?} for {}", config.store, config.origin);
    Ok(store)
}

/// Canonical ASCII form of an origin (`scheme://host[:port]`)
pub fn origin_of(origin: &str) -> Result<String> {
    let url = Url::parse(origin).with_context(|| format!("Invalid origin: {}", origin))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        anyhow::bail!("Origin {} is opaque and cannot scope a session", url);
    }
    Ok(origin.ascii_serialization())
}

/// Directory-safe name for an origin
fn origin_scope(origin: &str) -> Result<String> {
    let canonical = origin_of(origin)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Ok(digest[..32].to_string())
}

/// One file per origin and key, replaced atomically on write
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: &Path, origin: &str, key: &str) -> Result<Self> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            anyhow::bail!("Invalid storage key: {:?}", key);
        }

        Ok(Self {
            path: dir.join(origin_scope(origin)?).join(key),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(token) if token.is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp = self.temp_path();
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp)
            .with_context(|| format!("Failed to open {}", temp.display()))?;
        file.write_all(token.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already cleared
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// In-process store; forgets everything when dropped
#[derive(Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<String>> {
        let token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(token.clone().filter(|t| !t.is_empty()))
    }

    fn set(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), "https://maint.metakgp.org", "jwt").unwrap();

        assert_eq!(store.get().unwrap(), None);

        store.set("header.payload.signature").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("header.payload.signature"));

        store.set("second").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("second"));
        assert!(!store.temp_path().exists());

        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);

        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_keeps_token_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), "http://localhost:5173", "jwt").unwrap();

        store.set(" tok\n").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some(" tok\n"));

        store.set("").unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn test_file_store_is_origin_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let prod = FileSessionStore::new(dir.path(), "https://maint.metakgp.org", "jwt").unwrap();
        let local = FileSessionStore::new(dir.path(), "http://localhost:5173", "jwt").unwrap();

        prod.set("prod-token").unwrap();
        assert_eq!(local.get().unwrap(), None);

        // Paths on the same origin share storage
        let same = FileSessionStore::new(dir.path(), "https://maint.metakgp.org/oauth", "jwt").unwrap();
        assert_eq!(same.get().unwrap().as_deref(), Some("prod-token"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), "http://localhost:5173", "jwt").unwrap();
        store.set("secret").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_invalid_key_and_origin() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSessionStore::new(dir.path(), "http://localhost", "../jwt").is_err());
        assert!(FileSessionStore::new(dir.path(), "http://localhost", "").is_err());
        assert!(FileSessionStore::new(dir.path(), "data:text/plain,hi", "jwt").is_err());
        assert!(FileSessionStore::new(dir.path(), "not an origin", "jwt").is_err());
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://maint.metakgp.org/projects/x?y=1").unwrap(),
            "https://maint.metakgp.org"
        );
        assert_eq!(origin_of("http://localhost:5173/").unwrap(), "http://localhost:5173");
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::with_token("abc");
        assert_eq!(store.get().unwrap().as_deref(), Some("abc"));

        store.set("").unwrap();
        assert_eq!(store.get().unwrap(), None);

        store.set("xyz").unwrap();
        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }
}
