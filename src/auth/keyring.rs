/// System keyring storage for session tokens
/// Uses native keyring: Secret Service (Linux), Keychain (macOS), Credential Manager (Windows)
use anyhow::Result;
use keyring::Entry;

use super::store::{origin_of, SessionStore};

pub struct KeyringSessionStore {
    service: String,
    account: String,
}

impl KeyringSessionStore {
    /// One keyring entry per origin and key, e.g. `https://maint.metakgp.org#jwt`
    pub fn new(service: &str, origin: &str, key: &str) -> Result<Self> {
        Ok(Self {
            service: service.to_string(),
            account: format!("{}#{}", origin_of(origin)?, key),
        })
    }

    fn entry(&self) -> Result<Entry> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl SessionStore for KeyringSessionStore {
    fn get(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) if token.is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        self.entry()?.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(e.into()),
        }
    }
}
