use crate::error::{KioskError, Result};
use keyring::Entry;
use parking_lot::RwLock;
use std::collections::HashMap;

const KEYRING_ACCOUNT: &str = "pin";

/// OS-protected secret storage keyed by service name.
pub trait SecretStore: Send + Sync {
    fn set_secret(&self, service: &str, blob: &str) -> Result<()>;
    fn get_secret(&self, service: &str) -> Result<Option<String>>;
    fn delete_secret(&self, service: &str) -> Result<()>;
}

/// Secrets held by the platform keyring (Secret Service, Keychain, Credential Manager).
#[derive(Debug, Default, Clone)]
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str) -> Result<Entry> {
        Entry::new(service, KEYRING_ACCOUNT).map_err(|e| KioskError::Keyring(format!("init: {e}")))
    }
}

impl SecretStore for KeyringSecretStore {
    fn set_secret(&self, service: &str, blob: &str) -> Result<()> {
        Self::entry(service)?
            .set_password(blob)
            .map_err(|e| KioskError::Keyring(format!("store secret: {e}")))
    }

    fn get_secret(&self, service: &str) -> Result<Option<String>> {
        match Self::entry(service)?.get_password() {
            Ok(blob) => Ok(Some(blob)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KioskError::Keyring(format!("load secret: {e}"))),
        }
    }

    fn delete_secret(&self, service: &str) -> Result<()> {
        match Self::entry(service)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KioskError::Keyring(format!("delete secret: {e}"))),
        }
    }
}

/// Process-local secrets; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn set_secret(&self, service: &str, blob: &str) -> Result<()> {
        self.secrets
            .write()
            .insert(service.to_string(), blob.to_string());
        Ok(())
    }

    fn get_secret(&self, service: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().get(service).cloned())
    }

    fn delete_secret(&self, service: &str) -> Result<()> {
        self.secrets.write().remove(service);
        Ok(())
    }
}
