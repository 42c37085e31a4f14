use crate::attempts::AttemptTracker;
use crate::crypto::{derive, generate_salt};
use crate::error::{KioskError, Result};
use crate::secure_storage::SecretStore;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const PIN_SERVICE: &str = "freekiosk_pin";
pub const LEGACY_PIN_KEY: &str = "@kiosk_pin";
pub const DEFAULT_PIN: &str = "1234";
pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 6;

/// Salted PIN digest as stored in the secret store. Both fields are hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinCredential {
    pub hash: String,
    pub salt: String,
}

impl PinCredential {
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.salt).map_err(|e| KioskError::MalformedCredential(format!("salt: {e}")))
    }
}

pub fn validate_pin(pin: &str) -> Result<()> {
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KioskError::InvalidPin("PIN must contain digits only".into()));
    }
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len()) {
        return Err(KioskError::InvalidPin(format!(
            "PIN must be {MIN_PIN_LEN} to {MAX_PIN_LEN} digits"
        )));
    }
    Ok(())
}

/// Owns the hashed PIN record in the secret store and the legacy plaintext
/// value in general storage.
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    kv: Arc<dyn KeyValueStore>,
    attempts: Arc<AttemptTracker>,
}

impl CredentialStore {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        kv: Arc<dyn KeyValueStore>,
        attempts: Arc<AttemptTracker>,
    ) -> Self {
        Self {
            secrets,
            kv,
            attempts,
        }
    }

    /// Hash `pin` under a fresh salt, overwrite any previous credential and
    /// reset the attempt counter.
    pub fn save(&self, pin: &str) -> Result<()> {
        let salt = generate_salt()?;
        let credential = PinCredential {
            hash: derive(pin, &salt),
            salt: hex::encode(salt),
        };
        let blob = serde_json::to_string(&credential)?;
        self.secrets.set_secret(PIN_SERVICE, &blob)?;
        self.attempts.reset();
        info!("PIN credential saved");
        Ok(())
    }

    pub fn has(&self) -> bool {
        match self.secrets.get_secret(PIN_SERVICE) {
            Ok(blob) => blob.is_some(),
            Err(err) => {
                error!(error = %err, "failed to query PIN credential");
                false
            }
        }
    }

    /// A failing secret store reads as "no credential"; a blob that exists but
    /// does not parse is an error.
    pub fn load(&self) -> Result<Option<PinCredential>> {
        let blob = match self.secrets.get_secret(PIN_SERVICE) {
            Ok(blob) => blob,
            Err(err) => {
                error!(error = %err, "failed to read PIN credential, falling back to default PIN");
                return Ok(None);
            }
        };
        match blob {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| KioskError::MalformedCredential(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.secrets.delete_secret(PIN_SERVICE)?;
        self.attempts.reset();
        self.clear_legacy_pin();
        info!("PIN credential cleared");
        Ok(())
    }

    /// Plaintext PIN left by builds that predate hashing. Empty and default
    /// values count as absent.
    pub fn legacy_pin(&self) -> Option<String> {
        match self.kv.get(LEGACY_PIN_KEY) {
            Ok(Some(pin)) if !pin.is_empty() && pin != DEFAULT_PIN => Some(pin),
            Ok(_) => None,
            Err(err) => {
                error!(error = %err, "failed to read legacy PIN");
                None
            }
        }
    }

    pub fn clear_legacy_pin(&self) {
        if let Err(err) = self.kv.remove(LEGACY_PIN_KEY) {
            warn!(error = %err, "failed to remove legacy PIN");
        }
    }
}
