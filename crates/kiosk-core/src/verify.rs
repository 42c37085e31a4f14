//! PIN verification: the single authentication entry point for the settings screen.
//!
//! Each call either short-circuits on an active lockout (no state change) or
//! ends in exactly one of "reset attempts" or "record failure".

use crate::attempts::{AttemptTracker, LockoutStatus, LOCKOUT_DURATION};
use crate::clock::Clock;
use crate::credential::{validate_pin, CredentialStore, PinCredential, DEFAULT_PIN};
use crate::crypto::{derive, derive_fallback, digests_match, is_fallback_digest};
use crate::error::Result;
use crate::secure_storage::SecretStore;
use crate::storage::KeyValueStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// `migrated` is set when the stored PIN was upgraded to a PBKDF2 credential
    /// during this call.
    Success { migrated: bool },
    FailureWithAttempts { remaining: u32 },
    FailureLockedOut { time_remaining: Duration },
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success { .. })
    }

    pub fn message(&self) -> String {
        match self {
            VerificationResult::Success { migrated: true } => {
                "PIN accepted and upgraded to secure storage".to_string()
            }
            VerificationResult::Success { migrated: false } => "PIN accepted".to_string(),
            VerificationResult::FailureWithAttempts { remaining } => {
                format!("Incorrect PIN ({remaining} attempts remaining)")
            }
            VerificationResult::FailureLockedOut { time_remaining } => format!(
                "Too many failed attempts. Try again in {} minutes.",
                minutes_ceil(*time_remaining)
            ),
        }
    }
}

fn minutes_ceil(d: Duration) -> u64 {
    d.as_millis().div_ceil(60_000) as u64
}

/// Render a lockout countdown as `m:ss`.
pub fn format_remaining(d: Duration) -> String {
    let secs = d.as_millis().div_ceil(1000) as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub struct PinVerifier {
    credentials: CredentialStore,
    attempts: Arc<AttemptTracker>,
    gate: Mutex<()>,
}

impl PinVerifier {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let attempts = Arc::new(AttemptTracker::new(kv.clone(), clock));
        let credentials = CredentialStore::new(secrets, kv, attempts.clone());
        Self {
            credentials,
            attempts,
            gate: Mutex::new(()),
        }
    }

    pub fn verify(&self, input: &str) -> Result<VerificationResult> {
        let _guard = self.gate.lock();

        let lockout = self.attempts.check_lockout();
        if lockout.is_locked_out {
            let time_remaining = lockout.time_remaining.unwrap_or(LOCKOUT_DURATION);
            warn!(
                remaining_secs = time_remaining.as_secs(),
                "PIN entry rejected while locked out"
            );
            return Ok(VerificationResult::FailureLockedOut { time_remaining });
        }

        match self.credentials.load()? {
            Some(credential) => self.verify_stored(input, &credential),
            None => Ok(self.verify_without_credential(input)),
        }
    }

    fn verify_stored(&self, input: &str, credential: &PinCredential) -> Result<VerificationResult> {
        let salt = credential.salt_bytes()?;
        if is_fallback_digest(&credential.hash) {
            if !digests_match(&derive_fallback(input, &salt), &credential.hash) {
                return Ok(self.failure());
            }
            warn!("PIN matched a weak fallback digest, rehashing with PBKDF2");
            return Ok(self.upgrade(input, false));
        }
        if digests_match(&derive(input, &salt), &credential.hash) {
            Ok(self.success())
        } else {
            Ok(self.failure())
        }
    }

    fn verify_without_credential(&self, input: &str) -> VerificationResult {
        if let Some(legacy) = self.credentials.legacy_pin() {
            info!("legacy plaintext PIN present, verifying for migration");
            if digests_match(input, &legacy) {
                return self.upgrade(input, true);
            }
            return self.failure();
        }
        if input == DEFAULT_PIN {
            self.success()
        } else {
            self.failure()
        }
    }

    /// Store `input` as a PBKDF2 credential after a successful match against an
    /// older format. A failed write still lets the user in; the old record is
    /// kept so the upgrade is retried next time.
    fn upgrade(&self, input: &str, drop_legacy: bool) -> VerificationResult {
        match self.credentials.save(input) {
            Ok(()) => {
                if drop_legacy {
                    self.credentials.clear_legacy_pin();
                }
                info!("PIN migrated to PBKDF2 credential");
                VerificationResult::Success { migrated: true }
            }
            Err(err) => {
                error!(error = %err, "PIN migration failed");
                self.success()
            }
        }
    }

    fn success(&self) -> VerificationResult {
        self.attempts.reset();
        info!("PIN verified");
        VerificationResult::Success { migrated: false }
    }

    fn failure(&self) -> VerificationResult {
        let state = self.attempts.record_failure();
        if state.is_exhausted() {
            VerificationResult::FailureLockedOut {
                time_remaining: LOCKOUT_DURATION,
            }
        } else {
            VerificationResult::FailureWithAttempts {
                remaining: state.attempts_remaining(),
            }
        }
    }

    pub fn lockout_status(&self) -> LockoutStatus {
        let _guard = self.gate.lock();
        self.attempts.status()
    }

    pub fn save_pin(&self, pin: &str) -> Result<()> {
        validate_pin(pin)?;
        let _guard = self.gate.lock();
        self.credentials.save(pin)?;
        self.credentials.clear_legacy_pin();
        Ok(())
    }

    pub fn has_pin(&self) -> bool {
        self.credentials.has()
    }

    pub fn clear_pin(&self) -> Result<()> {
        let _guard = self.gate.lock();
        self.credentials.clear()
    }

    /// Hash a leftover plaintext PIN before anyone types it. Returns whether a
    /// migration happened.
    pub fn migrate_legacy_pin(&self) -> Result<bool> {
        let _guard = self.gate.lock();
        if self.credentials.has() {
            return Ok(false);
        }
        let Some(legacy) = self.credentials.legacy_pin() else {
            return Ok(false);
        };
        self.credentials.save(&legacy)?;
        self.credentials.clear_legacy_pin();
        info!("legacy plaintext PIN migrated to PBKDF2 credential");
        Ok(true)
    }
}
