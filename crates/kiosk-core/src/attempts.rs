use crate::clock::Clock;
use crate::error::KioskError;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const MAX_ATTEMPTS: u32 = 5;
pub const LOCKOUT_DURATION: Duration = Duration::from_millis(15 * 60 * 1000);

const ATTEMPTS_KEY: &str = "@kiosk_pin_attempts";
// Written by early builds; still cleared on reset.
const LOCKOUT_KEY: &str = "@kiosk_pin_lockout";

/// Failed-attempt bookkeeping. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptState {
    pub count: u32,
    pub last_attempt: i64,
    pub lockout_until: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lockout {
    Clear,
    Locked { remaining: Duration },
    /// A lockout was recorded but its deadline has passed.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutCheck {
    pub is_locked_out: bool,
    pub time_remaining: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutStatus {
    pub is_locked_out: bool,
    pub time_remaining: Option<Duration>,
    pub attempts_remaining: u32,
}

impl AttemptState {
    pub fn lockout_at(&self, now: DateTime<Utc>) -> Lockout {
        match self.lockout_until {
            None => Lockout::Clear,
            Some(until) => {
                let remaining = until.saturating_sub(now.timestamp_millis());
                if remaining > 0 {
                    Lockout::Locked {
                        remaining: Duration::from_millis(remaining as u64),
                    }
                } else {
                    Lockout::Expired
                }
            }
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        MAX_ATTEMPTS.saturating_sub(self.count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= MAX_ATTEMPTS
    }
}

/// Persists failed PIN attempts in ordinary storage and enforces the lockout window.
///
/// Storage failures never surface from here: a failed read is treated as an
/// empty record and a failed write is logged. A lost write can under-count one
/// attempt.
pub struct AttemptTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl AttemptTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn load(&self) -> AttemptState {
        match self.store.get(ATTEMPTS_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "unreadable attempt record, treating as empty");
                AttemptState::default()
            }),
            Ok(None) => AttemptState::default(),
            Err(err) => {
                error!(error = %err, "failed to read attempt record");
                AttemptState::default()
            }
        }
    }

    fn persist(&self, state: &AttemptState) {
        let written = serde_json::to_string(state)
            .map_err(KioskError::from)
            .and_then(|raw| self.store.set(ATTEMPTS_KEY, &raw));
        if let Err(err) = written {
            error!(error = %err, "failed to persist attempt record");
        }
    }

    pub fn record_failure(&self) -> AttemptState {
        let now = self.clock.now().timestamp_millis();
        let mut state = self.load();
        state.count = state.count.saturating_add(1);
        state.last_attempt = now;
        if state.is_exhausted() {
            state.lockout_until = Some(now.saturating_add(LOCKOUT_DURATION.as_millis() as i64));
            warn!(
                attempts = state.count,
                lockout_secs = LOCKOUT_DURATION.as_secs(),
                "max PIN attempts reached, locking out"
            );
        } else {
            debug!(attempts = state.count, max = MAX_ATTEMPTS, "failed PIN attempt recorded");
        }
        self.persist(&state);
        state
    }

    /// Clears an expired lockout. The query side stays in [`AttemptState::lockout_at`].
    pub fn reconcile(&self) -> Lockout {
        let lockout = self.load().lockout_at(self.clock.now());
        if lockout == Lockout::Expired {
            debug!("lockout expired, clearing attempt record");
            self.reset();
        }
        lockout
    }

    pub fn check_lockout(&self) -> LockoutCheck {
        match self.reconcile() {
            Lockout::Locked { remaining } => LockoutCheck {
                is_locked_out: true,
                time_remaining: Some(remaining),
            },
            Lockout::Clear | Lockout::Expired => LockoutCheck {
                is_locked_out: false,
                time_remaining: None,
            },
        }
    }

    pub fn reset(&self) {
        if let Err(err) = self.store.remove_many(&[ATTEMPTS_KEY, LOCKOUT_KEY]) {
            error!(error = %err, "failed to reset attempt record");
        }
    }

    pub fn status(&self) -> LockoutStatus {
        let check = self.check_lockout();
        LockoutStatus {
            is_locked_out: check.is_locked_out,
            time_remaining: check.time_remaining,
            attempts_remaining: self.load().attempts_remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn tracker() -> (AttemptTracker, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let tracker = AttemptTracker::new(store.clone(), clock.clone());
        (tracker, clock, store)
    }

    #[test]
    fn fifth_failure_sets_lockout() {
        let (tracker, clock, _) = tracker();
        for expected in 1..MAX_ATTEMPTS {
            let state = tracker.record_failure();
            assert_eq!(state.count, expected);
            assert_eq!(state.lockout_until, None);
        }
        let state = tracker.record_failure();
        assert_eq!(
            state.lockout_until,
            Some(clock.now().timestamp_millis() + 900_000)
        );
        let status = tracker.status();
        assert!(status.is_locked_out);
        assert_eq!(status.time_remaining, Some(LOCKOUT_DURATION));
        assert_eq!(status.attempts_remaining, 0);
    }

    #[test]
    fn lockout_query_is_pure() {
        let (tracker, clock, _) = tracker();
        for _ in 0..MAX_ATTEMPTS {
            tracker.record_failure();
        }
        clock.advance(chrono::Duration::minutes(16));
        let state = tracker.load();
        assert_eq!(state.lockout_at(clock.now()), Lockout::Expired);
        assert_eq!(tracker.load(), state);
    }

    #[test]
    fn expired_lockout_is_reconciled_on_check() {
        let (tracker, clock, _) = tracker();
        for _ in 0..MAX_ATTEMPTS {
            tracker.record_failure();
        }
        clock.advance(chrono::Duration::minutes(14));
        assert!(tracker.check_lockout().is_locked_out);
        clock.advance(chrono::Duration::minutes(1));
        let check = tracker.check_lockout();
        assert!(!check.is_locked_out);
        assert_eq!(check.time_remaining, None);
        assert_eq!(tracker.load(), AttemptState::default());
        assert_eq!(tracker.status().attempts_remaining, MAX_ATTEMPTS);
    }

    #[test]
    fn record_uses_wire_format_and_reset_clears_legacy_key() {
        let (tracker, clock, store) = tracker();
        store.set(LOCKOUT_KEY, "1").unwrap();
        tracker.record_failure();
        let raw = store.get(ATTEMPTS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["lastAttempt"], clock.now().timestamp_millis());
        assert!(value["lockoutUntil"].is_null());

        tracker.reset();
        assert_eq!(store.get(ATTEMPTS_KEY).unwrap(), None);
        assert_eq!(store.get(LOCKOUT_KEY).unwrap(), None);
    }

    #[test]
    fn oversized_stored_count_saturates_and_locks() {
        let (tracker, clock, store) = tracker();
        store
            .set(
                ATTEMPTS_KEY,
                r#"{"count":4294967295,"lastAttempt":0,"lockoutUntil":null}"#,
            )
            .unwrap();
        let state = tracker.record_failure();
        assert_eq!(state.count, u32::MAX);
        assert_eq!(
            state.lockout_until,
            Some(clock.now().timestamp_millis() + 900_000)
        );
        assert_eq!(state.attempts_remaining(), 0);
    }

    #[test]
    fn extreme_deadline_does_not_overflow() {
        let (tracker, _, store) = tracker();
        store
            .set(
                ATTEMPTS_KEY,
                &format!(r#"{{"count":1,"lastAttempt":0,"lockoutUntil":{}}}"#, i64::MIN),
            )
            .unwrap();
        assert!(!tracker.check_lockout().is_locked_out);
        assert_eq!(tracker.load(), AttemptState::default());
    }

    #[test]
    fn garbage_record_reads_as_empty() {
        let (tracker, clock, store) = tracker();
        store.set(ATTEMPTS_KEY, "][").unwrap();
        assert_eq!(tracker.load(), AttemptState::default());
        clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(tracker.record_failure().count, 1);
    }
}
