use chrono::{DateTime, Duration, Utc};

pub const SECRET_TAP_COUNT: u32 = 5;
pub const SECRET_TAP_WINDOW_MS: i64 = 2000;

/// Hidden exit gesture on the kiosk screen: five taps, each no more than two
/// seconds after the previous one.
#[derive(Debug, Clone, Default)]
pub struct SecretTapGesture {
    count: u32,
    last_tap: Option<DateTime<Utc>>,
}

impl SecretTapGesture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true on the tap that completes the gesture.
    pub fn tap(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self
            .last_tap
            .is_some_and(|last| now - last > Duration::milliseconds(SECRET_TAP_WINDOW_MS));
        if expired {
            self.count = 0;
        }
        self.count += 1;
        self.last_tap = Some(now);
        if self.count >= SECRET_TAP_COUNT {
            self.reset();
            return true;
        }
        false
    }

    pub fn taps(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last_tap = None;
    }
}
