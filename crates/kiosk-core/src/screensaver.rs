//! Inactivity screensaver.
//!
//! [`Screensaver`] is the pure state machine: every input returns the effects
//! the caller must apply. [`ScreensaverController`] applies them with a single
//! tokio one-shot timer and a [`Brightness`] sink.

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreensaverConfig {
    pub inactivity_enabled: bool,
    pub inactivity_delay_ms: u64,
    pub motion_enabled: bool,
    pub dim_brightness: f32,
    pub normal_brightness: f32,
}

impl Default for ScreensaverConfig {
    fn default() -> Self {
        Self {
            inactivity_enabled: true,
            inactivity_delay_ms: 600_000,
            motion_enabled: false,
            dim_brightness: 0.0,
            normal_brightness: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    StartTimer(Duration),
    CancelTimer,
    SetBrightness(f32),
}

#[derive(Debug, Clone)]
pub struct Screensaver {
    enabled: bool,
    phase: Phase,
    config: ScreensaverConfig,
}

impl Screensaver {
    pub fn new(config: ScreensaverConfig) -> Self {
        Self {
            enabled: false,
            phase: Phase::Idle,
            config: sanitize(config),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &ScreensaverConfig {
        &self.config
    }

    /// The camera-based detector only needs to run while the screen is dimmed.
    pub fn motion_detection_wanted(&self) -> bool {
        self.enabled && self.config.motion_enabled && self.is_active()
    }

    fn restart_timer(&self) -> Effect {
        if self.enabled && self.config.inactivity_enabled {
            Effect::StartTimer(Duration::from_millis(self.config.inactivity_delay_ms))
        } else {
            Effect::CancelTimer
        }
    }

    fn wake(&mut self) -> Option<Effect> {
        if self.is_active() {
            self.phase = Phase::Idle;
            Some(Effect::SetBrightness(self.config.normal_brightness))
        } else {
            None
        }
    }

    /// Disabling leaves brightness where it is.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        self.enabled = enabled;
        if !enabled {
            self.phase = Phase::Idle;
        }
        vec![self.restart_timer()]
    }

    pub fn configure(&mut self, config: ScreensaverConfig) -> Vec<Effect> {
        self.config = sanitize(config);
        let mut effects = vec![self.restart_timer()];
        if !self.config.inactivity_enabled {
            effects.extend(self.wake());
        }
        effects
    }

    pub fn on_timer_expired(&mut self) -> Vec<Effect> {
        if !self.enabled || self.is_active() {
            return vec![];
        }
        self.phase = Phase::Active;
        vec![Effect::SetBrightness(self.config.dim_brightness)]
    }

    pub fn on_user_interaction(&mut self) -> Vec<Effect> {
        let mut effects = vec![self.restart_timer()];
        effects.extend(self.wake());
        effects
    }

    pub fn on_motion_detected(&mut self) -> Vec<Effect> {
        if !self.config.motion_enabled {
            return vec![];
        }
        match self.wake() {
            Some(restore) => vec![restore, self.restart_timer()],
            None => vec![],
        }
    }

    /// Brightness is deliberately left as last set.
    pub fn on_focus_lost(&mut self) -> Vec<Effect> {
        self.phase = Phase::Idle;
        vec![Effect::CancelTimer]
    }

    pub fn on_focus_gained(&mut self) -> Vec<Effect> {
        self.phase = Phase::Idle;
        vec![
            Effect::SetBrightness(self.config.normal_brightness),
            self.restart_timer(),
        ]
    }
}

fn sanitize(mut config: ScreensaverConfig) -> ScreensaverConfig {
    config.dim_brightness = unit(config.dim_brightness);
    config.normal_brightness = unit(config.normal_brightness);
    config.inactivity_delay_ms = config.inactivity_delay_ms.max(1);
    config
}

fn unit(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Screen backlight control supplied by the platform.
pub trait Brightness: Send + Sync {
    fn set_level(&self, level: f32) -> Result<()>;
}

struct Shared {
    machine: Screensaver,
    brightness: Arc<dyn Brightness>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Drives a [`Screensaver`] with a real timer. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct ScreensaverController {
    shared: Arc<Mutex<Shared>>,
}

impl ScreensaverController {
    pub fn new(config: ScreensaverConfig, brightness: Arc<dyn Brightness>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                machine: Screensaver::new(config),
                brightness,
                timer: None,
                generation: 0,
            })),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().machine.phase()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().machine.is_active()
    }

    pub fn motion_detection_wanted(&self) -> bool {
        self.shared.lock().machine.motion_detection_wanted()
    }

    pub fn set_enabled(&self, enabled: bool) {
        info!(enabled, "screensaver toggled");
        self.dispatch(|m| m.set_enabled(enabled));
    }

    pub fn configure(&self, config: ScreensaverConfig) {
        debug!(
            delay_ms = config.inactivity_delay_ms,
            motion = config.motion_enabled,
            "screensaver configured"
        );
        self.dispatch(|m| m.configure(config));
    }

    pub fn on_user_interaction(&self) {
        self.dispatch(Screensaver::on_user_interaction);
    }

    pub fn on_motion_detected(&self) {
        self.dispatch(Screensaver::on_motion_detected);
    }

    pub fn on_focus_lost(&self) {
        self.dispatch(Screensaver::on_focus_lost);
    }

    pub fn on_focus_gained(&self) {
        self.dispatch(Screensaver::on_focus_gained);
    }

    fn dispatch(&self, input: impl FnOnce(&mut Screensaver) -> Vec<Effect>) {
        let mut shared = self.shared.lock();
        let effects = input(&mut shared.machine);
        self.apply(&mut shared, effects);
    }

    fn apply(&self, shared: &mut Shared, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelTimer => cancel_timer(shared),
                Effect::StartTimer(delay) => {
                    cancel_timer(shared);
                    let generation = shared.generation;
                    let this = self.clone();
                    shared.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        this.timer_fired(generation);
                    }));
                }
                Effect::SetBrightness(level) => {
                    if let Err(err) = shared.brightness.set_level(level) {
                        warn!(error = %err, brightness = level, "failed to set brightness");
                    }
                }
            }
        }
    }

    fn timer_fired(&self, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            debug!("stale inactivity timer ignored");
            return;
        }
        shared.timer = None;
        let effects = shared.machine.on_timer_expired();
        if !effects.is_empty() {
            info!("inactivity timeout, screensaver active");
        }
        self.apply(&mut shared, effects);
    }
}

/// Bumping the generation invalidates a timer task that already woke up and is
/// waiting on the lock.
fn cancel_timer(shared: &mut Shared) {
    shared.generation = shared.generation.wrapping_add(1);
    if let Some(handle) = shared.timer.take() {
        handle.abort();
    }
}
