//! Screensaver controller tests against tokio's paused clock.

use kiosk_core::screensaver::{Brightness, Phase, ScreensaverConfig, ScreensaverController};
use kiosk_core::{KioskError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Default)]
struct RecordingBrightness {
    levels: Mutex<Vec<f32>>,
}

impl RecordingBrightness {
    fn last(&self) -> Option<f32> {
        self.levels.lock().last().copied()
    }
}

impl Brightness for RecordingBrightness {
    fn set_level(&self, level: f32) -> Result<()> {
        self.levels.lock().push(level);
        Ok(())
    }
}

struct DeadBacklight;

impl Brightness for DeadBacklight {
    fn set_level(&self, _level: f32) -> Result<()> {
        Err(KioskError::Io(std::io::Error::other("no backlight")))
    }
}

fn config() -> ScreensaverConfig {
    ScreensaverConfig {
        inactivity_enabled: true,
        inactivity_delay_ms: 5000,
        motion_enabled: true,
        dim_brightness: 0.05,
        normal_brightness: 0.7,
    }
}

fn controller() -> (ScreensaverController, Arc<RecordingBrightness>) {
    let display = Arc::new(RecordingBrightness::default());
    let controller = ScreensaverController::new(ScreensaverConfig::default(), display.clone());
    controller.configure(config());
    (controller, display)
}

#[tokio::test(start_paused = true)]
async fn activates_after_inactivity_delay() {
    let (ctl, display) = controller();
    ctl.set_enabled(true);

    sleep(Duration::from_millis(4999)).await;
    assert_eq!(ctl.phase(), Phase::Idle);

    sleep(Duration::from_millis(2)).await;
    assert_eq!(ctl.phase(), Phase::Active);
    assert_eq!(display.last(), Some(0.05));
    assert!(ctl.motion_detection_wanted());
}

#[tokio::test(start_paused = true)]
async fn interaction_wakes_and_restarts_timer_from_zero() {
    let (ctl, display) = controller();
    ctl.set_enabled(true);
    sleep(Duration::from_millis(7000)).await;
    assert!(ctl.is_active());

    ctl.on_user_interaction();
    assert_eq!(ctl.phase(), Phase::Idle);
    assert_eq!(display.last(), Some(0.7));

    sleep(Duration::from_millis(4999)).await;
    assert!(!ctl.is_active());
    sleep(Duration::from_millis(2)).await;
    assert!(ctl.is_active());
}

#[tokio::test(start_paused = true)]
async fn restart_discards_pending_timer() {
    let (ctl, _) = controller();
    ctl.set_enabled(true);
    sleep(Duration::from_millis(3000)).await;
    ctl.on_user_interaction();

    sleep(Duration::from_millis(3000)).await;
    assert!(!ctl.is_active(), "first timer must not fire after a restart");
    sleep(Duration::from_millis(2001)).await;
    assert!(ctl.is_active());
}

#[tokio::test(start_paused = true)]
async fn motion_wakes_only_an_active_screen() {
    let (ctl, display) = controller();
    ctl.set_enabled(true);
    ctl.on_motion_detected();
    assert!(display.levels.lock().is_empty());

    sleep(Duration::from_millis(5001)).await;
    ctl.on_motion_detected();
    assert_eq!(ctl.phase(), Phase::Idle);
    assert_eq!(display.last(), Some(0.7));
    sleep(Duration::from_millis(5001)).await;
    assert!(ctl.is_active());
}

#[tokio::test(start_paused = true)]
async fn focus_loss_and_disable_cancel_timer() {
    let (ctl, display) = controller();
    ctl.set_enabled(true);
    sleep(Duration::from_millis(6000)).await;
    assert!(ctl.is_active());

    ctl.on_focus_lost();
    assert!(!ctl.is_active());
    assert_eq!(display.last(), Some(0.05));
    sleep(Duration::from_secs(60)).await;
    assert!(!ctl.is_active());

    ctl.on_focus_gained();
    assert_eq!(display.last(), Some(0.7));
    ctl.set_enabled(false);
    sleep(Duration::from_secs(60)).await;
    assert!(!ctl.is_active());
}

#[tokio::test(start_paused = true)]
async fn brightness_errors_do_not_stop_the_machine() {
    let ctl = ScreensaverController::new(config(), Arc::new(DeadBacklight));
    ctl.set_enabled(true);
    sleep(Duration::from_millis(5001)).await;
    assert!(ctl.is_active());
    ctl.on_user_interaction();
    assert!(!ctl.is_active());
}
