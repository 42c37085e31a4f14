use crate::error::{KioskError, Result};
use crate::screensaver::ScreensaverConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotionSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl MotionSensitivity {
    /// Fraction of sampled pixels that must change to count as motion.
    pub fn threshold(self) -> f64 {
        match self {
            MotionSensitivity::Low => 0.15,
            MotionSensitivity::Medium => 0.08,
            MotionSensitivity::High => 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreensaverSettings {
    pub enabled: bool,
    pub inactivity_enabled: bool,
    pub inactivity_delay_ms: u64,
    pub motion_enabled: bool,
    pub motion_sensitivity: MotionSensitivity,
    pub default_brightness: f32,
    pub screensaver_brightness: f32,
}

impl Default for ScreensaverSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            inactivity_enabled: true,
            inactivity_delay_ms: 600_000,
            motion_enabled: false,
            motion_sensitivity: MotionSensitivity::Medium,
            default_brightness: 0.5,
            screensaver_brightness: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct KioskSettings {
    pub url: Option<String>,
    pub auto_reload: bool,
    pub kiosk_enabled: bool,
    pub auto_launch: bool,
    pub screensaver: ScreensaverSettings,
}

impl KioskSettings {
    /// Clamp out-of-range values written by hand or by an older build.
    pub fn normalized(mut self) -> Self {
        let ss = &mut self.screensaver;
        ss.default_brightness = clamp_unit(ss.default_brightness, 0.5);
        ss.screensaver_brightness = clamp_unit(ss.screensaver_brightness, 0.0);
        if ss.inactivity_delay_ms == 0 {
            ss.inactivity_delay_ms = ScreensaverSettings::default().inactivity_delay_ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let ss = &self.screensaver;
        if ss.inactivity_delay_ms == 0 {
            return Err(KioskError::InvalidConfig(
                "inactivity delay must be positive".into(),
            ));
        }
        for (name, level) in [
            ("default_brightness", ss.default_brightness),
            ("screensaver_brightness", ss.screensaver_brightness),
        ] {
            if !(0.0..=1.0).contains(&level) {
                return Err(KioskError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {level}"
                )));
            }
        }
        Ok(())
    }

    pub fn screensaver_config(&self) -> ScreensaverConfig {
        let ss = &self.screensaver;
        ScreensaverConfig {
            inactivity_enabled: ss.inactivity_enabled,
            inactivity_delay_ms: ss.inactivity_delay_ms,
            motion_enabled: ss.motion_enabled,
            dim_brightness: ss.screensaver_brightness,
            normal_brightness: ss.default_brightness,
        }
    }
}

fn clamp_unit(level: f32, fallback: f32) -> f32 {
    if level.is_nan() {
        fallback
    } else {
        level.clamp(0.0, 1.0)
    }
}
