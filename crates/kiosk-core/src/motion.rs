use crate::clock::Clock;
use crate::settings::MotionSensitivity;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

const SAMPLE_STRIDE: usize = 50;
const PIXEL_DIFF_THRESHOLD: u32 = 30;
const THROTTLE_MS: i64 = 2000;

/// One camera frame as packed `0x00RRGGBB` pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<u32>) -> Option<Self> {
        (width.checked_mul(height) == Some(pixels.len())).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: usize, height: usize, rgb: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgb; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn is_consistent(&self) -> bool {
        self.width
            .checked_mul(self.height)
            .is_some_and(|len| len == self.pixels.len())
    }

    fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }
}

fn channel_diff(a: u32, b: u32) -> u32 {
    let ch = |p: u32, shift: u32| ((p >> shift) & 0xFF) as i32;
    [16, 8, 0]
        .iter()
        .map(|&s| ch(a, s).abs_diff(ch(b, s)))
        .sum()
}

/// Fraction of sampled pixels that differ between two frames, or `None` when
/// the frames cannot be compared.
pub fn change_ratio(previous: &Frame, current: &Frame) -> Option<f64> {
    if previous.width != current.width
        || previous.height != current.height
        || !previous.is_consistent()
        || !current.is_consistent()
    {
        return None;
    }
    let mut samples = 0u32;
    let mut changed = 0u32;
    for y in (0..previous.height).step_by(SAMPLE_STRIDE) {
        for x in (0..previous.width).step_by(SAMPLE_STRIDE) {
            if channel_diff(previous.pixel(x, y), current.pixel(x, y)) > PIXEL_DIFF_THRESHOLD {
                changed += 1;
            }
            samples += 1;
        }
    }
    Some(if samples == 0 {
        0.0
    } else {
        f64::from(changed) / f64::from(samples)
    })
}

/// Compares successive frames and reports motion at most once per throttle window.
pub struct MotionDetector {
    sensitivity: MotionSensitivity,
    previous: Option<Frame>,
    last_motion: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl MotionDetector {
    pub fn new(sensitivity: MotionSensitivity, clock: Arc<dyn Clock>) -> Self {
        Self {
            sensitivity,
            previous: None,
            last_motion: None,
            clock,
        }
    }

    pub fn observe(&mut self, frame: Frame) -> bool {
        let moved = match self.previous.as_ref().and_then(|prev| change_ratio(prev, &frame)) {
            Some(ratio) => ratio > self.sensitivity.threshold(),
            None => false,
        };
        self.previous = Some(frame);
        if !moved {
            return false;
        }

        let now = self.clock.now();
        let throttled = self
            .last_motion
            .is_some_and(|last| now - last <= Duration::milliseconds(THROTTLE_MS));
        if throttled {
            return false;
        }
        self.last_motion = Some(now);
        debug!(sensitivity = ?self.sensitivity, "motion detected");
        true
    }

    /// Drop the reference frame, e.g. when the camera stops.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn detector(sensitivity: MotionSensitivity) -> (MotionDetector, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
        ));
        (MotionDetector::new(sensitivity, clock.clone()), clock)
    }

    /// 500x500 frame; the left `fraction` of columns is white, the rest black.
    fn partly_lit(fraction: f64) -> Frame {
        let (w, h) = (500, 500);
        let edge = (w as f64 * fraction) as usize;
        let pixels = (0..w * h)
            .map(|i| if i % w < edge { 0xFFFFFF } else { 0x000000 })
            .collect();
        Frame::new(w, h, pixels).unwrap()
    }

    #[test]
    fn first_frame_never_reports_motion() {
        let (mut det, _) = detector(MotionSensitivity::High);
        assert!(!det.observe(Frame::filled(500, 500, 0xFFFFFF)));
    }

    #[test]
    fn small_pixel_noise_is_ignored() {
        let a = Frame::filled(200, 200, 0x101010);
        let b = Frame::filled(200, 200, 0x1A1A1A);
        assert_eq!(change_ratio(&a, &b), Some(0.0));
    }

    #[test]
    fn sensitivity_thresholds_apply() {
        // 10% of sampled columns change: above medium (8%), below low (15%).
        let (mut medium, _) = detector(MotionSensitivity::Medium);
        medium.observe(partly_lit(0.0));
        assert!(medium.observe(partly_lit(0.1)));

        let (mut low, _) = detector(MotionSensitivity::Low);
        low.observe(partly_lit(0.0));
        assert!(!low.observe(partly_lit(0.1)));
    }

    #[test]
    fn detections_are_throttled() {
        let (mut det, clock) = detector(MotionSensitivity::High);
        det.observe(Frame::filled(100, 100, 0x000000));
        assert!(det.observe(Frame::filled(100, 100, 0xFFFFFF)));
        clock.advance(Duration::milliseconds(1000));
        assert!(!det.observe(Frame::filled(100, 100, 0x000000)));
        clock.advance(Duration::milliseconds(1500));
        assert!(det.observe(Frame::filled(100, 100, 0xFFFFFF)));
    }

    #[test]
    fn size_change_and_reset_need_a_new_reference() {
        let (mut det, _) = detector(MotionSensitivity::High);
        det.observe(Frame::filled(100, 100, 0x000000));
        assert!(!det.observe(Frame::filled(120, 100, 0xFFFFFF)));
        det.reset();
        assert!(!det.observe(Frame::filled(120, 100, 0x000000)));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        assert!(Frame::new(10, 10, vec![0; 99]).is_none());
    }

    #[test]
    fn short_pixel_buffer_is_not_compared() {
        let empty = Frame {
            width: 100,
            height: 100,
            pixels: vec![],
        };
        let full = Frame::filled(100, 100, 0xFFFFFF);
        assert_eq!(change_ratio(&empty, &full), None);
        assert_eq!(change_ratio(&full, &empty), None);

        let (mut det, _) = detector(MotionSensitivity::High);
        det.observe(full);
        assert!(!det.observe(empty));
    }
}
