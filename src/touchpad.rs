//! Touchpad Tracker (C3) — converts absolute touchpad coordinates into
//! axis-velocity values.

use std::collections::HashMap;

use crate::signal::{joystick_limit, ControllerSignal};

const WINDOW: usize = 5;

#[derive(Debug, Clone)]
struct AxisWindow {
    prior_active: bool,
    samples: Vec<i16>,
    timestamps: Vec<u32>,
}

impl AxisWindow {
    fn new() -> Self {
        Self {
            prior_active: false,
            samples: Vec::with_capacity(WINDOW),
            timestamps: Vec::with_capacity(WINDOW),
        }
    }

    fn seed(&mut self, value: i16, now: u32) {
        self.samples.clear();
        self.timestamps.clear();
        for _ in 0..WINDOW {
            self.samples.push(value);
            self.timestamps.push(now);
        }
        self.prior_active = true;
    }

    fn push(&mut self, value: i16, now: u32) {
        self.samples.remove(0);
        self.timestamps.remove(0);
        self.samples.push(value);
        self.timestamps.push(now);
    }
}

/// Per-axis conversion tuning, configured per tracked touchpad axis.
#[derive(Debug, Clone, Copy)]
pub struct TouchpadScale {
    pub scale: f64,
    /// Alternate scale used when the touchpad's alternate condition holds.
    pub scale_if: Option<f64>,
    pub skew: f64,
}

impl Default for TouchpadScale {
    fn default() -> Self {
        Self {
            scale: 1.0,
            scale_if: None,
            skew: 0.0,
        }
    }
}

pub struct TouchpadTracker {
    windows: HashMap<ControllerSignal, AxisWindow>,
    scales: HashMap<ControllerSignal, TouchpadScale>,
}

impl TouchpadTracker {
    pub fn new() -> Self {
        let mut windows = HashMap::new();
        for sig in [
            ControllerSignal::TOUCHPAD_X,
            ControllerSignal::TOUCHPAD_Y,
            ControllerSignal::TOUCHPAD_X_2,
            ControllerSignal::TOUCHPAD_Y_2,
        ] {
            windows.insert(sig, AxisWindow::new());
        }
        Self {
            windows,
            scales: HashMap::new(),
        }
    }

    pub fn set_scale(&mut self, signal: ControllerSignal, scale: TouchpadScale) {
        self.scales.insert(signal, scale);
    }

    /// Mark every tracked axis as untouched; called on the
    /// inactive->active `TOUCHPAD_ACTIVE` transition.
    pub fn first_touch(&mut self) {
        for w in self.windows.values_mut() {
            w.prior_active = false;
        }
    }

    /// Convert one absolute touchpad sample into a joystick-scale velocity.
    pub fn to_axis(&mut self, signal: ControllerSignal, value: i16, now: u32) -> i16 {
        let use_alt = self.alternate_condition_active();
        let scale_cfg = self.scales.get(&signal).copied().unwrap_or_default();
        let Some(window) = self.windows.get_mut(&signal) else {
            return 0;
        };

        if !window.prior_active {
            window.seed(value, now);
            return 0;
        }

        let dt = now.saturating_sub(window.timestamps[0]);
        let delta = if dt == 0 {
            0.0
        } else {
            (value as f64 - window.samples[0] as f64) / dt as f64
        };

        window.push(value, now);

        let scale = if use_alt {
            scale_cfg.scale_if.unwrap_or(scale_cfg.scale)
        } else {
            scale_cfg.scale
        };

        let skew = if delta > 0.0 {
            scale_cfg.skew
        } else if delta < 0.0 {
            -scale_cfg.skew
        } else {
            0.0
        };

        joystick_limit((delta * scale + skew) as i32)
    }

    /// Placeholder hook for the touchpad's alternate scaling condition
    /// (e.g. a modifier-held button). Plain polling engines without such a
    /// condition always get the primary `scale`.
    fn alternate_condition_active(&self) -> bool {
        false
    }
}

impl Default for TouchpadTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_returns_zero_regardless_of_value() {
        let mut tracker = TouchpadTracker::new();
        assert_eq!(tracker.to_axis(ControllerSignal::TOUCHPAD_X, 12345, 0), 0);
        assert_eq!(tracker.to_axis(ControllerSignal::TOUCHPAD_X, -500, 1000), 0);
    }

    #[test]
    fn first_touch_reseeds_all_axes() {
        let mut tracker = TouchpadTracker::new();
        tracker.to_axis(ControllerSignal::TOUCHPAD_X, 100, 0);
        tracker.to_axis(ControllerSignal::TOUCHPAD_X, 200, 1000);
        tracker.first_touch();
        // After first_touch, the very next sample must again return 0.
        assert_eq!(tracker.to_axis(ControllerSignal::TOUCHPAD_X, 300, 2000), 0);
    }

    #[test]
    fn velocity_computed_after_seed() {
        let mut tracker = TouchpadTracker::new();
        tracker.set_scale(
            ControllerSignal::TOUCHPAD_X,
            TouchpadScale {
                scale: 1.0,
                scale_if: None,
                skew: 0.0,
            },
        );
        tracker.to_axis(ControllerSignal::TOUCHPAD_X, 0, 0);
        let v = tracker.to_axis(ControllerSignal::TOUCHPAD_X, 1000, 1000);
        assert_eq!(v, 1); // delta = 1000/1000 = 1.0 -> scaled to 1
    }
}
