use std::time::{Duration, Instant};

use crate::types::ActionIntent;

pub const CONTROL_BOX: (f32, f32, f32, f32) = (0.22, 0.28, 0.78, 0.95);
pub const CONTROL_GAIN: f32 = 1.10;
pub const GAIN_RANGE: (f32, f32) = (0.2, 4.0);
pub const EMA_ALPHA: f32 = 0.22;
pub const MOVE_HZ: f32 = 60.0;

#[derive(Clone, Debug)]
pub struct PointerConfig {
    /// `(x0, y0, x1, y1)` region of the camera frame mapped onto the whole screen.
    pub control_box: (f32, f32, f32, f32),
    pub gain: f32,
    pub ema_alpha: f32,
    pub move_hz: f32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            control_box: CONTROL_BOX,
            gain: CONTROL_GAIN,
            ema_alpha: EMA_ALPHA,
            move_hz: MOVE_HZ,
        }
    }
}

/// Maps the cursor hand's position to a smoothed, throttled normalized pointer target.
#[derive(Debug, Default)]
pub struct PointerMapper {
    config: PointerConfig,
    ema: Option<(f32, f32)>,
    last_emit: Option<Instant>,
}

impl PointerMapper {
    pub fn new(config: PointerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PointerConfig {
        &self.config
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.config.gain = gain.clamp(GAIN_RANGE.0, GAIN_RANGE.1);
    }

    /// Control box → unit square, then gain about the centre, clamped to the screen.
    pub fn map(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let (x0, y0, x1, y1) = self.config.control_box;
        let u = (x - x0) / (x1 - x0).max(1e-6);
        let v = (y - y0) / (y1 - y0).max(1e-6);
        let g = self.config.gain;
        (
            (0.5 + (u - 0.5) * g).clamp(0.0, 1.0),
            (0.5 + (v - 0.5) * g).clamp(0.0, 1.0),
        )
    }

    /// `None` position means the cursor hand is not steering; smoothing restarts next time.
    pub fn update(&mut self, now: Instant, position: Option<(f32, f32)>) -> Option<ActionIntent> {
        let Some(position) = position else {
            self.ema = None;
            return None;
        };
        let (tx, ty) = self.map(position);
        let a = self.config.ema_alpha;
        let (x, y) = match self.ema {
            Some((ex, ey)) => (ex + a * (tx - ex), ey + a * (ty - ey)),
            None => (tx, ty),
        };
        self.ema = Some((x, y));

        let interval = Duration::from_secs_f32(1.0 / self.config.move_hz.max(1.0));
        if self
            .last_emit
            .is_some_and(|last| now.saturating_duration_since(last) < interval)
        {
            return None;
        }
        self.last_emit = Some(now);
        Some(ActionIntent::PointerMove { x, y })
    }

    pub fn reset(&mut self) {
        self.ema = None;
        self.last_emit = None;
    }
}
