//! Air-tap detection for the virtual keyboard overlay.
//!
//! Each candidate fingertip runs its own idle → downing → fired machine on depth velocity
//! normalised by palm size, so the thresholds hold at any distance from the camera.

use std::time::{Duration, Instant};

use super::{Cooldown, FrameInput, ModeMachine};
use crate::{
    gesture::{finger_extended, palm_size},
    types::{
        ActionIntent, HandSkeleton, MouseButton,
        landmark::{INDEX_PIP, INDEX_TIP, MIDDLE_PIP, MIDDLE_TIP, RING_PIP, RING_TIP, PINKY_PIP, PINKY_TIP, WRIST},
    },
};

/// `(tip, pip)` pairs in firing priority.
pub const FINGERTIPS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

#[derive(Clone, Debug)]
pub struct AirTapConfig {
    /// Inward speed, palm sizes per second, that starts a press.
    pub down_velocity: f32,
    /// Outward speed that completes it.
    pub up_velocity: f32,
    /// Lateral drift from the press anchor, image units, that aborts a press.
    pub still_threshold: f32,
    pub min_gap: Duration,
    pub max_gap: Duration,
    pub global_cooldown: Duration,
    pub finger_cooldown: Duration,
}

impl Default for AirTapConfig {
    fn default() -> Self {
        Self {
            down_velocity: 1.5,
            up_velocity: 1.2,
            still_threshold: 0.03,
            min_gap: Duration::from_millis(60),
            max_gap: Duration::from_millis(450),
            global_cooldown: Duration::from_millis(250),
            finger_cooldown: Duration::from_millis(400),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum TapState {
    #[default]
    Idle,
    Downing {
        since: Instant,
        anchor: (f32, f32),
    },
    Fired,
}

#[derive(Debug, Default)]
struct Finger {
    state: TapState,
    /// Previous normalised depth sample.
    last: Option<(Instant, f32)>,
    cooldown: Cooldown,
}

impl Finger {
    fn reset(&mut self) {
        self.state = TapState::Idle;
        self.last = None;
    }

    /// Advances the machine; returns `true` when the tap completes this frame.
    fn step(&mut self, now: Instant, depth: f32, tip: (f32, f32), extended: bool, cfg: &AirTapConfig) -> bool {
        let velocity = match self.last.replace((now, depth)) {
            Some((then, prev)) => {
                let dt = now.saturating_duration_since(then).as_secs_f32();
                if dt <= f32::EPSILON {
                    return false;
                }
                (depth - prev) / dt
            }
            None => return false,
        };
        // Smaller depth is closer to the camera, so pressing toward it is negative velocity.
        let inward = -velocity;

        match self.state {
            TapState::Idle => {
                if extended && inward >= cfg.down_velocity {
                    self.state = TapState::Downing { since: now, anchor: tip };
                }
                false
            }
            TapState::Downing { since, anchor } => {
                let elapsed = now.saturating_duration_since(since);
                let drift = (tip.0 - anchor.0).hypot(tip.1 - anchor.1);
                if drift > cfg.still_threshold || elapsed > cfg.max_gap {
                    self.state = TapState::Idle;
                    return false;
                }
                if velocity >= cfg.up_velocity && elapsed >= cfg.min_gap {
                    self.state = TapState::Fired;
                    return true;
                }
                false
            }
            TapState::Fired => {
                if velocity.abs() < cfg.up_velocity {
                    self.state = TapState::Idle;
                }
                false
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct AirTapMachine {
    config: AirTapConfig,
    fingers: [Finger; 4],
    cooldown: Cooldown,
}

impl AirTapMachine {
    pub fn new(config: AirTapConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn depth(skeleton: &HandSkeleton, tip: usize, palm: f32) -> f32 {
        (skeleton.point(tip).z - skeleton.point(WRIST).z) / palm
    }
}

impl ModeMachine for AirTapMachine {
    /// Emits a left click at the tapping fingertip's image position.
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        let Some(hand) = input.primary.as_ref().filter(|h| !h.label.is_none()) else {
            return self.reset();
        };
        let skeleton = &hand.skeleton;
        let palm = palm_size(skeleton);
        if palm <= f32::EPSILON {
            return self.reset();
        }

        let mut fired = None;
        for (finger, (tip, pip)) in self.fingers.iter_mut().zip(FINGERTIPS) {
            let p = skeleton.point(tip);
            let extended = finger_extended(skeleton.points(), tip, pip);
            // Every finger keeps sampling so velocities stay continuous.
            if !finger.step(now, Self::depth(skeleton, tip, palm), (p.x, p.y), extended, &self.config) {
                continue;
            }
            if fired.is_some() || !self.cooldown.ready(now) || !finger.cooldown.ready(now) {
                continue;
            }
            finger.cooldown.trigger(now, self.config.finger_cooldown);
            fired = Some((p.x, p.y));
        }

        let at = fired?;
        self.cooldown.trigger(now, self.config.global_cooldown);
        log::debug!("air tap at {at:?}");
        Some(ActionIntent::Click {
            button: MouseButton::Left,
            at: Some(at),
        })
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        for finger in &mut self.fingers {
            finger.reset();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gesture::fixtures,
        modes::{HandObservation, testing::ms},
        types::GestureLabel,
    };

    fn frame(index_z: f32, middle_z: f32, dx: f32) -> FrameInput {
        let mut points = *fixtures::open_palm().points();
        points[INDEX_TIP].z = index_z;
        points[INDEX_TIP].x += dx;
        points[MIDDLE_TIP].z = middle_z;
        FrameInput {
            primary: Some(HandObservation {
                label: GestureLabel::OpenPalm,
                centroid: (0.5, 0.5),
                skeleton: HandSkeleton::new(points),
            }),
            secondary: None,
            hand_count: 1,
        }
    }

    fn tap(machine: &mut AirTapMachine, t0: Instant, start: u64, depths: &[(f32, f32)]) -> Vec<(u64, ActionIntent)> {
        let mut out = Vec::new();
        for (i, (index_z, middle_z)) in depths.iter().enumerate() {
            let t = start + i as u64 * 33;
            if let Some(intent) = machine.update(ms(t0, t), true, &frame(*index_z, *middle_z, 0.0)) {
                out.push((t, intent));
            }
        }
        out
    }

    const PRESS: [f32; 7] = [0.0, -0.02, -0.04, -0.04, -0.02, 0.0, 0.0];

    #[test]
    fn press_and_return_fires_one_click_at_the_tip() {
        let t0 = Instant::now();
        let mut vkey = AirTapMachine::default();
        let depths: Vec<(f32, f32)> = PRESS.iter().map(|z| (*z, 0.0)).collect();
        let events = tap(&mut vkey, t0, 0, &depths);
        assert_eq!(events.len(), 1);
        let tip = fixtures::open_palm().point(INDEX_TIP);
        assert_eq!(
            events[0].1,
            ActionIntent::Click {
                button: MouseButton::Left,
                at: Some((tip.x, tip.y)),
            }
        );
    }

    #[test]
    fn only_first_finger_in_priority_fires() {
        let t0 = Instant::now();
        let mut vkey = AirTapMachine::default();
        let depths: Vec<(f32, f32)> = PRESS.iter().map(|z| (*z, *z)).collect();
        let events = tap(&mut vkey, t0, 0, &depths);
        assert_eq!(events.len(), 1);
        let tip = fixtures::open_palm().point(INDEX_TIP);
        assert!(matches!(events[0].1, ActionIntent::Click { at: Some(at), .. } if at == (tip.x, tip.y)));
    }

    #[test]
    fn lateral_drift_aborts_the_press() {
        let t0 = Instant::now();
        let mut vkey = AirTapMachine::default();
        let mut fired = false;
        for (i, z) in PRESS.iter().enumerate() {
            let dx = if i >= 2 { 0.05 } else { 0.0 };
            fired |= vkey.update(ms(t0, i as u64 * 33), true, &frame(*z, 0.0, dx)).is_some();
        }
        assert!(!fired);
    }

    #[test]
    fn slow_push_never_starts_a_press() {
        let t0 = Instant::now();
        let mut vkey = AirTapMachine::default();
        let depths: Vec<(f32, f32)> = (0..30).map(|i| (-0.001 * i as f32, 0.0)).chain((0..30).map(|_| (0.0, 0.0))).collect();
        assert!(tap(&mut vkey, t0, 0, &depths).is_empty());
    }

    #[test]
    fn repeated_taps_respect_finger_cooldown() {
        let t0 = Instant::now();
        let mut vkey = AirTapMachine::default();
        let depths: Vec<(f32, f32)> = PRESS.iter().map(|z| (*z, 0.0)).collect();
        let mut events = tap(&mut vkey, t0, 0, &depths);
        // Second tap starts right away; completes inside the 400 ms finger cooldown.
        events.extend(tap(&mut vkey, t0, 231, &depths[1..5]));
        assert_eq!(events.len(), 1);
        events.extend(tap(&mut vkey, t0, 1000, &depths));
        assert_eq!(events.len(), 2);
    }
}
