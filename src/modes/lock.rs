use std::time::{Duration, Instant};

use super::{Cooldown, FrameInput};
use crate::types::GestureLabel;

pub const LOCK_HOLD: Duration = Duration::from_secs(2);
pub const LOCK_COOLDOWN: Duration = Duration::from_secs(1);
pub const LOCK_STILLNESS: f32 = 0.03;
/// `(x0, y0, x1, y1)` region the hand must stay inside while holding.
pub const LOCK_CENTER_BOX: (f32, f32, f32, f32) = (0.25, 0.25, 0.75, 0.75);

/// Toggles the global lock when one still hand holds the lock gesture near the frame centre.
#[derive(Debug)]
pub struct LockToggle {
    gesture: GestureLabel,
    /// Hold start and the centroid the hand must stay close to.
    anchor: Option<(Instant, (f32, f32))>,
    fired: bool,
    cooldown: Cooldown,
}

impl Default for LockToggle {
    fn default() -> Self {
        Self {
            gesture: GestureLabel::Fist,
            anchor: None,
            fired: false,
            cooldown: Cooldown::default(),
        }
    }
}

impl LockToggle {
    pub fn set_gesture(&mut self, gesture: GestureLabel) {
        self.gesture = gesture;
    }

    /// Length of the current hold, for status reporting.
    pub fn progress(&self, now: Instant) -> Option<Duration> {
        self.anchor.map(|(start, _)| now.saturating_duration_since(start))
    }

    /// Returns `true` on the frame the lock should flip.
    pub fn update(&mut self, now: Instant, input: &FrameInput) -> bool {
        let hand = input
            .primary
            .as_ref()
            .filter(|h| input.hand_count == 1 && h.label == self.gesture)
            .filter(|h| in_box(h.centroid, LOCK_CENTER_BOX));
        let Some(hand) = hand else {
            self.anchor = None;
            self.fired = false;
            return false;
        };

        let start = match self.anchor {
            Some((start, (ax, ay))) if (hand.centroid.0 - ax).hypot(hand.centroid.1 - ay) < LOCK_STILLNESS => {
                start
            }
            _ => {
                // Moving restarts the hold from the new position.
                self.anchor = Some((now, hand.centroid));
                now
            }
        };

        if self.fired || !self.cooldown.ready(now) || now.saturating_duration_since(start) < LOCK_HOLD {
            return false;
        }
        self.fired = true;
        self.cooldown.trigger(now, LOCK_COOLDOWN);
        true
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.fired = false;
    }
}

fn in_box((x, y): (f32, f32), (x0, y0, x1, y1): (f32, f32, f32, f32)) -> bool {
    (x0..=x1).contains(&x) && (y0..=y1).contains(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::testing::*;

    fn fist_at(x: f32, y: f32) -> FrameInput {
        FrameInput {
            primary: Some(hand(GestureLabel::Fist, x, y)),
            secondary: None,
            hand_count: 1,
        }
    }

    #[test]
    fn two_second_still_fist_toggles_once() {
        let t0 = Instant::now();
        let mut lock = LockToggle::default();
        let input = fist_at(0.5, 0.5);
        assert!(!lock.update(t0, &input));
        assert!(!lock.update(ms(t0, 1999), &input));
        assert!(lock.update(ms(t0, 2000), &input));
        // Keeping the fist up does not toggle again.
        for t in (2033..6000).step_by(33) {
            assert!(!lock.update(ms(t0, t), &input));
        }
    }

    #[test]
    fn movement_before_the_hold_completes_never_toggles() {
        let t0 = Instant::now();
        let mut lock = LockToggle::default();
        let still = fist_at(0.5, 0.5);
        let moved = fist_at(0.56, 0.5);
        let mut t = 0;
        while t < 1900 {
            assert!(!lock.update(ms(t0, t), &still));
            t += 33;
        }
        assert!(!lock.update(ms(t0, 1900), &moved));
        assert!(!lock.update(ms(t0, 2100), &moved));
        assert!(lock.progress(ms(t0, 2100)).is_some_and(|d| d < LOCK_HOLD));
    }

    #[test]
    fn needs_a_single_centred_hand() {
        let t0 = Instant::now();
        let mut lock = LockToggle::default();
        let edge = fist_at(0.1, 0.5);
        let pair = two(GestureLabel::Fist, GestureLabel::Fist);
        for t in (0..3000).step_by(33) {
            assert!(!lock.update(ms(t0, t), &edge));
        }
        for t in (3000..6000).step_by(33) {
            assert!(!lock.update(ms(t0, t), &pair));
        }
    }

    #[test]
    fn release_rearms_after_cooldown() {
        let t0 = Instant::now();
        let mut lock = LockToggle::default();
        let fist = fist_at(0.5, 0.5);
        lock.update(t0, &fist);
        assert!(lock.update(ms(t0, 2000), &fist));
        lock.update(ms(t0, 2100), &one(GestureLabel::OpenPalm));
        lock.update(ms(t0, 2200), &fist);
        assert!(lock.update(ms(t0, 4200), &fist));
    }
}
