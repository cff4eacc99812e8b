//! Stabilizes which of up to two detected hands fills the primary and secondary slots.
//!
//! Slots follow horizontal ordering (primary = left-most) but only swap after the
//! reassignment cost has favoured a swap for several consecutive frames, except when the
//! hands are nearly vertically aligned and ordering by x is meaningless.

use std::time::{Duration, Instant};

use crate::{
    gesture::palm_center,
    types::{GestureLabel, HandSkeleton},
};

pub const SWAP_DEADBAND: f32 = 0.06;
pub const SWAP_FRAMES: u32 = 4;
pub const ONE_HAND_GRACE: Duration = Duration::from_millis(250);

/// Missing slots cost more than any on-screen displacement.
const MISSING_SLOT_COST: f32 = 1e9;

#[derive(Clone, Debug, PartialEq)]
pub struct HandPack {
    pub centroid: (f32, f32),
    /// Carried through untouched; assignment only looks at centroids. The controller classifies
    /// after roles are known, so its packs hold `GestureLabel::None`.
    pub label: GestureLabel,
    /// Position of this hand in the frame's input list.
    pub source: usize,
}

impl HandPack {
    pub fn from_skeleton(skeleton: &HandSkeleton, label: GestureLabel, source: usize) -> Self {
        Self {
            centroid: palm_center(skeleton),
            label,
            source,
        }
    }

    fn dist2(&self, other: Option<&HandPack>) -> f32 {
        match other {
            Some(o) => {
                let dx = self.centroid.0 - o.centroid.0;
                let dy = self.centroid.1 - o.centroid.1;
                dx * dx + dy * dy
            }
            None => MISSING_SLOT_COST,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleAssignment {
    pub primary: Option<HandPack>,
    pub secondary: Option<HandPack>,
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub deadband: f32,
    pub swap_frames: u32,
    pub one_hand_grace: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            deadband: SWAP_DEADBAND,
            swap_frames: SWAP_FRAMES,
            one_hand_grace: ONE_HAND_GRACE,
        }
    }
}

#[derive(Debug, Default)]
pub struct RoleTracker {
    config: TrackerConfig,
    slots: RoleAssignment,
    pending_swap: u32,
    last_two_hand: Option<Instant>,
}

impl RoleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.slots = RoleAssignment::default();
        self.pending_swap = 0;
        self.last_two_hand = None;
    }

    pub fn assignment(&self) -> &RoleAssignment {
        &self.slots
    }

    pub fn pending_swap(&self) -> u32 {
        self.pending_swap
    }

    /// Consumes this frame's packs (at most the first two are used).
    pub fn update(&mut self, now: Instant, mut packs: Vec<HandPack>) -> RoleAssignment {
        packs.truncate(2);
        match packs.len() {
            0 => self.reset(),
            1 => self.update_one(now, packs.remove(0)),
            _ => self.update_two(now, packs),
        }
        self.slots.clone()
    }

    fn update_one(&mut self, now: Instant, pack: HandPack) {
        let recent_pair = self
            .last_two_hand
            .is_some_and(|t| now.saturating_duration_since(t) < self.config.one_hand_grace);

        if recent_pair {
            let to_primary = pack.dist2(self.slots.primary.as_ref());
            let to_secondary = pack.dist2(self.slots.secondary.as_ref());
            if to_primary < to_secondary {
                self.slots.primary = Some(pack);
            } else {
                self.slots.secondary = Some(pack);
            }
            return;
        }

        self.slots.primary = None;
        self.slots.secondary = Some(pack);
        self.pending_swap = 0;
    }

    fn update_two(&mut self, now: Instant, mut packs: Vec<HandPack>) {
        packs.sort_by(|a, b| a.centroid.0.total_cmp(&b.centroid.0));
        let right = packs.pop();
        let left = packs.pop();
        let (Some(left), Some(right)) = (left, right) else {
            return;
        };
        self.last_two_hand = Some(now);

        if self.slots.primary.is_none() && self.slots.secondary.is_none() {
            self.commit(left, right);
            return;
        }

        let cost_keep =
            left.dist2(self.slots.primary.as_ref()) + right.dist2(self.slots.secondary.as_ref());
        let cost_swap =
            left.dist2(self.slots.secondary.as_ref()) + right.dist2(self.slots.primary.as_ref());

        if (right.centroid.0 - left.centroid.0).abs() < self.config.deadband {
            if cost_swap < cost_keep {
                self.commit(right, left);
            } else {
                self.commit(left, right);
            }
            return;
        }

        if cost_swap < cost_keep {
            self.pending_swap += 1;
            if self.pending_swap >= self.config.swap_frames {
                log::debug!("role tracker committed swap after {} frames", self.pending_swap);
                self.commit(right, left);
            }
            // Until committed the previous slots stay as they were.
        } else {
            self.commit(left, right);
        }
    }

    fn commit(&mut self, primary: HandPack, secondary: HandPack) {
        self.slots.primary = Some(primary);
        self.slots.secondary = Some(secondary);
        self.pending_swap = 0;
    }
}
