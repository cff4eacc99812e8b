//! Two-layer gesture → token mapper shared by the text-navigation and presentation modes.
//!
//! The primary hand selects a token from the active layer. The modifier layer is active while the
//! secondary hand has shown the modifier gesture within a short grace window.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use super::FrameInput;
use crate::types::{ActionIntent, GestureLabel};

pub const STABLE_FRAMES: u32 = 3;
pub const MODIFIER_GRACE: Duration = Duration::from_millis(200);
pub const REPEAT_DELAY: Duration = Duration::from_millis(550);
pub const REPEAT_INTERVAL: Duration = Duration::from_millis(220);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Firing {
    /// Fires again on an interval while held.
    Repeat,
    /// Fires once, then needs a release and the cooldown before re-arming.
    OneShot,
}

/// One bindable action in a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub name: &'static str,
    pub gesture: GestureLabel,
    pub hold: Duration,
    pub cooldown: Duration,
    pub firing: Firing,
    pub intent: ActionIntent,
}

impl Token {
    pub fn new(name: &'static str, gesture: GestureLabel, intent: ActionIntent) -> Self {
        Self {
            name,
            gesture,
            hold: Duration::from_millis(120),
            cooldown: Duration::from_millis(220),
            firing: Firing::Repeat,
            intent,
        }
    }

    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.firing = Firing::OneShot;
        self
    }
}

#[derive(Clone, Debug)]
pub struct LayeredConfig {
    pub stable_frames: u32,
    pub modifier_grace: Duration,
    pub repeat_delay: Duration,
    pub repeat_interval: Duration,
}

impl Default for LayeredConfig {
    fn default() -> Self {
        Self {
            stable_frames: STABLE_FRAMES,
            modifier_grace: MODIFIER_GRACE,
            repeat_delay: REPEAT_DELAY,
            repeat_interval: REPEAT_INTERVAL,
        }
    }
}

/// Which layer and slot the current candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    modifier: bool,
    index: usize,
}

#[derive(Debug)]
struct Candidate {
    slot: Slot,
    streak: u32,
    hold_start: Option<Instant>,
    /// Cleared once the token fires; a one-shot stays disarmed until the gesture changes.
    armed: bool,
    first_fire: Option<Instant>,
    last_fire: Option<Instant>,
}

impl Candidate {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            streak: 0,
            hold_start: None,
            armed: true,
            first_fire: None,
            last_fire: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LayeredMapper {
    config: LayeredConfig,
    base: Vec<Token>,
    modifier: Vec<Token>,
    modifier_gesture: GestureLabel,
    modifier_seen: Option<Instant>,
    candidate: Option<Candidate>,
    /// Last firing per token name; survives candidate changes.
    fired_at: HashMap<&'static str, Instant>,
}

impl LayeredMapper {
    pub fn new(base: Vec<Token>, modifier: Vec<Token>, modifier_gesture: GestureLabel) -> Self {
        Self {
            base,
            modifier,
            modifier_gesture,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: LayeredConfig) -> Self {
        self.config = config;
        self
    }

    pub fn modifier_active(&self, now: Instant) -> bool {
        self.modifier_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) <= self.config.modifier_grace)
    }

    /// Name of the token currently being held, if any.
    pub fn candidate(&self) -> Option<&'static str> {
        self.candidate.as_ref().map(|c| self.token(c.slot).name)
    }

    fn token(&self, slot: Slot) -> &Token {
        if slot.modifier {
            &self.modifier[slot.index]
        } else {
            &self.base[slot.index]
        }
    }

    fn pick(&self, modifier: bool, label: GestureLabel) -> Option<Slot> {
        if label.is_none() {
            return None;
        }
        let layer = if modifier { &self.modifier } else { &self.base };
        layer
            .iter()
            .position(|t| t.gesture == label)
            .map(|index| Slot { modifier, index })
    }

    fn cooled(&self, now: Instant, token: &Token) -> bool {
        self.fired_at
            .get(token.name)
            .is_none_or(|last| now.saturating_duration_since(*last) >= token.cooldown)
    }

    pub fn update(&mut self, now: Instant, input: &FrameInput) -> Option<ActionIntent> {
        if !self.modifier_gesture.is_none() && input.secondary_label() == self.modifier_gesture {
            self.modifier_seen = Some(now);
        }
        let modifier = self.modifier_active(now);

        let Some(slot) = self.pick(modifier, input.primary_label()) else {
            self.candidate = None;
            return None;
        };

        if self.candidate.as_ref().is_some_and(|c| c.slot != slot) {
            self.candidate = None;
        }
        let candidate = self.candidate.get_or_insert_with(|| Candidate::new(slot));
        candidate.streak += 1;
        if candidate.streak < self.config.stable_frames {
            return None;
        }
        let hold_start = *candidate.hold_start.get_or_insert(now);
        let (armed, first_fire, last_fire) = (candidate.armed, candidate.first_fire, candidate.last_fire);

        let token = self.token(slot).clone();
        if now.saturating_duration_since(hold_start) < token.hold || !self.cooled(now, &token) {
            return None;
        }

        if !armed {
            if token.firing == Firing::OneShot {
                return None;
            }
            let (Some(first), Some(last)) = (first_fire, last_fire) else {
                return None;
            };
            let interval = self.config.repeat_interval.max(token.cooldown);
            if now.saturating_duration_since(first) < self.config.repeat_delay
                || now.saturating_duration_since(last) < interval
            {
                return None;
            }
        }

        if let Some(c) = self.candidate.as_mut() {
            c.armed = false;
            c.first_fire.get_or_insert(now);
            c.last_fire = Some(now);
        }
        self.fired_at.insert(token.name, now);
        log::debug!("layered token {} fired", token.name);
        Some(token.intent)
    }

    /// Clears timers and the modifier latch. Cooldowns persist.
    pub fn reset(&mut self) {
        self.candidate = None;
        self.modifier_seen = None;
    }
}
