//! Per-mode temporal state machines that turn noisy per-frame labels into action intents.
//!
//! Every machine owns its timers exclusively. `update` is called once per frame for the active
//! mode only, and `reset` releases anything held (button up) and clears timers. The controller
//! calls `reset` whenever injection is disallowed so no input is ever left stuck.

pub mod draw;
pub mod keyboard;
pub mod layered;
pub mod lock;
pub mod menu;
pub mod mouse;
pub mod pointer;
pub mod presentation;
pub mod vkey;

use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    bindings::BindingsConfig,
    types::{ActionIntent, GestureLabel, HandSkeleton, UnknownLabel},
};

use self::{
    draw::DrawMachine, keyboard::KeyboardMachine, mouse::MouseMachines, pointer::PointerMapper,
    presentation::PresentationMachine, vkey::AirTapMachine,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Mouse,
    Keyboard,
    Presentation,
    Draw,
    Vkey,
}

impl Mode {
    /// Menu order.
    pub const ALL: [Mode; 5] = [
        Mode::Mouse,
        Mode::Keyboard,
        Mode::Presentation,
        Mode::Draw,
        Mode::Vkey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Mouse => "MOUSE",
            Mode::Keyboard => "KEYBOARD",
            Mode::Presentation => "PRESENTATION",
            Mode::Draw => "DRAW",
            Mode::Vkey => "VKEY",
        }
    }

    /// Modes in which the adaptive classifier must not override rule labels.
    pub fn rule_labels_only(&self) -> bool {
        matches!(self, Mode::Draw | Mode::Vkey | Mode::Keyboard)
    }

    pub fn index(&self) -> usize {
        Mode::ALL.iter().position(|m| m == self).unwrap_or(0)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOUSE" => Ok(Mode::Mouse),
            "KEYBOARD" => Ok(Mode::Keyboard),
            "PRESENTATION" | "PPT" => Ok(Mode::Presentation),
            "DRAW" | "PAINT" => Ok(Mode::Draw),
            "VKEY" => Ok(Mode::Vkey),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

/// One classified hand as the machines see it.
#[derive(Clone, Debug, PartialEq)]
pub struct HandObservation {
    pub label: GestureLabel,
    pub centroid: (f32, f32),
    pub skeleton: HandSkeleton,
}

/// Per-frame machine input. `primary` is the cursor hand, `secondary` the modifier hand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub primary: Option<HandObservation>,
    pub secondary: Option<HandObservation>,
    /// Hands actually detected this frame, before any tracking-loss grace.
    pub hand_count: usize,
}

impl FrameInput {
    pub fn primary_label(&self) -> GestureLabel {
        self.primary.as_ref().map_or(GestureLabel::None, |h| h.label)
    }

    pub fn secondary_label(&self) -> GestureLabel {
        self.secondary.as_ref().map_or(GestureLabel::None, |h| h.label)
    }

    pub fn secondary_present(&self) -> bool {
        self.secondary.is_some()
    }

    /// Both hands present and showing `label`.
    pub fn both(&self, label: GestureLabel) -> bool {
        self.primary.is_some()
            && self.secondary.is_some()
            && self.primary_label() == label
            && self.secondary_label() == label
    }
}

/// Tracks how long a condition has held continuously.
#[derive(Clone, Debug, Default)]
pub struct HoldTimer {
    start: Option<Instant>,
}

impl HoldTimer {
    /// Feeds this frame's condition and returns the continuous hold so far.
    pub fn update(&mut self, now: Instant, active: bool) -> Option<Duration> {
        if !active {
            self.start = None;
            return None;
        }
        let start = *self.start.get_or_insert(now);
        Some(now.saturating_duration_since(start))
    }

    pub fn reached(&mut self, now: Instant, active: bool, hold: Duration) -> bool {
        self.update(now, active).is_some_and(|held| held >= hold)
    }

    pub fn started(&self) -> Option<Instant> {
        self.start
    }

    pub fn reset(&mut self) {
        self.start = None;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cooldown {
    until: Option<Instant>,
}

impl Cooldown {
    pub fn ready(&self, now: Instant) -> bool {
        self.until.is_none_or(|until| now >= until)
    }

    pub fn trigger(&mut self, now: Instant, length: Duration) {
        self.until = Some(now + length);
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}

/// Common contract for a per-mode machine.
pub trait ModeMachine {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent>;

    /// Releases held input and clears timers. Returns the release intent, if any.
    fn reset(&mut self) -> Option<ActionIntent>;
}

/// Owns one instance of every mode's machines and dispatches to the active mode.
#[derive(Debug, Default)]
pub struct ModeMachines {
    pub pointer: PointerMapper,
    pub mouse: MouseMachines,
    pub keyboard: KeyboardMachine,
    pub presentation: PresentationMachine,
    pub draw: DrawMachine,
    pub vkey: AirTapMachine,
}

impl ModeMachines {
    pub fn apply_bindings(&mut self, bindings: &BindingsConfig) {
        self.mouse.apply_bindings(&bindings.mouse());
        self.keyboard.apply_bindings(&bindings.keyboard());
        self.presentation.apply_bindings(&bindings.presentation());
    }

    /// Runs the active mode's machines for one frame.
    pub fn update(&mut self, mode: Mode, now: Instant, input: &FrameInput) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        let cursor = input.primary.as_ref();
        match mode {
            Mode::Mouse => {
                let moving = cursor.is_some_and(|h| self.mouse.pointer_follows(h.label));
                out.extend(self.pointer.update(now, cursor.filter(|_| moving).map(|h| h.centroid)));
                out.extend(self.mouse.update(now, true, input));
            }
            Mode::Keyboard => {
                if self.keyboard.mouse_gate(input) {
                    out.extend(self.keyboard.reset());
                    let moving = cursor.is_some_and(|h| self.mouse.pointer_follows(h.label));
                    out.extend(self.pointer.update(now, cursor.filter(|_| moving).map(|h| h.centroid)));
                    out.extend(self.mouse.update_buttons(now, true, input));
                } else {
                    out.extend(self.mouse.reset());
                    self.pointer.reset();
                    out.extend(self.keyboard.update(now, true, input));
                }
            }
            Mode::Presentation => {
                let moving = cursor.is_some_and(|h| h.label == GestureLabel::OpenPalm);
                out.extend(self.pointer.update(now, cursor.filter(|_| moving).map(|h| h.centroid)));
                out.extend(self.presentation.update(now, true, input));
            }
            Mode::Draw => {
                let moving = cursor.is_some_and(|h| {
                    matches!(h.label, GestureLabel::OpenPalm | GestureLabel::PinchIndex)
                }) || self.draw.pen_down();
                out.extend(self.pointer.update(now, cursor.filter(|_| moving).map(|h| h.centroid)));
                out.extend(self.draw.update(now, true, input));
            }
            Mode::Vkey => {
                let moving = cursor.is_some_and(|h| self.mouse.pointer_follows(h.label));
                out.extend(self.pointer.update(now, cursor.filter(|_| moving).map(|h| h.centroid)));
                // Tap positions arrive in image space; map them like the pointer.
                out.extend(self.vkey.update(now, true, input).map(|intent| match intent {
                    ActionIntent::Click { button, at: Some(at) } => ActionIntent::Click {
                        button,
                        at: Some(self.pointer.map(at)),
                    },
                    other => other,
                }));
            }
        }
        out
    }

    /// Resets every machine, returning any release intents.
    pub fn reset_all(&mut self) -> Vec<ActionIntent> {
        self.pointer.reset();
        let mut out = Vec::new();
        out.extend(self.mouse.reset());
        out.extend(self.keyboard.reset());
        out.extend(self.presentation.reset());
        out.extend(self.draw.reset());
        out.extend(self.vkey.reset());
        out
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::gesture::fixtures;

    pub fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    pub fn hand(label: GestureLabel, x: f32, y: f32) -> HandObservation {
        let base = match label {
            GestureLabel::Fist => fixtures::fist(),
            GestureLabel::PinchIndex => fixtures::pinch(),
            GestureLabel::VSign => fixtures::v_sign(),
            GestureLabel::Knife => fixtures::knife(),
            GestureLabel::Other => fixtures::other(),
            _ => fixtures::open_palm(),
        };
        HandObservation {
            label,
            centroid: (x, y),
            skeleton: fixtures::placed(base, x, y),
        }
    }

    pub fn one(label: GestureLabel) -> FrameInput {
        FrameInput {
            primary: Some(hand(label, 0.5, 0.5)),
            secondary: None,
            hand_count: 1,
        }
    }

    pub fn two(primary: GestureLabel, secondary: GestureLabel) -> FrameInput {
        FrameInput {
            primary: Some(hand(primary, 0.35, 0.5)),
            secondary: Some(hand(secondary, 0.65, 0.5)),
            hand_count: 2,
        }
    }

    pub fn empty() -> FrameInput {
        FrameInput::default()
    }

    /// Drives `machine` at 30 fps over `[from, to)` milliseconds with a fixed input.
    pub fn run<M: ModeMachine>(
        machine: &mut M,
        t0: Instant,
        from: u64,
        to: u64,
        input: &FrameInput,
    ) -> Vec<(u64, ActionIntent)> {
        let mut out = Vec::new();
        let mut t = from;
        while t < to {
            if let Some(intent) = machine.update(ms(t0, t), true, input) {
                out.push((t, intent));
            }
            t += 33;
        }
        out
    }
}
