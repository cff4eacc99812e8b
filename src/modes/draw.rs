use std::time::{Duration, Instant};

use super::{Cooldown, FrameInput, HoldTimer, ModeMachine};
use crate::types::{ActionIntent, GestureLabel, MouseButton};

pub const PEN_DOWN_DEBOUNCE: Duration = Duration::from_millis(30);
/// Non-pinch must persist this long before the pen lifts.
pub const PEN_UP_LATCH: Duration = Duration::from_millis(120);
pub const SELECTION_HOLD: Duration = Duration::from_millis(280);
pub const SELECTION_COOLDOWN: Duration = Duration::from_millis(600);

#[derive(Debug)]
struct Shortcut {
    gesture: GestureLabel,
    timer: HoldTimer,
    fired: bool,
    cooldown: Cooldown,
    intent: ActionIntent,
}

impl Shortcut {
    fn new(gesture: GestureLabel, intent: ActionIntent) -> Self {
        Self {
            gesture,
            timer: HoldTimer::default(),
            fired: false,
            cooldown: Cooldown::default(),
            intent,
        }
    }

    fn update(&mut self, now: Instant, modifier: bool, label: GestureLabel) -> Option<ActionIntent> {
        let active = modifier && label == self.gesture;
        if !active {
            self.fired = false;
        }
        if !self.timer.reached(now, active, SELECTION_HOLD) || self.fired || !self.cooldown.ready(now) {
            return None;
        }
        self.fired = true;
        self.cooldown.trigger(now, SELECTION_COOLDOWN);
        Some(self.intent.clone())
    }

    fn reset(&mut self) {
        self.timer.reset();
        self.fired = false;
    }
}

/// Pinch draws with the left button held; secondary-hand pinch turns V_SIGN/FIST into copy/cut.
#[derive(Debug)]
pub struct DrawMachine {
    pinch: HoldTimer,
    release: HoldTimer,
    down: bool,
    shortcuts: [Shortcut; 2],
}

impl Default for DrawMachine {
    fn default() -> Self {
        Self {
            pinch: HoldTimer::default(),
            release: HoldTimer::default(),
            down: false,
            shortcuts: [
                Shortcut::new(GestureLabel::VSign, ActionIntent::hotkey(&["ctrl", "c"])),
                Shortcut::new(GestureLabel::Fist, ActionIntent::hotkey(&["ctrl", "x"])),
            ],
        }
    }
}

impl DrawMachine {
    pub fn pen_down(&self) -> bool {
        self.down
    }

    fn update_pen(&mut self, now: Instant, label: GestureLabel) -> Option<ActionIntent> {
        let pinching = label == GestureLabel::PinchIndex;
        let pinch_held = self.pinch.reached(now, pinching, PEN_DOWN_DEBOUNCE);
        let release_held = self.release.reached(now, !pinching, PEN_UP_LATCH);

        if !self.down && pinch_held {
            self.down = true;
            return Some(ActionIntent::MouseDown {
                button: MouseButton::Left,
            });
        }
        // A lost hand lifts the pen at once; classification flicker has to outlast the latch.
        if self.down && (release_held || label.is_none()) {
            self.down = false;
            return Some(ActionIntent::MouseUp {
                button: MouseButton::Left,
            });
        }
        None
    }
}

impl ModeMachine for DrawMachine {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        let label = input.primary_label();
        let pen = self.update_pen(now, label);

        let modifier = input.secondary_label() == GestureLabel::PinchIndex;
        let mut shortcut = None;
        for s in &mut self.shortcuts {
            if let Some(intent) = s.update(now, modifier, label) {
                shortcut.get_or_insert(intent);
            }
        }
        pen.or(shortcut)
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        self.pinch.reset();
        self.release.reset();
        for s in &mut self.shortcuts {
            s.reset();
        }
        let was_down = std::mem::take(&mut self.down);
        was_down.then_some(ActionIntent::MouseUp {
            button: MouseButton::Left,
        })
    }
}
