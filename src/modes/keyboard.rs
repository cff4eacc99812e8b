use std::time::{Duration, Instant};

use super::{
    FrameInput, ModeMachine,
    layered::{LayeredMapper, Token},
};
use crate::{
    bindings::KeyboardBindings,
    types::{ActionIntent, GestureLabel},
};

/// Text navigation: arrows on the base layer, editing keys on the FN layer held by the secondary
/// hand. A second secondary-hand gesture hands control to the mouse machines.
#[derive(Debug)]
pub struct KeyboardMachine {
    mapper: LayeredMapper,
    mouse_mod: GestureLabel,
}

impl Default for KeyboardMachine {
    fn default() -> Self {
        Self::new(&KeyboardBindings::default())
    }
}

fn key(name: &'static str, gesture: GestureLabel, hold_ms: u64, cooldown_ms: u64) -> Token {
    Token::new(name, gesture, ActionIntent::key(&name.to_ascii_lowercase()))
        .hold(Duration::from_millis(hold_ms))
        .cooldown(Duration::from_millis(cooldown_ms))
}

impl KeyboardMachine {
    pub fn new(bindings: &KeyboardBindings) -> Self {
        let base = vec![
            key("LEFT", bindings.left, 120, 220),
            key("RIGHT", bindings.right, 120, 220),
            key("UP", bindings.up, 120, 220),
            key("DOWN", bindings.down, 120, 220),
        ];
        let fn_layer = vec![
            key("BACKSPACE", bindings.backspace, 140, 250),
            key("SPACE", bindings.space, 160, 350).one_shot(),
            key("ENTER", bindings.enter, 160, 350).one_shot(),
            key("ESC", bindings.esc, 180, 450).one_shot(),
        ];
        Self {
            mapper: LayeredMapper::new(base, fn_layer, bindings.fn_hold),
            mouse_mod: bindings.mouse_mod,
        }
    }

    pub fn apply_bindings(&mut self, bindings: &KeyboardBindings) {
        *self = Self::new(bindings);
    }

    /// Secondary hand is holding the mouse modifier.
    pub fn mouse_gate(&self, input: &FrameInput) -> bool {
        !self.mouse_mod.is_none() && input.secondary_label() == self.mouse_mod
    }

    pub fn fn_active(&self, now: Instant) -> bool {
        self.mapper.modifier_active(now)
    }
}

impl ModeMachine for KeyboardMachine {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        self.mapper.update(now, input)
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        self.mapper.reset();
        None
    }
}
