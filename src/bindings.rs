//! User gesture remapping: a versioned nested table merged key-by-key from untrusted JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::GestureLabel;

pub const BINDINGS_VERSION: u32 = 1;

/// A mode entry is either a gesture or one nested block of gestures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Gesture(GestureLabel),
    Block(BTreeMap<String, GestureLabel>),
}

pub type ModeBindings = BTreeMap<String, Binding>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BindingsConfig {
    pub version: u32,
    pub bindings: BTreeMap<String, ModeBindings>,
}

/// Parses a leaf, accepting only the user-facing label set.
fn sanitize_gesture(value: &Value) -> Option<GestureLabel> {
    let label: GestureLabel = value.as_str()?.parse().ok()?;
    label.is_bindable().then_some(label)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

fn parse_version(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

impl Default for BindingsConfig {
    fn default() -> Self {
        use GestureLabel::{Fist, OpenPalm, PinchIndex, VSign};

        fn block(entries: &[(&str, GestureLabel)]) -> Binding {
            Binding::Block(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        }
        fn mode(entries: Vec<(&str, Binding)>) -> ModeBindings {
            entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
        }

        let mut bindings = BTreeMap::new();
        bindings.insert(
            "MOUSE".to_string(),
            mode(vec![
                ("MOVE", Binding::Gesture(OpenPalm)),
                ("CLICK_DRAG", Binding::Gesture(PinchIndex)),
                ("RIGHT_CLICK", Binding::Gesture(VSign)),
                ("LOCK_TOGGLE", Binding::Gesture(Fist)),
                ("SCROLL_HOLD", Binding::Gesture(Fist)),
            ]),
        );
        bindings.insert(
            "KEYBOARD".to_string(),
            mode(vec![
                (
                    "BASE",
                    block(&[("LEFT", Fist), ("RIGHT", VSign), ("UP", PinchIndex), ("DOWN", OpenPalm)]),
                ),
                (
                    "FN",
                    block(&[("BACKSPACE", Fist), ("SPACE", OpenPalm), ("ENTER", PinchIndex), ("ESC", VSign)]),
                ),
                ("FN_HOLD", Binding::Gesture(PinchIndex)),
                ("MOUSE_MOD", Binding::Gesture(Fist)),
            ]),
        );
        bindings.insert(
            "PRESENTATION".to_string(),
            mode(vec![
                ("NAV", block(&[("NEXT", PinchIndex), ("PREV", VSign)])),
                (
                    "INTERACT",
                    block(&[
                        ("TAB", Fist),
                        ("SHIFT_TAB", VSign),
                        ("ACTIVATE", PinchIndex),
                        ("PLAY_PAUSE", OpenPalm),
                    ]),
                ),
                ("INTERACT_HOLD", Binding::Gesture(Fist)),
            ]),
        );
        Self {
            version: BINDINGS_VERSION,
            bindings,
        }
    }
}

impl BindingsConfig {
    /// Merges a `{version, bindings}` document or a bare bindings object into `self`.
    ///
    /// Keys are upper-cased, invalid gestures and non-object modes are dropped, and a nested block
    /// is merged entry by entry. A block and a gesture never replace each other.
    pub fn merge(&mut self, incoming: &Value) {
        let Some(object) = incoming.as_object() else {
            log::warn!("ignoring non-object bindings update");
            return;
        };
        let modes = match object.get("bindings").and_then(Value::as_object) {
            Some(bindings) => {
                if let Some(version) = object.get("version").and_then(parse_version) {
                    self.version = version;
                }
                bindings
            }
            None => object,
        };

        for (mode, entries) in modes {
            let Some(entries) = entries.as_object() else {
                continue;
            };
            let target = self.bindings.entry(normalize_key(mode)).or_default();
            for (key, value) in entries {
                let key = normalize_key(key);
                if let Some(nested) = value.as_object() {
                    let slot = target
                        .entry(key.clone())
                        .or_insert_with(|| Binding::Block(BTreeMap::new()));
                    let Binding::Block(block) = slot else {
                        log::debug!("refusing to replace gesture {key} with a block");
                        continue;
                    };
                    for (inner, leaf) in nested {
                        match sanitize_gesture(leaf) {
                            Some(label) => {
                                block.insert(normalize_key(inner), label);
                            }
                            None => log::debug!("dropping invalid binding {inner}={leaf}"),
                        }
                    }
                    continue;
                }

                let Some(label) = sanitize_gesture(value) else {
                    log::debug!("dropping invalid binding {key}={value}");
                    continue;
                };
                match target.get(&key) {
                    Some(Binding::Block(_)) => log::debug!("refusing to replace block {key} with a gesture"),
                    _ => {
                        target.insert(key, Binding::Gesture(label));
                    }
                }
            }
        }
    }

    pub fn merged(&self, incoming: &Value) -> Self {
        let mut out = self.clone();
        out.merge(incoming);
        out
    }

    pub fn gesture(&self, mode: &str, key: &str) -> Option<GestureLabel> {
        match self.bindings.get(mode)?.get(key)? {
            Binding::Gesture(label) => Some(*label),
            Binding::Block(_) => None,
        }
    }

    pub fn nested(&self, mode: &str, block: &str, key: &str) -> Option<GestureLabel> {
        match self.bindings.get(mode)?.get(block)? {
            Binding::Block(entries) => entries.get(key).copied(),
            Binding::Gesture(_) => None,
        }
    }

    pub fn mouse(&self) -> MouseBindings {
        let d = MouseBindings::default();
        let get = |key: &str, default| self.gesture("MOUSE", key).unwrap_or(default);
        MouseBindings {
            move_gesture: get("MOVE", d.move_gesture),
            click_drag: get("CLICK_DRAG", d.click_drag),
            right_click: get("RIGHT_CLICK", d.right_click),
            lock_toggle: get("LOCK_TOGGLE", d.lock_toggle),
            scroll_hold: get("SCROLL_HOLD", d.scroll_hold),
        }
    }

    pub fn keyboard(&self) -> KeyboardBindings {
        let d = KeyboardBindings::default();
        let base = |key: &str, default| self.nested("KEYBOARD", "BASE", key).unwrap_or(default);
        let fn_layer = |key: &str, default| self.nested("KEYBOARD", "FN", key).unwrap_or(default);
        KeyboardBindings {
            left: base("LEFT", d.left),
            right: base("RIGHT", d.right),
            up: base("UP", d.up),
            down: base("DOWN", d.down),
            backspace: fn_layer("BACKSPACE", d.backspace),
            space: fn_layer("SPACE", d.space),
            enter: fn_layer("ENTER", d.enter),
            esc: fn_layer("ESC", d.esc),
            fn_hold: self.gesture("KEYBOARD", "FN_HOLD").unwrap_or(d.fn_hold),
            mouse_mod: self.gesture("KEYBOARD", "MOUSE_MOD").unwrap_or(d.mouse_mod),
        }
    }

    pub fn presentation(&self) -> PresentationBindings {
        let d = PresentationBindings::default();
        let nav = |key: &str, default| self.nested("PRESENTATION", "NAV", key).unwrap_or(default);
        let interact = |key: &str, default| self.nested("PRESENTATION", "INTERACT", key).unwrap_or(default);
        PresentationBindings {
            next: nav("NEXT", d.next),
            prev: nav("PREV", d.prev),
            tab: interact("TAB", d.tab),
            shift_tab: interact("SHIFT_TAB", d.shift_tab),
            activate: interact("ACTIVATE", d.activate),
            play_pause: interact("PLAY_PAUSE", d.play_pause),
            interact_hold: self
                .gesture("PRESENTATION", "INTERACT_HOLD")
                .unwrap_or(d.interact_hold),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseBindings {
    pub move_gesture: GestureLabel,
    pub click_drag: GestureLabel,
    pub right_click: GestureLabel,
    pub lock_toggle: GestureLabel,
    /// Held by the secondary hand.
    pub scroll_hold: GestureLabel,
}

impl Default for MouseBindings {
    fn default() -> Self {
        Self {
            move_gesture: GestureLabel::OpenPalm,
            click_drag: GestureLabel::PinchIndex,
            right_click: GestureLabel::VSign,
            lock_toggle: GestureLabel::Fist,
            scroll_hold: GestureLabel::Fist,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyboardBindings {
    pub left: GestureLabel,
    pub right: GestureLabel,
    pub up: GestureLabel,
    pub down: GestureLabel,
    pub backspace: GestureLabel,
    pub space: GestureLabel,
    pub enter: GestureLabel,
    pub esc: GestureLabel,
    /// Secondary-hand gesture selecting the FN layer.
    pub fn_hold: GestureLabel,
    /// Secondary-hand gesture handing control to the mouse machines.
    pub mouse_mod: GestureLabel,
}

impl Default for KeyboardBindings {
    fn default() -> Self {
        use GestureLabel::{Fist, OpenPalm, PinchIndex, VSign};
        Self {
            left: Fist,
            right: VSign,
            up: PinchIndex,
            down: OpenPalm,
            backspace: Fist,
            space: OpenPalm,
            enter: PinchIndex,
            esc: VSign,
            fn_hold: PinchIndex,
            mouse_mod: Fist,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationBindings {
    pub next: GestureLabel,
    pub prev: GestureLabel,
    pub tab: GestureLabel,
    pub shift_tab: GestureLabel,
    pub activate: GestureLabel,
    pub play_pause: GestureLabel,
    pub interact_hold: GestureLabel,
}

impl Default for PresentationBindings {
    fn default() -> Self {
        use GestureLabel::{Fist, OpenPalm, PinchIndex, VSign};
        Self {
            next: PinchIndex,
            prev: VSign,
            tab: Fist,
            shift_tab: VSign,
            activate: PinchIndex,
            play_pause: OpenPalm,
            interact_hold: Fist,
        }
    }
}
