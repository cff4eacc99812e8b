use std::time::{Duration, Instant};

use super::{Cooldown, FrameInput, HoldTimer, ModeMachine};
use crate::{
    bindings::MouseBindings,
    types::{ActionIntent, GestureLabel, MouseButton},
};

pub const DRAG_HOLD: Duration = Duration::from_millis(280);
pub const TAP_MAX: Duration = Duration::from_millis(220);
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(350);
pub const CLICK_COOLDOWN: Duration = Duration::from_millis(300);

pub const RIGHT_CLICK_HOLD: Duration = Duration::from_millis(350);
pub const RIGHT_CLICK_COOLDOWN: Duration = Duration::from_millis(600);

pub const SCROLL_GAIN: f32 = 1400.0;
pub const SCROLL_DEADZONE: f32 = 0.012;
pub const SCROLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ClickDragConfig {
    pub gesture: GestureLabel,
    pub drag_hold: Duration,
    pub tap_max: Duration,
    pub double_click_window: Duration,
    pub cooldown: Duration,
}

impl Default for ClickDragConfig {
    fn default() -> Self {
        Self {
            gesture: GestureLabel::PinchIndex,
            drag_hold: DRAG_HOLD,
            tap_max: TAP_MAX,
            double_click_window: DOUBLE_CLICK_WINDOW,
            cooldown: CLICK_COOLDOWN,
        }
    }
}

/// Pinch held long enough drags; short pinches are taps resolved into single or double clicks.
#[derive(Debug, Default)]
pub struct ClickDrag {
    config: ClickDragConfig,
    pinch_start: Option<Instant>,
    dragging: bool,
    /// The current pinch already produced a double-click and must not become a tap or drag.
    consumed: bool,
    /// Release time of a tap waiting to see whether a second tap follows.
    pending_single: Option<Instant>,
    cooldown: Cooldown,
}

impl ClickDrag {
    pub fn new(config: ClickDragConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn set_gesture(&mut self, gesture: GestureLabel) {
        self.config.gesture = gesture;
    }

    pub fn gesture(&self) -> GestureLabel {
        self.config.gesture
    }

    pub fn dragging(&self) -> bool {
        self.dragging
    }

    fn fire(&mut self, now: Instant, intent: ActionIntent) -> Option<ActionIntent> {
        if !self.cooldown.ready(now) {
            log::debug!("click suppressed by cooldown");
            return None;
        }
        self.cooldown.trigger(now, self.config.cooldown);
        Some(intent)
    }

    fn end_pinch(&mut self) {
        self.pinch_start = None;
        self.consumed = false;
    }

    fn step(&mut self, now: Instant, label: GestureLabel) -> Option<ActionIntent> {
        if label == self.config.gesture {
            let Some(start) = self.pinch_start else {
                self.pinch_start = Some(now);
                let in_window = self.pending_single.is_some_and(|released| {
                    now.saturating_duration_since(released) <= self.config.double_click_window
                });
                if in_window {
                    self.pending_single = None;
                    self.consumed = true;
                    return self.fire(now, ActionIntent::DoubleClick);
                }
                return None;
            };
            if !self.consumed
                && !self.dragging
                && now.saturating_duration_since(start) >= self.config.drag_hold
            {
                self.dragging = true;
                return Some(ActionIntent::MouseDown {
                    button: MouseButton::Left,
                });
            }
            return None;
        }

        if self.dragging {
            self.dragging = false;
            self.end_pinch();
            return Some(ActionIntent::MouseUp {
                button: MouseButton::Left,
            });
        }

        if let Some(start) = self.pinch_start {
            // Losing the hand aborts a tap rather than completing it.
            let is_tap = !label.is_none()
                && !self.consumed
                && now.saturating_duration_since(start) <= self.config.tap_max;
            if is_tap {
                self.pending_single = Some(now);
            }
            self.end_pinch();
        }
        None
    }
}

impl ModeMachine for ClickDrag {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        if let Some(intent) = self.step(now, input.primary_label()) {
            return Some(intent);
        }
        let expired = self.pending_single.is_some_and(|released| {
            now.saturating_duration_since(released) > self.config.double_click_window
        });
        if expired {
            self.pending_single = None;
            return self.fire(now, ActionIntent::left_click());
        }
        None
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        let was_down = self.dragging;
        self.dragging = false;
        self.end_pinch();
        self.pending_single = None;
        was_down.then_some(ActionIntent::MouseUp {
            button: MouseButton::Left,
        })
    }
}

/// One right click per continuous hold of the trigger gesture.
#[derive(Debug)]
pub struct RightClick {
    gesture: GestureLabel,
    hold: HoldTimer,
    fired: bool,
    cooldown: Cooldown,
}

impl Default for RightClick {
    fn default() -> Self {
        Self {
            gesture: GestureLabel::VSign,
            hold: HoldTimer::default(),
            fired: false,
            cooldown: Cooldown::default(),
        }
    }
}

impl RightClick {
    pub fn set_gesture(&mut self, gesture: GestureLabel) {
        self.gesture = gesture;
    }
}

impl ModeMachine for RightClick {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        let active = input.primary_label() == self.gesture;
        if !active {
            self.fired = false;
        }
        if !self.hold.reached(now, active, RIGHT_CLICK_HOLD) || self.fired || !self.cooldown.ready(now) {
            return None;
        }
        self.fired = true;
        self.cooldown.trigger(now, RIGHT_CLICK_COOLDOWN);
        Some(ActionIntent::Click {
            button: MouseButton::Right,
            at: None,
        })
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        self.hold.reset();
        self.fired = false;
        None
    }
}

/// Vertical scrolling driven by the secondary hand while it holds the scroll gesture.
#[derive(Debug)]
pub struct Scroll {
    gesture: GestureLabel,
    anchor: Option<f32>,
    last_emit: Option<Instant>,
}

impl Default for Scroll {
    fn default() -> Self {
        Self {
            gesture: GestureLabel::Fist,
            anchor: None,
            last_emit: None,
        }
    }
}

impl Scroll {
    pub fn set_gesture(&mut self, gesture: GestureLabel) {
        self.gesture = gesture;
    }

    pub fn active(&self) -> bool {
        self.anchor.is_some()
    }
}

impl ModeMachine for Scroll {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        let Some(hand) = input.secondary.as_ref().filter(|h| h.label == self.gesture) else {
            self.anchor = None;
            return None;
        };
        let y = hand.centroid.1;
        let Some(anchor) = self.anchor else {
            self.anchor = Some(y);
            return None;
        };

        let dy = y - anchor;
        if dy.abs() <= SCROLL_DEADZONE {
            return None;
        }
        if self
            .last_emit
            .is_some_and(|last| now.saturating_duration_since(last) < SCROLL_INTERVAL)
        {
            return None;
        }
        self.anchor = Some(y);
        self.last_emit = Some(now);

        // Hand moving up (smaller y) scrolls up.
        let mut amount = (-dy * SCROLL_GAIN).round() as i32;
        if amount == 0 {
            amount = if dy < 0.0 { 1 } else { -1 };
        }
        Some(ActionIntent::Scroll { amount })
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        self.anchor = None;
        None
    }
}

/// Click/drag, right click and scroll as used by pointer-style modes.
#[derive(Debug)]
pub struct MouseMachines {
    move_gesture: GestureLabel,
    pub click_drag: ClickDrag,
    pub right_click: RightClick,
    pub scroll: Scroll,
}

impl Default for MouseMachines {
    fn default() -> Self {
        Self {
            move_gesture: GestureLabel::OpenPalm,
            click_drag: ClickDrag::default(),
            right_click: RightClick::default(),
            scroll: Scroll::default(),
        }
    }
}

impl MouseMachines {
    pub fn apply_bindings(&mut self, bindings: &MouseBindings) {
        self.move_gesture = bindings.move_gesture;
        self.click_drag.set_gesture(bindings.click_drag);
        self.right_click.set_gesture(bindings.right_click);
        self.scroll.set_gesture(bindings.scroll_hold);
    }

    /// Whether the cursor follows a hand showing `label`: the move gesture, or the click
    /// gesture while a drag is in progress.
    pub fn pointer_follows(&self, label: GestureLabel) -> bool {
        label == self.move_gesture
            || (self.click_drag.dragging() && label == self.click_drag.gesture())
    }

    pub fn update_buttons(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        out.extend(self.click_drag.update(now, can_inject, input));
        out.extend(self.right_click.update(now, can_inject, input));
        out
    }

    pub fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Vec<ActionIntent> {
        let mut out = self.update_buttons(now, can_inject, input);
        out.extend(self.scroll.update(now, can_inject, input));
        out
    }

    pub fn reset(&mut self) -> Option<ActionIntent> {
        self.right_click.reset();
        self.scroll.reset();
        self.click_drag.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::testing::*;
    use GestureLabel::{OpenPalm, PinchIndex, VSign};

    fn downs_and_ups(events: &[(u64, ActionIntent)]) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for (_, intent) in events {
            match intent {
                ActionIntent::MouseDown { .. } => counts.0 += 1,
                ActionIntent::MouseUp { .. } => counts.1 += 1,
                ActionIntent::Click { .. } | ActionIntent::DoubleClick => counts.2 += 1,
                _ => {}
            }
        }
        counts
    }

    #[test]
    fn long_pinch_drags_without_clicking() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 350, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 363, 1500, &one(OpenPalm)));
        assert_eq!(downs_and_ups(&events), (1, 1, 0));
        assert!(matches!(events[0].1, ActionIntent::MouseDown { button: MouseButton::Left }));
        assert!(matches!(events[1].1, ActionIntent::MouseUp { button: MouseButton::Left }));
    }

    #[test]
    fn short_tap_resolves_to_single_click_after_window() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 100, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 100, 1500, &one(OpenPalm)));
        assert_eq!(events.len(), 1);
        let (at, intent) = &events[0];
        assert_eq!(*intent, ActionIntent::left_click());
        // Released at 100 ms; the click waits out the double-click window.
        assert!(*at > 100 + 350 && *at <= 100 + 350 + 33, "fired at {at}");
    }

    #[test]
    fn second_tap_inside_window_is_a_double_click() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 100, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 100, 200, &one(OpenPalm)));
        events.extend(run(&mut machine, t0, 200, 300, &one(PinchIndex)));
        events.extend(run(&mut machine, t0, 300, 1500, &one(OpenPalm)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, ActionIntent::DoubleClick);
    }

    #[test]
    fn medium_hold_is_neither_tap_nor_drag() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 250, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 250, 1500, &one(OpenPalm)));
        assert!(events.is_empty());
    }

    #[test]
    fn losing_the_hand_releases_a_drag_and_aborts_a_tap() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 400, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 400, 500, &empty()));
        assert_eq!(downs_and_ups(&events), (1, 1, 0));

        let mut machine = ClickDrag::default();
        let mut events = run(&mut machine, t0, 0, 100, &one(PinchIndex));
        events.extend(run(&mut machine, t0, 100, 1000, &empty()));
        assert!(events.is_empty());
    }

    #[test]
    fn reset_releases_held_button() {
        let t0 = Instant::now();
        let mut machine = ClickDrag::default();
        run(&mut machine, t0, 0, 400, &one(PinchIndex));
        assert!(machine.dragging());
        assert_eq!(
            machine.update(ms(t0, 433), false, &one(PinchIndex)),
            Some(ActionIntent::MouseUp { button: MouseButton::Left })
        );
        assert_eq!(machine.reset(), None);
    }

    #[test]
    fn right_click_fires_once_per_hold() {
        let t0 = Instant::now();
        let mut machine = RightClick::default();
        let events = run(&mut machine, t0, 0, 3000, &one(VSign));
        assert_eq!(events.len(), 1);
        assert!(events[0].0 >= 350);
    }

    #[test]
    fn right_click_respects_cooldown() {
        let t0 = Instant::now();
        let mut machine = RightClick::default();
        let mut events = run(&mut machine, t0, 0, 400, &one(VSign));
        events.extend(run(&mut machine, t0, 400, 450, &one(OpenPalm)));
        events.extend(run(&mut machine, t0, 450, 850, &one(VSign)));
        assert_eq!(events.len(), 1);
        events.extend(run(&mut machine, t0, 850, 1400, &one(VSign)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn scroll_follows_secondary_hand_height() {
        let t0 = Instant::now();
        let mut machine = Scroll::default();
        let mut input = two(OpenPalm, GestureLabel::Fist);
        assert_eq!(machine.update(t0, true, &input), None);

        input.secondary.as_mut().unwrap().centroid.1 = 0.45;
        assert_eq!(machine.update(ms(t0, 33), true, &input), Some(ActionIntent::Scroll { amount: 70 }));

        // Within the deadzone of the new anchor.
        input.secondary.as_mut().unwrap().centroid.1 = 0.46;
        assert_eq!(machine.update(ms(t0, 100), true, &input), None);

        input.secondary.as_mut().unwrap().centroid.1 = 0.50;
        assert_eq!(machine.update(ms(t0, 133), true, &input), Some(ActionIntent::Scroll { amount: -70 }));
    }

    #[test]
    fn scroll_is_rate_limited_and_needs_the_hold_gesture() {
        let t0 = Instant::now();
        let mut machine = Scroll::default();
        let mut input = two(OpenPalm, GestureLabel::Fist);
        machine.update(t0, true, &input);
        input.secondary.as_mut().unwrap().centroid.1 = 0.40;
        assert!(machine.update(ms(t0, 10), true, &input).is_some());
        input.secondary.as_mut().unwrap().centroid.1 = 0.30;
        assert!(machine.update(ms(t0, 20), true, &input).is_none());

        let open = two(OpenPalm, OpenPalm);
        assert!(machine.update(ms(t0, 100), true, &open).is_none());
        assert!(!machine.active());
    }

    #[test]
    fn pointer_follows_move_gesture_or_drag() {
        let t0 = Instant::now();
        let mut mouse = MouseMachines::default();
        assert!(mouse.pointer_follows(OpenPalm));
        assert!(!mouse.pointer_follows(PinchIndex));
        mouse.update(t0, true, &one(PinchIndex));
        mouse.update(ms(t0, 300), true, &one(PinchIndex));
        assert!(mouse.pointer_follows(PinchIndex));
    }
}
