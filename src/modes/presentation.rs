use std::time::{Duration, Instant};

use super::{
    Cooldown, FrameInput, HoldTimer, ModeMachine,
    layered::{LayeredMapper, Token},
};
use crate::{
    bindings::PresentationBindings,
    types::{ActionIntent, GestureLabel},
};

pub const NAV_COOLDOWN: Duration = Duration::from_millis(350);
pub const START_HOLD: Duration = Duration::from_millis(450);
pub const SWITCH_HOLD: Duration = Duration::from_millis(550);
pub const CHORD_COOLDOWN: Duration = Duration::from_secs(1);

/// A two-hand gesture that fires once per hold.
#[derive(Debug)]
struct Chord {
    gesture: GestureLabel,
    hold: Duration,
    timer: HoldTimer,
    fired: bool,
    intent: ActionIntent,
}

impl Chord {
    fn new(gesture: GestureLabel, hold: Duration, intent: ActionIntent) -> Self {
        Self {
            gesture,
            hold,
            timer: HoldTimer::default(),
            fired: false,
            intent,
        }
    }

    fn update(&mut self, now: Instant, input: &FrameInput, cooldown: &mut Cooldown) -> Option<ActionIntent> {
        let active = input.both(self.gesture);
        if !active {
            self.fired = false;
        }
        if !self.timer.reached(now, active, self.hold) || self.fired || !cooldown.ready(now) {
            return None;
        }
        self.fired = true;
        cooldown.trigger(now, CHORD_COOLDOWN);
        Some(self.intent.clone())
    }

    fn reset(&mut self) {
        self.timer.reset();
        self.fired = false;
    }
}

/// Slide navigation on the base layer, focus/activation on the INTERACT layer, and two-hand
/// chords for starting the show and switching applications.
#[derive(Debug)]
pub struct PresentationMachine {
    mapper: LayeredMapper,
    chords: [Chord; 2],
    chord_cooldown: Cooldown,
}

impl Default for PresentationMachine {
    fn default() -> Self {
        Self::new(&PresentationBindings::default())
    }
}

impl PresentationMachine {
    pub fn new(bindings: &PresentationBindings) -> Self {
        let nav = vec![
            Token::new("NEXT", bindings.next, ActionIntent::key("right"))
                .cooldown(NAV_COOLDOWN)
                .one_shot(),
            Token::new("PREV", bindings.prev, ActionIntent::key("left"))
                .cooldown(NAV_COOLDOWN)
                .one_shot(),
        ];
        let interact = vec![
            Token::new("TAB", bindings.tab, ActionIntent::key("tab")),
            Token::new("SHIFT_TAB", bindings.shift_tab, ActionIntent::hotkey(&["shift", "tab"])),
            Token::new("ACTIVATE", bindings.activate, ActionIntent::key("enter"))
                .cooldown(NAV_COOLDOWN)
                .one_shot(),
            Token::new("PLAY_PAUSE", bindings.play_pause, ActionIntent::key("space"))
                .cooldown(NAV_COOLDOWN)
                .one_shot(),
        ];
        Self {
            mapper: LayeredMapper::new(nav, interact, bindings.interact_hold),
            chords: [
                Chord::new(GestureLabel::OpenPalm, START_HOLD, ActionIntent::key("f5")),
                Chord::new(GestureLabel::PinchIndex, SWITCH_HOLD, ActionIntent::hotkey(&["alt", "tab"])),
            ],
            chord_cooldown: Cooldown::default(),
        }
    }

    pub fn apply_bindings(&mut self, bindings: &PresentationBindings) {
        *self = Self::new(bindings);
    }

    fn chord_candidate(&self, input: &FrameInput) -> bool {
        self.chords.iter().any(|c| input.both(c.gesture))
    }
}

impl ModeMachine for PresentationMachine {
    fn update(&mut self, now: Instant, can_inject: bool, input: &FrameInput) -> Option<ActionIntent> {
        if !can_inject {
            return self.reset();
        }
        if self.chord_candidate(input) {
            self.mapper.reset();
        } else {
            let out = self.mapper.update(now, input);
            for chord in &mut self.chords {
                chord.reset();
            }
            return out;
        }
        let mut out = None;
        for chord in &mut self.chords {
            if let Some(intent) = chord.update(now, input, &mut self.chord_cooldown) {
                log::info!("presentation chord fired: {intent:?}");
                out.get_or_insert(intent);
            }
        }
        out
    }

    fn reset(&mut self) -> Option<ActionIntent> {
        self.mapper.reset();
        for chord in &mut self.chords {
            chord.reset();
        }
        None
    }
}
