//! Per-frame orchestration: role tracking, classification, lock and menu gating, then the active
//! mode's machines. Everything here runs on the frame thread; waiting is expressed through
//! timestamps only.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;

use crate::{
    bindings::BindingsConfig,
    config::AgentConfig,
    gesture::{RuleClassifier, pinch_threshold_from_ratio},
    learner::{AdaptiveClassifier, ProfileStore},
    modes::{
        FrameInput, HandObservation, Mode, ModeMachines, lock::LockToggle, menu::MenuEvent, menu::ModeMenu,
        pointer::PointerMapper,
    },
    pipeline::commands::Command,
    tracker::{HandPack, RoleTracker},
    types::{ActionIntent, GestureLabel, HandRole, HandSkeleton, LandmarkFrame},
};

/// How long a vanished cursor hand keeps its last observation.
pub const CURSOR_GRACE: Duration = Duration::from_millis(300);
const FPS_SMOOTHING: f32 = 0.9;
const MAX_CAPTURE_SECS: f32 = 600.0;
const SETTINGS_GAIN_KEYS: [&str; 3] = ["control_gain", "gain", "controlGain"];

/// Receives action intents for delivery to the OS. Delivery is best effort.
pub trait InputSink: Send {
    fn emit(&mut self, intent: &ActionIntent) -> anyhow::Result<()>;
}

/// Records intents instead of injecting them.
impl InputSink for Vec<ActionIntent> {
    fn emit(&mut self, intent: &ActionIntent) -> anyhow::Result<()> {
        self.push(intent.clone());
        Ok(())
    }
}

impl<S: InputSink + ?Sized> InputSink for Box<S> {
    fn emit(&mut self, intent: &ActionIntent) -> anyhow::Result<()> {
        (**self).emit(intent)
    }
}

/// Snapshot published after every frame and command.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Status {
    pub enabled: bool,
    pub mode: Mode,
    pub locked: bool,
    pub menu_open: bool,
    pub menu_selection: Option<Mode>,
    pub primary_label: GestureLabel,
    pub secondary_label: GestureLabel,
    pub fps: f32,
    pub profile: String,
    pub learner_enabled: bool,
    pub training: bool,
    pub capturing: bool,
    pub sample_counts: BTreeMap<HandRole, BTreeMap<String, usize>>,
}

fn role_index(role: HandRole) -> usize {
    match role {
        HandRole::Primary => 0,
        HandRole::Secondary => 1,
    }
}

pub struct Controller<S: InputSink> {
    config: AgentConfig,
    sink: S,
    enabled: bool,
    locked: bool,
    mode: Mode,
    bindings: BindingsConfig,
    tracker: RoleTracker,
    /// Indexed by machine role: the cursor hand first.
    rules: [RuleClassifier; 2],
    learner: AdaptiveClassifier,
    machines: ModeMachines,
    menu: ModeMenu,
    lock: LockToggle,
    last_cursor: Option<(Instant, HandObservation)>,
    last_frame: Option<Instant>,
    fps: f32,
    menu_events: Vec<MenuEvent>,
    status: Arc<Mutex<Status>>,
}

impl<S: InputSink> Controller<S> {
    pub fn new(config: AgentConfig, sink: S) -> Self {
        let learner = AdaptiveClassifier::open(
            ProfileStore::new(config.profile_dir.clone()),
            &config.profile,
            config.learner.clone(),
        );
        let mut controller = Self {
            sink,
            enabled: config.start_enabled,
            locked: false,
            mode: config.start_mode,
            bindings: BindingsConfig::default(),
            tracker: RoleTracker::new(config.tracker.clone()),
            rules: [RuleClassifier::new(), RuleClassifier::new()],
            learner,
            machines: ModeMachines {
                pointer: PointerMapper::new(config.pointer.clone()),
                ..ModeMachines::default()
            },
            menu: ModeMenu::default(),
            lock: LockToggle::default(),
            last_cursor: None,
            last_frame: None,
            fps: 0.0,
            menu_events: Vec::new(),
            status: Arc::new(Mutex::new(Status::default())),
            config,
        };
        controller.apply_bindings();
        controller.publish(&FrameInput::default());
        log::info!(
            "controller ready: mode {}, profile {}, enabled {}",
            controller.mode,
            controller.learner.profile(),
            controller.enabled
        );
        controller
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn bindings(&self) -> &BindingsConfig {
        &self.bindings
    }

    pub fn machines(&self) -> &ModeMachines {
        &self.machines
    }

    pub fn learner(&self) -> &AdaptiveClassifier {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut AdaptiveClassifier {
        &mut self.learner
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Shared handle other threads can read the latest [`Status`] from.
    pub fn status_handle(&self) -> Arc<Mutex<Status>> {
        Arc::clone(&self.status)
    }

    pub fn status(&self) -> Status {
        self.status_guard().clone()
    }

    /// Menu transitions since the last call, oldest first.
    pub fn take_menu_events(&mut self) -> Vec<MenuEvent> {
        std::mem::take(&mut self.menu_events)
    }

    fn status_guard(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time base for commands: the latest frame's timestamp, or the wall clock before any frame.
    fn clock(&self) -> Instant {
        self.last_frame.unwrap_or_else(Instant::now)
    }

    /// Runs one frame and returns the intents handed to the sink.
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> Vec<ActionIntent> {
        let now = frame.timestamp;
        self.tick_fps(now);
        self.learner.poll_training();

        let mut input = self.observe(now, &frame.hands);
        self.learner.tick_capture(
            now,
            input.primary.as_ref().map(|h| &h.skeleton),
            input.secondary.as_ref().map(|h| &h.skeleton),
        );
        self.apply_cursor_grace(now, &mut input);

        let intents = self.route(now, &input);
        self.emit(&intents);
        self.publish(&input);
        intents
    }

    fn tick_fps(&mut self, now: Instant) {
        let Some(prev) = self.last_frame.replace(now) else {
            return;
        };
        let dt = now.saturating_duration_since(prev).as_secs_f32();
        if dt <= f32::EPSILON {
            return;
        }
        let instant = 1.0 / dt;
        self.fps = if self.fps <= 0.0 {
            instant
        } else {
            FPS_SMOOTHING * self.fps + (1.0 - FPS_SMOOTHING) * instant
        };
    }

    /// Assigns roles, then classifies each present hand under its machine role.
    fn observe(&mut self, now: Instant, hands: &[HandSkeleton]) -> FrameInput {
        let packs: Vec<HandPack> = hands
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, skeleton)| HandPack::from_skeleton(skeleton, GestureLabel::None, i))
            .collect();
        let assignment = self.tracker.update(now, packs.clone());
        let (cursor, other) = match self.config.cursor_hand {
            HandRole::Primary => (assignment.primary, assignment.secondary),
            HandRole::Secondary => (assignment.secondary, assignment.primary),
        };

        // A slot kept from an earlier frame has no skeleton this frame.
        let mut present = |role: HandRole, slot: Option<HandPack>| {
            let found = slot
                .filter(|pack| packs.contains(pack))
                .and_then(|pack| hands.get(pack.source).map(|skeleton| (pack.centroid, skeleton)));
            match found {
                Some((centroid, skeleton)) => Some(self.classify(role, centroid, skeleton)),
                None => {
                    self.rules[role_index(role)].reset();
                    None
                }
            }
        };
        let primary = present(HandRole::Primary, cursor);
        let secondary = present(HandRole::Secondary, other);

        FrameInput {
            primary,
            secondary,
            hand_count: packs.len(),
        }
    }

    fn classify(&mut self, role: HandRole, centroid: (f32, f32), skeleton: &HandSkeleton) -> HandObservation {
        let threshold = pinch_threshold_from_ratio(skeleton, self.learner.pinch_ratio_threshold(role));
        let rule = self.rules[role_index(role)].classify(Some(skeleton), threshold);
        HandObservation {
            label: self.adaptive_override(role, skeleton, rule),
            centroid,
            skeleton: skeleton.clone(),
        }
    }

    /// The learned label wins only outside rule-only modes, never over a rule pinch, and only when
    /// it names a bindable gesture.
    fn adaptive_override(&self, role: HandRole, skeleton: &HandSkeleton, rule: GestureLabel) -> GestureLabel {
        if self.mode.rule_labels_only() || rule == GestureLabel::PinchIndex {
            return rule;
        }
        self.learner
            .predict(role, skeleton)
            .and_then(|prediction| prediction.label.parse::<GestureLabel>().ok())
            .filter(|label| label.is_bindable() && !label.is_none())
            .unwrap_or(rule)
    }

    fn apply_cursor_grace(&mut self, now: Instant, input: &mut FrameInput) {
        if let Some(hand) = &input.primary {
            self.last_cursor = Some((now, hand.clone()));
            return;
        }
        match self.last_cursor.take() {
            Some((seen, hand)) if now.saturating_duration_since(seen) <= CURSOR_GRACE => {
                input.primary = Some(hand.clone());
                self.last_cursor = Some((seen, hand));
            }
            _ => {}
        }
    }

    fn route(&mut self, now: Instant, input: &FrameInput) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        if !self.enabled {
            self.lock.reset();
            out.extend(self.machines.reset_all());
            return out;
        }

        let lock_watch = self.locked || (self.mode == Mode::Mouse && !self.menu.is_open());
        if !lock_watch {
            self.lock.reset();
        } else if self.lock.update(now, input) {
            self.set_locked(!self.locked, &mut out);
        }

        if !self.locked {
            if let Some(event) = self.menu.update(now, self.mode, input) {
                if let MenuEvent::Confirmed(mode) = event {
                    self.switch_mode(mode, &mut out);
                }
                self.menu_events.push(event);
            }
        }

        // Both fists belong to the menu, from the first frame of the hold.
        let reserved = self.menu.is_open() || self.menu.arming() || input.both(GestureLabel::Fist);
        if self.locked || reserved {
            out.extend(self.machines.reset_all());
        } else {
            out.extend(self.machines.update(self.mode, now, input));
        }
        out
    }

    fn emit(&mut self, intents: &[ActionIntent]) {
        for intent in intents {
            if let Err(err) = self.sink.emit(intent) {
                log::warn!("failed to inject {intent:?}: {err:?}");
            }
        }
    }

    fn close_menu(&mut self) {
        if let Some(event) = self.menu.reset() {
            self.menu_events.push(event);
        }
    }

    fn set_locked(&mut self, locked: bool, out: &mut Vec<ActionIntent>) {
        if locked == self.locked {
            return;
        }
        self.locked = locked;
        log::info!("input {}", if locked { "locked" } else { "unlocked" });
        if locked {
            out.extend(self.machines.reset_all());
            self.close_menu();
        }
    }

    fn switch_mode(&mut self, mode: Mode, out: &mut Vec<ActionIntent>) {
        if mode == self.mode {
            return;
        }
        log::info!("mode {} -> {mode}", self.mode);
        out.extend(self.machines.reset_all());
        self.mode = mode;
    }

    fn apply_bindings(&mut self) {
        self.machines.apply_bindings(&self.bindings);
        self.lock.set_gesture(self.bindings.mouse().lock_toggle);
    }

    fn update_settings(&mut self, settings: &Value) {
        self.bindings.merge(settings);
        self.apply_bindings();
        let gain = SETTINGS_GAIN_KEYS
            .iter()
            .find_map(|key| settings.get(*key))
            .and_then(Value::as_f64);
        if let Some(gain) = gain {
            self.machines.pointer.set_gain(gain as f32);
            log::info!("control gain set to {:.2}", self.machines.pointer.config().gain);
        }
    }

    /// Applies one inbound command between frames and returns any release intents it caused.
    pub fn apply_command(&mut self, command: Command) -> Vec<ActionIntent> {
        let now = self.clock();
        let mut out = Vec::new();
        match command {
            Command::Enable => {
                self.enabled = true;
                self.locked = false;
                log::info!("gesture control enabled");
            }
            Command::Disable => {
                self.enabled = false;
                out.extend(self.machines.reset_all());
                self.close_menu();
                log::info!("gesture control disabled");
            }
            Command::SetMode { mode } => match mode.parse::<Mode>() {
                Ok(mode) => {
                    self.close_menu();
                    self.switch_mode(mode, &mut out);
                }
                Err(err) => log::warn!("ignoring SET_MODE: {err}"),
            },
            Command::UpdateSettings { settings } => self.update_settings(&settings),
            Command::SetLock { locked } => self.set_locked(locked, &mut out),
            Command::TrainCapture { payload } => {
                let role = payload.hand.parse::<HandRole>().unwrap_or_else(|err| {
                    log::warn!("capture hand defaults to cursor: {err}");
                    HandRole::Primary
                });
                let seconds = if payload.seconds.is_finite() {
                    payload.seconds.clamp(0.0, MAX_CAPTURE_SECS)
                } else {
                    0.0
                };
                self.learner.start_capture(
                    now,
                    role,
                    &payload.label,
                    Duration::from_secs_f32(seconds),
                    payload.hz,
                );
            }
            Command::TrainTrain => {
                if !self.learner.spawn_training() {
                    log::info!("training already in flight");
                }
            }
            Command::TrainEnable { enabled } => {
                self.learner.set_enabled(enabled);
                if let Err(err) = self.learner.save() {
                    log::warn!("failed to save profile {}: {err}", self.learner.profile());
                }
            }
            Command::TrainReset => {
                if let Err(err) = self.learner.reset() {
                    log::warn!("failed to reset profile {}: {err}", self.learner.profile());
                }
            }
            Command::TrainRollback => {
                if let Err(err) = self.learner.rollback() {
                    log::warn!("rollback failed: {err}");
                }
            }
            Command::TrainSetProfile { payload } => self.learner.set_profile(&payload.profile),
            Command::TrainProfileCreate { payload } => {
                match self.learner.create_profile(&payload.profile, payload.copy, payload.switch) {
                    Ok(slug) => log::info!("created profile {slug}"),
                    Err(err) => log::warn!("failed to create profile {}: {err}", payload.profile),
                }
            }
            Command::TrainProfileDelete { payload } => {
                if let Err(err) = self.learner.delete_profile(&payload.profile) {
                    log::warn!("failed to delete profile {}: {err}", payload.profile);
                }
            }
            Command::TrainProfileRename { payload } => {
                if let Err(err) = self.learner.rename_profile(&payload.from, &payload.to) {
                    log::warn!("failed to rename profile {} to {}: {err}", payload.from, payload.to);
                }
            }
        }
        self.emit(&out);
        let (primary, secondary) = {
            let status = self.status_guard();
            (status.primary_label, status.secondary_label)
        };
        self.publish_labels(primary, secondary);
        out
    }

    /// Releases anything held, waits for an in-flight training run and saves the profile.
    pub fn shutdown(&mut self) {
        let released = self.machines.reset_all();
        self.emit(&released);
        self.learner.wait_for_training();
        if let Err(err) = self.learner.save() {
            log::warn!("failed to save profile {} on shutdown: {err}", self.learner.profile());
        }
    }

    fn publish(&self, input: &FrameInput) {
        self.publish_labels(input.primary_label(), input.secondary_label());
    }

    fn publish_labels(&self, primary_label: GestureLabel, secondary_label: GestureLabel) {
        let snapshot = Status {
            enabled: self.enabled,
            mode: self.mode,
            locked: self.locked,
            menu_open: self.menu.is_open(),
            menu_selection: self.menu.selected(),
            primary_label,
            secondary_label,
            fps: self.fps,
            profile: self.learner.profile().to_string(),
            learner_enabled: self.learner.is_enabled(),
            training: self.learner.training_in_flight(),
            capturing: self.learner.capture().is_some(),
            sample_counts: self.learner.counts(),
        };
        *self.status_guard() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        gesture::fixtures,
        modes::testing::ms,
        types::MouseButton,
    };

    fn controller(dir: &tempfile::TempDir) -> Controller<Vec<ActionIntent>> {
        let config = AgentConfig {
            profile_dir: dir.path().to_path_buf(),
            start_enabled: true,
            ..AgentConfig::default()
        };
        Controller::new(config, Vec::new())
    }

    fn frame(t0: Instant, millis: u64, hands: Vec<HandSkeleton>) -> LandmarkFrame {
        LandmarkFrame::new(hands, ms(t0, millis))
    }

    fn at(skeleton: HandSkeleton, x: f32, y: f32) -> HandSkeleton {
        fixtures::placed(skeleton, x, y)
    }

    /// Feeds the same hands every 33 ms over `[from, to)` and collects the emitted intents.
    fn drive(
        c: &mut Controller<Vec<ActionIntent>>,
        t0: Instant,
        from: u64,
        to: u64,
        hands: impl Fn() -> Vec<HandSkeleton>,
    ) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        let mut t = from;
        while t < to {
            out.extend(c.process_frame(&frame(t0, t, hands())));
            t += 33;
        }
        out
    }

    #[test]
    fn open_palm_moves_the_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let t0 = Instant::now();
        let out = drive(&mut c, t0, 0, 200, || vec![at(fixtures::open_palm(), 0.5, 0.6)]);
        assert!(!out.is_empty());
        assert!(out.iter().all(|i| matches!(i, ActionIntent::PointerMove { .. })));
        assert_eq!(c.sink().len(), out.len());
        assert_eq!(c.status().primary_label, GestureLabel::OpenPalm);
    }

    #[test]
    fn disabled_controller_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        c.apply_command(Command::Disable);
        let t0 = Instant::now();
        assert!(drive(&mut c, t0, 0, 500, || vec![at(fixtures::open_palm(), 0.5, 0.6)]).is_empty());
        assert!(!c.status().enabled);
    }

    #[test]
    fn long_pinch_drags_and_disable_releases() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let t0 = Instant::now();
        let out = drive(&mut c, t0, 0, 500, || vec![at(fixtures::pinch(), 0.5, 0.6)]);
        assert!(out.contains(&ActionIntent::MouseDown { button: MouseButton::Left }));
        let released = c.apply_command(Command::Disable);
        assert_eq!(released, vec![ActionIntent::MouseUp { button: MouseButton::Left }]);
    }

    #[test]
    fn fist_hold_locks_and_suppresses_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let t0 = Instant::now();
        drive(&mut c, t0, 0, 2100, || vec![at(fixtures::fist(), 0.5, 0.5)]);
        assert!(c.is_locked());
        let out = drive(&mut c, t0, 2100, 2600, || vec![at(fixtures::open_palm(), 0.5, 0.6)]);
        assert!(out.is_empty());
        assert!(c.status().locked);
    }

    #[test]
    fn both_fists_open_menu_and_palms_confirm() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let t0 = Instant::now();
        let fists = || vec![at(fixtures::fist(), 0.3, 0.5), at(fixtures::fist(), 0.7, 0.5)];
        let out = drive(&mut c, t0, 0, 800, fists);
        assert!(out.is_empty());
        assert!(c.status().menu_open);

        // The cursor hand is the right-hand slot by default; pinch it to step forward once.
        drive(&mut c, t0, 800, 850, || {
            vec![at(fixtures::open_palm(), 0.3, 0.5), at(fixtures::pinch(), 0.7, 0.5)]
        });
        drive(&mut c, t0, 850, 1300, || {
            vec![at(fixtures::open_palm(), 0.3, 0.5), at(fixtures::open_palm(), 0.7, 0.5)]
        });
        assert_eq!(c.mode(), Mode::Keyboard);
        let events = c.take_menu_events();
        assert_eq!(events.first(), Some(&MenuEvent::Opened(Mode::Mouse)));
        assert_eq!(events.last(), Some(&MenuEvent::Confirmed(Mode::Keyboard)));
    }

    #[test]
    fn set_mode_accepts_aliases_and_ignores_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        c.apply_command(Command::SetMode { mode: "ppt".into() });
        assert_eq!(c.mode(), Mode::Presentation);
        c.apply_command(Command::SetMode { mode: "paint".into() });
        assert_eq!(c.mode(), Mode::Draw);
        c.apply_command(Command::SetMode { mode: "juggle".into() });
        assert_eq!(c.mode(), Mode::Draw);
        assert_eq!(c.status().mode, Mode::Draw);
    }

    #[test]
    fn update_settings_merges_bindings_and_gain() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        c.apply_command(Command::UpdateSettings {
            settings: json!({
                "control_gain": 9.0,
                "bindings": {"MOUSE": {"RIGHT_CLICK": "FIST", "MOVE": "BOGUS"}}
            }),
        });
        assert_eq!(c.machines().pointer.config().gain, 4.0);
        assert_eq!(c.bindings().mouse().right_click, GestureLabel::Fist);
        assert_eq!(c.bindings().mouse().move_gesture, GestureLabel::OpenPalm);
    }

    #[test]
    fn cursor_loss_grace_keeps_drag_alive() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let t0 = Instant::now();
        drive(&mut c, t0, 0, 500, || vec![at(fixtures::pinch(), 0.5, 0.6)]);
        // A 200 ms dropout is bridged.
        let bridged = drive(&mut c, t0, 500, 700, Vec::new);
        assert!(!bridged.contains(&ActionIntent::MouseUp { button: MouseButton::Left }));
        let resumed = drive(&mut c, t0, 700, 800, || vec![at(fixtures::pinch(), 0.5, 0.6)]);
        assert!(!resumed.contains(&ActionIntent::MouseUp { button: MouseButton::Left }));
        // A longer one releases the button.
        let lost = drive(&mut c, t0, 800, 1300, Vec::new);
        assert!(lost.contains(&ActionIntent::MouseUp { button: MouseButton::Left }));
    }

    #[test]
    fn failing_sink_does_not_stop_the_loop() {
        struct Broken;
        impl InputSink for Broken {
            fn emit(&mut self, _intent: &ActionIntent) -> anyhow::Result<()> {
                anyhow::bail!("injector offline")
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            profile_dir: dir.path().to_path_buf(),
            start_enabled: true,
            ..AgentConfig::default()
        };
        let mut c = Controller::new(config, Broken);
        let t0 = Instant::now();
        let mut t = 0;
        while t < 200 {
            c.process_frame(&frame(t0, t, vec![at(fixtures::open_palm(), 0.5, 0.6)]));
            t += 33;
        }
        assert!(c.status().fps > 25.0);
    }

    #[test]
    fn profile_commands_switch_the_learner() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        c.apply_command(Command::parse(r#"{"type":"TRAIN_PROFILE_CREATE","payload":{"profile":"Alice"}}"#).unwrap());
        assert_eq!(c.status().profile, "alice");
        c.apply_command(Command::parse(r#"{"type":"TRAIN_PROFILE_DELETE","payload":{"profile":"alice"}}"#).unwrap());
        assert_eq!(c.status().profile, "default");
        c.apply_command(Command::TrainEnable { enabled: true });
        assert!(c.status().learner_enabled);
    }
}
