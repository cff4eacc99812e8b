//! Per-user adaptive gesture classifier: sample capture, training, profiles and rollback.

mod bundle;
mod calibration;
mod capture;
mod mlp;
mod model;
mod proto;
mod store;

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use rayon::prelude::*;

pub use self::{
    bundle::{Bundle, HandBundle, LEGACY_SCHEMA, SCHEMA},
    calibration::{DEFAULT_PINCH_RATIO, PinchCalibration},
    capture::{CaptureSession, CaptureStep, DEFAULT_CAPTURE, DEFAULT_RATE_HZ},
    mlp::{MlpModel, MlpRecord, TrainParams},
    model::{Fallback, GestureModel, Gated, Prediction},
    proto::{Prototype, PrototypeModel},
    store::{DEFAULT_PROFILE, ProfileStore, sanitize_profile},
};
use crate::{
    error::ProfileError,
    gesture::{FeatureVector, extract_features, pinch_ratio},
    types::{GestureLabel, HandRole, HandSkeleton},
};

pub const MAX_SAMPLES_PER_LABEL: usize = 900;
pub const MIN_SAMPLES: usize = 10;
pub const MIN_CONFIDENCE: f32 = 0.70;

type SampleSet = BTreeMap<String, VecDeque<FeatureVector>>;

#[derive(Clone, Debug)]
pub struct LearnerConfig {
    pub min_samples: usize,
    pub min_conf: f32,
    pub max_samples_per_label: usize,
    pub use_mlp: bool,
    pub train: TrainParams,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            min_conf: MIN_CONFIDENCE,
            max_samples_per_label: MAX_SAMPLES_PER_LABEL,
            use_mlp: true,
            train: TrainParams::default(),
        }
    }
}

/// Trained state for one hand role.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleModels {
    pub mlp: Option<MlpModel>,
    pub prototypes: PrototypeModel,
    pub pinch_ratio_threshold: f32,
}

impl Default for RoleModels {
    fn default() -> Self {
        Self {
            mlp: None,
            prototypes: PrototypeModel::default(),
            pinch_ratio_threshold: DEFAULT_PINCH_RATIO,
        }
    }
}

impl RoleModels {
    /// Network when trained, otherwise prototypes.
    pub fn model(&self) -> Fallback<Option<&MlpModel>, &PrototypeModel> {
        Fallback {
            preferred: self.mlp.as_ref(),
            fallback: &self.prototypes,
        }
    }

    fn from_hand_bundle(role: HandRole, hand: &HandBundle) -> Self {
        let mlp = hand.mlp.as_ref().and_then(|record| {
            MlpModel::from_record(record)
                .inspect_err(|err| log::warn!("dropping {} network: {err}", role.as_str()))
                .ok()
        });
        Self {
            mlp,
            prototypes: PrototypeModel::from_prototypes(hand.prototypes.clone()),
            pinch_ratio_threshold: hand.pinch_ratio_threshold,
        }
    }

    fn to_hand_bundle(&self) -> HandBundle {
        HandBundle {
            pinch_ratio_threshold: self.pinch_ratio_threshold,
            mlp: self.mlp.as_ref().map(MlpModel::to_record),
            prototypes: self.prototypes.prototypes().clone(),
        }
    }
}

/// Everything a training run needs, detached from the live classifier.
#[derive(Clone, Debug)]
struct TrainingJob {
    samples: BTreeMap<HandRole, SampleSet>,
    calibration: BTreeMap<HandRole, PinchCalibration>,
    previous_thresholds: BTreeMap<HandRole, f32>,
    config: LearnerConfig,
}

#[derive(Debug)]
struct TrainingOutcome {
    generation: u64,
    models: BTreeMap<HandRole, RoleModels>,
}

impl TrainingJob {
    fn run(self) -> BTreeMap<HandRole, RoleModels> {
        HandRole::ALL
            .par_iter()
            .map(|&role| (role, self.train_role(role)))
            .collect()
    }

    fn train_role(&self, role: HandRole) -> RoleModels {
        let empty = SampleSet::new();
        let samples = self.samples.get(&role).unwrap_or(&empty);
        let min = self.config.min_samples;

        let prototypes = PrototypeModel::fit(samples, min);
        let mlp = if self.config.use_mlp {
            MlpModel::fit(samples, &training_labels(samples, min), &self.config.train)
        } else {
            None
        };
        let pinch_ratio_threshold = self
            .calibration
            .get(&role)
            .and_then(PinchCalibration::threshold)
            .or_else(|| self.previous_thresholds.get(&role).copied())
            .unwrap_or(DEFAULT_PINCH_RATIO);

        log::info!(
            "trained {} hand: {} prototypes, network {}",
            role.as_str(),
            prototypes.prototypes().len(),
            mlp.as_ref()
                .map_or("skipped".to_string(), |m| format!("over {} labels", m.labels().len()))
        );

        RoleModels {
            mlp,
            prototypes,
            pinch_ratio_threshold,
        }
    }
}

/// Bootstrap labels first in their fixed order, then any other qualifying label.
fn training_labels(samples: &SampleSet, min_samples: usize) -> Vec<String> {
    let qualifies = |label: &str| samples.get(label).is_some_and(|v| v.len() >= min_samples.max(1));
    let mut labels: Vec<String> = GestureLabel::BOOTSTRAP
        .iter()
        .map(|l| l.as_str().to_string())
        .filter(|l| qualifies(l))
        .collect();
    for label in samples.keys() {
        if !labels.contains(label) && qualifies(label) {
            labels.push(label.clone());
        }
    }
    labels
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

pub struct AdaptiveClassifier {
    store: ProfileStore,
    profile: String,
    config: LearnerConfig,
    enabled: bool,
    samples: BTreeMap<HandRole, SampleSet>,
    calibration: BTreeMap<HandRole, PinchCalibration>,
    models: BTreeMap<HandRole, RoleModels>,
    last_trained_unix: Option<f64>,
    capture: Option<CaptureSession>,
    training: Option<Receiver<TrainingOutcome>>,
    /// Bumped whenever trained state is replaced outside of training; stale runs are discarded.
    generation: u64,
}

impl AdaptiveClassifier {
    /// Opens `profile` from `store`, keeping defaults if it is missing or unreadable.
    pub fn open(store: ProfileStore, profile: &str, config: LearnerConfig) -> Self {
        let mut learner = Self {
            store,
            profile: sanitize_profile(profile),
            config,
            enabled: false,
            samples: BTreeMap::new(),
            calibration: BTreeMap::new(),
            models: BTreeMap::new(),
            last_trained_unix: None,
            capture: None,
            training: None,
            generation: 0,
        };
        learner.load();
        learner
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn last_trained_unix(&self) -> Option<f64> {
        self.last_trained_unix
    }

    pub fn models(&self, role: HandRole) -> Option<&RoleModels> {
        self.models.get(&role)
    }

    pub fn pinch_ratio_threshold(&self, role: HandRole) -> f32 {
        self.models
            .get(&role)
            .map_or(DEFAULT_PINCH_RATIO, |m| m.pinch_ratio_threshold)
    }

    pub fn counts(&self) -> BTreeMap<HandRole, BTreeMap<String, usize>> {
        self.samples
            .iter()
            .map(|(role, set)| {
                (
                    *role,
                    set.iter().map(|(label, v)| (label.clone(), v.len())).collect(),
                )
            })
            .collect()
    }

    pub fn has_backup(&self) -> bool {
        self.store.has_backup(&self.profile)
    }

    pub fn add_sample(&mut self, role: HandRole, label: &str, skeleton: &HandSkeleton) {
        let label = label.trim().to_ascii_uppercase();
        let ring = self
            .samples
            .entry(role)
            .or_default()
            .entry(label.clone())
            .or_default();
        ring.push_back(extract_features(skeleton));
        while ring.len() > self.config.max_samples_per_label {
            ring.pop_front();
        }

        if let Some(ratio) = pinch_ratio(skeleton) {
            let is_pinch = label == GestureLabel::PinchIndex.as_str();
            self.calibration.entry(role).or_default().push(is_pinch, ratio);
        }
    }

    pub fn start_capture(
        &mut self,
        now: Instant,
        role: HandRole,
        label: &str,
        duration: Duration,
        rate_hz: u32,
    ) {
        log::info!(
            "capturing {label} for {} hand ({:.1}s at {rate_hz} Hz)",
            role.as_str(),
            duration.as_secs_f32()
        );
        self.capture = Some(CaptureSession::new(now, role, label, duration, rate_hz));
    }

    pub fn capture(&self) -> Option<&CaptureSession> {
        self.capture.as_ref()
    }

    /// Called every frame; samples only when the session's next deadline has passed.
    pub fn tick_capture(
        &mut self,
        now: Instant,
        primary: Option<&HandSkeleton>,
        secondary: Option<&HandSkeleton>,
    ) {
        let Some(session) = self.capture.as_mut() else {
            return;
        };
        match session.step(now) {
            CaptureStep::Finished => {
                log::info!(
                    "capture of {} finished with {} samples",
                    session.label,
                    session.collected()
                );
                self.capture = None;
            }
            CaptureStep::Wait => {}
            CaptureStep::Sample => {
                let skeleton = match session.role {
                    HandRole::Primary => primary,
                    HandRole::Secondary => secondary,
                };
                if let Some(skeleton) = skeleton {
                    session.record_sample();
                    let (role, label) = (session.role, session.label.clone());
                    self.add_sample(role, &label, skeleton);
                }
            }
        }
    }

    /// Gated prediction for `role`; `None` when disabled, untrained, or not confident.
    pub fn predict(&self, role: HandRole, skeleton: &HandSkeleton) -> Option<Prediction> {
        if !self.enabled {
            return None;
        }
        let models = self.models.get(&role)?;
        let features = extract_features(skeleton);
        Gated {
            inner: models.model(),
            min_conf: self.config.min_conf,
        }
        .predict(&features)
    }

    fn job(&self) -> TrainingJob {
        TrainingJob {
            samples: self.samples.clone(),
            calibration: self.calibration.clone(),
            previous_thresholds: self
                .models
                .iter()
                .map(|(role, m)| (*role, m.pinch_ratio_threshold))
                .collect(),
            config: self.config.clone(),
        }
    }

    fn backup_before_train(&self) {
        if let Err(err) = self.store.backup(&self.profile) {
            log::warn!("failed to back up profile {}: {err}", self.profile);
        }
    }

    fn install(&mut self, models: BTreeMap<HandRole, RoleModels>) {
        self.models = models;
        self.last_trained_unix = Some(unix_now());
        if let Err(err) = self.save() {
            log::warn!("failed to save profile {}: {err}", self.profile);
        }
    }

    /// Backs up the current bundle, trains on the calling thread, then saves.
    pub fn train(&mut self) {
        self.backup_before_train();
        let models = self.job().run();
        self.install(models);
    }

    /// Starts training on a worker thread. Returns `false` if a run is already in flight.
    pub fn spawn_training(&mut self) -> bool {
        if self.training.is_some() {
            return false;
        }
        self.backup_before_train();
        let job = self.job();
        let generation = self.generation;
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let models = job.run();
            let _ = tx.send(TrainingOutcome { generation, models });
        });
        self.training = Some(rx);
        true
    }

    pub fn training_in_flight(&self) -> bool {
        self.training.is_some()
    }

    /// Installs a finished background run. Returns `true` when new models were swapped in.
    pub fn poll_training(&mut self) -> bool {
        let Some(rx) = self.training.as_ref() else {
            return false;
        };
        match rx.try_recv() {
            Ok(outcome) => {
                self.training = None;
                self.install_outcome(outcome)
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                log::warn!("training worker exited without a result");
                self.training = None;
                false
            }
        }
    }

    /// Blocks until a background run completes, then installs it.
    pub fn wait_for_training(&mut self) -> bool {
        let Some(rx) = self.training.take() else {
            return false;
        };
        match rx.recv() {
            Ok(outcome) => self.install_outcome(outcome),
            Err(_) => {
                log::warn!("training worker exited without a result");
                false
            }
        }
    }

    fn install_outcome(&mut self, outcome: TrainingOutcome) -> bool {
        if outcome.generation != self.generation {
            log::warn!(
                "discarding stale training result for profile {}",
                self.profile
            );
            return false;
        }
        self.install(outcome.models);
        true
    }

    pub fn to_bundle(&self) -> Bundle {
        let mut bundle = Bundle::empty(&self.profile, self.config.min_samples, self.config.min_conf);
        bundle.enabled = self.enabled;
        bundle.last_trained_unix = self.last_trained_unix;
        for (role, models) in &self.models {
            bundle.hands.insert(*role, models.to_hand_bundle());
        }
        bundle
    }

    pub fn save(&self) -> Result<(), ProfileError> {
        self.store.save(&self.profile, &self.to_bundle())
    }

    /// Resets trained state to defaults, then applies the stored bundle if one loads.
    pub fn load(&mut self) {
        self.generation += 1;
        self.models.clear();
        self.last_trained_unix = None;
        let Some(bundle) = self.store.load(&self.profile) else {
            return;
        };
        self.enabled = bundle.enabled;
        self.config.min_samples = bundle.min_samples;
        self.config.min_conf = bundle.min_conf;
        self.last_trained_unix = bundle.last_trained_unix;
        self.models = bundle
            .hands
            .iter()
            .map(|(role, hand)| (*role, RoleModels::from_hand_bundle(*role, hand)))
            .collect();
    }

    fn clear_session(&mut self) {
        self.samples.clear();
        self.calibration.clear();
        self.capture = None;
    }

    /// Saves the active profile, drops in-memory samples and loads `name`.
    pub fn set_profile(&mut self, name: &str) {
        let slug = sanitize_profile(name);
        if slug == self.profile {
            return;
        }
        if let Err(err) = self.save() {
            log::warn!("failed to save profile {} before switching: {err}", self.profile);
        }
        self.clear_session();
        log::info!("switching learner profile {} -> {slug}", self.profile);
        self.profile = slug;
        self.load();
    }

    pub fn create_profile(
        &mut self,
        name: &str,
        copy_from_current: bool,
        switch: bool,
    ) -> Result<String, ProfileError> {
        let slug = sanitize_profile(name);
        if self.store.exists(&slug) {
            return Err(ProfileError::AlreadyExists(slug));
        }
        if copy_from_current {
            self.save()?;
            self.store.copy(&self.profile, &slug)?;
        } else {
            let empty = Bundle::empty(&slug, self.config.min_samples, self.config.min_conf);
            self.store.save(&slug, &empty)?;
        }
        if switch {
            self.set_profile(&slug);
        }
        Ok(slug)
    }

    /// Deletes a profile and its backup; deleting the active one switches to "default" first.
    pub fn delete_profile(&mut self, name: &str) -> Result<bool, ProfileError> {
        let slug = sanitize_profile(name);
        if slug == DEFAULT_PROFILE {
            return Err(ProfileError::ReservedProfile);
        }
        if slug == self.profile {
            self.set_profile(DEFAULT_PROFILE);
        }
        self.store.remove(&slug)
    }

    pub fn rename_profile(&mut self, src: &str, dst: &str) -> Result<(), ProfileError> {
        let src = sanitize_profile(src);
        let dst = sanitize_profile(dst);
        if src == DEFAULT_PROFILE || dst == DEFAULT_PROFILE {
            return Err(ProfileError::ReservedProfile);
        }
        if src == dst {
            return Ok(());
        }
        let active = src == self.profile;
        if active {
            self.save()?;
        }
        self.store.rename(&src, &dst)?;
        if active {
            self.profile = dst;
            self.load();
        }
        Ok(())
    }

    /// Profiles on disk plus "default" and the active profile.
    pub fn list_profiles(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.store.list();
        names.insert(DEFAULT_PROFILE.to_string());
        names.insert(self.profile.clone());
        names.into_iter().collect()
    }

    /// Restores the bundle written before the most recent `train`.
    pub fn rollback(&mut self) -> Result<(), ProfileError> {
        self.store.restore_backup(&self.profile)?;
        self.load();
        log::info!("rolled back profile {}", self.profile);
        Ok(())
    }

    /// Forgets samples and trained models for the active profile.
    pub fn reset(&mut self) -> Result<(), ProfileError> {
        self.generation += 1;
        self.clear_session();
        self.models.clear();
        self.last_trained_unix = None;
        self.save()
    }
}
