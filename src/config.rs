use std::{env, path::PathBuf, str::FromStr};

use crate::{
    learner::{DEFAULT_PROFILE, LearnerConfig},
    modes::{
        Mode,
        pointer::{GAIN_RANGE, PointerConfig},
    },
    tracker::TrackerConfig,
    types::HandRole,
};

const PROFILE_DIR_NAME: &str = "GestureOS_learner_profiles";

/// Runtime settings for one agent instance.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub profile_dir: PathBuf,
    pub profile: String,
    pub start_enabled: bool,
    pub start_mode: Mode,
    /// Tracker slot whose hand drives the cursor. A lone hand lands in the secondary slot.
    pub cursor_hand: HandRole,
    pub pointer: PointerConfig,
    pub tracker: TrackerConfig,
    pub learner: LearnerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            profile_dir: env::temp_dir().join(PROFILE_DIR_NAME),
            profile: DEFAULT_PROFILE.to_string(),
            start_enabled: false,
            start_mode: Mode::Mouse,
            cursor_hand: HandRole::Secondary,
            pointer: PointerConfig::default(),
            tracker: TrackerConfig::default(),
            learner: LearnerConfig::default(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        log::warn!("ignoring invalid {key}={raw:?}");
    }
    parsed
}

impl AgentConfig {
    /// Defaults overridden by `GESTUREOS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AgentConfig::from_env`] with an explicit variable source. Unparseable values
    /// are logged and leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("GESTUREOS_PROFILE_DIR").filter(|v| !v.trim().is_empty()) {
            config.profile_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GESTUREOS_PROFILE").filter(|v| !v.trim().is_empty()) {
            config.profile = v;
        }
        if let Some(v) = lookup("GESTUREOS_START_ENABLED") {
            match parse_bool(&v) {
                Some(enabled) => config.start_enabled = enabled,
                None => log::warn!("ignoring invalid GESTUREOS_START_ENABLED={v:?}"),
            }
        }
        if let Some(mode) = lookup("GESTUREOS_START_MODE").and_then(|v| parse("GESTUREOS_START_MODE", &v)) {
            config.start_mode = mode;
        }
        if let Some(gain) = lookup("GESTUREOS_CONTROL_GAIN").and_then(|v| parse::<f32>("GESTUREOS_CONTROL_GAIN", &v)) {
            config.pointer.gain = gain.clamp(GAIN_RANGE.0, GAIN_RANGE.1);
        }
        if let Some(alpha) = lookup("GESTUREOS_EMA_ALPHA").and_then(|v| parse::<f32>("GESTUREOS_EMA_ALPHA", &v)) {
            config.pointer.ema_alpha = alpha.clamp(0.01, 1.0);
        }
        if let Some(hz) = lookup("GESTUREOS_MOVE_HZ").and_then(|v| parse::<f32>("GESTUREOS_MOVE_HZ", &v)) {
            config.pointer.move_hz = hz.max(1.0);
        }
        if let Some(role) = lookup("GESTUREOS_CURSOR_HAND").and_then(|v| parse("GESTUREOS_CURSOR_HAND", &v)) {
            config.cursor_hand = role;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with(vars: &[(&str, &str)]) -> AgentConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_overrides() {
        let config = with(&[]);
        assert_eq!(config.profile, "default");
        assert!(!config.start_enabled);
        assert_eq!(config.start_mode, Mode::Mouse);
        assert_eq!(config.cursor_hand, HandRole::Secondary);
        assert!(config.profile_dir.ends_with(PROFILE_DIR_NAME));
    }

    #[test]
    fn overrides_apply_and_clamp() {
        let config = with(&[
            ("GESTUREOS_PROFILE_DIR", "/tmp/profiles"),
            ("GESTUREOS_PROFILE", "alice"),
            ("GESTUREOS_START_ENABLED", "yes"),
            ("GESTUREOS_START_MODE", "ppt"),
            ("GESTUREOS_CONTROL_GAIN", "9"),
            ("GESTUREOS_MOVE_HZ", "120"),
            ("GESTUREOS_CURSOR_HAND", "primary"),
        ]);
        assert_eq!(config.profile_dir, PathBuf::from("/tmp/profiles"));
        assert_eq!(config.profile, "alice");
        assert!(config.start_enabled);
        assert_eq!(config.start_mode, Mode::Presentation);
        assert_eq!(config.pointer.gain, 4.0);
        assert_eq!(config.pointer.move_hz, 120.0);
        assert_eq!(config.cursor_hand, HandRole::Primary);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = with(&[
            ("GESTUREOS_START_ENABLED", "maybe"),
            ("GESTUREOS_START_MODE", "juggle"),
            ("GESTUREOS_EMA_ALPHA", "fast"),
        ]);
        assert!(!config.start_enabled);
        assert_eq!(config.start_mode, Mode::Mouse);
        assert_eq!(config.pointer.ema_alpha, 0.22);
    }
}
