use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::learner::{DEFAULT_CAPTURE, DEFAULT_PROFILE, DEFAULT_RATE_HZ};

fn yes() -> bool {
    true
}

fn default_hand() -> String {
    "cursor".to_string()
}

fn default_label() -> String {
    "OPEN_PALM".to_string()
}

fn default_seconds() -> f32 {
    DEFAULT_CAPTURE.as_secs_f32()
}

fn default_hz() -> u32 {
    DEFAULT_RATE_HZ
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturePayload {
    /// `cursor`/`primary` or `other`/`secondary`.
    #[serde(default = "default_hand")]
    pub hand: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_seconds")]
    pub seconds: f32,
    #[serde(default = "default_hz")]
    pub hz: u32,
}

impl Default for CapturePayload {
    fn default() -> Self {
        Self {
            hand: default_hand(),
            label: default_label(),
            seconds: default_seconds(),
            hz: default_hz(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    #[serde(default = "default_profile", alias = "name")]
    pub profile: String,
}

impl Default for ProfilePayload {
    fn default() -> Self {
        Self {
            profile: default_profile(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateProfilePayload {
    #[serde(alias = "name")]
    pub profile: String,
    #[serde(default = "yes")]
    pub copy: bool,
    #[serde(default = "yes")]
    pub switch: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenamePayload {
    #[serde(alias = "src")]
    pub from: String,
    #[serde(alias = "dst")]
    pub to: String,
}

/// Inbound control messages, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Enable,
    Disable,
    /// Mode names are parsed leniently when applied (`ppt`, `paint`, any case).
    SetMode { mode: String },
    /// A bindings fragment, optionally with `control_gain`.
    UpdateSettings {
        #[serde(default)]
        settings: Value,
    },
    #[serde(alias = "SET_LOCKED")]
    SetLock {
        #[serde(default = "yes", alias = "enabled")]
        locked: bool,
    },
    TrainCapture {
        #[serde(default)]
        payload: CapturePayload,
    },
    TrainTrain,
    TrainEnable {
        #[serde(default = "yes")]
        enabled: bool,
    },
    TrainReset,
    TrainRollback,
    TrainSetProfile {
        #[serde(default)]
        payload: ProfilePayload,
    },
    TrainProfileCreate { payload: CreateProfilePayload },
    TrainProfileDelete { payload: ProfilePayload },
    TrainProfileRename { payload: RenamePayload },
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(Command::parse(r#"{"type":"ENABLE"}"#).unwrap(), Command::Enable);
        assert_eq!(
            Command::parse(r#"{"type":"SET_MODE","mode":"ppt"}"#).unwrap(),
            Command::SetMode { mode: "ppt".into() }
        );
        assert_eq!(
            Command::parse(r#"{"type":"SET_LOCKED","enabled":false}"#).unwrap(),
            Command::SetLock { locked: false }
        );
        assert_eq!(Command::parse(r#"{"type":"SET_LOCK"}"#).unwrap(), Command::SetLock { locked: true });
    }

    #[test]
    fn settings_are_kept_as_json() {
        let cmd = Command::parse(r#"{"type":"UPDATE_SETTINGS","settings":{"control_gain":2.0}}"#).unwrap();
        assert_eq!(
            cmd,
            Command::UpdateSettings {
                settings: json!({"control_gain": 2.0})
            }
        );
    }

    #[test]
    fn train_payloads_default_missing_fields() {
        let cmd = Command::parse(r#"{"type":"TRAIN_CAPTURE","payload":{"label":"FIST"}}"#).unwrap();
        let Command::TrainCapture { payload } = cmd else {
            panic!("wrong command");
        };
        assert_eq!(payload.hand, "cursor");
        assert_eq!(payload.label, "FIST");
        assert_eq!(payload.hz, 15);

        let cmd = Command::parse(r#"{"type":"TRAIN_PROFILE_RENAME","payload":{"src":"a","dst":"b"}}"#).unwrap();
        assert_eq!(
            cmd,
            Command::TrainProfileRename {
                payload: RenamePayload {
                    from: "a".into(),
                    to: "b".into()
                }
            }
        );

        let cmd = Command::parse(r#"{"type":"TRAIN_PROFILE_CREATE","payload":{"profile":"bob","copy":false}}"#).unwrap();
        assert!(matches!(
            cmd,
            Command::TrainProfileCreate { payload } if !payload.copy && payload.switch && payload.profile == "bob"
        ));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(Command::parse(r#"{"type":"SET_PREVIEW","enabled":true}"#).is_err());
        assert!(Command::parse("not json").is_err());
    }
}
