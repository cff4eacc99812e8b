//! On-disk profile bundle: a versioned schema plus migration from the legacy `mlp_v1` layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{calibration::DEFAULT_PINCH_RATIO, mlp::MlpRecord, proto::Prototype};
use crate::{error::BundleError, types::HandRole};

pub const SCHEMA: &str = "gesture_bundle_v2";
pub const LEGACY_SCHEMA: &str = "mlp_v1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub schema: String,
    pub profile: String,
    #[serde(default)]
    pub enabled: bool,
    pub min_samples: usize,
    pub min_conf: f32,
    #[serde(default)]
    pub last_trained_unix: Option<f64>,
    #[serde(default)]
    pub hands: BTreeMap<HandRole, HandBundle>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandBundle {
    pub pinch_ratio_threshold: f32,
    /// Absent until a network has been trained for this role.
    #[serde(default)]
    pub mlp: Option<MlpRecord>,
    #[serde(default)]
    pub prototypes: BTreeMap<String, Prototype>,
}

impl Default for HandBundle {
    fn default() -> Self {
        Self {
            pinch_ratio_threshold: DEFAULT_PINCH_RATIO,
            mlp: None,
            prototypes: BTreeMap::new(),
        }
    }
}

impl Bundle {
    pub fn empty(profile: &str, min_samples: usize, min_conf: f32) -> Self {
        Self {
            schema: SCHEMA.to_string(),
            profile: profile.to_string(),
            enabled: false,
            min_samples,
            min_conf,
            last_trained_unix: None,
            hands: HandRole::ALL
                .into_iter()
                .map(|role| (role, HandBundle::default()))
                .collect(),
        }
    }

    pub fn hand(&self, role: HandRole) -> Option<&HandBundle> {
        self.hands.get(&role)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses either schema. A missing `schema` key is treated as legacy.
    pub fn decode(text: &str) -> Result<Self, BundleError> {
        let value: Value = serde_json::from_str(text)?;
        let schema = value
            .get("schema")
            .and_then(Value::as_str)
            .unwrap_or(LEGACY_SCHEMA)
            .to_string();
        match schema.as_str() {
            SCHEMA => Ok(serde_json::from_value(value)?),
            LEGACY_SCHEMA => {
                let legacy: LegacyBundle = serde_json::from_value(value)?;
                Ok(legacy.migrate())
            }
            _ => Err(BundleError::UnsupportedSchema(schema)),
        }
    }
}

#[derive(Deserialize)]
struct LegacyBundle {
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    min_samples: Option<usize>,
    #[serde(default)]
    min_conf: Option<f32>,
    #[serde(default)]
    last_train_ts: Option<f64>,
    #[serde(default)]
    pinch_ratio_thresh: BTreeMap<String, f32>,
    #[serde(default)]
    mlp: BTreeMap<String, LegacyMlp>,
    #[serde(default)]
    proto: BTreeMap<String, BTreeMap<String, Prototype>>,
}

/// Untrained hands were written as `{}`, so every field defaults.
#[derive(Default, Deserialize)]
struct LegacyMlp {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    mean: Vec<f32>,
    #[serde(default)]
    std: Vec<f32>,
    #[serde(rename = "W1", default)]
    w1: Vec<Vec<f32>>,
    #[serde(default)]
    b1: Vec<f32>,
    #[serde(rename = "W2", default)]
    w2: Vec<Vec<f32>>,
    #[serde(default)]
    b2: Vec<f32>,
    #[serde(rename = "W3", default)]
    w3: Vec<Vec<f32>>,
    #[serde(default)]
    b3: Vec<f32>,
}

impl LegacyMlp {
    fn into_record(self) -> Option<MlpRecord> {
        if self.labels.is_empty() {
            return None;
        }
        Some(MlpRecord {
            labels: self.labels,
            mean: self.mean,
            std: self.std,
            w1: self.w1,
            b1: self.b1,
            w2: self.w2,
            b2: self.b2,
            w3: self.w3,
            b3: self.b3,
        })
    }
}

impl LegacyBundle {
    fn migrate(mut self) -> Bundle {
        let defaults = Bundle::empty("default", 10, 0.70);
        let mut hands = BTreeMap::new();
        for (legacy_key, role) in [("cursor", HandRole::Primary), ("other", HandRole::Secondary)] {
            hands.insert(
                role,
                HandBundle {
                    pinch_ratio_threshold: self
                        .pinch_ratio_thresh
                        .get(legacy_key)
                        .copied()
                        .unwrap_or(DEFAULT_PINCH_RATIO),
                    mlp: self
                        .mlp
                        .remove(legacy_key)
                        .and_then(LegacyMlp::into_record),
                    prototypes: self.proto.remove(legacy_key).unwrap_or_default(),
                },
            );
        }
        log::info!("migrated {LEGACY_SCHEMA} profile bundle to {SCHEMA}");
        Bundle {
            schema: SCHEMA.to_string(),
            profile: self.profile.unwrap_or(defaults.profile),
            enabled: self.enabled,
            min_samples: self.min_samples.unwrap_or(defaults.min_samples),
            min_conf: self.min_conf.unwrap_or(defaults.min_conf),
            last_trained_unix: self.last_train_ts,
            hands,
        }
    }
}
