use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::model::{GestureModel, Prediction};
use crate::gesture::FeatureVector;

const SIGMA_FLOOR: f32 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub centroid: Vec<f32>,
    pub sigma: f32,
    #[serde(default)]
    pub n: usize,
}

/// Nearest-centroid classifier scored with `exp(-distance / sigma)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrototypeModel {
    prototypes: BTreeMap<String, Prototype>,
}

impl PrototypeModel {
    pub fn from_prototypes(prototypes: BTreeMap<String, Prototype>) -> Self {
        Self { prototypes }
    }

    pub fn prototypes(&self) -> &BTreeMap<String, Prototype> {
        &self.prototypes
    }

    /// Builds one prototype per label holding at least `min_samples` vectors.
    pub fn fit(samples: &BTreeMap<String, VecDeque<FeatureVector>>, min_samples: usize) -> Self {
        let prototypes = samples
            .iter()
            .filter(|(_, vecs)| !vecs.is_empty() && vecs.len() >= min_samples)
            .map(|(label, vecs)| (label.clone(), fit_one(vecs)))
            .collect();
        Self { prototypes }
    }
}

fn fit_one(vecs: &VecDeque<FeatureVector>) -> Prototype {
    let n = vecs.len();
    let mut centroid = vec![0.0f32; vecs[0].len()];
    for v in vecs {
        for (c, x) in centroid.iter_mut().zip(v.iter()) {
            *c += x;
        }
    }
    for c in centroid.iter_mut() {
        *c /= n as f32;
    }

    let mean_sq = vecs
        .iter()
        .map(|v| {
            let d = l2(v, &centroid);
            d * d
        })
        .sum::<f32>()
        / n as f32;

    Prototype {
        centroid,
        sigma: mean_sq.sqrt().max(SIGMA_FLOOR),
        n,
    }
}

pub(crate) fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl GestureModel for PrototypeModel {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        let mut best: Option<Prediction> = None;
        for (label, proto) in &self.prototypes {
            if proto.centroid.len() != features.len() {
                continue;
            }
            let score = (-l2(features, &proto.centroid) / proto.sigma.max(SIGMA_FLOOR)).exp();
            if best.as_ref().is_none_or(|b| score > b.confidence) {
                best = Some(Prediction {
                    label: label.clone(),
                    confidence: score,
                });
            }
        }
        best
    }

    fn is_trained(&self) -> bool {
        !self.prototypes.is_empty()
    }
}
