//! Small feed-forward classifier trained full-batch with Adam.

use std::collections::{BTreeMap, VecDeque};

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::model::{GestureModel, Prediction};
use crate::{error::BundleError, gesture::FeatureVector};

pub const HIDDEN_1: usize = 128;
pub const HIDDEN_2: usize = 64;
pub const DEFAULT_EPOCHS: usize = 220;
pub const LEARNING_RATE: f32 = 0.01;
pub const INIT_SEED: u64 = 42;

const BETA_1: f32 = 0.9;
const BETA_2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;
const STD_EPS: f32 = 1e-6;

#[derive(Clone, Debug)]
pub struct TrainParams {
    pub epochs: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            learning_rate: LEARNING_RATE,
            seed: INIT_SEED,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MlpModel {
    labels: Vec<String>,
    mean: Array1<f32>,
    /// Per-dimension standard deviation with the epsilon already folded in.
    std: Array1<f32>,
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
    w3: Array2<f32>,
    b3: Array1<f32>,
}

/// Serialized form stored inside profile bundles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MlpRecord {
    pub labels: Vec<String>,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub w1: Vec<Vec<f32>>,
    pub b1: Vec<f32>,
    pub w2: Vec<Vec<f32>>,
    pub b2: Vec<f32>,
    pub w3: Vec<Vec<f32>>,
    pub b3: Vec<f32>,
}

impl MlpModel {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Trains on every vector of the given labels, in label order.
    ///
    /// Returns `None` when fewer than two labels have data.
    pub fn fit(
        samples: &BTreeMap<String, VecDeque<FeatureVector>>,
        labels: &[String],
        params: &TrainParams,
    ) -> Option<Self> {
        let labels: Vec<String> = labels
            .iter()
            .filter(|l| samples.get(*l).is_some_and(|v| !v.is_empty()))
            .cloned()
            .collect();
        if labels.len() < 2 {
            return None;
        }

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for (class, label) in labels.iter().enumerate() {
            for v in &samples[label] {
                rows.extend_from_slice(v);
                targets.push(class);
            }
        }
        let n = targets.len();
        let dim = rows.len() / n;
        let x = Array2::from_shape_vec((n, dim), rows).ok()?;

        let mean = x.mean_axis(Axis(0))?;
        let std = x.std_axis(Axis(0), 0.0) + STD_EPS;
        let xn = (&x - &mean) / &std;

        let k = labels.len();
        let mut onehot = Array2::<f32>::zeros((n, k));
        for (row, &class) in targets.iter().enumerate() {
            onehot[[row, class]] = 1.0;
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut w1 = xavier(&mut rng, dim, HIDDEN_1);
        let mut w2 = xavier(&mut rng, HIDDEN_1, HIDDEN_2);
        let mut w3 = xavier(&mut rng, HIDDEN_2, k);
        let mut b1 = Array1::<f32>::zeros(HIDDEN_1);
        let mut b2 = Array1::<f32>::zeros(HIDDEN_2);
        let mut b3 = Array1::<f32>::zeros(k);

        let mut adam_w1 = Adam::like(&w1);
        let mut adam_b1 = Adam::like(&b1);
        let mut adam_w2 = Adam::like(&w2);
        let mut adam_b2 = Adam::like(&b2);
        let mut adam_w3 = Adam::like(&w3);
        let mut adam_b3 = Adam::like(&b3);

        let lr = params.learning_rate;
        for step in 1..=params.epochs as i32 {
            let z1 = xn.dot(&w1) + &b1;
            let a1 = relu(&z1);
            let z2 = a1.dot(&w2) + &b2;
            let a2 = relu(&z2);
            let probs = softmax_rows(a2.dot(&w3) + &b3);

            let dlogits = (probs - &onehot) / n as f32;
            let dw3 = a2.t().dot(&dlogits);
            let db3 = dlogits.sum_axis(Axis(0));
            let dz2 = dlogits.dot(&w3.t()) * relu_mask(&z2);
            let dw2 = a1.t().dot(&dz2);
            let db2 = dz2.sum_axis(Axis(0));
            let dz1 = dz2.dot(&w2.t()) * relu_mask(&z1);
            let dw1 = xn.t().dot(&dz1);
            let db1 = dz1.sum_axis(Axis(0));

            adam_w1.step(&mut w1, &dw1, lr, step);
            adam_b1.step(&mut b1, &db1, lr, step);
            adam_w2.step(&mut w2, &dw2, lr, step);
            adam_b2.step(&mut b2, &db2, lr, step);
            adam_w3.step(&mut w3, &dw3, lr, step);
            adam_b3.step(&mut b3, &db3, lr, step);
        }

        Some(Self {
            labels,
            mean,
            std,
            w1,
            b1,
            w2,
            b2,
            w3,
            b3,
        })
    }

    fn probabilities(&self, features: &[f32]) -> Option<Array1<f32>> {
        if features.len() != self.mean.len() {
            return None;
        }
        let x = (Array1::from_iter(features.iter().copied()) - &self.mean) / &self.std;
        let a1 = relu(&(x.dot(&self.w1) + &self.b1));
        let a2 = relu(&(a1.dot(&self.w2) + &self.b2));
        let logits = a2.dot(&self.w3) + &self.b3;
        let probs = softmax_rows(logits.insert_axis(Axis(0)));
        Some(probs.row(0).to_owned())
    }

    pub fn to_record(&self) -> MlpRecord {
        MlpRecord {
            labels: self.labels.clone(),
            mean: self.mean.to_vec(),
            std: self.std.to_vec(),
            w1: rows_of(&self.w1),
            b1: self.b1.to_vec(),
            w2: rows_of(&self.w2),
            b2: self.b2.to_vec(),
            w3: rows_of(&self.w3),
            b3: self.b3.to_vec(),
        }
    }

    /// Rebuilds a model, rejecting records whose tensors disagree on shape.
    pub fn from_record(record: &MlpRecord) -> Result<Self, BundleError> {
        let dim = record.mean.len();
        let k = record.labels.len();
        check_len("std", dim, record.std.len())?;
        let w1 = matrix("w1", &record.w1, (dim, HIDDEN_1))?;
        let w2 = matrix("w2", &record.w2, (HIDDEN_1, HIDDEN_2))?;
        let w3 = matrix("w3", &record.w3, (HIDDEN_2, k))?;
        check_len("b1", HIDDEN_1, record.b1.len())?;
        check_len("b2", HIDDEN_2, record.b2.len())?;
        check_len("b3", k, record.b3.len())?;

        Ok(Self {
            labels: record.labels.clone(),
            mean: Array1::from(record.mean.clone()),
            std: Array1::from(record.std.clone()),
            w1,
            b1: Array1::from(record.b1.clone()),
            w2,
            b2: Array1::from(record.b2.clone()),
            w3,
            b3: Array1::from(record.b3.clone()),
        })
    }
}

impl GestureModel for MlpModel {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        let probs = self.probabilities(features)?;
        let (idx, &confidence) = probs
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &f32)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })?;
        Some(Prediction {
            label: self.labels.get(idx)?.clone(),
            confidence,
        })
    }

    fn is_trained(&self) -> bool {
        self.labels.len() >= 2
    }
}

fn xavier(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit))
}

fn relu<D: Dimension>(z: &Array<f32, D>) -> Array<f32, D> {
    z.mapv(|v| v.max(0.0))
}

fn relu_mask<D: Dimension>(z: &Array<f32, D>) -> Array<f32, D> {
    z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

fn softmax_rows(mut z: Array2<f32>) -> Array2<f32> {
    for mut row in z.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    z
}

struct Adam<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Adam<D> {
    fn like(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f32, D>, grad: &Array<f32, D>, lr: f32, t: i32) {
        self.m
            .zip_mut_with(grad, |m, &g| *m = BETA_1 * *m + (1.0 - BETA_1) * g);
        self.v
            .zip_mut_with(grad, |v, &g| *v = BETA_2 * *v + (1.0 - BETA_2) * g * g);
        let m_corr = 1.0 - BETA_1.powi(t);
        let v_corr = 1.0 - BETA_2.powi(t);
        Zip::from(param)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| *p -= lr * (m / m_corr) / ((v / v_corr).sqrt() + ADAM_EPS));
    }
}

fn rows_of(m: &Array2<f32>) -> Vec<Vec<f32>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), BundleError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BundleError::Shape {
            name,
            expected: (expected, 1),
            actual: (actual, 1),
        })
    }
}

fn matrix(
    name: &'static str,
    rows: &[Vec<f32>],
    shape: (usize, usize),
) -> Result<Array2<f32>, BundleError> {
    let cols = rows.first().map_or(0, Vec::len);
    let shape_err = BundleError::Shape {
        name,
        expected: shape,
        actual: (rows.len(), cols),
    };
    if rows.len() != shape.0 || rows.iter().any(|r| r.len() != shape.1) {
        return Err(shape_err);
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec(shape, flat).map_err(|_| shape_err)
}
