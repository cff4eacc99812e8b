use std::collections::VecDeque;

pub const DEFAULT_PINCH_RATIO: f32 = 0.35;
pub const RATIO_BUFFER_CAP: usize = 2000;
pub const MIN_RATIO_SAMPLES: usize = 10;
pub const RATIO_CLAMP: (f32, f32) = (0.12, 0.60);

const POSITIVE_QUANTILE: f32 = 0.85;
const NEGATIVE_QUANTILE: f32 = 0.15;
const MEDIAN_MARGIN: f32 = 1.2;

/// Thumb-index ratios observed while capturing pinch (positive) and everything else (negative).
#[derive(Clone, Debug, Default)]
pub struct PinchCalibration {
    positive: VecDeque<f32>,
    negative: VecDeque<f32>,
}

impl PinchCalibration {
    pub fn push(&mut self, is_pinch: bool, ratio: f32) {
        let buf = if is_pinch {
            &mut self.positive
        } else {
            &mut self.negative
        };
        buf.push_back(ratio);
        while buf.len() > RATIO_BUFFER_CAP {
            buf.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.positive.clear();
        self.negative.clear();
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.positive.len(), self.negative.len())
    }

    /// Calibrated ratio threshold, or `None` while there are too few pinch samples.
    pub fn threshold(&self) -> Option<f32> {
        if self.positive.len() < MIN_RATIO_SAMPLES {
            return None;
        }
        let pos = sorted(&self.positive);
        let raw = if self.negative.len() >= MIN_RATIO_SAMPLES {
            let neg = sorted(&self.negative);
            (quantile(&pos, POSITIVE_QUANTILE) + quantile(&neg, NEGATIVE_QUANTILE)) * 0.5
        } else {
            quantile(&pos, 0.5) * MEDIAN_MARGIN
        };
        Some(raw.clamp(RATIO_CLAMP.0, RATIO_CLAMP.1))
    }
}

fn sorted(values: &VecDeque<f32>) -> Vec<f32> {
    let mut out: Vec<f32> = values.iter().copied().collect();
    out.sort_by(f32::total_cmp);
    out
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f32], q: f32) -> f32 {
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_ten_positives() {
        let mut cal = PinchCalibration::default();
        for _ in 0..9 {
            cal.push(true, 0.2);
        }
        assert_eq!(cal.threshold(), None);
        cal.push(true, 0.2);
        assert!(cal.threshold().is_some());
    }

    #[test]
    fn midpoint_of_quantiles_with_negatives() {
        let mut cal = PinchCalibration::default();
        for i in 0..11 {
            cal.push(true, 0.10 + 0.01 * i as f32);
            cal.push(false, 0.50 + 0.01 * i as f32);
        }
        // q85 of 0.10..=0.20 is 0.185, q15 of 0.50..=0.60 is 0.515.
        let thr = cal.threshold().unwrap();
        assert!((thr - 0.35).abs() < 1e-4, "{thr}");
    }

    #[test]
    fn median_fallback_is_clamped() {
        let mut cal = PinchCalibration::default();
        for _ in 0..10 {
            cal.push(true, 0.05);
        }
        assert_eq!(cal.threshold(), Some(0.12));

        let mut cal = PinchCalibration::default();
        for _ in 0..10 {
            cal.push(true, 0.9);
        }
        assert_eq!(cal.threshold(), Some(0.60));
    }

    #[test]
    fn buffers_are_capped() {
        let mut cal = PinchCalibration::default();
        for _ in 0..RATIO_BUFFER_CAP + 5 {
            cal.push(false, 0.4);
        }
        assert_eq!(cal.counts(), (0, RATIO_BUFFER_CAP));
    }

    #[test]
    fn quantile_interpolates() {
        assert_eq!(quantile(&[0.0, 1.0], 0.5), 0.5);
        assert_eq!(quantile(&[3.0], 0.85), 3.0);
    }
}
