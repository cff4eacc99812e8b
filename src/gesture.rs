use crate::types::{
    FEATURE_LEN, GestureLabel, HandSkeleton, Landmark, LANDMARK_COUNT,
    landmark::{
        INDEX_MCP, INDEX_PIP, INDEX_TIP, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP, PINKY_MCP, PINKY_PIP,
        PINKY_TIP, RING_MCP, RING_PIP, RING_TIP, THUMB_TIP, WRIST,
    },
};

pub const PINCH_DISTANCE: f32 = 0.06;
pub const V_SIGN_MIN_SPREAD: f32 = 0.06;
pub const KNIFE_MAX_TIP_GAP: f32 = 0.055;
pub const KNIFE_MAX_THUMB_GAP: f32 = 0.095;
/// Release threshold multiplier once a pinch is engaged.
pub const PINCH_RELEASE_FACTOR: f32 = 1.25;

const PINCH_THRESHOLD_MIN: f32 = 0.01;
const PINCH_THRESHOLD_MAX: f32 = 0.20;
const DEGENERATE_SCALE: f32 = 1e-6;

const FINGER_TIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
const FINGER_PIPS: [usize; 4] = [INDEX_PIP, MIDDLE_PIP, RING_PIP, PINKY_PIP];
const PALM_JOINTS: [usize; 5] = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];

pub type FeatureVector = [f32; FEATURE_LEN];

/// Wrist-relative, scale-normalized flattening of a skeleton.
pub fn extract_features(skeleton: &HandSkeleton) -> FeatureVector {
    let wrist = skeleton.point(WRIST);
    let mut rel = [[0.0f32; 3]; LANDMARK_COUNT];
    for (dst, p) in rel.iter_mut().zip(skeleton.points()) {
        *dst = [p.x - wrist.x, p.y - wrist.y, p.z - wrist.z];
    }

    let mut scale = norm3(rel[MIDDLE_MCP]);
    if scale < DEGENERATE_SCALE {
        scale = rel.iter().map(|p| norm3(*p)).fold(0.0, f32::max);
        if scale < DEGENERATE_SCALE {
            scale = 1.0;
        }
    }

    let inv = 1.0 / scale;
    let mut out = [0.0f32; FEATURE_LEN];
    for (i, p) in rel.iter().enumerate() {
        out[i * 3] = p[0] * inv;
        out[i * 3 + 1] = p[1] * inv;
        out[i * 3 + 2] = p[2] * inv;
    }
    out
}

/// Classifies with the fixed default pinch distance.
pub fn classify(skeleton: Option<&HandSkeleton>) -> GestureLabel {
    classify_with_pinch(skeleton, PINCH_DISTANCE)
}

/// Ordered geometric predicates on raw image-space points; first match wins.
pub fn classify_with_pinch(skeleton: Option<&HandSkeleton>, pinch_threshold: f32) -> GestureLabel {
    let Some(skeleton) = skeleton else {
        return GestureLabel::None;
    };
    let p = skeleton.points();

    if is_fist(p) {
        GestureLabel::Fist
    } else if is_pinch(p, pinch_threshold) {
        GestureLabel::PinchIndex
    } else if is_v_sign(p) {
        GestureLabel::VSign
    } else if is_knife(p) {
        GestureLabel::Knife
    } else if is_open_palm(p) {
        GestureLabel::OpenPalm
    } else {
        GestureLabel::Other
    }
}

/// Tip above its proximal joint in image space.
pub fn finger_extended(points: &[Landmark], tip: usize, pip: usize) -> bool {
    points[tip].y < points[pip].y
}

fn is_fist(p: &[Landmark]) -> bool {
    FINGER_TIPS
        .iter()
        .zip(FINGER_PIPS)
        .filter(|(tip, pip)| p[**tip].y > p[*pip].y)
        .count()
        >= 3
}

fn is_pinch(p: &[Landmark], threshold: f32) -> bool {
    dist_xy(p[THUMB_TIP], p[INDEX_TIP]) < threshold
}

fn is_open_palm(p: &[Landmark]) -> bool {
    FINGER_TIPS
        .iter()
        .zip(FINGER_PIPS)
        .all(|(tip, pip)| finger_extended(p, *tip, pip))
}

fn is_v_sign(p: &[Landmark]) -> bool {
    let two_finger = finger_extended(p, INDEX_TIP, INDEX_PIP)
        && finger_extended(p, MIDDLE_TIP, MIDDLE_PIP)
        && !finger_extended(p, RING_TIP, RING_PIP)
        && !finger_extended(p, PINKY_TIP, PINKY_PIP);
    two_finger && dist_xy(p[INDEX_TIP], p[MIDDLE_TIP]) > V_SIGN_MIN_SPREAD
}

fn is_knife(p: &[Landmark]) -> bool {
    if !is_open_palm(p) {
        return false;
    }
    let gaps = dist_xy(p[INDEX_TIP], p[MIDDLE_TIP])
        + dist_xy(p[MIDDLE_TIP], p[RING_TIP])
        + dist_xy(p[RING_TIP], p[PINKY_TIP]);
    gaps / 3.0 < KNIFE_MAX_TIP_GAP && dist_xy(p[THUMB_TIP], p[INDEX_MCP]) < KNIFE_MAX_THUMB_GAP
}

/// Average of the wrist and the four knuckles; stable under finger motion.
pub fn palm_center(skeleton: &HandSkeleton) -> (f32, f32) {
    let (sx, sy) = PALM_JOINTS.iter().fold((0.0, 0.0), |(sx, sy), idx| {
        let p = skeleton.point(*idx);
        (sx + p.x, sy + p.y)
    });
    let n = PALM_JOINTS.len() as f32;
    (sx / n, sy / n)
}

/// Wrist to middle-knuckle distance in image units.
pub fn palm_size(skeleton: &HandSkeleton) -> f32 {
    dist_xy(skeleton.point(WRIST), skeleton.point(MIDDLE_MCP))
}

/// Thumb-index tip gap relative to palm size.
pub fn pinch_ratio(skeleton: &HandSkeleton) -> Option<f32> {
    let palm = palm_size(skeleton);
    if palm < DEGENERATE_SCALE {
        return None;
    }
    Some(dist_xy(skeleton.point(THUMB_TIP), skeleton.point(INDEX_TIP)) / palm)
}

/// Converts a calibrated pinch ratio into an absolute image-space threshold for this hand.
pub fn pinch_threshold_from_ratio(skeleton: &HandSkeleton, ratio: f32) -> f32 {
    let palm = palm_size(skeleton);
    if palm < DEGENERATE_SCALE {
        return PINCH_DISTANCE;
    }
    (ratio * palm).clamp(PINCH_THRESHOLD_MIN, PINCH_THRESHOLD_MAX)
}

/// Rule classification for one tracked hand with pinch hysteresis.
#[derive(Debug, Default)]
pub struct RuleClassifier {
    pinch_engaged: bool,
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, skeleton: Option<&HandSkeleton>, pinch_threshold: f32) -> GestureLabel {
        let threshold = if self.pinch_engaged {
            pinch_threshold * PINCH_RELEASE_FACTOR
        } else {
            pinch_threshold
        };
        let label = classify_with_pinch(skeleton, threshold);
        self.pinch_engaged = label == GestureLabel::PinchIndex;
        label
    }

    pub fn reset(&mut self) {
        self.pinch_engaged = false;
    }
}

pub(crate) fn dist_xy(a: Landmark, b: Landmark) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn norm3(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Synthetic skeletons for tests across the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::{HandSkeleton, Landmark, LANDMARK_COUNT};

    const OPEN: [(f32, f32); LANDMARK_COUNT] = [
        (0.50, 0.80),
        (0.44, 0.76),
        (0.40, 0.72),
        (0.37, 0.68),
        (0.34, 0.64),
        (0.44, 0.65),
        (0.42, 0.57),
        (0.41, 0.52),
        (0.40, 0.47),
        (0.49, 0.64),
        (0.49, 0.55),
        (0.49, 0.50),
        (0.49, 0.45),
        (0.54, 0.65),
        (0.55, 0.57),
        (0.56, 0.52),
        (0.57, 0.48),
        (0.58, 0.67),
        (0.60, 0.61),
        (0.61, 0.57),
        (0.62, 0.54),
    ];

    fn build(points: [(f32, f32); LANDMARK_COUNT]) -> [Landmark; LANDMARK_COUNT] {
        points.map(|(x, y)| Landmark::new(x, y, 0.0))
    }

    /// Curls a finger given its pip index: tip and dip drop below the pip.
    fn fold(p: &mut [Landmark; LANDMARK_COUNT], pip: usize) {
        let base = p[pip];
        p[pip + 1] = Landmark::new(base.x, base.y + 0.03, base.z);
        p[pip + 2] = Landmark::new(base.x, base.y + 0.05, base.z);
    }

    pub fn open_palm() -> HandSkeleton {
        HandSkeleton::new(build(OPEN))
    }

    pub fn fist() -> HandSkeleton {
        let mut p = build(OPEN);
        for pip in [6, 10, 14, 18] {
            fold(&mut p, pip);
        }
        HandSkeleton::new(p)
    }

    pub fn v_sign() -> HandSkeleton {
        let mut p = build(OPEN);
        fold(&mut p, 14);
        fold(&mut p, 18);
        HandSkeleton::new(p)
    }

    pub fn pinch() -> HandSkeleton {
        let mut p = build(OPEN);
        p[4] = Landmark::new(0.41, 0.49, 0.0);
        HandSkeleton::new(p)
    }

    pub fn knife() -> HandSkeleton {
        let mut p = build(OPEN);
        p[4] = Landmark::new(0.40, 0.70, 0.0);
        p[8] = Landmark::new(0.45, 0.47, 0.0);
        p[12] = Landmark::new(0.48, 0.45, 0.0);
        p[16] = Landmark::new(0.51, 0.47, 0.0);
        p[20] = Landmark::new(0.54, 0.52, 0.0);
        HandSkeleton::new(p)
    }

    /// Three fingers up, pinky curled: matches no named gesture.
    pub fn other() -> HandSkeleton {
        let mut p = build(OPEN);
        fold(&mut p, 18);
        HandSkeleton::new(p)
    }

    /// Moves the whole hand so its palm centre lands near `(x, y)`.
    pub fn placed(skeleton: HandSkeleton, x: f32, y: f32) -> HandSkeleton {
        let (cx, cy) = super::palm_center(&skeleton);
        skeleton.translated(x - cx, y - cy, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures, *};

    #[test]
    fn fixtures_classify_as_named() {
        assert_eq!(classify(Some(&fixtures::open_palm())), GestureLabel::OpenPalm);
        assert_eq!(classify(Some(&fixtures::fist())), GestureLabel::Fist);
        assert_eq!(classify(Some(&fixtures::v_sign())), GestureLabel::VSign);
        assert_eq!(classify(Some(&fixtures::pinch())), GestureLabel::PinchIndex);
        assert_eq!(classify(Some(&fixtures::knife())), GestureLabel::Knife);
        assert_eq!(classify(Some(&fixtures::other())), GestureLabel::Other);
        assert_eq!(classify(None), GestureLabel::None);
    }

    #[test]
    fn fist_outranks_pinch() {
        let mut p = *fixtures::fist().points();
        p[THUMB_TIP] = Landmark::new(p[INDEX_TIP].x + 0.01, p[INDEX_TIP].y, 0.0);
        let skeleton = HandSkeleton::new(p);
        assert_eq!(classify(Some(&skeleton)), GestureLabel::Fist);
    }

    #[test]
    fn pinch_outranks_v_sign() {
        let mut p = *fixtures::v_sign().points();
        p[THUMB_TIP] = Landmark::new(p[INDEX_TIP].x + 0.01, p[INDEX_TIP].y + 0.01, 0.0);
        let skeleton = HandSkeleton::new(p);
        assert_eq!(classify(Some(&skeleton)), GestureLabel::PinchIndex);
    }

    #[test]
    fn knife_outranks_open_palm() {
        // knife is a strict subset of open palm
        let knife = fixtures::knife();
        assert!(is_open_palm(knife.points()));
        assert_eq!(classify(Some(&knife)), GestureLabel::Knife);
    }

    #[test]
    fn closed_two_finger_is_not_v_sign() {
        let mut p = *fixtures::v_sign().points();
        p[MIDDLE_TIP] = Landmark::new(p[INDEX_TIP].x + 0.02, p[INDEX_TIP].y, 0.0);
        let skeleton = HandSkeleton::new(p);
        assert_eq!(classify(Some(&skeleton)), GestureLabel::Other);
    }

    #[test]
    fn features_are_translation_and_scale_invariant() {
        let base = fixtures::v_sign();
        let reference = extract_features(&base);
        let moved = base.translated(0.13, -0.21, 0.05).scaled(1.7);
        let features = extract_features(&moved);
        for (a, b) in reference.iter().zip(features.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn features_are_deterministic() {
        let skeleton = fixtures::pinch();
        let a = extract_features(&skeleton);
        let b = extract_features(&skeleton);
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn degenerate_scale_falls_back() {
        let flat = HandSkeleton::new([Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT]);
        assert!(extract_features(&flat).iter().all(|v| *v == 0.0));

        let mut p = [Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
        p[INDEX_TIP] = Landmark::new(0.5, 0.3, 0.0);
        let features = extract_features(&HandSkeleton::new(p));
        assert!((features[INDEX_TIP * 3 + 1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn middle_knuckle_normalizes_to_unit_length() {
        let f = extract_features(&fixtures::open_palm());
        let i = MIDDLE_MCP * 3;
        let len = (f[i].powi(2) + f[i + 1].powi(2) + f[i + 2].powi(2)).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
        assert_eq!(&f[0..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn hysteresis_keeps_marginal_pinch_engaged() {
        let mut p = *fixtures::open_palm().points();
        p[THUMB_TIP] = Landmark::new(p[INDEX_TIP].x + 0.05, p[INDEX_TIP].y, 0.0);
        let engage = HandSkeleton::new(p);
        p[THUMB_TIP] = Landmark::new(p[INDEX_TIP].x + 0.07, p[INDEX_TIP].y, 0.0);
        let marginal = HandSkeleton::new(p);

        let mut rule = RuleClassifier::new();
        assert_eq!(rule.classify(Some(&marginal), PINCH_DISTANCE), GestureLabel::OpenPalm);
        assert_eq!(rule.classify(Some(&engage), PINCH_DISTANCE), GestureLabel::PinchIndex);
        assert_eq!(rule.classify(Some(&marginal), PINCH_DISTANCE), GestureLabel::PinchIndex);
    }

    #[test]
    fn pinch_threshold_tracks_palm_size() {
        let skeleton = fixtures::open_palm();
        let palm = palm_size(&skeleton);
        let t = pinch_threshold_from_ratio(&skeleton, 0.35);
        assert!((t - 0.35 * palm).abs() < 1e-6);
        assert_eq!(pinch_threshold_from_ratio(&skeleton, 10.0), PINCH_THRESHOLD_MAX);
    }
}
