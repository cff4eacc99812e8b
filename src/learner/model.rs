//! Prediction seam shared by the prototype and network backends.

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

pub trait GestureModel {
    /// Best label for a normalized feature vector, with no confidence gating applied.
    fn predict(&self, features: &[f32]) -> Option<Prediction>;

    fn is_trained(&self) -> bool;
}

impl<M: GestureModel + ?Sized> GestureModel for &M {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        (**self).predict(features)
    }

    fn is_trained(&self) -> bool {
        (**self).is_trained()
    }
}

impl<M: GestureModel> GestureModel for Option<M> {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        self.as_ref().and_then(|m| m.predict(features))
    }

    fn is_trained(&self) -> bool {
        self.as_ref().is_some_and(|m| m.is_trained())
    }
}

/// Uses `preferred` whenever it is trained, otherwise `fallback`.
#[derive(Clone, Debug)]
pub struct Fallback<A, B> {
    pub preferred: A,
    pub fallback: B,
}

impl<A: GestureModel, B: GestureModel> GestureModel for Fallback<A, B> {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        if self.preferred.is_trained() {
            self.preferred.predict(features)
        } else {
            self.fallback.predict(features)
        }
    }

    fn is_trained(&self) -> bool {
        self.preferred.is_trained() || self.fallback.is_trained()
    }
}

/// Drops predictions whose confidence is below `min_conf`.
#[derive(Clone, Debug)]
pub struct Gated<M> {
    pub inner: M,
    pub min_conf: f32,
}

impl<M: GestureModel> GestureModel for Gated<M> {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        self.inner
            .predict(features)
            .filter(|p| p.confidence >= self.min_conf)
    }

    fn is_trained(&self) -> bool {
        self.inner.is_trained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<(&'static str, f32)>);

    impl GestureModel for Fixed {
        fn predict(&self, _features: &[f32]) -> Option<Prediction> {
            self.0.map(|(label, confidence)| Prediction {
                label: label.to_string(),
                confidence,
            })
        }

        fn is_trained(&self) -> bool {
            self.0.is_some()
        }
    }

    #[test]
    fn fallback_prefers_trained_backend() {
        let model = Fallback {
            preferred: Fixed(Some(("FIST", 0.9))),
            fallback: Fixed(Some(("OPEN_PALM", 0.99))),
        };
        assert_eq!(model.predict(&[]).map(|p| p.label), Some("FIST".to_string()));
    }

    #[test]
    fn fallback_used_when_preferred_untrained() {
        let model = Fallback {
            preferred: None::<Fixed>,
            fallback: Fixed(Some(("OPEN_PALM", 0.8))),
        };
        assert_eq!(model.predict(&[]).map(|p| p.label), Some("OPEN_PALM".to_string()));
    }

    #[test]
    fn gate_filters_low_confidence() {
        let gated = Gated {
            inner: Fixed(Some(("FIST", 0.69))),
            min_conf: 0.70,
        };
        assert!(gated.predict(&[]).is_none());
        let gated = Gated {
            inner: Fixed(Some(("FIST", 0.70))),
            min_conf: 0.70,
        };
        assert!(gated.predict(&[]).is_some());
    }
}
