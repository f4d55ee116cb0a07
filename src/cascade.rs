//! II/V disambiguation.
//!
//! The primary classifier confuses "II" and "V". When it answers "V", a
//! binary classifier is asked again on up to three views of the input, one
//! view per state:
//!
//! ```text
//! Query(Original) --conf > 0.5--> Resolved(II)
//!        |
//!        +--else--> Query(Flipped) --conf <= 0.5--> Resolved(II)
//!                          |
//!                          +--else--> Query(Rotated) --conf > 0.5--> Resolved(V)
//!                                             |
//!                                             +--else--> Resolved(II)
//! ```
//!
//! On the original view the score reads as "probability of II"; on the
//! flipped and rotated views a score above the threshold keeps "V".

use tracing::debug;

use crate::classifier::ClassifierPort;
use crate::error::Result;
use crate::labels::RomanNumeral;
use crate::normalizer::NormalizedTensor;

pub const DECISION_THRESHOLD: f32 = 0.5;
pub const ROTATION_DEGREES: f32 = 45.0;

/// Which view of the input the secondary classifier is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Original,
    Flipped,
    Rotated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeState {
    Query(View),
    Resolved(RomanNumeral),
}

impl CascadeState {
    pub fn start() -> Self {
        CascadeState::Query(View::Original)
    }

    /// Next state after the current view scored `confidence`.
    pub fn next(self, confidence: f32, threshold: f32) -> Self {
        let above = confidence > threshold;
        match self {
            CascadeState::Query(View::Original) if above => {
                CascadeState::Resolved(RomanNumeral::II)
            }
            CascadeState::Query(View::Original) => CascadeState::Query(View::Flipped),
            CascadeState::Query(View::Flipped) if above => CascadeState::Query(View::Rotated),
            CascadeState::Query(View::Flipped) => CascadeState::Resolved(RomanNumeral::II),
            CascadeState::Query(View::Rotated) if above => CascadeState::Resolved(RomanNumeral::V),
            CascadeState::Query(View::Rotated) => CascadeState::Resolved(RomanNumeral::II),
            resolved @ CascadeState::Resolved(_) => resolved,
        }
    }
}

/// One secondary classifier call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub view: View,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub primary: RomanNumeral,
    pub label: RomanNumeral,
    pub verdicts: Vec<Verdict>,
}

impl Resolution {
    fn unchanged(label: RomanNumeral) -> Self {
        Resolution {
            primary: label,
            label,
            verdicts: Vec::new(),
        }
    }

    pub fn overridden(&self) -> bool {
        self.primary != self.label
    }
}

#[derive(Clone, Debug)]
pub struct DisambiguationCascade {
    threshold: f32,
    rotation_degrees: f32,
}

impl Default for DisambiguationCascade {
    fn default() -> Self {
        DisambiguationCascade {
            threshold: DECISION_THRESHOLD,
            rotation_degrees: ROTATION_DEGREES,
        }
    }
}

impl DisambiguationCascade {
    /// Final label for a primary answer of `top`.
    ///
    /// Only "V" is re-examined, and only when a secondary model is loaded.
    pub fn resolve(
        &self,
        top: RomanNumeral,
        tensor: &NormalizedTensor,
        classifiers: &ClassifierPort,
    ) -> Result<Resolution> {
        if top != RomanNumeral::V {
            return Ok(Resolution::unchanged(top));
        }
        if !classifiers.has_secondary() {
            debug!("secondary model unavailable, keeping primary label");
            return Ok(Resolution::unchanged(top));
        }

        let mut resolution = Resolution::unchanged(top);
        let mut state = CascadeState::start();
        while let CascadeState::Query(view) = state {
            let confidence = match view {
                View::Original => classifiers.classify_secondary(tensor)?,
                View::Flipped => classifiers.classify_secondary(&tensor.flipped()?)?,
                View::Rotated => {
                    classifiers.classify_secondary(&tensor.rotated(self.rotation_degrees)?)?
                }
            };
            debug!(?view, confidence, "secondary verdict");
            resolution.verdicts.push(Verdict { view, confidence });
            state = state.next(confidence, self.threshold);
        }
        if let CascadeState::Resolved(label) = state {
            resolution.label = label;
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use std::sync::{Arc, Mutex};
    use tract_onnx::prelude::tract_ndarray::Array4;

    type Seen = Arc<Mutex<Vec<NormalizedTensor>>>;

    /// Pops one scripted score per call and keeps every input it was shown.
    struct Scripted {
        scores: Mutex<Vec<f32>>,
        seen: Seen,
    }

    impl Scripted {
        fn boxed(scores: &[f32], seen: &Seen) -> Box<dyn Classifier> {
            let mut scores = scores.to_vec();
            scores.reverse();
            Box::new(Scripted {
                scores: Mutex::new(scores),
                seen: Arc::clone(seen),
            })
        }
    }

    impl Classifier for Scripted {
        fn infer(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(input.clone());
            let next = self.scores.lock().unwrap().pop().expect("unexpected secondary call");
            Ok(vec![next])
        }
    }

    /// Left-to-right gradient, so neither flip nor rotation leaves it unchanged.
    fn tensor() -> NormalizedTensor {
        let arr = Array4::from_shape_fn((1, 28, 28, 1), |(_, _, x, _)| x as f32 / 27.0);
        NormalizedTensor::new(arr).unwrap()
    }

    fn resolve_seen(top: RomanNumeral, scores: &[f32]) -> (Resolution, Vec<NormalizedTensor>) {
        let seen = Seen::default();
        let port = ClassifierPort::new(None, Some(Scripted::boxed(scores, &seen)));
        let resolution = DisambiguationCascade::default()
            .resolve(top, &tensor(), &port)
            .unwrap();
        let inputs = seen.lock().unwrap().clone();
        (resolution, inputs)
    }

    fn resolve(top: RomanNumeral, scores: &[f32]) -> Resolution {
        resolve_seen(top, scores).0
    }

    #[test]
    fn transitions() {
        let t = DECISION_THRESHOLD;
        let start = CascadeState::start();
        assert_eq!(start.next(0.9, t), CascadeState::Resolved(RomanNumeral::II));
        assert_eq!(start.next(0.5, t), CascadeState::Query(View::Flipped));

        let flipped = CascadeState::Query(View::Flipped);
        assert_eq!(flipped.next(0.2, t), CascadeState::Resolved(RomanNumeral::II));
        assert_eq!(flipped.next(0.7, t), CascadeState::Query(View::Rotated));

        let rotated = CascadeState::Query(View::Rotated);
        assert_eq!(rotated.next(0.51, t), CascadeState::Resolved(RomanNumeral::V));
        assert_eq!(rotated.next(0.5, t), CascadeState::Resolved(RomanNumeral::II));

        let done = CascadeState::Resolved(RomanNumeral::V);
        assert_eq!(done.next(0.0, t), done);
    }

    #[test]
    fn early_resolve_on_original_view() {
        let resolution = resolve(RomanNumeral::V, &[0.9]);
        assert_eq!(resolution.label, RomanNumeral::II);
        assert_eq!(resolution.verdicts.len(), 1);
        assert!(resolution.overridden());
    }

    #[test]
    fn flip_can_settle_on_two() {
        let resolution = resolve(RomanNumeral::V, &[0.1, 0.3]);
        assert_eq!(resolution.label, RomanNumeral::II);
        let views: Vec<View> = resolution.verdicts.iter().map(|v| v.view).collect();
        assert_eq!(views, vec![View::Original, View::Flipped]);
    }

    #[test]
    fn rotation_has_last_word() {
        let resolution = resolve(RomanNumeral::V, &[0.3, 0.7, 0.2]);
        assert_eq!(resolution.label, RomanNumeral::II);
        assert_eq!(resolution.verdicts.len(), 3);

        let resolution = resolve(RomanNumeral::V, &[0.3, 0.7, 0.8]);
        assert_eq!(resolution.label, RomanNumeral::V);
        assert!(!resolution.overridden());
    }

    #[test]
    fn each_stage_sees_its_own_view() -> Result<()> {
        let original = tensor();
        let (resolution, inputs) = resolve_seen(RomanNumeral::V, &[0.3, 0.7, 0.2]);
        assert_eq!(resolution.verdicts.len(), 3);
        assert_eq!(inputs.len(), 3);

        assert_eq!(inputs[0], original);
        assert_eq!(inputs[1], original.flipped()?);
        assert_eq!(inputs[2], original.rotated(ROTATION_DEGREES)?);
        assert_ne!(inputs[1], original);
        assert_ne!(inputs[2], original);
        assert_ne!(inputs[2], inputs[1]);
        Ok(())
    }

    #[test]
    fn other_labels_pass_through() {
        // an empty script panics on any call
        for top in RomanNumeral::ALL.into_iter().filter(|n| *n != RomanNumeral::V) {
            let resolution = resolve(top, &[]);
            assert_eq!(resolution.label, top);
            assert!(resolution.verdicts.is_empty());
        }
    }

    #[test]
    fn missing_secondary_keeps_v() -> Result<()> {
        let port = ClassifierPort::default();
        let resolution =
            DisambiguationCascade::default().resolve(RomanNumeral::V, &tensor(), &port)?;
        assert_eq!(resolution.label, RomanNumeral::V);
        Ok(())
    }
}
