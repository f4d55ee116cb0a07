use std::path::Path;

use tracing::{debug, info, warn};
use tract_onnx::prelude::*;

use crate::error::{Error, ModelRole, Result};
use crate::labels::{RomanNumeral, LABELS};
use crate::normalizer::{NormalizedTensor, INPUT_SIZE};

type TractSimplePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An opaque model: normalized tensor in, flat score vector out.
///
/// Implementations are shared across threads and must not rely on
/// serialized access.
pub trait Classifier: Send + Sync {
    fn infer(&self, input: &NormalizedTensor) -> Result<Vec<f32>>;
}

/// Classifier backed by an ONNX graph run through tract.
pub struct OnnxClassifier {
    model: TractSimplePlan,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let model = Self::load_model(path).map_err(|e| Error::ModelLoad {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        info!(path = %path.display(), "model loaded");
        Ok(OnnxClassifier { model })
    }

    fn load_model(path: &Path) -> TractResult<TractSimplePlan> {
        let input_shape = tvec!(1, INPUT_SIZE, INPUT_SIZE, 1);
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))?
            .into_optimized()?
            .into_runnable()
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
        let tensor: Tensor = input.view().to_owned().into();
        let result = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| Error::Inference(e.into()))?;
        let output = result
            .first()
            .ok_or(Error::InvalidOutput { expected: 1, actual: 0 })?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| Error::Inference(e.into()))?
            .iter()
            .copied()
            .collect();
        Ok(scores)
    }
}

/// Top label of a primary classification and its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimaryResult {
    pub label: RomanNumeral,
    pub confidence: f32,
}

impl PrimaryResult {
    /// First highest score wins ties.
    pub fn from_scores(scores: &[f32]) -> Result<Self> {
        if scores.len() != LABELS.len() {
            return Err(Error::InvalidOutput {
                expected: LABELS.len(),
                actual: scores.len(),
            });
        }
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        let label = RomanNumeral::from_index(best).ok_or(Error::InvalidOutput {
            expected: LABELS.len(),
            actual: scores.len(),
        })?;
        Ok(PrimaryResult {
            label,
            confidence: scores[best],
        })
    }
}

/// The two classifiers the service depends on.
///
/// Either slot may be empty when its model failed to load.
#[derive(Default)]
pub struct ClassifierPort {
    primary: Option<Box<dyn Classifier>>,
    secondary: Option<Box<dyn Classifier>>,
}

impl ClassifierPort {
    pub fn new(
        primary: Option<Box<dyn Classifier>>,
        secondary: Option<Box<dyn Classifier>>,
    ) -> Self {
        ClassifierPort { primary, secondary }
    }

    /// Loads whichever paths are given; load failures leave that slot empty.
    pub fn load(primary: Option<&Path>, secondary: Option<&Path>) -> Self {
        ClassifierPort {
            primary: primary.and_then(|path| Self::try_load(ModelRole::Primary, path)),
            secondary: secondary.and_then(|path| Self::try_load(ModelRole::Secondary, path)),
        }
    }

    fn try_load(role: ModelRole, path: &Path) -> Option<Box<dyn Classifier>> {
        match OnnxClassifier::load(path) {
            Ok(model) => Some(Box::new(model)),
            Err(e) => {
                warn!(%role, error = %e, "model failed to load");
                None
            }
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Scores for every label, in [`LABELS`] order.
    pub fn classify_primary(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>> {
        let model = self.primary.as_ref().ok_or(Error::ModelUnavailable {
            role: ModelRole::Primary,
        })?;
        let scores = model.infer(tensor)?;
        if scores.len() != LABELS.len() {
            return Err(Error::InvalidOutput {
                expected: LABELS.len(),
                actual: scores.len(),
            });
        }
        debug!(?scores, "primary scores");
        Ok(scores)
    }

    /// Probability that the glyph is "II" rather than "V".
    pub fn classify_secondary(&self, tensor: &NormalizedTensor) -> Result<f32> {
        let model = self.secondary.as_ref().ok_or(Error::ModelUnavailable {
            role: ModelRole::Secondary,
        })?;
        let scores = model.infer(tensor)?;
        scores.first().copied().ok_or(Error::InvalidOutput {
            expected: 1,
            actual: 0,
        })
    }
}
