use std::fmt;

use tracing::{debug, warn};

use crate::cascade::DisambiguationCascade;
use crate::classifier::{Classifier, ClassifierPort, PrimaryResult};
use crate::config::Config;
use crate::error::Result;
use crate::labels::RomanNumeral;
use crate::normalizer::{EncodedImage, ImageNormalizer};

/// Outcome of one inference call.
///
/// `label` is `None` when the call failed. `confidence` is the primary
/// classifier's score for its own top label, even when the cascade
/// replaced that label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub label: Option<RomanNumeral>,
    pub confidence: Option<f32>,
}

impl Prediction {
    pub fn failed() -> Self {
        Prediction {
            label: None,
            confidence: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.label.is_none()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.label, self.confidence) {
            (None, _) => write!(f, "prediction failed"),
            (Some(label), Some(confidence)) => write!(f, "{} ({:.2}%)", label, confidence * 100.0),
            (Some(label), None) => write!(f, "{}", label),
        }
    }
}

pub struct PredictionService {
    normalizer: ImageNormalizer,
    classifiers: ClassifierPort,
    cascade: DisambiguationCascade,
}

impl PredictionService {
    pub fn new(classifiers: ClassifierPort) -> Self {
        PredictionService {
            normalizer: ImageNormalizer::new(),
            classifiers,
            cascade: DisambiguationCascade::default(),
        }
    }

    pub fn with_classifiers(
        primary: Option<Box<dyn Classifier>>,
        secondary: Option<Box<dyn Classifier>>,
    ) -> Self {
        Self::new(ClassifierPort::new(primary, secondary))
    }

    /// Loads the configured models; any that fail to load are left out.
    pub fn from_config(config: &Config) -> Self {
        let classifiers = ClassifierPort::load(
            config.primary_model.as_deref(),
            config.secondary_model.as_deref(),
        );
        if !classifiers.has_primary() {
            warn!("primary model unavailable, every prediction will fail");
        } else if !classifiers.has_secondary() {
            warn!("secondary model unavailable, II/V disambiguation disabled");
        }
        Self::new(classifiers)
    }

    pub fn classifiers(&self) -> &ClassifierPort {
        &self.classifiers
    }

    /// Like [`predict`](Self::predict) but reports why a call failed.
    pub fn try_predict(&self, encoded: EncodedImage) -> Result<Prediction> {
        let tensor = self.normalizer.normalize(encoded)?;
        let scores = self.classifiers.classify_primary(&tensor)?;
        let top = PrimaryResult::from_scores(&scores)?;
        debug!(label = %top.label, confidence = top.confidence, "primary prediction");

        let resolution = self.cascade.resolve(top.label, &tensor, &self.classifiers)?;
        if resolution.overridden() {
            debug!(from = %top.label, to = %resolution.label, "cascade overrode primary label");
        }

        Ok(Prediction {
            label: Some(resolution.label),
            confidence: Some(top.confidence),
        })
    }

    /// Classifies one image; any failure yields [`Prediction::failed`].
    pub fn predict(&self, encoded: EncodedImage) -> Prediction {
        match self.try_predict(encoded) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(error = %e, "prediction failed");
                Prediction::failed()
            }
        }
    }
}
