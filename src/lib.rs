//! Roman numeral (I–X) recognition for hand-drawn glyphs.
//!
//! An encoded image is normalized into a `(1, 28, 28, 1)` tensor, scored by a
//! primary 10-class model, and a "V" answer is double-checked by a binary
//! II/V model on augmented views before the label is returned.
//!
//! ```no_run
//! use roman_ocr_rust::{Config, EncodedImage, PredictionService};
//!
//! let service = PredictionService::from_config(&Config::default());
//! let bytes = std::fs::read("glyph.png").unwrap();
//! println!("{}", service.predict(EncodedImage::Raw(bytes)));
//! ```

pub mod cascade;
pub mod classifier;
pub mod config;
pub mod error;
pub mod labels;
pub mod normalizer;
pub mod pipeline;
pub mod transformer;

pub use cascade::{CascadeState, DisambiguationCascade, Resolution, Verdict, View};
pub use classifier::{Classifier, ClassifierPort, OnnxClassifier, PrimaryResult};
pub use config::Config;
pub use error::{Error, ModelRole, Result};
pub use labels::{RomanNumeral, LABELS};
pub use normalizer::{EncodedImage, ImageNormalizer, NormalizedTensor, INPUT_SHAPE, INPUT_SIZE};
pub use pipeline::{Prediction, PredictionService};

/// Installs a `tracing` subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
