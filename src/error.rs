//! Error types for the glyph classification pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which of the two classifiers an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// The 10-class numeral classifier.
    Primary,
    /// The binary II/V disambiguation classifier.
    Secondary,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRole::Primary => write!(f, "primary"),
            ModelRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Errors that can occur while turning an encoded image into a prediction.
#[derive(Error, Debug)]
pub enum Error {
    /// The base64 payload could not be decoded.
    #[error("base64 decode: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The raster bytes are not a readable image.
    #[error("image decode: {0}")]
    Image(#[from] image::ImageError),

    /// The classifier was never loaded.
    #[error("{role} model unavailable")]
    ModelUnavailable {
        /// The classifier that is missing.
        role: ModelRole,
    },

    /// The model file could not be read or compiled into a runnable plan.
    #[error("cannot load model {}: {source}", path.display())]
    ModelLoad {
        /// Path of the model file.
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A classifier invocation failed.
    #[error("inference: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The classifier produced an output of unexpected size.
    #[error("invalid classifier output: expected {expected} values, got {actual}")]
    InvalidOutput { expected: usize, actual: usize },

    /// A pipeline step received an input it does not handle.
    #[error("transform: {0}")]
    Transform(&'static str),

    /// The configuration file is not valid JSON for [`crate::Config`].
    #[error("invalid configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for malformed encodings and unreadable raster data.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Image(_))
    }

    /// Returns true when a classifier was never loaded.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Error::ModelUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
