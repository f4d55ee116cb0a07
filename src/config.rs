use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::error::{Error, Result};

pub const DEFAULT_PRIMARY_MODEL: &str = "primary.onnx";
pub const DEFAULT_SECONDARY_MODEL: &str = "secondary.onnx";

/// Model locations. A `None` path skips loading that model.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub primary_model: Option<PathBuf>,
    pub secondary_model: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            primary_model: Some(PathBuf::from(DEFAULT_PRIMARY_MODEL)),
            secondary_model: Some(PathBuf::from(DEFAULT_SECONDARY_MODEL)),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
