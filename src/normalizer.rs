//! Turns encoded images into the classifier's canonical input tensor.
//!
//! The sequence here must match what the classifiers were trained on:
//! ITU-R 601-2 luma, background crop at intensity 240 with a
//! `max(3, 5%)` margin, bicubic resize to 28x28 and scaling by 1/255.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use tract_onnx::prelude::tract_ndarray::{Array4, ArrayView4};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transformer::{
    CropBackground, FlipHorizontal, GenericTransform, ImageSize, ImageTransform,
    ImageTransformResult, ResizeGrayImage, Rotate, ToArray,
};

/// Side length of the classifier input.
pub const INPUT_SIZE: usize = 28;
pub const INPUT_SHAPE: (usize, usize, usize, usize) = (1, INPUT_SIZE, INPUT_SIZE, 1);

const DATA_URI_PREFIX: &str = "data:image";

/// An image as handed to the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodedImage {
    /// Raster bytes in any format the `image` crate can read.
    Raw(Vec<u8>),
    /// Standard base64, optionally wrapped as `data:image/<fmt>;base64,<payload>`.
    Base64(String),
}

impl EncodedImage {
    /// Raw raster when the bytes carry a known image signature, base64 text
    /// when they read as a data URI or bare base64, raw raster otherwise.
    pub fn sniff(bytes: Vec<u8>) -> Self {
        // ASCII PNM is valid base64 text too
        if image::guess_format(&bytes).is_ok() {
            return EncodedImage::Raw(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) if text.trim_start().starts_with(DATA_URI_PREFIX) || is_base64_text(&text) => {
                EncodedImage::Base64(text)
            }
            Ok(text) => EncodedImage::Raw(text.into_bytes()),
            Err(e) => EncodedImage::Raw(e.into_bytes()),
        }
    }

    /// Raster bytes with any text envelope removed.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            EncodedImage::Raw(bytes) => Ok(bytes),
            EncodedImage::Base64(text) => {
                let text = text.trim();
                let payload = if text.starts_with(DATA_URI_PREFIX) {
                    text.split_once(',').map_or("", |(_, payload)| payload)
                } else {
                    text
                };
                let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                Ok(STANDARD.decode(payload)?)
            }
        }
    }

    pub fn decode(self) -> Result<GrayImage> {
        let bytes = self.into_bytes()?;
        let image = image::load_from_memory(&bytes)?;
        Ok(to_intensity(image))
    }
}

impl From<String> for EncodedImage {
    fn from(text: String) -> Self {
        EncodedImage::Base64(text)
    }
}

impl From<&str> for EncodedImage {
    fn from(text: &str) -> Self {
        EncodedImage::Base64(text.to_owned())
    }
}

fn is_base64_text(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=') || c.is_whitespace())
}

/// Single-channel intensity using ITU-R 601-2 luma; alpha is dropped.
pub fn to_intensity(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        DynamicImage::ImageLumaA8(gray) => {
            GrayImage::from_fn(gray.width(), gray.height(), |x, y| Luma([gray[(x, y)][0]]))
        }
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb[(x, y)].0;
                // fixed point 0.299 / 0.587 / 0.114
                let luma = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
                Luma([luma as u8])
            })
        }
    }
}

/// A `(1, 28, 28, 1)` tensor with samples in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTensor(Array4<f32>);

impl NormalizedTensor {
    pub fn new(arr: Array4<f32>) -> Result<Self> {
        if arr.dim() != INPUT_SHAPE {
            return Err(Error::Transform("tensor must have shape (1, 28, 28, 1)"));
        }
        if !arr.iter().all(|v| (0.0..=1.0).contains(v)) {
            return Err(Error::Transform("tensor values must lie in [0, 1]"));
        }
        Ok(NormalizedTensor(arr))
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }

    /// Mirror image along the width axis.
    pub fn flipped(&self) -> Result<Self> {
        self.augment(&FlipHorizontal {}.into())
    }

    /// Rotated copy; see [`Rotate`] for the resampling used.
    pub fn rotated(&self, degrees: f32) -> Result<Self> {
        self.augment(&Rotate { degrees }.into())
    }

    fn augment(&self, step: &ImageTransform) -> Result<Self> {
        match step.transform(self.0.clone().into()).map_err(Error::Transform)? {
            ImageTransformResult::Array4(arr) => NormalizedTensor::new(arr),
            ImageTransformResult::GrayImage(_) => {
                Err(Error::Transform("augmentation must yield an array"))
            }
        }
    }
}

pub struct ImageNormalizer {
    steps: Vec<ImageTransform>,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageNormalizer {
    pub fn new() -> Self {
        ImageNormalizer {
            steps: vec![
                CropBackground::default().into(),
                ResizeGrayImage {
                    image_size: ImageSize {
                        width: INPUT_SIZE,
                        height: INPUT_SIZE,
                    },
                    filter: FilterType::CatmullRom,
                }
                .into(),
                ToArray {}.into(),
            ],
        }
    }

    pub fn steps(&self) -> &[ImageTransform] {
        &self.steps
    }

    pub fn normalize(&self, encoded: EncodedImage) -> Result<NormalizedTensor> {
        let image = encoded.decode()?;
        debug!(width = image.width(), height = image.height(), "decoded glyph image");
        self.transform_image(image)
    }

    pub fn transform_image(&self, image: GrayImage) -> Result<NormalizedTensor> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Transform("empty image"));
        }
        let mut result = ImageTransformResult::GrayImage(image);

        for step in &self.steps {
            result = step.transform(result).map_err(Error::Transform)?;
        }

        match result {
            ImageTransformResult::Array4(arr) => NormalizedTensor::new(arr),
            _ => Err(Error::Transform("Should be converted to array already")),
        }
    }
}
