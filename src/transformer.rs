use enum_dispatch::enum_dispatch;
use image::imageops::{crop_imm, resize, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::tract_ndarray::{s, Array4};

/// Intensity at or above which a pixel counts as blank paper.
pub const BACKGROUND_THRESHOLD: u8 = 240;
pub const MIN_PADDING: u32 = 3;
pub const PADDING_RATIO: f64 = 0.05;

#[enum_dispatch]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ImageTransform {
    CropBackground(CropBackground),
    ResizeGrayImage(ResizeGrayImage),
    ToArray(ToArray),
    FlipHorizontal(FlipHorizontal),
    Rotate(Rotate),
}

#[enum_dispatch(ImageTransform)]
pub trait GenericTransform {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str>;
}

pub enum ImageTransformResult {
    GrayImage(GrayImage),
    Array4(Array4<f32>),
}

impl From<GrayImage> for ImageTransformResult {
    fn from(image: GrayImage) -> Self {
        ImageTransformResult::GrayImage(image)
    }
}

impl From<Array4<f32>> for ImageTransformResult {
    fn from(arr: Array4<f32>) -> Self {
        ImageTransformResult::Array4(arr)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "FilterType")]
enum FilterOption {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

/// Half-open pixel rectangle: `left..right` by `top..bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Crops to the glyph's bounding box plus a margin.
///
/// A row (column) is content when its darkest pixel is below `threshold`.
/// Images without any content row or column are passed through untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CropBackground {
    pub threshold: u8,
    pub min_padding: u32,
    pub padding_ratio: f64,
}

impl Default for CropBackground {
    fn default() -> Self {
        CropBackground {
            threshold: BACKGROUND_THRESHOLD,
            min_padding: MIN_PADDING,
            padding_ratio: PADDING_RATIO,
        }
    }
}

impl CropBackground {
    /// Tight bounding box of content rows and columns, without padding.
    pub fn content_bounds(&self, image: &GrayImage) -> Option<CropBox> {
        let (width, height) = image.dimensions();
        let mut row_min = vec![u8::MAX; height as usize];
        let mut col_min = vec![u8::MAX; width as usize];
        for (x, y, pixel) in image.enumerate_pixels() {
            let value = pixel[0];
            row_min[y as usize] = row_min[y as usize].min(value);
            col_min[x as usize] = col_min[x as usize].min(value);
        }

        let is_content = |min: &u8| *min < self.threshold;
        let top = row_min.iter().position(is_content)?;
        let bottom = row_min.iter().rposition(is_content)?;
        let left = col_min.iter().position(is_content)?;
        let right = col_min.iter().rposition(is_content)?;

        Some(CropBox {
            left: left as u32,
            top: top as u32,
            right: right as u32 + 1,
            bottom: bottom as u32 + 1,
        })
    }

    pub fn padding(&self, width: u32, height: u32) -> u32 {
        let scaled = (width.min(height) as f64 * self.padding_ratio).floor() as u32;
        scaled.max(self.min_padding)
    }

    /// Padded crop region clamped to the image, or `None` for blank images.
    pub fn crop_box(&self, image: &GrayImage) -> Option<CropBox> {
        let (width, height) = image.dimensions();
        let bounds = self.content_bounds(image)?;
        let padding = self.padding(width, height);
        Some(CropBox {
            left: bounds.left.saturating_sub(padding),
            top: bounds.top.saturating_sub(padding),
            right: (bounds.right + padding).min(width),
            bottom: (bounds.bottom + padding).min(height),
        })
    }
}

impl GenericTransform for CropBackground {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::GrayImage(image) => match self.crop_box(&image) {
                Some(region) => Ok(crop_imm(
                    &image,
                    region.left,
                    region.top,
                    region.width(),
                    region.height(),
                )
                .to_image()
                .into()),
                None => Ok(image.into()),
            },
            ImageTransformResult::Array4(_) => Err("Background crop not implemented for Array4"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResizeGrayImage {
    pub image_size: ImageSize,
    #[serde(with = "FilterOption")]
    pub filter: FilterType,
}

impl GenericTransform for ResizeGrayImage {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::GrayImage(image) => Ok(resize(
                &image,
                self.image_size.width as u32,
                self.image_size.height as u32,
                self.filter,
            )
            .into()),
            ImageTransformResult::Array4(_) => Err("Image resize not implemented for Array4"),
        }
    }
}

/// Converts an 8-bit image to a `(1, height, width, 1)` array scaled to `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToArray {}

impl GenericTransform for ToArray {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::GrayImage(image) => {
                let (width, height) = image.dimensions();
                let arr = Array4::from_shape_fn(
                    (1_usize, height as usize, width as usize, 1_usize),
                    |(_, y, x, _)| image[(x as u32, y as u32)][0] as f32 / 255.0,
                );
                Ok(ImageTransformResult::Array4(arr))
            }
            // already an array
            ImageTransformResult::Array4(arr) => Ok(ImageTransformResult::Array4(arr)),
        }
    }
}

/// Mirrors an NHWC array along the width axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlipHorizontal {}

impl GenericTransform for FlipHorizontal {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::GrayImage(_) => Err("Flip not implemented for GrayImage"),
            ImageTransformResult::Array4(arr) => {
                Ok(ImageTransformResult::Array4(arr.slice(s![.., .., ..;-1, ..]).to_owned()))
            }
        }
    }
}

/// Rotates an NHWC array about its center, keeping the shape.
///
/// Counter-clockwise as displayed for positive angles. Each output sample is
/// inverse-mapped into the source and bilinearly interpolated; source samples
/// outside the grid read as 0.0, so corners fill with black.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rotate {
    pub degrees: f32,
}

impl GenericTransform for Rotate {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::GrayImage(_) => Err("Rotate not implemented for GrayImage"),
            ImageTransformResult::Array4(arr) => {
                let (_, height, width, _) = arr.dim();
                let (sin, cos) = (self.degrees as f64).to_radians().sin_cos();
                let cy = (height as f64 - 1.0) / 2.0;
                let cx = (width as f64 - 1.0) / 2.0;

                let at = |n: usize, y: f64, x: f64, c: usize| -> f64 {
                    if y < 0.0 || x < 0.0 || y >= height as f64 || x >= width as f64 {
                        0.0
                    } else {
                        arr[[n, y as usize, x as usize, c]] as f64
                    }
                };

                let rotated = Array4::from_shape_fn(arr.dim(), |(n, y, x, c)| {
                    let dy = y as f64 - cy;
                    let dx = x as f64 - cx;
                    let sx = cx + dx * cos - dy * sin;
                    let sy = cy + dx * sin + dy * cos;

                    let (x0, y0) = (sx.floor(), sy.floor());
                    let (fx, fy) = (sx - x0, sy - y0);
                    let value = at(n, y0, x0, c) * (1.0 - fx) * (1.0 - fy)
                        + at(n, y0, x0 + 1.0, c) * fx * (1.0 - fy)
                        + at(n, y0 + 1.0, x0, c) * (1.0 - fx) * fy
                        + at(n, y0 + 1.0, x0 + 1.0, c) * fx * fy;
                    // weights can round just past 1.0
                    value.clamp(0.0, 1.0) as f32
                });
                Ok(ImageTransformResult::Array4(rotated))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn into_image(result: ImageTransformResult) -> GrayImage {
        match result {
            ImageTransformResult::GrayImage(image) => image,
            ImageTransformResult::Array4(_) => panic!("expected an image"),
        }
    }

    fn into_array(result: ImageTransformResult) -> Array4<f32> {
        match result {
            ImageTransformResult::Array4(arr) => arr,
            ImageTransformResult::GrayImage(_) => panic!("expected an array"),
        }
    }

    #[test]
    fn blank_image_is_not_cropped() -> Result<(), &'static str> {
        let mut image = white(50, 30);
        // a pixel at the threshold is still background
        image.put_pixel(10, 10, Luma([BACKGROUND_THRESHOLD]));
        let cropped = into_image(CropBackground::default().transform(image.clone().into())?);
        assert_eq!(cropped, image);
        Ok(())
    }

    #[test]
    fn padding_has_a_floor_of_three() {
        let crop = CropBackground::default();
        assert_eq!(crop.padding(20, 20), 3);
        assert_eq!(crop.padding(300, 300), 15);
        // floor of 0.05 * 79
        assert_eq!(crop.padding(79, 500), 3);
        assert_eq!(crop.padding(100, 119), 5);
    }

    #[test]
    fn crop_box_pads_and_clamps() {
        let crop = CropBackground::default();
        let mut image = white(200, 100);
        for x in 50..60 {
            for y in 1..40 {
                image.put_pixel(x, y, Luma([0]));
            }
        }

        let bounds = crop.content_bounds(&image).unwrap();
        assert_eq!(
            bounds,
            CropBox {
                left: 50,
                top: 1,
                right: 60,
                bottom: 40
            }
        );

        // padding = max(3, floor(100 * 0.05)) = 5, clamped at the top edge
        let padded = crop.crop_box(&image).unwrap();
        assert_eq!(
            padded,
            CropBox {
                left: 45,
                top: 0,
                right: 65,
                bottom: 45
            }
        );
    }

    #[test]
    fn padded_box_stays_inside_image() {
        let crop = CropBackground::default();
        for (w, h) in [(5, 5), (28, 40), (300, 300), (7, 90)] {
            let mut image = white(w, h);
            image.put_pixel(0, 0, Luma([0]));
            image.put_pixel(w - 1, h - 1, Luma([0]));
            let region = crop.crop_box(&image).unwrap();
            assert_eq!(region, CropBox { left: 0, top: 0, right: w, bottom: h });
        }
    }

    #[test]
    fn crop_keeps_margin_around_glyph() -> Result<(), &'static str> {
        let mut image = white(100, 100);
        image.put_pixel(40, 60, Luma([10]));
        let cropped = into_image(CropBackground::default().transform(image.into())?);
        // one content pixel plus 5 on each side
        assert_eq!(cropped.dimensions(), (11, 11));
        assert_eq!(cropped[(5, 5)][0], 10);
        assert_eq!(cropped[(0, 0)][0], 255);
        Ok(())
    }

    #[test]
    fn to_array_is_nhwc_and_scaled() -> Result<(), &'static str> {
        let mut image = white(3, 2);
        image.put_pixel(2, 1, Luma([0]));
        image.put_pixel(0, 1, Luma([51]));
        let arr = into_array(ToArray {}.transform(image.into())?);
        assert_eq!(arr.dim(), (1, 2, 3, 1));
        assert_eq!(arr[[0, 0, 0, 0]], 1.0);
        assert_eq!(arr[[0, 1, 2, 0]], 0.0);
        assert!((arr[[0, 1, 0, 0]] - 0.2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn flip_mirrors_width_axis() -> Result<(), &'static str> {
        let arr = Array4::from_shape_fn((1, 2, 3, 1), |(_, y, x, _)| (y * 3 + x) as f32);
        let flipped = into_array(FlipHorizontal {}.transform(arr.into())?);
        assert_eq!(flipped.dim(), (1, 2, 3, 1));
        assert_eq!(flipped[[0, 0, 0, 0]], 2.0);
        assert_eq!(flipped[[0, 0, 2, 0]], 0.0);
        assert_eq!(flipped[[0, 1, 0, 0]], 5.0);
        Ok(())
    }

    #[test]
    fn rotation_keeps_shape_and_fills_corners() -> Result<(), &'static str> {
        let arr = Array4::<f32>::ones((1, 28, 28, 1));
        let rotated = into_array(Rotate { degrees: 45.0 }.transform(arr.into())?);
        assert_eq!(rotated.dim(), (1, 28, 28, 1));
        assert_eq!(rotated[[0, 0, 0, 0]], 0.0);
        assert_eq!(rotated[[0, 27, 27, 0]], 0.0);
        assert!((rotated[[0, 14, 14, 0]] - 1.0).abs() < 1e-6);
        assert!(rotated.iter().all(|v| (0.0..=1.0).contains(v)));
        Ok(())
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() -> Result<(), &'static str> {
        let mut arr = Array4::<f32>::zeros((1, 5, 5, 1));
        // right of center
        arr[[0, 2, 4, 0]] = 1.0;
        let rotated = into_array(Rotate { degrees: 90.0 }.transform(arr.into())?);
        // ends up above center
        assert!((rotated[[0, 0, 2, 0]] - 1.0).abs() < 1e-6);
        assert!(rotated[[0, 2, 4, 0]].abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn array_steps_reject_images() {
        assert!(FlipHorizontal {}.transform(white(2, 2).into()).is_err());
        let arr = Array4::<f32>::zeros((1, 2, 2, 1));
        assert!(CropBackground::default().transform(arr.into()).is_err());
    }
}
