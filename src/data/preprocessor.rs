// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an image file into the flat float buffer the network
// consumes:
//
//   1. decode (any format the `image` crate understands)
//   2. convert to 8-bit RGB, dropping alpha
//   3. resize to size x size
//   4. optionally shear / flip (training data only)
//   5. scale to [0, 1] and lay out channel-first: [3, H, W]
//
// The same routine feeds the batched data loaders and the
// one-image-at-a-time evaluator, so both see identical pixels.

use anyhow::{Context, Result};
use image::{imageops::FilterType, ImageReader, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CHANNELS: usize = 3;

/// Random geometric distortions applied to training images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    /// Shear angle range in degrees; the angle is drawn uniformly from [-r, r]
    pub shear_degrees:   f32,
    pub horizontal_flip: bool,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            shear_degrees:   0.2,
            horizontal_flip: false,
        }
    }
}

impl Augmentation {
    pub fn apply<R: Rng + ?Sized>(&self, img: RgbImage, rng: &mut R) -> RgbImage {
        let mut img = img;
        if self.shear_degrees > 0.0 {
            let angle = rng.gen_range(-self.shear_degrees..=self.shear_degrees);
            img = shear(&img, angle.to_radians());
        }
        if self.horizontal_flip && rng.gen_bool(0.5) {
            img = image::imageops::flip_horizontal(&img);
        }
        img
    }
}

/// Shear around the image centre. Output pixels are sampled from the
/// nearest source pixel, with coordinates clamped to the border.
fn shear(img: &RgbImage, angle: f32) -> RgbImage {
    let (w, h)   = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (sin, cos) = angle.sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    RgbImage::from_fn(w, h, |x, y| {
        let dy = y as f32 - cy;
        let dx = x as f32 - cx;
        let src_x = (dx - sin * dy + cx).round().clamp(0.0, (w - 1) as f32) as u32;
        let src_y = (cos * dy + cy).round().clamp(0.0, (h - 1) as f32) as u32;
        *img.get_pixel(src_x, src_y)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePreprocessor {
    pub size: usize,
}

impl ImagePreprocessor {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Decode and resize, without normalising.
    pub fn decode(&self, path: &Path) -> Result<RgbImage> {
        let img = ImageReader::open(path)
            .with_context(|| format!("Cannot open image '{}'", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("Cannot detect format of '{}'", path.display()))?
            .decode()
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;

        let side = self.size as u32;
        Ok(img.resize_exact(side, side, FilterType::Triangle).to_rgb8())
    }

    /// Decode, resize and normalise into `[3, size, size]` floats.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        Ok(self.to_chw(&self.decode(path)?))
    }

    /// Same as `load`, with the training distortions applied.
    pub fn load_augmented<R: Rng + ?Sized>(
        &self,
        path: &Path,
        augmentation: &Augmentation,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        let img = augmentation.apply(self.decode(path)?, rng);
        Ok(self.to_chw(&img))
    }

    /// Scale to [0, 1] and reorder HWC → CHW.
    pub fn to_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let plane  = w * h;
        let mut data = vec![0.0f32; CHANNELS * plane];
        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..CHANNELS {
                data[c * plane + offset] = pixel[c] as f32 / 255.0;
            }
        }
        data
    }
}
