// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an image file into the normalised float tensor data the
// encoder expects.
//
// Steps (applied in order):
//   1. Decode with the `image` crate and convert to RGB
//   2. Resize to a square (bilinear)
//   3. Training only: cut a random square crop out of it
//   4. Scale to [0, 1], then normalise per channel:
//        x = (p / 255 - mean[c]) / std[c]
//   5. Lay out channel-major (CHW), as Burn's Conv2d wants
//
// Two profiles, one per backbone family:
//
//   Profile    split  resize   crop   mean / std
//   Inception  train  356x356  299    0.5 / 0.5
//              test   299x299  none   0.5 / 0.5
//   ResNet     train  226x226  224    ImageNet
//              test   224x224  none   ImageNet
//
// The random crop is drawn from an RNG seeded with the caller's
// seed, so the same (seed, sample) pair always yields the same
// pixels no matter which loader worker decodes it.
//
// Reference: image crate documentation (imageops)

use std::path::Path;

use anyhow::Result;
use image::{imageops::FilterType, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::{error::CaptionError, hyperparams::ModelKind};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// Backbone family the pixels are prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProfile {
    Inception,
    ResNet,
}

impl ImageProfile {
    /// Global models were trained on Inception-style inputs,
    /// attention models on ResNet-style ones.
    pub fn for_kind(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Global    => Self::Inception,
            ModelKind::Attention => Self::ResNet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// A fully resolved resize/crop/normalise recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTransform {
    pub resize: u32,
    /// Side of the random crop, None for a plain resize
    pub crop:   Option<u32>,
    pub mean:   [f32; 3],
    pub std:    [f32; 3],
}

impl ImageTransform {
    pub fn for_profile(profile: ImageProfile, split: Split) -> Self {
        match (profile, split) {
            (ImageProfile::Inception, Split::Train) => Self {
                resize: 356,
                crop:   Some(299),
                mean:   [0.5; 3],
                std:    [0.5; 3],
            },
            (ImageProfile::Inception, Split::Test) => Self {
                resize: 299,
                crop:   None,
                mean:   [0.5; 3],
                std:    [0.5; 3],
            },
            (ImageProfile::ResNet, Split::Train) => Self {
                resize: 226,
                crop:   Some(224),
                mean:   IMAGENET_MEAN,
                std:    IMAGENET_STD,
            },
            (ImageProfile::ResNet, Split::Test) => Self {
                resize: 224,
                crop:   None,
                mean:   IMAGENET_MEAN,
                std:    IMAGENET_STD,
            },
        }
    }

    /// Side length of the square output image.
    pub fn output_size(&self) -> u32 {
        self.crop.unwrap_or(self.resize).min(self.resize)
    }

    /// Decode an image file and transform it.
    pub fn load(&self, path: &Path, seed: u64) -> Result<Vec<f32>> {
        let img = image::open(path)
            .map_err(|e| CaptionError::ImageLoad {
                image_id: path.display().to_string(),
                reason:   e.to_string(),
            })?
            .to_rgb8();
        Ok(self.apply(&img, seed))
    }

    /// Transform an already decoded RGB image into CHW floats.
    pub fn apply(&self, img: &RgbImage, seed: u64) -> Vec<f32> {
        let resized = image::imageops::resize(img, self.resize, self.resize, FilterType::Triangle);

        let side = self.output_size();
        let (x0, y0) = match self.crop {
            Some(_) if side < self.resize => {
                let mut rng = StdRng::seed_from_u64(seed);
                let max = self.resize - side;
                (rng.gen_range(0..=max), rng.gen_range(0..=max))
            }
            _ => (0, 0),
        };

        let plane = (side * side) as usize;
        let mut out = vec![0.0f32; 3 * plane];
        for y in 0..side {
            for x in 0..side {
                let px = resized.get_pixel(x0 + x, y0 + y).0;
                let offset = (y * side + x) as usize;
                for c in 0..3 {
                    let v = px[c] as f32 / 255.0;
                    out[c * plane + offset] = (v - self.mean[c]) / self.std[c];
                }
            }
        }
        out
    }
}
