use image::imageops;
use image::{GrayImage, RgbImage};
use image_compare::Algorithm;
use tracing::{debug, warn};

use super::mask::apply_mask;

/// Structural similarity between two frames, restricted to `mask`.
///
/// Both frames are masked first, then optionally blurred with a Gaussian of
/// `blur_sigma` to damp sensor noise, then compared with MSSIM over RGB.
/// Returns `None` if the frames cannot be compared (dimension mismatch).
pub fn similar_image(
    first: &RgbImage,
    second: &RgbImage,
    mask: Option<&GrayImage>,
    blur_sigma: f32,
) -> Option<f64> {
    let (first, second) = match mask {
        Some(mask) => (apply_mask(first, mask).ok()?, apply_mask(second, mask).ok()?),
        None => (first.clone(), second.clone()),
    };
    if first.dimensions() != second.dimensions() {
        return None;
    }

    let (first, second) = if blur_sigma > 0.0 {
        (
            imageops::blur(&first, blur_sigma),
            imageops::blur(&second, blur_sigma),
        )
    } else {
        (first, second)
    };

    match image_compare::rgb_similarity_structure(&Algorithm::MSSIMSimple, &first, &second) {
        Ok(similarity) => Some(similarity.score),
        Err(e) => {
            warn!(error = ?e, "structural comparison failed");
            None
        }
    }
}

/// Rejects frames that do not show the expected scene.
///
/// A frame is valid when its masked structural similarity to the reference
/// frame exceeds `threshold`.
pub struct ValidityCheck {
    reference: RgbImage,
    mask: GrayImage,
    threshold: f64,
    blur_sigma: f32,
}

impl ValidityCheck {
    pub fn new(reference: RgbImage, mask: GrayImage, threshold: f64, blur_sigma: f32) -> Self {
        Self {
            reference,
            mask,
            threshold,
            blur_sigma,
        }
    }

    pub fn score(&self, frame: &RgbImage) -> Option<f64> {
        similar_image(frame, &self.reference, Some(&self.mask), self.blur_sigma)
    }

    pub fn is_valid(&self, frame: &RgbImage) -> bool {
        match self.score(frame) {
            Some(score) => {
                let valid = score > self.threshold;
                debug!(
                    score = format!("{:.4}", score),
                    threshold = format!("{:.4}", self.threshold),
                    valid,
                    "validity comparison"
                );
                valid
            }
            None => {
                debug!(
                    width = frame.width(),
                    height = frame.height(),
                    "frame not comparable with reference"
                );
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Luma, Rgb};

    /// A textured stand-in for the expected camera angle.
    pub(crate) fn scene(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([(x * 7 % 256) as u8, 180, (y * 5 % 256) as u8])
            } else {
                Rgb([40, (x * 3 % 256) as u8, 90])
            }
        })
    }

    /// A different camera angle: the same texture, mirrored and recolored.
    pub(crate) fn other_scene(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / 6 + y / 3) % 2 == 0 {
                Rgb([230, 20, 20])
            } else {
                Rgb([10, 10, (x * 11 % 256) as u8])
            }
        })
    }

    fn full_mask(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    #[test]
    fn identical_frames_score_one() {
        let frame = scene(32, 32);
        let score = similar_image(&frame, &frame, None, 0.0).unwrap();
        assert!((score - 1.0).abs() < 1e-6, "{score}");
    }

    #[test]
    fn different_scenes_score_lower() {
        let score = similar_image(&scene(32, 32), &other_scene(32, 32), None, 0.0).unwrap();
        assert!(score < 0.9, "{score}");
    }

    #[test]
    fn mismatched_dimensions_are_not_comparable() {
        assert!(similar_image(&scene(32, 32), &scene(16, 32), None, 0.0).is_none());
    }

    #[test]
    fn masked_out_pixels_do_not_matter() {
        let reference = scene(32, 32);
        let mut frame = reference.clone();
        // Change the right half only, then mask it away.
        let mut mask = GrayImage::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                if x >= 16 {
                    frame.put_pixel(x, y, Rgb([255, 0, 255]));
                } else {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let check = ValidityCheck::new(reference, mask, 0.95, 0.0);
        assert!(check.is_valid(&frame));
    }

    #[test]
    fn check_accepts_reference_and_rejects_other_scene() {
        let check = ValidityCheck::new(scene(32, 32), full_mask(32, 32), 0.9, 0.0);
        assert!(check.is_valid(&scene(32, 32)));
        assert!(!check.is_valid(&other_scene(32, 32)));
        assert!(!check.is_valid(&scene(16, 16)));
    }

    #[test]
    fn blur_keeps_identical_frames_valid() {
        let check = ValidityCheck::new(scene(32, 32), full_mask(32, 32), 0.9, 1.5);
        assert!(check.is_valid(&scene(32, 32)));
    }
}
