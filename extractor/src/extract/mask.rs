use image::{GrayImage, Rgb, RgbImage};

/// Mask pixels brighter than this select the region.
pub const MASK_GATE: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("mask is {mask_w}x{mask_h} but frame is {frame_w}x{frame_h}")]
    DimensionMismatch {
        frame_w: u32,
        frame_h: u32,
        mask_w: u32,
        mask_h: u32,
    },
}

/// Blacken every frame pixel whose mask pixel is at or below [`MASK_GATE`].
pub fn apply_mask(frame: &RgbImage, mask: &GrayImage) -> Result<RgbImage, MaskError> {
    if frame.dimensions() != mask.dimensions() {
        return Err(MaskError::DimensionMismatch {
            frame_w: frame.width(),
            frame_h: frame.height(),
            mask_w: mask.width(),
            mask_h: mask.height(),
        });
    }

    let mut masked = frame.clone();
    for (pixel, gate) in masked.pixels_mut().zip(mask.pixels()) {
        if gate.0[0] <= MASK_GATE {
            *pixel = Rgb([0, 0, 0]);
        }
    }
    Ok(masked)
}
