use image::RgbImage;
use stagelight_common::snapshot::StateSnapshot;

use super::color::SimilarityError;
use super::mask::MaskError;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("frame is not valid for extraction")]
    InvalidFrame,
    #[error("region mask does not fit frame: {0}")]
    Mask(#[from] MaskError),
}

/// Turns a decoded frame into a comparable lighting state.
///
/// Implementations are shared read-only across search workers.
pub trait StateExtractor: Send + Sync {
    /// Returns `true` if the frame shows the scene this extractor is set up for.
    fn is_valid(&self, frame: &RgbImage) -> bool;

    /// Extract the lighting state of a valid frame.
    ///
    /// Fails with [`ExtractError::InvalidFrame`] if `is_valid(frame)` is false.
    /// The returned snapshot is not yet placed in time.
    fn extract(&self, frame: &RgbImage) -> Result<StateSnapshot, ExtractError>;

    /// Returns `true` if both snapshots describe the same lighting state.
    fn similar(&self, a: &StateSnapshot, b: &StateSnapshot) -> Result<bool, SimilarityError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
