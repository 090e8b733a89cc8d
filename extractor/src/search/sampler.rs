use stagelight_common::snapshot::StateSnapshot;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::extract::color::SimilarityError;
use crate::extract::traits::{ExtractError, StateExtractor};
use crate::source::FrameSource;

/// Samples the lighting state at single instants.
///
/// Every way a sample can fail (no frame, decode error, wrong scene, failed
/// extraction) ends up as an invalid snapshot at that instant.
#[derive(Clone)]
pub struct Sampler {
    source: Arc<dyn FrameSource>,
    extractor: Arc<dyn StateExtractor>,
}

impl Sampler {
    pub fn new(source: Arc<dyn FrameSource>, extractor: Arc<dyn StateExtractor>) -> Self {
        Self { source, extractor }
    }

    pub fn sample(&self, t: f64) -> StateSnapshot {
        let frame = match self.source.get_frame(t) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(t, "no frame available");
                return StateSnapshot::invalid(t);
            }
            Err(e) => {
                warn!(t, error = %e, "frame fetch failed");
                return StateSnapshot::invalid(t);
            }
        };

        match self.extractor.extract(&frame) {
            Ok(snapshot) => {
                let snapshot = snapshot.at(t);
                debug!(%snapshot, "sampled");
                snapshot
            }
            Err(ExtractError::InvalidFrame) => {
                debug!(t, extractor = self.extractor.name(), "frame not valid");
                StateSnapshot::invalid(t)
            }
            Err(e) => {
                warn!(t, extractor = self.extractor.name(), error = %e, "extraction failed");
                StateSnapshot::invalid(t)
            }
        }
    }

    pub fn similar(&self, a: &StateSnapshot, b: &StateSnapshot) -> Result<bool, SimilarityError> {
        self.extractor.similar(a, b)
    }
}
