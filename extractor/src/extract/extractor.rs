use image::RgbImage;
use stagelight_common::config::{ColorConfig, ValidityConfig};
use stagelight_common::snapshot::StateSnapshot;

use super::color::{extract_color, hue_to_temperature, similar, SimilarityError, Thresholds};
use super::regions::{Region, RegionSet};
use super::traits::{ExtractError, StateExtractor};
use super::validity::ValidityCheck;

/// Extracts region colors and temperatures from frames that pass the
/// reference-scene check.
pub struct RegionExtractor {
    validity: ValidityCheck,
    hue_regions: Vec<Region>,
    temp_regions: Vec<Region>,
    brightness_cutoff: f64,
    thresholds: Thresholds,
}

impl RegionExtractor {
    pub fn new(regions: RegionSet, validity: &ValidityConfig, color: &ColorConfig) -> Self {
        Self {
            validity: ValidityCheck::new(
                regions.reference,
                regions.reference_mask,
                validity.threshold,
                validity.blur_sigma,
            ),
            hue_regions: regions.hues,
            temp_regions: regions.temps,
            brightness_cutoff: color.brightness_cutoff,
            thresholds: Thresholds::from(color),
        }
    }

    pub fn hue_regions(&self) -> usize {
        self.hue_regions.len()
    }

    pub fn temp_regions(&self) -> usize {
        self.temp_regions.len()
    }
}

impl StateExtractor for RegionExtractor {
    fn is_valid(&self, frame: &RgbImage) -> bool {
        self.validity.is_valid(frame)
    }

    fn extract(&self, frame: &RgbImage) -> Result<StateSnapshot, ExtractError> {
        if !self.is_valid(frame) {
            return Err(ExtractError::InvalidFrame);
        }

        let hues = self
            .hue_regions
            .iter()
            .map(|region| extract_color(frame, &region.mask, self.brightness_cutoff))
            .collect::<Result<Vec<_>, _>>()?;
        let temps = self
            .temp_regions
            .iter()
            .map(|region| {
                extract_color(frame, &region.mask, self.brightness_cutoff)
                    .map(|c| hue_to_temperature(c.h, c.s, c.v))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StateSnapshot::new(hues, temps))
    }

    fn similar(&self, a: &StateSnapshot, b: &StateSnapshot) -> Result<bool, SimilarityError> {
        similar(a, b, &self.thresholds)
    }

    fn name(&self) -> &str {
        "regions"
    }
}
