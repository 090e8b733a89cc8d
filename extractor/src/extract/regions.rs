use image::{GrayImage, RgbImage};
use std::path::Path;
use tracing::{debug, info};

/// One tracked area of the frame.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub mask: GrayImage,
}

/// Everything an extractor needs to know about a show's camera setup.
///
/// Loaded from a directory of PNGs for one video quality:
///
///   frame_<quality>.png          reference frame of the expected camera angle
///   frame_mask_<quality>.png     part of the reference used for the validity check
///   hue_<name>_<quality>.png     region whose color is tracked
///   temp_<name>_<quality>.png    region whose color temperature is tracked
///
/// Hue and temperature regions are ordered by file name.
#[derive(Debug, Clone)]
pub struct RegionSet {
    pub reference: RgbImage,
    pub reference_mask: GrayImage,
    pub hues: Vec<Region>,
    pub temps: Vec<Region>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("failed to read region directory {0}: {1}")]
    ReadDir(String, std::io::Error),
    #[error("failed to load image {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("missing {0}")]
    Missing(String),
    #[error("{path} is {got_w}x{got_h} but the reference frame is {want_w}x{want_h}")]
    DimensionMismatch {
        path: String,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
}

impl RegionSet {
    pub fn load(dir: &Path, quality: &str) -> Result<Self, RegionError> {
        let suffix = format!("_{quality}.png");
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map_err(|e| RegionError::ReadDir(dir.display().to_string(), e))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(&suffix))
            .collect();
        names.sort();

        let mut reference = None;
        let mut reference_mask = None;
        let mut hues = Vec::new();
        let mut temps = Vec::new();

        for name in names {
            let stem = &name[..name.len() - suffix.len()];
            let path = dir.join(&name);
            if stem == "frame" {
                reference = Some(load_rgb(&path)?);
            } else if stem == "frame_mask" {
                reference_mask = Some(load_gray(&path)?);
            } else if let Some(region) = stem.strip_prefix("hue_") {
                hues.push(Region {
                    name: region.to_string(),
                    mask: load_gray(&path)?,
                });
            } else if let Some(region) = stem.strip_prefix("temp_") {
                temps.push(Region {
                    name: region.to_string(),
                    mask: load_gray(&path)?,
                });
            } else {
                debug!(file = name, "ignoring unrecognised file in region directory");
            }
        }

        let reference = reference
            .ok_or_else(|| RegionError::Missing(dir.join(format!("frame{suffix}")).display().to_string()))?;
        let reference_mask = reference_mask.ok_or_else(|| {
            RegionError::Missing(dir.join(format!("frame_mask{suffix}")).display().to_string())
        })?;

        let set = Self {
            reference,
            reference_mask,
            hues,
            temps,
        };
        set.check_dimensions(dir, &suffix)?;

        info!(
            dir = %dir.display(),
            quality,
            width = set.reference.width(),
            height = set.reference.height(),
            hue_regions = set.hues.len(),
            temp_regions = set.temps.len(),
            "loaded region set"
        );
        Ok(set)
    }

    fn check_dimensions(&self, dir: &Path, suffix: &str) -> Result<(), RegionError> {
        let (want_w, want_h) = self.reference.dimensions();
        let masks = std::iter::once(("frame_mask".to_string(), &self.reference_mask))
            .chain(self.hues.iter().map(|r| (format!("hue_{}", r.name), &r.mask)))
            .chain(self.temps.iter().map(|r| (format!("temp_{}", r.name), &r.mask)));

        for (stem, mask) in masks {
            let (got_w, got_h) = mask.dimensions();
            if (got_w, got_h) != (want_w, want_h) {
                return Err(RegionError::DimensionMismatch {
                    path: dir.join(format!("{stem}{suffix}")).display().to_string(),
                    got_w,
                    got_h,
                    want_w,
                    want_h,
                });
            }
        }
        Ok(())
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, RegionError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| RegionError::Load {
            path: path.display().to_string(),
            source,
        })
}

fn load_gray(path: &Path) -> Result<GrayImage, RegionError> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|source| RegionError::Load {
            path: path.display().to_string(),
            source,
        })
}
