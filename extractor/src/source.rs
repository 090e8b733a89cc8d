use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to list frames in {0}: {1}")]
    ReadDir(String, std::io::Error),
    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("frame backend failed at {second:.2}s: {reason}")]
    Backend { second: f64, reason: String },
}

/// Anything that can hand out decoded frames of one video by timestamp.
pub trait FrameSource: Send + Sync {
    /// The frame shown at `second`, or `None` if the source has nothing there.
    fn get_frame(&self, second: f64) -> Result<Option<RgbImage>, SourceError>;

    /// Duration in seconds; the last instant that may be sampled.
    fn length(&self) -> f64;
}

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Frames previously dumped to a directory, one file per instant, named by
/// their timestamp in seconds (`0.png`, `120.png`, `7.5.jpg`).
///
/// A request returns the latest frame at or before the requested second,
/// i.e. what a player would be showing at that time.
pub struct ImageDirSource {
    /// Sorted by timestamp.
    frames: Vec<(f64, PathBuf)>,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let mut frames: Vec<(f64, PathBuf)> = std::fs::read_dir(dir)
            .map_err(|e| SourceError::ReadDir(dir.display().to_string(), e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| frame_timestamp(&path).map(|t| (t, path)))
            .collect();
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));

        let source = Self { frames };
        info!(
            dir = %dir.display(),
            frames = source.frames.len(),
            length = source.length(),
            "opened frame directory"
        );
        Ok(source)
    }
}

/// Timestamp encoded in a frame file name, if it is one.
fn frame_timestamp(path: &Path) -> Option<f64> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !FRAME_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    let t: f64 = path.file_stem()?.to_str()?.parse().ok()?;
    (t.is_finite() && t >= 0.0).then_some(t)
}

impl FrameSource for ImageDirSource {
    fn get_frame(&self, second: f64) -> Result<Option<RgbImage>, SourceError> {
        if second > self.length() {
            return Ok(None);
        }
        let shown = self.frames.partition_point(|(t, _)| *t <= second);
        let Some((_, path)) = shown.checked_sub(1).map(|i| &self.frames[i]) else {
            return Ok(None);
        };
        image::open(path)
            .map(|img| Some(img.to_rgb8()))
            .map_err(|source| SourceError::Decode {
                path: path.display().to_string(),
                source,
            })
    }

    fn length(&self) -> f64 {
        self.frames.last().map(|(t, _)| *t).unwrap_or(0.0)
    }
}
