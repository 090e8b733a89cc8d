use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub regions: RegionsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub validity: ValidityConfig,
    #[serde(default)]
    pub color: ColorConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Identifier of the video, written verbatim as the `url` of the result file.
    pub url: String,
    /// Directory of still frames named by their timestamp in seconds.
    pub frames_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionsConfig {
    pub dir: PathBuf,
    #[serde(default = "default_quality")]
    pub quality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_step_secs")]
    pub step_secs: u32,
    #[serde(default = "default_accuracy_secs")]
    pub accuracy_secs: f64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidityConfig {
    #[serde(default = "default_valid_threshold")]
    pub threshold: f64,
    /// Gaussian blur sigma applied before comparing; 0 disables blurring.
    #[serde(default)]
    pub blur_sigma: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_brightness_cutoff")]
    pub brightness_cutoff: f64,
    #[serde(default = "default_hue_threshold")]
    pub hue_threshold: f64,
    #[serde(default = "default_saturation_threshold")]
    pub saturation_threshold: f64,
    #[serde(default = "default_value_threshold")]
    pub value_threshold: f64,
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub compact: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            step_secs: default_step_secs(),
            accuracy_secs: default_accuracy_secs(),
            workers: default_workers(),
        }
    }
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self {
            threshold: default_valid_threshold(),
            blur_sigma: 0.0,
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            brightness_cutoff: default_brightness_cutoff(),
            hue_threshold: default_hue_threshold(),
            saturation_threshold: default_saturation_threshold(),
            value_threshold: default_value_threshold(),
            temperature_threshold: default_temperature_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values outside the domains the search engine is defined for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.step_secs < 1 {
            return Err(ConfigError::Invalid("search.step_secs must be >= 1".into()));
        }
        if !(self.search.accuracy_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "search.accuracy_secs must be > 0, got {}",
                self.search.accuracy_secs
            )));
        }
        if self.search.workers < 1 {
            return Err(ConfigError::Invalid("search.workers must be >= 1".into()));
        }
        if !(self.validity.threshold > 0.0 && self.validity.threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "validity.threshold must lie in (0, 1), got {}",
                self.validity.threshold
            )));
        }
        if !(self.validity.blur_sigma >= 0.0) {
            return Err(ConfigError::Invalid("validity.blur_sigma must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.color.brightness_cutoff) {
            return Err(ConfigError::Invalid(format!(
                "color.brightness_cutoff must lie in [0, 1], got {}",
                self.color.brightness_cutoff
            )));
        }
        let thresholds = [
            ("color.hue_threshold", self.color.hue_threshold),
            ("color.saturation_threshold", self.color.saturation_threshold),
            ("color.value_threshold", self.color.value_threshold),
            ("color.temperature_threshold", self.color.temperature_threshold),
        ];
        for (name, value) in thresholds {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0, got {value}")));
            }
        }
        if !matches!(self.regions.quality.as_str(), "sd" | "hd" | "fullhd") {
            return Err(ConfigError::Invalid(format!(
                "regions.quality must be one of sd, hd, fullhd, got {:?}",
                self.regions.quality
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_quality() -> String {
    "hd".into()
}
fn default_step_secs() -> u32 {
    300
}
fn default_accuracy_secs() -> f64 {
    20.0
}
fn default_workers() -> usize {
    1
}
fn default_valid_threshold() -> f64 {
    0.98
}
fn default_brightness_cutoff() -> f64 {
    0.25
}
fn default_hue_threshold() -> f64 {
    0.05
}
fn default_saturation_threshold() -> f64 {
    0.1
}
fn default_value_threshold() -> f64 {
    0.15
}
fn default_temperature_threshold() -> f64 {
    500.0
}
fn default_log_level() -> String {
    "info".into()
}
