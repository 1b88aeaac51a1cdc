use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::detection::infrastructure::onnx_face_locator::DEFAULT_FACE_CONFIDENCE;
use crate::events::infrastructure::background_uploader::DEFAULT_QUEUE_CAPACITY;
use crate::recognition::domain::face_gallery::DEFAULT_MATCH_THRESHOLD;
use crate::shared::constants::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SAVE_INTERVAL_SECS};

/// Longest accepted dedup interval: one day.
pub const MAX_SAVE_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a monitoring session. Every field has a default, so a
/// config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// A detection counts only when its confidence is strictly above this.
    pub confidence_threshold: f64,
    pub save_interval_secs: u64,
    pub output_dir: PathBuf,
    pub backend_url: Option<String>,
    pub upload_queue_capacity: usize,
    pub match_threshold: f64,
    pub face_confidence: f64,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            save_interval_secs: DEFAULT_SAVE_INTERVAL_SECS,
            output_dir: PathBuf::from("."),
            backend_url: None,
            upload_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            face_confidence: DEFAULT_FACE_CONFIDENCE,
            frame_width: Some(640),
            frame_height: Some(480),
        }
    }
}

impl MonitorConfig {
    /// `<config dir>/SpoofWatch/config.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("SpoofWatch").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file at [`default_path`](Self::default_path) when it
    /// exists, otherwise returns defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("match_threshold", self.match_threshold)?;
        check_unit("face_confidence", self.face_confidence)?;
        if self.save_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "save_interval_secs must be greater than zero".into(),
            ));
        }
        if self.save_interval_secs > MAX_SAVE_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "save_interval_secs must be at most {MAX_SAVE_INTERVAL_SECS}, got {}",
                self.save_interval_secs
            )));
        }
        if self.frame_width.is_some() != self.frame_height.is_some() {
            return Err(ConfigError::Invalid(
                "frame_width and frame_height must be set together".into(),
            ));
        }
        Ok(())
    }

    /// The dedup interval, clamped to [`MAX_SAVE_INTERVAL_SECS`] for
    /// configs that skipped [`validate`](Self::validate).
    pub fn save_interval(&self) -> TimeDelta {
        let secs = self.save_interval_secs.min(MAX_SAVE_INTERVAL_SECS) as i64;
        TimeDelta::try_seconds(secs).unwrap_or_else(TimeDelta::zero)
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_width.zip(self.frame_height)
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be between 0 and 1, got {value}"
        )))
    }
}
