//! Configuration management for motioncam
//!
//! Provides configuration loading, saving, and validation for the motion
//! video parameters, detection thresholds, blob tracking, and recording
//! storage options.

use crate::errors::MotionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionCamConfig {
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub blob: BlobConfig,
    pub storage: StorageConfig,
}

/// Motion video stream parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second (1-30)
    pub framerate: u32,
    /// Target encoder bitrate in kbps
    pub bitrate_kbps: u32,
}

/// Detection thresholds driving the trigger/clear state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Enable motion detection
    pub enabled: bool,
    /// Active-percent moving average must fall below this before a pending
    /// clear completes (3-10)
    pub clear_percent: u32,
    /// Minimum time in WAIT_CLEAR before recording stops, in milliseconds
    /// (2000-10000)
    pub clear_wait_period_ms: u64,
}

/// Blob extraction and tracking thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Connected components smaller than this percentage of the grid are
    /// discarded as noise (0-100)
    pub cancel_percent: f32,
    /// Frames a blob must survive via overlap before it counts as genuine
    pub tracking_threshold: u32,
}

/// Recording file and retention options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving motion recordings
    pub directory: String,
    /// Filename prefix for recordings
    pub file_prefix: String,
    /// Per-file size ceiling in kilobytes (0 = unlimited)
    pub file_size_limit_kb: u64,
    /// Directory size ceiling in kilobytes; oldest files are deleted when
    /// exceeded (0 = unlimited)
    pub total_size_limit_kb: u64,
    /// Also save the raw inline motion vectors alongside the video
    pub save_imv_file: bool,
}

impl Default for MotionCamConfig {
    fn default() -> Self {
        Self {
            video: VideoConfig {
                width: 1280,
                height: 720,
                framerate: 30,
                bitrate_kbps: 3500,
            },
            detection: DetectionConfig {
                enabled: true,
                clear_percent: 5,
                clear_wait_period_ms: 5000,
            },
            blob: BlobConfig {
                cancel_percent: 5.0,
                tracking_threshold: 5,
            },
            storage: StorageConfig {
                directory: "./motion".to_string(),
                file_prefix: "motion".to_string(),
                file_size_limit_kb: 0,
                total_size_limit_kb: 0,
                save_imv_file: false,
            },
        }
    }
}

impl MotionCamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MotionError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| MotionError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config: MotionCamConfig = toml::from_str(&contents)
            .map_err(|e| MotionError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate();
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MotionError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                MotionError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| MotionError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents)
            .map_err(|e| MotionError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Clamp out-of-range values back to defaults, logging each correction.
    pub fn validate(&mut self) {
        let defaults = Self::default();

        if self.video.framerate == 0 || self.video.framerate > 30 {
            log::error!(
                "Motion framerate {} out of range 1-30, using default {}",
                self.video.framerate,
                defaults.video.framerate
            );
            self.video.framerate = defaults.video.framerate;
        }
        if self.detection.clear_percent < 3 || self.detection.clear_percent > 10 {
            log::error!(
                "Motion clear percent {} out of range 3-10, using default {}",
                self.detection.clear_percent,
                defaults.detection.clear_percent
            );
            self.detection.clear_percent = defaults.detection.clear_percent;
        }
        if self.detection.clear_wait_period_ms < 2000 || self.detection.clear_wait_period_ms > 10000
        {
            log::error!(
                "Motion clear wait period {} out of range 2000-10000 ms, using default {}",
                self.detection.clear_wait_period_ms,
                defaults.detection.clear_wait_period_ms
            );
            self.detection.clear_wait_period_ms = defaults.detection.clear_wait_period_ms;
        }
        if self.blob.cancel_percent <= 0.0 || self.blob.cancel_percent >= 100.0 {
            log::error!(
                "Blob cancel percent {} out of range 0-100, using default {}",
                self.blob.cancel_percent,
                defaults.blob.cancel_percent
            );
            self.blob.cancel_percent = defaults.blob.cancel_percent;
        }
        if self.storage.file_prefix.is_empty() {
            log::error!("Empty motion file prefix, using default");
            self.storage.file_prefix = defaults.storage.file_prefix;
        }
    }
}
