//! Configuration for the flowstate sensor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Segmentation and classification tunables
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Keystroke-dynamics record extraction
    #[serde(default)]
    pub record: RecordConfig,

    /// Path for exporting snapshots and timing records
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,

    /// Path for storing transparency counters
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_data_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flowstate-sensor")
}

fn default_export_path() -> PathBuf {
    default_data_path().join("exports")
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file, falling back to defaults when it is absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flowstate-sensor")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            record: RecordConfig::default(),
            export_path: default_export_path(),
            data_path: default_data_path(),
        }
    }
}

/// Tunables for segmentation, feature extraction and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// A gap at least this long closes the open sample (user left and came back)
    pub context_switch_window_ms: i64,
    /// Gaps longer than this count as breaks; gaps from 2s up to it count as pauses
    pub break_window_ms: i64,
    /// Re-baseline the state once the open sample spans this long
    pub max_length_for_analysis_ms: i64,
    /// Capacity of the rolling open sample
    pub max_window_size: usize,
    /// Recompute on the first capacity overflow, then on every Nth one
    pub eviction_recompute_interval: usize,
    /// Typing-rate thresholds driving the scores
    pub rates: RateThresholds,
    /// Drop paste/bulk-delete events before scoring
    pub filter_anomalies: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_switch_window_ms: 10_000,
            break_window_ms: 2_000,
            max_length_for_analysis_ms: 1_000,
            max_window_size: 100,
            eviction_recompute_interval: 10,
            rates: RateThresholds::default(),
            filter_anomalies: false,
        }
    }
}

/// Typing-rate thresholds in events per minute.
///
/// Rates are measured over short samples (about one second by default), so the defaults sit
/// well above a typist's long-run average. Smashing starts at 10 keys per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateThresholds {
    pub normal: f64,
    pub fast: f64,
    /// Above this only keyboard smashing is plausible
    pub smash: f64,
    pub slow: f64,
}

impl Default for RateThresholds {
    fn default() -> Self {
        Self {
            normal: 300.0,
            fast: 420.0,
            smash: 600.0,
            slow: 120.0,
        }
    }
}

impl RateThresholds {
    /// Low thresholds (smash at 100 events/min) for long samples of slow, deliberate input.
    ///
    /// With one-second samples anything above 2.5 keys per second reads as smashing.
    pub fn strict() -> Self {
        Self {
            normal: 50.0,
            fast: 70.0,
            smash: 100.0,
            slow: 20.0,
        }
    }
}

/// Settings for periodic keystroke-dynamics record extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Seconds between record attempts
    pub record_interval_secs: u64,
    /// Subject number written into every record
    pub subject: u32,
    /// Session index written into every record
    pub session_index: u32,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            record_interval_secs: 30,
            subject: 0,
            session_index: 1,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
