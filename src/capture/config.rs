//! Capture configuration.
//!
//! Loaded from a TOML file; every section falls back to its defaults
//! when omitted.

use super::session::{BusyPolicy, SessionPolicy};
use crate::hardware::PictureFormat;
use crate::negotiation::AspectTolerance;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Capture behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Picture encoding requested when the sensor advertises it.
    pub preferred_format: PictureFormat,
    /// Take the picture even if focusing fails.
    pub capture_on_focus_failure: bool,
    /// Trigger handling while a session is in flight.
    pub on_busy: BusyPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preferred_format: PictureFormat::Jpeg,
            capture_on_focus_failure: true,
            on_busy: BusyPolicy::Ignore,
        }
    }
}

impl CaptureConfig {
    /// Session policy derived from this configuration.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            capture_on_focus_failure: self.capture_on_focus_failure,
            on_busy: self.on_busy,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("aspect tolerances must be finite and non-negative")]
    InvalidTolerance,
    #[error("output file prefix must not be empty")]
    EmptyPrefix,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Where handed-off pictures are written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving pictures.
    pub directory: PathBuf,
    /// File name prefix.
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
            file_prefix: "photo".to_string(),
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub negotiation: AspectTolerance,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.negotiation.is_valid() {
            return Err(ConfigError::InvalidTolerance);
        }
        if self.output.file_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }
}
