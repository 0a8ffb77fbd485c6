//! Configuration management for midi-frame
//!
//! Handles loading, parsing and validation of YAML configuration files.
//! Every field has a default, so an empty file (or no file) is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::error::EngineError;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Engine behavior, read once at construction
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Record traffic history and message counters
    #[serde(default = "default_true")]
    pub diagnostics: bool,
    /// Messages kept per direction when diagnostics are on
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Upper bound on words drained in one poll
    #[serde(default = "default_max_drain")]
    pub max_drain_per_poll: usize,
    /// Tick length for the wall-clock tick source
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Clamp send velocities/values to [0, 1] instead of truncating the scaled byte
    #[serde(default)]
    pub clamp_send_values: bool,
}

/// Settings for the `midi-frame` monitor binary
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Client name announced to the OS MIDI service
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filter: Option<String>,
    /// Output port pattern that receives echoed notes and controllers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_output: Option<String>,
    /// Frames per second of the monitor loop
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Tick on the wall clock every `engine.poll_interval_ms` instead of once per frame
    #[serde(default)]
    pub interval_clock: bool,
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            diagnostics: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_drain_per_poll: default_max_drain(),
            poll_interval_ms: default_poll_interval_ms(),
            clamp_send_values: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            input_filter: None,
            output_filter: None,
            echo_output: None,
            frame_rate: default_frame_rate(),
            interval_clock: false,
            rescan_interval_ms: default_rescan_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.max_drain_per_poll == 0 {
            return Err(EngineError::Config(
                "engine.max_drain_per_poll must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "engine.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.diagnostics && self.history_capacity == 0 {
            return Err(EngineError::Config(
                "engine.history_capacity must be at least 1 when diagnostics are on".to_string(),
            ));
        }
        Ok(())
    }
}

impl MonitorConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        if self.monitor.frame_rate == 0 || self.monitor.frame_rate > 1000 {
            anyhow::bail!(
                "monitor.frame_rate must be between 1 and 1000 (got {})",
                self.monitor.frame_rate
            );
        }
        if self.monitor.client_name.trim().is_empty() {
            anyhow::bail!("monitor.client_name cannot be empty");
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}
fn default_max_drain() -> usize {
    4096
}
fn default_poll_interval_ms() -> u64 {
    33
}
fn default_client_name() -> String {
    "midi-frame".to_string()
}
fn default_frame_rate() -> u32 {
    60
}
fn default_rescan_interval_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.engine.diagnostics);
        assert_eq!(config.engine.history_capacity, 8);
        assert!(!config.engine.clamp_send_values);
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
engine:
  clamp_send_values: true
  max_drain_per_poll: 16
monitor:
  input_filter: "keystation"
  frame_rate: 30
  interval_clock: true
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert!(config.engine.clamp_send_values);
        assert_eq!(config.engine.max_drain_per_poll, 16);
        assert_eq!(config.engine.poll_interval_ms, 33);
        assert_eq!(config.monitor.input_filter.as_deref(), Some("keystation"));
        assert_eq!(config.monitor.frame_rate, 30);
        assert!(config.monitor.interval_clock);
        assert_eq!(config.monitor.client_name, "midi-frame");
    }

    #[test]
    fn test_validation_rejects_zero_drain_bound() {
        let err = AppConfig::parse("engine:\n  max_drain_per_poll: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_drain_per_poll"));
    }

    #[test]
    fn test_validation_rejects_frame_rate() {
        assert!(AppConfig::parse("monitor:\n  frame_rate: 0\n").is_err());
        assert!(AppConfig::parse("monitor:\n  frame_rate: 5000\n").is_err());
    }

    #[test]
    fn test_disabled_diagnostics_allow_zero_capacity() {
        let config =
            AppConfig::parse("engine:\n  diagnostics: false\n  history_capacity: 0\n").unwrap();
        assert!(!config.engine.diagnostics);
    }

    #[test]
    fn test_intervals() {
        let config = AppConfig::default();
        assert_eq!(config.engine.poll_interval(), Duration::from_millis(33));
        assert_eq!(config.monitor.rescan_interval(), Duration::from_secs(2));
        assert!(config.monitor.frame_interval() < Duration::from_millis(17));
    }

    #[tokio::test]
    async fn test_load_and_save_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "engine:\n  history_capacity: 4").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.engine.history_capacity, 4);

        config.monitor.echo_output = Some("synth".to_string());
        config.save(&path).await.unwrap();

        let reloaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/midi-frame.yaml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
