//! Configuration for Synheart Mood.

use crate::error::MoodError;
use crate::features::{FeatureConfig, DEFAULT_BASELINE_WINDOW_DAYS, MAX_BASELINE_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "synheart-mood";

/// Main configuration, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Calendar days in the trailing baseline window
    pub baseline_window_days: u32,

    /// Minimum baseline observations per signal
    pub min_sleep_baseline_days: usize,
    pub min_hrv_baseline_days: usize,
    pub min_activity_baseline_days: usize,
    pub min_stress_baseline_days: usize,

    /// Allow files whose processing failed to be submitted again
    pub retry_failed_uploads: bool,

    /// Tracing filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let gates = FeatureConfig::default();

        Self {
            database_path: data_dir.join("mood.db"),
            baseline_window_days: DEFAULT_BASELINE_WINDOW_DAYS,
            min_sleep_baseline_days: gates.min_sleep_baseline_days,
            min_hrv_baseline_days: gates.min_hrv_baseline_days,
            min_activity_baseline_days: gates.min_activity_baseline_days,
            min_stress_baseline_days: gates.min_stress_baseline_days,
            retry_failed_uploads: false,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MoodError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| MoodError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MoodError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    pub fn validate(&self) -> Result<(), MoodError> {
        if !(1..=MAX_BASELINE_WINDOW_DAYS).contains(&self.baseline_window_days) {
            return Err(MoodError::Config(format!(
                "baseline_window_days must be between 1 and {MAX_BASELINE_WINDOW_DAYS}, got {}",
                self.baseline_window_days
            )));
        }
        Ok(())
    }

    /// The feature engine's slice of the configuration
    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            baseline_window_days: self.baseline_window_days,
            min_sleep_baseline_days: self.min_sleep_baseline_days,
            min_hrv_baseline_days: self.min_hrv_baseline_days,
            min_activity_baseline_days: self.min_activity_baseline_days,
            min_stress_baseline_days: self.min_stress_baseline_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.baseline_window_days, 28);
        assert_eq!(config.min_hrv_baseline_days, 10);
        assert!(!config.retry_failed_uploads);
        assert!(config.database_path.ends_with("synheart-mood/mood.db"));
        assert_eq!(config.feature_config(), FeatureConfig::default());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_partial_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.json");

        let config = Config {
            baseline_window_days: 14,
            retry_failed_uploads: true,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);

        std::fs::write(&path, r#"{"min_stress_baseline_days": 7}"#).unwrap();
        let partial = Config::load(&path).unwrap();
        assert_eq!(partial.min_stress_baseline_days, 7);
        assert_eq!(partial.baseline_window_days, 28);
    }

    #[test]
    fn test_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"baseline_window_days": 0}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(MoodError::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"baseline_window_days": 4294967295}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(MoodError::Config(_))));

        std::fs::write(&path, r#"{"baseline_window_days": 3650}"#).unwrap();
        assert_eq!(Config::load(&path).unwrap().baseline_window_days, 3650);
    }
}
