//! Runtime settings for the `d4mt` binary.
//!
//! Not to be confused with [`Configuration`](crate::models::Configuration), the user's
//! persisted directories. Settings control the process itself: logging, where the
//! configuration document lives, and how patiently locked files are waited for.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional `d4mt.yaml`
//! 3. `D4MT_*` environment variables (nested keys use `__`, e.g. `D4MT_OPEN_RETRY__TIMEOUT_MS`)

use crate::models::CONFIGURATION_FILE_PATH;
use crate::services::RetryPolicy;
use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "d4mt.yaml";

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory receiving daily rolling log files
    pub log_dir: String,

    /// File name prefix of the log files
    pub log_prefix: String,

    pub debug_mode: bool,

    /// Mirror logs to stdout
    pub console_output: bool,

    /// Location of `Configuration.json`
    pub configuration_file: String,

    pub open_retry: RetrySettings,
}

/// [`RetryPolicy`] in config-friendly units. A zero timeout waits forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_prefix: "d4mt".to_string(),
            debug_mode: false,
            console_output: true,
            configuration_file: CONFIGURATION_FILE_PATH.to_string(),
            open_retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
            timeout_ms: policy.timeout.map_or(0, |timeout| timeout.as_millis() as u64),
        }
    }
}

impl Settings {
    /// Reject values that would make the process misbehave.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.log_prefix.trim().is_empty(), "log_prefix must not be empty");
        ensure!(
            !self.configuration_file.trim().is_empty(),
            "configuration_file must not be empty"
        );
        self.open_retry.validate()
    }

    pub fn configuration_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.configuration_file)
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.log_dir)
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.initial_delay_ms > 0, "open_retry.initial_delay_ms must be positive");
        ensure!(
            self.max_delay_ms >= self.initial_delay_ms,
            "open_retry.max_delay_ms ({}) must be at least initial_delay_ms ({})",
            self.max_delay_ms,
            self.initial_delay_ms
        );
        ensure!(
            self.backoff_factor.is_finite() && self.backoff_factor >= 1.0,
            "open_retry.backoff_factor must be at least 1.0, got {}",
            self.backoff_factor
        );
        Ok(())
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

/// Loads and saves the settings file.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: Utf8PathBuf,
}

impl SettingsManager {
    /// # Arguments
    /// * `settings_path` - YAML settings file; it does not need to exist
    pub fn new<P: AsRef<Utf8Path>>(settings_path: P) -> Self {
        Self {
            settings_path: settings_path.as_ref().to_path_buf(),
        }
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Merge defaults, the settings file (if present) and the environment.
    ///
    /// # Returns
    /// Validated settings
    pub fn load(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::debug!("Settings file {} not found, using defaults", self.settings_path);
        }

        let defaults =
            Config::try_from(&Settings::default()).context("Failed to build default settings")?;

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(self.settings_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("D4MT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings from {}", self.settings_path))?;

        let settings: Settings = merged
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings from {}", self.settings_path))?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", self.settings_path))?;
        Ok(settings)
    }

    /// Save settings as YAML.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        if let Some(parent) = self.settings_path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent))?;
        }
        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Write the default settings unless a settings file already exists.
    ///
    /// # Returns
    /// `true` if a file was written
    pub fn write_defaults_if_missing(&self) -> Result<bool> {
        if self.settings_path.exists() {
            return Ok(false);
        }
        self.save(&Settings::default())?;
        Ok(true)
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager() -> (SettingsManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = Utf8PathBuf::try_from(temp_dir.path().join("d4mt.yaml")).unwrap();
        (SettingsManager::new(&settings_path), temp_dir)
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.configuration_file, "./Configuration.json");
        assert_eq!(settings.open_retry.to_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let (manager, _temp_dir) = create_test_manager();
        let settings = manager.load().unwrap();
        assert_eq!(settings.log_prefix, "d4mt");
        assert_eq!(settings.open_retry, RetrySettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let (manager, _temp_dir) = create_test_manager();

        let mut settings = Settings::default();
        settings.debug_mode = true;
        settings.configuration_file = "/data/Configuration.json".to_string();
        settings.open_retry.timeout_ms = 0;
        manager.save(&settings).unwrap();

        let loaded = manager.load().unwrap();
        assert!(loaded.debug_mode);
        assert_eq!(loaded.configuration_file, "/data/Configuration.json");
        assert_eq!(loaded.open_retry.to_policy().timeout, None);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let (manager, _temp_dir) = create_test_manager();
        fs::write(manager.settings_path(), "log_dir: custom-logs\nopen_retry:\n  max_delay_ms: 500\n").unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.log_dir, "custom-logs");
        assert_eq!(loaded.open_retry.max_delay_ms, 500);
        assert_eq!(loaded.open_retry.initial_delay_ms, RetrySettings::default().initial_delay_ms);
        assert_eq!(loaded.log_prefix, "d4mt");
    }

    #[test]
    fn test_invalid_backoff_is_rejected() {
        let (manager, _temp_dir) = create_test_manager();
        fs::write(manager.settings_path(), "open_retry:\n  backoff_factor: 0.5\n").unwrap();

        assert!(manager.load().is_err());
    }

    #[test]
    fn test_write_defaults_if_missing() {
        let (manager, _temp_dir) = create_test_manager();
        assert!(manager.write_defaults_if_missing().unwrap());
        assert!(!manager.write_defaults_if_missing().unwrap());
        assert_eq!(manager.load().unwrap(), Settings::default());
    }
}
