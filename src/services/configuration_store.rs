//! Persistence for the [`Configuration`] singleton.

use crate::models::{Configuration, DirectoryRole};
use crate::paths::is_invalid_file_path;
use crate::services::arbiter::{ArbiterError, FileArbiter};
use crate::services::json_file::{self, Parsed};
use crate::text::is_blank;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// The document exists but is empty, `null`, or not valid JSON.
    #[error("Configuration file {path} is corrupt")]
    Corrupt {
        path: Utf8PathBuf,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error(transparent)]
    Access(#[from] ArbiterError),
}

/// Loads and saves the configuration document.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationStore {
    arbiter: FileArbiter,
}

impl ConfigurationStore {
    pub fn new(arbiter: FileArbiter) -> Self {
        Self { arbiter }
    }

    /// Load the configuration at `path`; `Ok(None)` when missing or unreadable.
    pub fn deserialize(&self, path: &Utf8Path) -> Result<Option<Configuration>, ConfigurationError> {
        let parsed = json_file::read::<Configuration>(&self.arbiter, path, &CancellationToken::new())?;
        bind(parsed, path)
    }

    pub async fn deserialize_async(
        &self,
        path: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Option<Configuration>, ConfigurationError> {
        let parsed = json_file::read_async::<Configuration>(&self.arbiter, path, cancel).await?;
        bind(parsed, path)
    }

    /// Load the configuration at `path`, or start from an empty one bound to `path`.
    ///
    /// A corrupt file is still an error; it is never silently replaced.
    pub fn load_or_default(&self, path: &Utf8Path) -> Result<Configuration, ConfigurationError> {
        match self.deserialize(path)? {
            Some(configuration) => Ok(configuration),
            None => {
                tracing::info!("No configuration at {}, using defaults", path);
                Ok(Configuration::new(path))
            }
        }
    }

    /// Write `configuration` to its file path. Failures are logged, never raised.
    pub fn try_save(&self, configuration: &Configuration) -> bool {
        let Some(path) = writable_path(configuration) else {
            return false;
        };
        report_save(
            path,
            json_file::write(&self.arbiter, path, configuration, &CancellationToken::new()),
        )
    }

    pub async fn try_save_async(&self, configuration: &Configuration, cancel: &CancellationToken) -> bool {
        let Some(path) = writable_path(configuration) else {
            return false;
        };
        report_save(
            path,
            json_file::write_async(&self.arbiter, path, configuration, cancel).await,
        )
    }

    /// Set the directory for `role` and persist the result.
    ///
    /// # Returns
    ///
    /// The save outcome; `false` when the value could not be assigned or the save
    /// was cancelled or failed.
    pub async fn try_set_directory_async(
        &self,
        configuration: &mut Configuration,
        role: DirectoryRole,
        new_path: &str,
        cancel: &CancellationToken,
    ) -> bool {
        if !configuration.try_set_directory(role, new_path) {
            return false;
        }
        self.try_save_async(configuration, cancel).await
    }
}

fn writable_path(configuration: &Configuration) -> Option<&Utf8Path> {
    match configuration.file_path() {
        Some(path) if !is_blank(path.as_str()) && !is_invalid_file_path(path) => Some(path),
        _ => {
            tracing::warn!("Cannot save configuration: no valid file path");
            None
        }
    }
}

fn bind(parsed: Option<Parsed<Configuration>>, path: &Utf8Path) -> Result<Option<Configuration>, ConfigurationError> {
    match parsed {
        None => Ok(None),
        Some(Parsed::Value(mut configuration)) => {
            configuration.bind_file_path(path.to_path_buf());
            tracing::debug!("Loaded configuration from {}", path);
            Ok(Some(configuration))
        }
        Some(Parsed::Corrupt(source)) => {
            tracing::error!("Configuration file {} is corrupt", path);
            Err(ConfigurationError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn report_save(path: &Utf8Path, result: Result<bool, ArbiterError>) -> bool {
    match result {
        Ok(true) => {
            tracing::debug!("Saved configuration to {}", path);
            true
        }
        Ok(false) => {
            tracing::warn!("Configuration {} was not saved (cancelled or not writable)", path);
            false
        }
        Err(e) => {
            tracing::warn!("Failed to save configuration {}: {}", path, e);
            false
        }
    }
}
