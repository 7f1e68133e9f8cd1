//! Persistence for [`Project`] documents.
//!
//! Every project lives in `<projects root>/<name>/Project.json`. The store creates
//! that layout, reads documents back (binding the path they were read from) and
//! writes them, always through the [`FileArbiter`].

use crate::models::{PROJECT_FILE_NAME, Project};
use crate::paths::{contains_invalid_path_characters, is_invalid_file_path};
use crate::services::arbiter::{ArbiterError, FileArbiter};
use crate::services::json_file::{self, Parsed};
use crate::text::{TextValidator, is_blank};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while loading a project.
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The document exists but is empty, `null`, or not valid JSON.
    #[error("Project file {path} is corrupt")]
    Corrupt {
        path: Utf8PathBuf,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error(transparent)]
    Access(#[from] ArbiterError),
}

/// Directory a project called `name` would occupy under `root`, or `None` when
/// `root` is not an existing, well-formed directory or `name` is not acceptable.
pub(crate) fn project_directory(
    root: &Utf8Path,
    name: &str,
    validator: &dyn TextValidator,
) -> Option<Utf8PathBuf> {
    if contains_invalid_path_characters(root.as_str()) || !root.is_dir() {
        tracing::debug!("Rejected projects root {:?}", root);
        return None;
    }
    if is_blank(name) || contains_invalid_path_characters(name) || !validator.is_valid(name) {
        tracing::debug!("Rejected project name {:?}", name);
        return None;
    }
    Some(root.join(name))
}

fn has_writable_path(project: &Project) -> bool {
    match project.file_path() {
        Some(path) => !is_blank(path.as_str()) && !is_invalid_file_path(path),
        None => false,
    }
}

/// Creates, loads and saves projects.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore {
    arbiter: FileArbiter,
}

impl ProjectStore {
    pub fn new(arbiter: FileArbiter) -> Self {
        Self { arbiter }
    }

    pub fn arbiter(&self) -> &FileArbiter {
        &self.arbiter
    }

    /// Create a project directory named `name` under `root` and write a fresh document.
    ///
    /// # Returns
    ///
    /// The new project, or `None` when validation fails, a project already occupies
    /// that directory, or the initial save did not succeed.
    pub fn create(&self, root: &Utf8Path, name: &str, validator: &dyn TextValidator) -> Option<Project> {
        let directory = project_directory(root, name, validator)?;
        let file_path = directory.join(PROJECT_FILE_NAME);
        if file_path.exists() {
            tracing::warn!("Project {} already exists", directory);
            return None;
        }

        if let Err(e) = std::fs::create_dir_all(&directory) {
            tracing::warn!("Failed to create project directory {}: {}", directory, e);
            return None;
        }

        let project = Project::new(file_path);
        if !self.try_save(&project) {
            return None;
        }

        tracing::info!("Created project {} ({})", project.display_name(), project.id());
        Some(project)
    }

    /// Async twin of [`create`](Self::create). Cancellation makes it return `None`.
    pub async fn create_async(
        &self,
        root: &Utf8Path,
        name: &str,
        validator: &dyn TextValidator,
        cancel: &CancellationToken,
    ) -> Option<Project> {
        let directory = project_directory(root, name, validator)?;
        let file_path = directory.join(PROJECT_FILE_NAME);
        if tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            tracing::warn!("Project {} already exists", directory);
            return None;
        }

        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            tracing::warn!("Failed to create project directory {}: {}", directory, e);
            return None;
        }

        let project = Project::new(file_path);
        if !self.try_save_async(&project, cancel).await {
            return None;
        }

        tracing::info!("Created project {} ({})", project.display_name(), project.id());
        Some(project)
    }

    /// Load the project document at `path`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(project))` bound to `path`
    /// - `Ok(None)` if the file is missing or cannot be opened for reading
    /// - `Err(ProjectError::Corrupt)` if the file is empty, `null` or malformed
    pub fn deserialize(&self, path: &Utf8Path) -> Result<Option<Project>, ProjectError> {
        self.deserialize_cancellable(path, &CancellationToken::new())
    }

    pub(crate) fn deserialize_cancellable(
        &self,
        path: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Option<Project>, ProjectError> {
        let parsed = json_file::read::<Project>(&self.arbiter, path, cancel)?;
        bind(parsed, path)
    }

    /// Async twin of [`deserialize`](Self::deserialize); `Ok(None)` when cancelled.
    pub async fn deserialize_async(
        &self,
        path: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Option<Project>, ProjectError> {
        let parsed = json_file::read_async::<Project>(&self.arbiter, path, cancel).await?;
        bind(parsed, path)
    }

    /// Write `project` to its file path. Failures are logged, never raised.
    pub fn try_save(&self, project: &Project) -> bool {
        if !has_writable_path(project) {
            tracing::warn!("Cannot save project {}: no valid file path", project.id());
            return false;
        }
        let Some(path) = project.file_path() else {
            return false;
        };

        report_save(path, json_file::write(&self.arbiter, path, project, &CancellationToken::new()))
    }

    pub async fn try_save_async(&self, project: &Project, cancel: &CancellationToken) -> bool {
        if !has_writable_path(project) {
            tracing::warn!("Cannot save project {}: no valid file path", project.id());
            return false;
        }
        let Some(path) = project.file_path() else {
            return false;
        };

        report_save(path, json_file::write_async(&self.arbiter, path, project, cancel).await)
    }
}

fn bind(parsed: Option<Parsed<Project>>, path: &Utf8Path) -> Result<Option<Project>, ProjectError> {
    match parsed {
        None => Ok(None),
        Some(Parsed::Value(mut project)) => {
            project.bind_file_path(path.to_path_buf());
            tracing::debug!("Loaded project {} from {}", project.id(), path);
            Ok(Some(project))
        }
        Some(Parsed::Corrupt(source)) => {
            tracing::error!("Project file {} is corrupt", path);
            Err(ProjectError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn report_save(path: &Utf8Path, result: Result<bool, ArbiterError>) -> bool {
    match result {
        Ok(true) => {
            tracing::debug!("Saved project file {}", path);
            true
        }
        Ok(false) => {
            tracing::warn!("Project file {} was not saved (cancelled or not writable)", path);
            false
        }
        Err(e) => {
            tracing::warn!("Failed to save project file {}: {}", path, e);
            false
        }
    }
}
