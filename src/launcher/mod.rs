//! Launcher orchestration.
//!
//! [`Launcher`] is the headless core behind the project launcher screen. It keeps the
//! in-memory [`Configuration`], mirrors user-facing values into a [`StateManager`] and
//! pushes every slow operation onto a background [`SyncQueue`]:
//!
//! - `configuration-save`: one item per directory/language change, each carrying a
//!   snapshot of the configuration taken when the change was made
//! - `project-sync`: project creation, rename and save
//! - `project-fetch`: discovery of the projects under the projects directory
//!
//! Callers never wait on file I/O unless they choose to await a returned handle.

use crate::models::{Configuration, DirectoryRole, Language, Project};
use crate::paths::RestrictedPathMatcher;
use crate::services::{
    ArbiterError, ConfigurationStore, FileArbiter, ProjectError, ProjectRepository, ProjectStore, QueueError,
    SyncQueue, WorkHandle,
};
use crate::state::StateManager;
use crate::text::{ProjectNameTransformer, ProjectNameValidator, TextTransformer, TextValidator, is_blank};
use camino::{Utf8Path, Utf8PathBuf};
use futures::TryStreamExt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Outcome of a project fetch: how many projects were stored.
pub type FetchResult = Result<usize, ProjectError>;

pub struct Launcher {
    configuration: Mutex<Configuration>,
    configuration_store: ConfigurationStore,
    repository: ProjectRepository,
    validator: Arc<dyn TextValidator>,
    transformer: Arc<dyn TextTransformer>,
    restricted_paths: RestrictedPathMatcher,
    state: StateManager,

    save_configuration_queue: SyncQueue<bool>,
    project_queue: SyncQueue<Option<Project>>,
    fetch_queue: SyncQueue<FetchResult>,

    /// Stops the queues from taking new work and cancels fetches.
    shutdown: CancellationToken,
    /// Cancels writes. Never fired by `shutdown` so accepted saves are still drained.
    abort: CancellationToken,
}

impl Launcher {
    /// Build the launcher around an already loaded configuration.
    ///
    /// Queue consumers are spawned on `runtime`. An initial project fetch is queued.
    pub fn new(configuration: Configuration, arbiter: FileArbiter, runtime: &Handle) -> Self {
        let shutdown = CancellationToken::new();
        let state = StateManager::new();
        for role in DirectoryRole::ALL {
            state.set_directory(role, configuration.directory_path(role));
        }

        let launcher = Self {
            configuration: Mutex::new(configuration),
            configuration_store: ConfigurationStore::new(arbiter.clone()),
            repository: ProjectRepository::new(ProjectStore::new(arbiter)),
            validator: Arc::new(ProjectNameValidator::new()),
            transformer: Arc::new(ProjectNameTransformer::new()),
            restricted_paths: RestrictedPathMatcher::new(),
            state,
            save_configuration_queue: SyncQueue::spawn_on("configuration-save", runtime, &shutdown),
            project_queue: SyncQueue::spawn_on("project-sync", runtime, &shutdown),
            fetch_queue: SyncQueue::spawn_on("project-fetch", runtime, &shutdown),
            shutdown,
            abort: CancellationToken::new(),
        };

        if let Err(e) = launcher.refresh_projects() {
            tracing::warn!("Initial project fetch was not queued: {}", e);
        }
        tracing::info!("Launcher started");
        launcher
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Copy of the in-memory configuration.
    pub fn configuration(&self) -> Configuration {
        self.lock_configuration().clone()
    }

    fn lock_configuration(&self) -> std::sync::MutexGuard<'_, Configuration> {
        self.configuration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Directories

    pub fn directory_path(&self, role: DirectoryRole) -> String {
        self.state.read(|state| state.directory(role).to_string())
    }

    /// Change the directory for `role`.
    ///
    /// A configuration save is queued whenever the persisted value differs. Returns
    /// `false` when the launcher already held `path` for that role, or when the save
    /// could not be queued; the configuration then keeps its previous value.
    pub fn set_directory_path(&self, role: DirectoryRole, path: &str) -> bool {
        {
            let mut configuration = self.lock_configuration();
            if configuration.directory_path(role) != path {
                let previous = configuration.clone();
                if configuration.try_set_directory(role, path)
                    && self.enqueue_configuration_save(configuration.clone()).is_none()
                {
                    *configuration = previous;
                    return false;
                }
            }
        }

        if self.state.set_directory(role, path).is_empty() {
            tracing::debug!("Directory {} was not changed, it already had that value", role);
            return false;
        }

        tracing::info!("Directory {} set to {:?}", role, path);
        if let Err(e) = self.refresh_projects() {
            tracing::warn!("Project fetch was not queued: {}", e);
        }
        true
    }

    /// The directory is set, exists, and is not a protected system location.
    pub fn is_valid_configuration_directory(&self, role: DirectoryRole) -> bool {
        let path = self.directory_path(role);
        !is_blank(&path) && Utf8Path::new(&path).is_dir() && !self.restricted_paths.is_match(&path)
    }

    pub fn are_valid_configuration_directories(&self, roles: &[DirectoryRole]) -> bool {
        roles.iter().all(|&role| self.is_valid_configuration_directory(role))
    }

    /// Projects are only listed once every directory is usable.
    pub fn are_projects_visible(&self) -> bool {
        self.are_valid_configuration_directories(&DirectoryRole::ALL)
    }

    pub fn language(&self) -> Language {
        self.lock_configuration().language().clone()
    }

    /// Change the language and queue a configuration save if it differs.
    /// The previous language is kept when the save cannot be queued.
    pub fn set_language(&self, language: Language) -> bool {
        let mut configuration = self.lock_configuration();
        if configuration.language() == &language {
            return false;
        }

        let previous = configuration.language().clone();
        configuration.set_language(language);
        if self.enqueue_configuration_save(configuration.clone()).is_none() {
            configuration.set_language(previous);
            return false;
        }
        true
    }

    fn enqueue_configuration_save(&self, snapshot: Configuration) -> Option<WorkHandle<bool>> {
        let store = self.configuration_store.clone();
        let abort = self.abort.clone();

        let queued = self.save_configuration_queue.enqueue(async move {
            let saved = store.try_save_async(&snapshot, &abort).await;
            if !saved {
                tracing::error!("Could not save configuration");
            }
            saved
        });

        match queued {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Configuration change will not be saved: {}", e);
                None
            }
        }
    }

    // New project

    pub fn project_name(&self) -> String {
        self.state.read(|state| state.project_name.clone())
    }

    /// Store `text` canonicalized into a project name, and return that name.
    pub fn set_project_name(&self, text: &str) -> String {
        let name = self.transformer.transform(text);
        self.state.set_project_name(name.clone());
        name
    }

    /// The current name is acceptable and no existing project already uses it.
    ///
    /// Reads the matching project file synchronously; async callers go through
    /// [`create_project`](Self::create_project) instead.
    pub fn is_valid_project_name(&self) -> bool {
        let Some((root, name)) = self.project_name_candidate() else {
            return false;
        };
        let existing = self.repository.get_by_name(&root, &name, self.validator.as_ref());
        is_name_free(&name, existing)
    }

    pub fn can_create_project(&self) -> bool {
        self.is_valid_project_name() && self.are_valid_configuration_directories(&DirectoryRole::ALL)
    }

    async fn can_create_project_async(&self) -> bool {
        if !self.are_valid_configuration_directories(&DirectoryRole::ALL) {
            return false;
        }
        let Some((root, name)) = self.project_name_candidate() else {
            return false;
        };
        let existing = self
            .repository
            .get_by_name_async(&root, &name, self.validator.as_ref(), &self.shutdown)
            .await;
        is_name_free(&name, existing)
    }

    /// Projects root and current name, when both pass the checks that need no project file.
    fn project_name_candidate(&self) -> Option<(Utf8PathBuf, String)> {
        if !self.is_valid_configuration_directory(DirectoryRole::Projects) {
            return None;
        }
        let name = self.project_name();
        if is_blank(&name) || !self.validator.is_valid(&name) {
            return None;
        }
        Some((Utf8PathBuf::from(self.directory_path(DirectoryRole::Projects)), name))
    }

    /// Create a project from the current name on the project queue, then refresh.
    ///
    /// # Returns
    /// The created project, or `None` if creation was not possible or failed.
    pub async fn create_project(&self) -> Option<Project> {
        if !self.can_create_project_async().await {
            tracing::warn!("Cannot create project {:?}", self.project_name());
            return None;
        }

        let root = Utf8PathBuf::from(self.directory_path(DirectoryRole::Projects));
        let name = self.project_name();
        let store = self.repository.store().clone();
        let validator = self.validator.clone();
        let abort = self.abort.clone();

        let handle = self
            .project_queue
            .enqueue(async move { store.create_async(&root, &name, validator.as_ref(), &abort).await })
            .inspect_err(|e| tracing::error!("Project was not created: {}", e))
            .ok()?;

        let created = handle.wait().await.flatten();
        if created.is_some() {
            self.state.set_project_name(String::new());
            if let Err(e) = self.refresh_projects() {
                tracing::warn!("Project fetch was not queued: {}", e);
            }
        }
        created
    }

    /// Rename `project` by moving its directory, then refresh the project list.
    ///
    /// # Returns
    /// The renamed project, or `None` if the rename was refused or failed.
    pub async fn rename_project(&self, project: Project, new_name: &str) -> Option<Project> {
        let new_name = self.transformer.transform(new_name);
        let validator = self.validator.clone();

        let handle = self
            .project_queue
            .enqueue(async move {
                let renamed = tokio::task::spawn_blocking(move || {
                    let mut project = project;
                    project
                        .try_set_name(&new_name, validator.as_ref())
                        .then_some(project)
                })
                .await;

                match renamed {
                    Ok(renamed) => renamed,
                    Err(e) => {
                        tracing::error!("Rename task failed: {}", e);
                        None
                    }
                }
            })
            .inspect_err(|e| tracing::error!("Project was not renamed: {}", e))
            .ok()?;

        let renamed = handle.wait().await.flatten();
        if renamed.is_some() {
            if let Err(e) = self.refresh_projects() {
                tracing::warn!("Project fetch was not queued: {}", e);
            }
        }
        renamed
    }

    /// Queue a save of `project`. The handle yields the project once it is on disk.
    pub fn save_project(&self, project: Project) -> Result<WorkHandle<Option<Project>>, QueueError> {
        let store = self.repository.store().clone();
        let abort = self.abort.clone();

        self.project_queue.enqueue(async move {
            if store.try_save_async(&project, &abort).await {
                Some(project)
            } else {
                tracing::error!("Could not save project {}", project.display_name());
                None
            }
        })
    }

    // Project list

    /// Queue a fetch of every project under the projects directory.
    ///
    /// On success the state's project list is replaced (sorted by name) and
    /// [`LauncherEvent::ProjectsFetched`](crate::state::LauncherEvent::ProjectsFetched)
    /// is emitted. A cancelled or failed fetch leaves the list untouched.
    pub fn refresh_projects(&self) -> Result<WorkHandle<FetchResult>, QueueError> {
        let root = Utf8PathBuf::from(self.directory_path(DirectoryRole::Projects));
        let repository = self.repository.clone();
        let state = self.state.clone();
        let cancel = self.shutdown.clone();

        self.fetch_queue.enqueue(async move {
            let lister = repository.clone();
            let paths = tokio::task::spawn_blocking(move || lister.list_candidate_files(&root))
                .await
                .map_err(ArbiterError::from)?;

            let projects: Vec<Project> = repository
                .deserialize_all_async(paths, cancel.clone())
                .try_collect()
                .await
                .inspect_err(|e| tracing::error!("Project fetch aborted: {}", e))?;

            if cancel.is_cancelled() {
                tracing::debug!("Project fetch cancelled, keeping previous list");
                return Ok(0);
            }

            let count = projects.len();
            state.replace_found_projects(projects);
            tracing::info!("Fetched {} project(s)", count);
            Ok(count)
        })
    }

    pub fn found_projects(&self) -> Vec<Project> {
        self.state.read(|state| state.found_projects.clone())
    }

    pub fn set_project_filter(&self, filter: &str) {
        self.state.set_project_filter(filter.to_string());
    }

    /// Found projects that still exist and whose name or directory contains `filter`
    /// (case-insensitive). Empty unless every directory is valid.
    pub fn visible_projects(&self, filter: &str) -> Vec<Project> {
        if !self.are_projects_visible() {
            return Vec::new();
        }

        let filter = filter.to_lowercase();
        self.state.read(|state| {
            state
                .found_projects
                .iter()
                .filter(|project| project.exists())
                .filter(|project| {
                    project.display_name().to_lowercase().contains(&filter)
                        || project.display_directory_path().to_lowercase().contains(&filter)
                })
                .cloned()
                .collect()
        })
    }

    /// Visible projects under the stored filter.
    pub fn filtered_projects(&self) -> Vec<Project> {
        let filter = self.state.read(|state| state.project_filter.clone());
        self.visible_projects(&filter)
    }

    // Selection

    /// Select one of the found projects, or clear the selection with `None`.
    /// Returns `false` if `project` is not in the current list.
    pub fn select_project(&self, project: Option<Project>) -> bool {
        if let Some(project) = &project {
            if !self.state.read(|state| state.found_projects.contains(project)) {
                return false;
            }
        }
        self.state.select_project(project);
        true
    }

    pub fn selected_project(&self) -> Option<Project> {
        self.state.read(|state| state.selected_project.clone())
    }

    pub fn can_open_project(&self) -> bool {
        self.selected_project().is_some_and(|project| project.exists())
    }

    // Lifecycle

    /// Stop accepting work and drain every queue. Accepted saves still complete.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down launcher");
        self.shutdown.cancel();

        let processed = self.save_configuration_queue.shutdown().await
            + self.project_queue.shutdown().await
            + self.fetch_queue.shutdown().await;
        tracing::info!("Launcher stopped after {} queued item(s)", processed);

        self.save_configuration_queue.log_summary();
        self.project_queue.log_summary();
        self.fetch_queue.log_summary();
    }

    /// Cancel writes that have not started yet, then shut down.
    pub async fn abort(&self) {
        self.abort.cancel();
        self.shutdown().await;
    }

    /// True once shutdown was requested and every queue has finished draining.
    pub fn can_exit(&self) -> bool {
        self.shutdown.is_cancelled()
            && self.save_configuration_queue.is_finished()
            && self.project_queue.is_finished()
            && self.fetch_queue.is_finished()
    }
}

fn is_name_free(name: &str, existing: Result<Option<Project>, ProjectError>) -> bool {
    match existing {
        Ok(None) => true,
        Ok(Some(project)) => !project.exists(),
        Err(e) => {
            tracing::debug!("Project name {} is taken by an unreadable project: {}", name, e);
            false
        }
    }
}
