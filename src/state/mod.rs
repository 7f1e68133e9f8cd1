// State management module
//
// This module provides the StateManager which wraps LauncherSnapshot with thread-safe
// access using Arc<RwLock<T>> and emits change events for whatever front end observes it.

use crate::models::{DirectoryRole, LauncherSnapshot, Project};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when launcher state is modified
///
/// Observers subscribe instead of polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum LauncherEvent {
    /// A configured directory changed
    DirectoryChanged { role: DirectoryRole, path: String },

    /// The (already canonicalized) new-project name changed
    ProjectNameChanged { name: String },

    /// The project list filter changed
    FilterChanged { filter: String },

    /// A project fetch finished and replaced the project list
    ProjectsFetched { count: usize },

    /// The selected project changed (`None` when cleared)
    SelectionChanged { name: Option<String> },
}

/// Thread-safe launcher state with event emission
///
/// - Provides thread-safe access to [`LauncherSnapshot`] via `Arc<RwLock<T>>`
/// - Detects changes and emits [`LauncherEvent`]s
/// - Supports subscribing to changes via a tokio broadcast channel
///
/// Clones share the same state and channel.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<LauncherSnapshot>>,

    /// Multiple subscribers can listen for changes
    event_tx: broadcast::Sender<LauncherEvent>,
}

impl StateManager {
    /// Create a new StateManager with empty state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(LauncherSnapshot::default())),
            event_tx,
        }
    }

    /// Get a copy of the current state
    pub fn snapshot(&self) -> LauncherSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let count = state_manager.read(|state| state.found_projects.len());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&LauncherSnapshot) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs old against new and
    /// broadcasts one event per detected change.
    ///
    /// # Returns
    /// The events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<LauncherEvent>
    where
        F: FnOnce(&mut LauncherSnapshot),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            // Nobody listening is fine
            let _ = self.event_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.event_tx.subscribe()
    }

    // Convenience methods for common state updates

    pub fn set_directory(&self, role: DirectoryRole, path: &str) -> Vec<LauncherEvent> {
        self.update(|state| {
            *state.directory_mut(role) = path.to_string();
        })
    }

    pub fn set_project_name(&self, name: String) -> Vec<LauncherEvent> {
        self.update(|state| state.project_name = name)
    }

    pub fn set_project_filter(&self, filter: String) -> Vec<LauncherEvent> {
        self.update(|state| state.project_filter = filter)
    }

    /// Store the result of a fetch, sorted by display name
    ///
    /// Always emits [`LauncherEvent::ProjectsFetched`], even when the list is
    /// unchanged. A selection that is no longer in the list is cleared.
    pub fn replace_found_projects(&self, mut projects: Vec<Project>) -> Vec<LauncherEvent> {
        projects.sort();
        self.update(|state| {
            if let Some(selected) = &state.selected_project {
                if !projects.contains(selected) {
                    state.selected_project = None;
                }
            }
            state.found_projects = projects;
            state.fetches_completed += 1;
        })
    }

    pub fn select_project(&self, project: Option<Project>) -> Vec<LauncherEvent> {
        self.update(|state| state.selected_project = project)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Work out which events an update produced
fn detect_changes(old: &LauncherSnapshot, new: &LauncherSnapshot) -> Vec<LauncherEvent> {
    let mut changes = Vec::new();

    for role in DirectoryRole::ALL {
        if old.directory(role) != new.directory(role) {
            changes.push(LauncherEvent::DirectoryChanged {
                role,
                path: new.directory(role).to_string(),
            });
        }
    }

    if old.project_name != new.project_name {
        changes.push(LauncherEvent::ProjectNameChanged {
            name: new.project_name.clone(),
        });
    }

    if old.project_filter != new.project_filter {
        changes.push(LauncherEvent::FilterChanged {
            filter: new.project_filter.clone(),
        });
    }

    if old.fetches_completed != new.fetches_completed || old.found_projects != new.found_projects {
        changes.push(LauncherEvent::ProjectsFetched {
            count: new.found_projects.len(),
        });
    }

    if old.selected_project != new.selected_project {
        changes.push(LauncherEvent::SelectionChanged {
            name: new
                .selected_project
                .as_ref()
                .map(|project| project.display_name().to_string()),
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn project(name: &str) -> Project {
        Project::new(Utf8PathBuf::from(format!("/projects/{}/Project.json", name)))
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        assert_eq!(manager.snapshot(), LauncherSnapshot::default());
    }

    #[test]
    fn test_directory_change_detection() {
        let manager = StateManager::new();

        let changes = manager.set_directory(DirectoryRole::Mods, "/mods");
        assert_eq!(
            changes,
            vec![LauncherEvent::DirectoryChanged {
                role: DirectoryRole::Mods,
                path: "/mods".to_string()
            }]
        );

        // Same value again: nothing changes
        assert!(manager.set_directory(DirectoryRole::Mods, "/mods").is_empty());
    }

    #[test]
    fn test_replace_found_projects_sorts() {
        let manager = StateManager::new();

        let changes = manager.replace_found_projects(vec![project("Zeta"), project("Alpha")]);
        assert_eq!(changes, vec![LauncherEvent::ProjectsFetched { count: 2 }]);

        let names = manager.read(|state| {
            state
                .found_projects
                .iter()
                .map(|project| project.display_name().to_string())
                .collect::<Vec<_>>()
        });
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_refetch_of_same_list_still_emits() {
        let manager = StateManager::new();
        manager.replace_found_projects(vec![project("Alpha")]);

        let changes = manager.replace_found_projects(vec![project("Alpha")]);
        assert_eq!(changes, vec![LauncherEvent::ProjectsFetched { count: 1 }]);
        assert_eq!(manager.read(|state| state.fetches_completed), 2);
    }

    #[test]
    fn test_stale_selection_is_cleared() {
        let manager = StateManager::new();
        manager.replace_found_projects(vec![project("Alpha")]);
        manager.select_project(Some(project("Alpha")));

        let changes = manager.replace_found_projects(vec![project("Beta")]);
        assert!(changes.contains(&LauncherEvent::SelectionChanged { name: None }));
        assert!(manager.snapshot().selected_project.is_none());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.set_project_name("My_Mod".to_string());

        assert_eq!(
            rx.try_recv().unwrap(),
            LauncherEvent::ProjectNameChanged {
                name: "My_Mod".to_string()
            }
        );
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.set_project_filter("mod".to_string());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_project_name("Shared".to_string());

        assert_eq!(manager2.snapshot().project_name, "Shared");
    }
}
