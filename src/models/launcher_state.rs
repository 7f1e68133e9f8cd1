use crate::models::{DirectoryRole, Project};

/// In-memory state of the launcher.
///
/// # Thread Safety
///
/// Wrapped in `Arc<RwLock<LauncherSnapshot>>` by [`crate::state::StateManager`].
/// Mutate it only through the manager so change events are emitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LauncherSnapshot {
    // Directory values as last set; mirrors the in-memory configuration
    pub projects_directory: String,
    pub game_directory: String,
    pub mods_directory: String,

    // Already canonicalized by the name transformer
    pub project_name: String,
    pub project_filter: String,

    // Last completed fetch, sorted by display name
    pub found_projects: Vec<Project>,
    pub selected_project: Option<Project>,

    pub fetches_completed: u64,
}

impl LauncherSnapshot {
    pub fn directory(&self, role: DirectoryRole) -> &str {
        match role {
            DirectoryRole::Projects => &self.projects_directory,
            DirectoryRole::Game => &self.game_directory,
            DirectoryRole::Mods => &self.mods_directory,
        }
    }

    pub(crate) fn directory_mut(&mut self, role: DirectoryRole) -> &mut String {
        match role {
            DirectoryRole::Projects => &mut self.projects_directory,
            DirectoryRole::Game => &mut self.game_directory,
            DirectoryRole::Mods => &mut self.mods_directory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let snapshot = LauncherSnapshot::default();
        for role in DirectoryRole::ALL {
            assert_eq!(snapshot.directory(role), "");
        }
        assert!(snapshot.found_projects.is_empty());
        assert!(snapshot.selected_project.is_none());
        assert_eq!(snapshot.fetches_completed, 0);
    }

    #[test]
    fn test_directory_mut_targets_role() {
        let mut snapshot = LauncherSnapshot::default();
        *snapshot.directory_mut(DirectoryRole::Game) = "/games/d4".to_string();
        assert_eq!(snapshot.game_directory, "/games/d4");
        assert_eq!(snapshot.directory(DirectoryRole::Game), "/games/d4");
    }
}
