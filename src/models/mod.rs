//! Data models for D4MT.
//!
//! - [`Project`]: a project directory identified by the UUID in its `Project.json`
//! - [`Configuration`]: the `Configuration.json` singleton (three [`DirectoryRole`] paths + [`Language`])
//! - [`LauncherSnapshot`]: in-memory launcher state observed through [`StateManager`](crate::state::StateManager)
//!
//! Entities only know their own fields and derived attributes. Reading and writing
//! them goes through the stores in [`crate::services`].

pub mod configuration;
pub mod launcher_state;
pub mod project;

pub use configuration::{CONFIGURATION_FILE_PATH, Configuration, DirectoryRole, Language, UnknownDirectoryRole};
pub use launcher_state::LauncherSnapshot;
pub use project::{PROJECT_FILE_NAME, Project};
