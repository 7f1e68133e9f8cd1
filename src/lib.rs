// D4MT - Democracy 4 Modding Tool core
//
// This is the library crate containing project/configuration persistence, discovery
// and background synchronization. The binary crate (main.rs) is a headless front end.

pub mod config;
pub mod launcher;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod paths;
pub mod services;
pub mod state;
pub mod text;

// Re-export commonly used types for convenience
pub use config::{Settings, SettingsManager};
pub use launcher::Launcher;
pub use models::{Configuration, DirectoryRole, Language, Project};
pub use services::{ConfigurationStore, FileArbiter, ProjectRepository, ProjectStore, RetryPolicy, SyncQueue};
pub use state::{LauncherEvent, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
