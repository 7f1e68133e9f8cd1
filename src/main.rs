//! D4MT - Democracy 4 Modding Tool
//!
//! Headless entry point over the launcher core.
//!
//! # Execution Flow
//!
//! 1. Load runtime settings (`d4mt.yaml`, `D4MT_*` environment variables)
//! 2. Initialize logging → `<log_dir>/<log_prefix>.<date>`
//! 3. Create the tokio runtime
//! 4. Load `Configuration.json` (or start from an empty configuration)
//! 5. Build the [`Launcher`] and run the requested command
//! 6. Shut the launcher down, draining queued saves

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use d4mt::models::DirectoryRole;
use d4mt::services::ConfigurationStore;
use d4mt::{APP_NAME, FileArbiter, Launcher, SettingsManager, VERSION};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "d4mt", about = concat!("Democracy 4 Modding Tool v", env!("CARGO_PKG_VERSION")), version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./d4mt.yaml)
    #[arg(long, global = true)]
    settings: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects in the projects directory
    Projects {
        /// Only show projects whose name or directory contains this text
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// Create a new project
    Create {
        /// Project name; spaces become underscores, other symbols are dropped
        name: String,
    },
    /// Rename an existing project
    Rename { name: String, new_name: String },
    /// Set one of the configured directories
    SetDir {
        /// projects, game or mods
        role: DirectoryRole,
        path: String,
    },
    /// Show the current configuration
    Config,
    /// Write a default settings file if none exists
    InitSettings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_manager = cli
        .settings
        .as_deref()
        .map(SettingsManager::new)
        .unwrap_or_default();

    if matches!(cli.command, Commands::InitSettings) {
        if settings_manager.write_defaults_if_missing()? {
            println!("Wrote {}", settings_manager.settings_path());
        } else {
            println!("{} already exists", settings_manager.settings_path());
        }
        return Ok(());
    }

    let settings = settings_manager.load()?;
    let _guard = d4mt::logging::setup_logging(&settings)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("d4mt-worker")
        .build()
        .context("Failed to build the tokio runtime")?;

    let arbiter = FileArbiter::new(settings.open_retry.to_policy());
    let configuration_path = settings.configuration_path();
    let configuration = ConfigurationStore::new(arbiter.clone())
        .load_or_default(&configuration_path)
        .with_context(|| format!("Failed to load configuration from {}", configuration_path))?;

    let launcher = Launcher::new(configuration, arbiter, runtime.handle());

    let result = runtime.block_on(run(&launcher, cli.command));

    runtime.block_on(launcher.shutdown());
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    result
}

async fn run(launcher: &Launcher, command: Commands) -> Result<()> {
    match command {
        Commands::Projects { filter } => {
            fetch_projects(launcher).await?;
            if !launcher.are_projects_visible() {
                bail!("Projects are hidden until the projects, game and mods directories are all valid");
            }
            for project in launcher.visible_projects(&filter) {
                println!("{}\t{}", project.display_name(), project.display_directory_path());
            }
        }
        Commands::Create { name } => {
            fetch_projects(launcher).await?;
            let name = launcher.set_project_name(&name);
            match launcher.create_project().await {
                Some(project) => println!("Created {} ({})", project.display_name(), project.id()),
                None => bail!("Could not create project {:?}", name),
            }
        }
        Commands::Rename { name, new_name } => {
            fetch_projects(launcher).await?;
            let Some(project) = launcher
                .found_projects()
                .into_iter()
                .find(|project| project.display_name() == name)
            else {
                bail!("No project named {:?}", name);
            };
            match launcher.rename_project(project, &new_name).await {
                Some(project) => println!("Renamed {} to {}", name, project.display_name()),
                None => bail!("Could not rename {:?} to {:?}", name, new_name),
            }
        }
        Commands::SetDir { role, path } => {
            if launcher.set_directory_path(role, &path) {
                println!("{} directory set to {}", role, path);
            } else {
                println!("{} directory unchanged", role);
            }
            if !launcher.is_valid_configuration_directory(role) {
                println!("warning: {} is not a usable {} directory", path, role);
            }
        }
        Commands::Config => {
            for role in DirectoryRole::ALL {
                let validity = if launcher.is_valid_configuration_directory(role) {
                    "ok"
                } else {
                    "invalid"
                };
                println!("{:<9}{} [{}]", role.as_str(), launcher.directory_path(role), validity);
            }
            println!("language {}", launcher.language());
        }
        Commands::InitSettings => {}
    }
    Ok(())
}

async fn fetch_projects(launcher: &Launcher) -> Result<usize> {
    let handle = launcher.refresh_projects()?;
    match handle.wait().await {
        Some(result) => Ok(result?),
        None => bail!("Project fetch failed"),
    }
}
