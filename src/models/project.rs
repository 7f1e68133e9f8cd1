use crate::paths::{contains_invalid_path_characters, normalize};
use crate::text::{TextValidator, is_blank};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Fixed name of the document inside every project directory.
pub const PROJECT_FILE_NAME: &str = "Project.json";

/// A modding project: one directory holding exactly one [`PROJECT_FILE_NAME`].
///
/// Only the identifier is persisted. The display name is the directory's own name,
/// so renaming a project means renaming its directory
/// ([`try_set_name`](Self::try_set_name)).
///
/// # Identity
///
/// Two projects are equal when their normalized file paths match. Only when
/// neither has a path does the identifier decide. Copies of the same document
/// at two different paths are therefore distinct projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    id: Uuid,

    #[serde(skip)]
    file_path: Option<Utf8PathBuf>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Identity {
    Path(Utf8PathBuf),
    Id(Uuid),
}

impl Project {
    /// A brand-new project with a fresh identifier, bound to `file_path`.
    pub(crate) fn new(file_path: Utf8PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: Some(file_path),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_path(&self) -> Option<&Utf8Path> {
        self.file_path.as_deref()
    }

    pub(crate) fn bind_file_path(&mut self, file_path: Utf8PathBuf) {
        self.file_path = Some(file_path);
    }

    pub fn directory_path(&self) -> Option<&Utf8Path> {
        self.file_path()?.parent()
    }

    /// Directory path, or an empty string when unknown.
    pub fn display_directory_path(&self) -> &str {
        self.directory_path().map(Utf8Path::as_str).unwrap_or("")
    }

    pub fn name(&self) -> Option<&str> {
        self.directory_path()?.file_name()
    }

    /// Name, or an empty string when unknown.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("")
    }

    /// Checked against the filesystem on every call.
    pub fn exists(&self) -> bool {
        self.file_path().is_some_and(Utf8Path::is_file)
    }

    /// Rename the project by moving its directory next to itself under `new_name`.
    ///
    /// Fails (returns `false`) when the current directory or its parent is gone,
    /// `new_name` is blank or rejected by `validator`, or a sibling named
    /// `new_name` already exists. The identifier and file content are untouched.
    pub fn try_set_name(&mut self, new_name: &str, validator: &dyn TextValidator) -> bool {
        let Some(directory) = self.directory_path().map(Utf8Path::to_path_buf) else {
            return false;
        };
        if !directory.is_dir() {
            tracing::debug!("Cannot rename {}: directory does not exist", directory);
            return false;
        }
        let Some(parent) = directory.parent().filter(|parent| parent.is_dir()) else {
            tracing::debug!("Cannot rename {}: parent directory does not exist", directory);
            return false;
        };
        if is_blank(new_name)
            || contains_invalid_path_characters(new_name)
            || !validator.is_valid(new_name)
        {
            tracing::debug!("Cannot rename {}: invalid name {:?}", directory, new_name);
            return false;
        }

        let destination = parent.join(new_name);
        if destination.exists() {
            tracing::debug!("Cannot rename {}: {} already exists", directory, destination);
            return false;
        }

        if let Err(e) = fs::rename(&directory, &destination) {
            tracing::warn!("Failed to move {} to {}: {}", directory, destination, e);
            return false;
        }
        if !destination.is_dir() {
            tracing::warn!("Renamed project directory {} is missing", destination);
            return false;
        }

        let file_name = self
            .file_path()
            .and_then(Utf8Path::file_name)
            .unwrap_or(PROJECT_FILE_NAME)
            .to_owned();
        self.file_path = Some(destination.join(file_name));

        tracing::info!("Renamed project {} -> {}", directory, destination);
        true
    }

    /// Ordering against a possibly-absent project; a real project sorts before `None`.
    pub fn compare_with(&self, other: Option<&Project>) -> Ordering {
        match other {
            Some(other) => self.cmp(other),
            None => Ordering::Less,
        }
    }

    fn identity(&self) -> Identity {
        match self.file_path() {
            Some(path) => Identity::Path(normalize(path)),
            None => Identity::Id(self.id),
        }
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Project {}

impl Hash for Project {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Ord for Project {
    /// By display name (empty first), ties broken by identity.
    fn cmp(&self, other: &Self) -> Ordering {
        self.display_name()
            .cmp(other.display_name())
            .then_with(|| self.identity().cmp(&other.identity()))
    }
}

impl PartialOrd for Project {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
