use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Default location of the configuration document, relative to the working directory.
pub const CONFIGURATION_FILE_PATH: &str = "./Configuration.json";

/// The directories a configuration points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectoryRole {
    /// Root under which every project gets its own directory.
    Projects,
    /// Game installation.
    Game,
    /// Directory the game loads mods from.
    Mods,
}

impl DirectoryRole {
    pub const ALL: [DirectoryRole; 3] = [DirectoryRole::Projects, DirectoryRole::Game, DirectoryRole::Mods];

    pub fn as_str(self) -> &'static str {
        match self {
            DirectoryRole::Projects => "projects",
            DirectoryRole::Game => "game",
            DirectoryRole::Mods => "mods",
        }
    }
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown directory role '{0}' (expected projects, game or mods)")]
pub struct UnknownDirectoryRole(pub String);

impl FromStr for DirectoryRole {
    type Err = UnknownDirectoryRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projects" => Ok(DirectoryRole::Projects),
            "game" => Ok(DirectoryRole::Game),
            "mods" => Ok(DirectoryRole::Mods),
            _ => Err(UnknownDirectoryRole(s.to_string())),
        }
    }
}

fn language_tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^[A-Za-z]{2,8}(?:-[A-Za-z0-9]{1,8})*$").expect("Invalid language tag regex"))
}

/// A culture tag such as `en-US`. The empty tag is the invariant culture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Language(String);

impl Language {
    pub fn invariant() -> Self {
        Self::default()
    }

    /// `None` when `tag` is neither empty nor a well-formed culture tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Some(Self::invariant());
        }
        language_tag_regex().is_match(tag).then(|| Self(tag.to_string()))
    }

    pub fn is_invariant(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Language {
    /// Unknown tags fall back to the invariant culture instead of failing the document.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(Language::parse(&tag).unwrap_or_else(|| {
            tracing::warn!("Unrecognized language tag {:?}, using invariant culture", tag);
            Language::invariant()
        }))
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Process-wide settings document (`Configuration.json`).
///
/// Loaded once at startup; the in-memory copy is the reference for deciding whether
/// a change needs to be written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, deserialize_with = "null_as_empty")]
    projects_directory: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    game_directory: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    mods_directory: String,

    #[serde(default)]
    language: Language,

    #[serde(skip)]
    file_path: Option<Utf8PathBuf>,
}

impl Configuration {
    /// Empty configuration bound to `file_path`.
    pub fn new(file_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::default()
        }
    }

    pub fn file_path(&self) -> Option<&Utf8Path> {
        self.file_path.as_deref()
    }

    pub(crate) fn bind_file_path(&mut self, file_path: Utf8PathBuf) {
        self.file_path = Some(file_path);
    }

    pub fn directory_path(&self, role: DirectoryRole) -> &str {
        match role {
            DirectoryRole::Projects => &self.projects_directory,
            DirectoryRole::Game => &self.game_directory,
            DirectoryRole::Mods => &self.mods_directory,
        }
    }

    fn directory_slot(&mut self, role: DirectoryRole) -> &mut String {
        match role {
            DirectoryRole::Projects => &mut self.projects_directory,
            DirectoryRole::Game => &mut self.game_directory,
            DirectoryRole::Mods => &mut self.mods_directory,
        }
    }

    /// Assign the directory for `role` in memory and report whether it now holds
    /// `new_path`. Nothing is written to disk.
    pub fn try_set_directory(&mut self, role: DirectoryRole, new_path: &str) -> bool {
        let slot = self.directory_slot(role);
        if slot != new_path {
            *slot = new_path.to_string();
        }
        self.directory_path(role) == new_path
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }
}
