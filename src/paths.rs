//! Path validation helpers.
//!
//! - character checks for directory paths and file names
//! - lexical normalization used for project identity
//! - hidden/system detection for discovery
//! - [`RestrictedPathMatcher`]: blocks configuring a work root over sensitive system locations

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs::Metadata;
use std::path::Path;

#[cfg(windows)]
const PLATFORM_INVALID_PATH_CHARACTERS: &[char] = &['"', '<', '>', '|'];
#[cfg(not(windows))]
const PLATFORM_INVALID_PATH_CHARACTERS: &[char] = &[];

#[cfg(windows)]
const PLATFORM_INVALID_FILE_NAME_CHARACTERS: &[char] = &['\\', '/', ':', '*', '?'];
#[cfg(not(windows))]
const PLATFORM_INVALID_FILE_NAME_CHARACTERS: &[char] = &['/'];

/// NUL and ASCII control characters are rejected everywhere.
pub fn is_invalid_path_character(c: char) -> bool {
    c.is_ascii_control() || PLATFORM_INVALID_PATH_CHARACTERS.contains(&c)
}

pub fn is_invalid_file_name_character(c: char) -> bool {
    is_invalid_path_character(c) || PLATFORM_INVALID_FILE_NAME_CHARACTERS.contains(&c)
}

pub fn contains_invalid_path_characters(path: &str) -> bool {
    path.chars().any(is_invalid_path_character)
}

/// A file path is invalid when it has no file name, its directory part contains
/// characters illegal in paths, or its file name contains characters illegal in names.
pub fn is_invalid_file_path(path: &Utf8Path) -> bool {
    let Some(file_name) = path.file_name() else {
        return true;
    };
    let directory = path.parent().map(Utf8Path::as_str).unwrap_or("");

    contains_invalid_path_characters(directory) || file_name.chars().any(is_invalid_file_name_character)
}

/// Lexically normalize a path: drop `.` components and trailing separators, fold
/// `..` into its parent (a `..` directly below the root is dropped), and (on
/// Windows) compare case-insensitively.
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match normalized.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_str()),
        }
    }

    if cfg!(windows) {
        Utf8PathBuf::from(normalized.as_str().to_lowercase())
    } else {
        normalized
    }
}

/// Dot-prefixed names count as hidden on every platform; Windows additionally
/// honours the hidden and system attributes.
pub fn is_hidden_or_system(path: impl AsRef<Path>, metadata: &Metadata) -> bool {
    let dot_prefixed = path
        .as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name != "." && name != "..");

    dot_prefixed || has_hidden_or_system_attribute(metadata)
}

#[cfg(windows)]
fn has_hidden_or_system_attribute(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

    metadata.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0
}

#[cfg(not(windows))]
fn has_hidden_or_system_attribute(_metadata: &Metadata) -> bool {
    false
}

/// Patterns for directories that must never be used as a projects/game/mods root.
///
/// Windows: a bare drive root, the Windows directory and anything below it, and
/// the `Users` directory plus its immediate (profile) children.
/// Unix: `/`, system trees, and home roots plus their immediate children.
const RESTRICTED_PATTERNS: &[&str] = &[
    r"^[A-Za-z]:[\\/]?$",
    r"(?i)^[A-Za-z]:[\\/]windows(?:[\\/].*)?$",
    r"(?i)^[A-Za-z]:[\\/]users(?:[\\/][A-Za-z\s]*)?[\\/]?$",
    r"^/+$",
    r"^/(?:bin|boot|dev|etc|lib|lib32|lib64|proc|sbin|sys|usr|System)(?:/.*)?$",
    r"^/(?:home|Users)(?:/[^/]*)?/?$",
    r"^/root/?$",
];

/// Matches directory roots that target sensitive system locations.
#[derive(Debug, Clone)]
pub struct RestrictedPathMatcher {
    patterns: Vec<Regex>,
}

impl RestrictedPathMatcher {
    pub fn new() -> Self {
        Self {
            patterns: RESTRICTED_PATTERNS
                .iter()
                .map(|pattern| Regex::new(pattern).expect("Invalid restricted path regex"))
                .collect(),
        }
    }

    /// Checks both the path as written and where it resolves to, so `/tmp/..`
    /// counts as `/`.
    pub fn is_match(&self, path: &str) -> bool {
        let resolved = normalize(Utf8Path::new(path));
        self.patterns
            .iter()
            .any(|pattern| pattern.is_match(path) || pattern.is_match(resolved.as_str()))
    }
}

impl Default for RestrictedPathMatcher {
    fn default() -> Self {
        Self::new()
    }
}
