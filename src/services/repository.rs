//! Project discovery.
//!
//! A projects root is scanned exactly one level deep: every visible child directory
//! holding a `Project.json` is a candidate. Hidden and system entries are ignored,
//! unreadable entries are skipped.

use crate::models::{PROJECT_FILE_NAME, Project};
use crate::paths::{contains_invalid_path_characters, is_hidden_or_system};
use crate::services::project_store::{ProjectError, ProjectStore, project_directory};
use crate::text::{TextValidator, is_blank};
use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, Stream};
use std::iter::FusedIterator;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Finds and loads projects below a projects root.
#[derive(Debug, Clone, Default)]
pub struct ProjectRepository {
    store: ProjectStore,
}

impl ProjectRepository {
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Paths of every `<root>/<child>/Project.json`, sorted.
    ///
    /// Never fails: an unusable root (blank, malformed, missing, hidden, or not a
    /// directory) simply yields nothing.
    pub fn list_candidate_files(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        if is_blank(root.as_str()) || contains_invalid_path_characters(root.as_str()) {
            return Vec::new();
        }
        let metadata = match std::fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("Projects root {} is not accessible: {}", root, e);
                return Vec::new();
            }
        };
        if !metadata.is_dir() || is_hidden_or_system(root, &metadata) {
            tracing::debug!("Projects root {} is not a visible directory", root);
            return Vec::new();
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .metadata()
                    .map(|metadata| !is_hidden_or_system(entry.path(), &metadata))
                    .unwrap_or(false)
            });

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };

            // Depth 1 entries are the project directories themselves.
            if entry.depth() != 2 || !entry.file_type().is_file() || entry.file_name() != PROJECT_FILE_NAME {
                continue;
            }

            match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => candidates.push(path),
                Err(path) => tracing::debug!("Skipping non UTF-8 path {}", path.display()),
            }
        }

        tracing::debug!("Found {} candidate project files under {}", candidates.len(), root);
        candidates
    }

    /// Lazily load each path in order.
    ///
    /// Missing files are skipped and cancellation ends the sequence quietly. A
    /// corrupt file is yielded as an error, after which the sequence ends.
    pub fn deserialize_all<I>(&self, paths: I, cancel: CancellationToken) -> DeserializeAll<I::IntoIter>
    where
        I: IntoIterator<Item = Utf8PathBuf>,
    {
        DeserializeAll {
            store: self.store.clone(),
            paths: paths.into_iter(),
            cancel,
            done: false,
        }
    }

    /// Stream counterpart of [`deserialize_all`](Self::deserialize_all).
    pub fn deserialize_all_async<I>(
        &self,
        paths: I,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Project, ProjectError>> + Send + use<I>
    where
        I: IntoIterator<Item = Utf8PathBuf> + 'static,
        I::IntoIter: Send + 'static,
    {
        let state = (self.store.clone(), paths.into_iter(), cancel, false);

        stream::unfold(state, |(store, mut paths, cancel, done)| async move {
            if done {
                return None;
            }
            loop {
                if cancel.is_cancelled() {
                    tracing::debug!("Project loading cancelled");
                    return None;
                }
                let path = paths.next()?;
                match store.deserialize_async(&path, &cancel).await {
                    Ok(Some(project)) => return Some((Ok(project), (store, paths, cancel, false))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), (store, paths, cancel, true))),
                }
            }
        })
    }

    /// Load the project called `name` under `root`, with the same validation as creation.
    pub fn get_by_name(
        &self,
        root: &Utf8Path,
        name: &str,
        validator: &dyn TextValidator,
    ) -> Result<Option<Project>, ProjectError> {
        match project_directory(root, name, validator) {
            Some(directory) => self.store.deserialize(&directory.join(PROJECT_FILE_NAME)),
            None => Ok(None),
        }
    }

    pub async fn get_by_name_async(
        &self,
        root: &Utf8Path,
        name: &str,
        validator: &dyn TextValidator,
        cancel: &CancellationToken,
    ) -> Result<Option<Project>, ProjectError> {
        match project_directory(root, name, validator) {
            Some(directory) => {
                self.store
                    .deserialize_async(&directory.join(PROJECT_FILE_NAME), cancel)
                    .await
            }
            None => Ok(None),
        }
    }
}

/// Iterator returned by [`ProjectRepository::deserialize_all`].
pub struct DeserializeAll<I> {
    store: ProjectStore,
    paths: I,
    cancel: CancellationToken,
    done: bool,
}

impl<I> Iterator for DeserializeAll<I>
where
    I: Iterator<Item = Utf8PathBuf>,
{
    type Item = Result<Project, ProjectError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("Project loading cancelled");
                self.done = true;
                return None;
            }
            let Some(path) = self.paths.next() else {
                self.done = true;
                return None;
            };
            match self.store.deserialize_cancellable(&path, &self.cancel) {
                Ok(Some(project)) => return Some(Ok(project)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<I> FusedIterator for DeserializeAll<I> where I: Iterator<Item = Utf8PathBuf> {}
