// Integration tests for project discovery and bulk loading.

use camino::{Utf8Path, Utf8PathBuf};
use d4mt::models::PROJECT_FILE_NAME;
use d4mt::services::{ProjectError, ProjectRepository};
use d4mt::text::ProjectNameValidator;
use futures::StreamExt;
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// The temp dir itself starts with '.', so projects live one level further down.
fn projects_root() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().join("projects")).unwrap();
    fs::create_dir(&root).unwrap();
    (temp_dir, root)
}

fn create(repository: &ProjectRepository, root: &Utf8Path, name: &str) -> d4mt::Project {
    repository
        .store()
        .create(root, name, &ProjectNameValidator::new())
        .unwrap()
}

fn write_raw(root: &Utf8Path, directory: &str, contents: &str) -> Utf8PathBuf {
    let directory = root.join(directory);
    fs::create_dir_all(&directory).unwrap();
    let path = directory.join(PROJECT_FILE_NAME);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_lists_only_direct_children_in_order() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();

    create(&repository, &root, "Zeta");
    create(&repository, &root, "Alpha");
    create(&repository, &root, "Middle");

    // Ignored: hidden directory, a file at the root, a nested project, and a folder
    // without a project file.
    write_raw(&root, ".hidden", "{}");
    fs::write(root.join(PROJECT_FILE_NAME), "{}").unwrap();
    write_raw(&root, "Outer/Inner", "{}");
    fs::create_dir(root.join("Empty")).unwrap();

    let candidates = repository.list_candidate_files(&root);
    let expected: Vec<Utf8PathBuf> = ["Alpha", "Middle", "Zeta"]
        .iter()
        .map(|name| root.join(name).join(PROJECT_FILE_NAME))
        .collect();
    assert_eq!(candidates, expected);
}

#[test]
fn test_missing_root_lists_nothing() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();

    assert!(repository.list_candidate_files(&root.join("missing")).is_empty());
    assert!(repository.list_candidate_files(Utf8Path::new("")).is_empty());
}

#[test]
fn test_deserialize_all_loads_every_project() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();

    let alpha = create(&repository, &root, "Alpha");
    let beta = create(&repository, &root, "Beta");

    let paths = repository.list_candidate_files(&root);
    let loaded: Vec<_> = repository
        .deserialize_all(paths, CancellationToken::new())
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(loaded, vec![alpha.clone(), beta.clone()]);
    assert_eq!(loaded[0].id(), alpha.id());
    assert_eq!(loaded[1].id(), beta.id());
}

#[test]
fn test_corrupt_project_ends_the_sequence() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();

    create(&repository, &root, "A_First");
    let corrupt = write_raw(&root, "B_Broken", "{ nope");
    create(&repository, &root, "C_Last");

    let paths = repository.list_candidate_files(&root);
    assert_eq!(paths.len(), 3);

    let mut results = repository.deserialize_all(paths, CancellationToken::new());
    assert_eq!(results.next().unwrap().unwrap().name(), Some("A_First"));
    match results.next() {
        Some(Err(ProjectError::Corrupt { path, .. })) => assert_eq!(path, corrupt),
        other => panic!("expected a corrupt project, got {:?}", other),
    }
    assert!(results.next().is_none());
    assert!(results.next().is_none());
}

#[test]
fn test_cancelled_sequence_is_empty() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    create(&repository, &root, "Alpha");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let paths = repository.list_candidate_files(&root);
    assert_eq!(repository.deserialize_all(paths, cancel).count(), 0);
}

#[test]
fn test_cancel_midway_stops_loading() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    create(&repository, &root, "Alpha");
    create(&repository, &root, "Beta");

    let cancel = CancellationToken::new();
    let paths = repository.list_candidate_files(&root);
    let mut results = repository.deserialize_all(paths, cancel.clone());

    assert!(results.next().unwrap().is_ok());
    cancel.cancel();
    assert!(results.next().is_none());
}

#[tokio::test]
async fn test_stream_matches_iterator() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    create(&repository, &root, "One");
    create(&repository, &root, "Two");
    let deleted = create(&repository, &root, "Three");

    let paths = repository.list_candidate_files(&root);
    fs::remove_dir_all(deleted.directory_path().unwrap()).unwrap();

    let names: Vec<String> = repository
        .deserialize_all_async(paths, CancellationToken::new())
        .map(|result| result.unwrap().display_name().to_string())
        .collect()
        .await;
    assert_eq!(names, vec!["One", "Two"]);
}

#[tokio::test]
async fn test_stream_stops_after_corruption() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    write_raw(&root, "A_Broken", "null");
    create(&repository, &root, "B_Fine");

    let paths = repository.list_candidate_files(&root);
    let results: Vec<_> = repository
        .deserialize_all_async(paths, CancellationToken::new())
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(ProjectError::Corrupt { .. })));
}

#[test]
fn test_get_by_name() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    let validator = ProjectNameValidator::new();
    let created = create(&repository, &root, "Named");

    let found = repository.get_by_name(&root, "Named", &validator).unwrap().unwrap();
    assert_eq!(found.id(), created.id());

    assert!(repository.get_by_name(&root, "Unknown", &validator).unwrap().is_none());
    assert!(repository.get_by_name(&root, "not valid", &validator).unwrap().is_none());
    assert!(repository.get_by_name(&root, "", &validator).unwrap().is_none());
}

#[tokio::test]
async fn test_get_by_name_async() {
    let (_temp_dir, root) = projects_root();
    let repository = ProjectRepository::default();
    let validator = ProjectNameValidator::new();
    let created = create(&repository, &root, "Named");
    let cancel = CancellationToken::new();

    let found = repository
        .get_by_name_async(&root, "Named", &validator, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), created.id());

    write_raw(&root, "Broken", "");
    assert!(
        repository
            .get_by_name_async(&root, "Broken", &validator, &cancel)
            .await
            .is_err()
    );
}
