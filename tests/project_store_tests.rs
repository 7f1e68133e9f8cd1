// Integration tests for project creation, loading, saving and renaming.

use camino::Utf8PathBuf;
use d4mt::models::PROJECT_FILE_NAME;
use d4mt::services::{ProjectError, ProjectStore};
use d4mt::text::ProjectNameValidator;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn temp_root() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().join("projects")).unwrap();
    fs::create_dir(&root).unwrap();
    (temp_dir, root)
}

#[test]
fn test_create_writes_project_file() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();

    let project = store.create(&root, "First_Mod", &ProjectNameValidator::new()).unwrap();

    assert_eq!(project.name(), Some("First_Mod"));
    assert_eq!(project.file_path(), Some(root.join("First_Mod").join(PROJECT_FILE_NAME).as_path()));
    assert!(project.exists());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(project.file_path().unwrap()).unwrap()).unwrap();
    assert_eq!(json["id"], project.id().to_string());
}

#[test]
fn test_create_rejects_invalid_names() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let validator = ProjectNameValidator::new();

    assert!(store.create(&root, "", &validator).is_none());
    assert!(store.create(&root, "   ", &validator).is_none());
    assert!(store.create(&root, "bad name", &validator).is_none());
    assert!(store.create(&root, "semi;colon", &validator).is_none());
    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
}

#[test]
fn test_create_refuses_existing_project() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let validator = ProjectNameValidator::new();

    let original = store.create(&root, "Taken", &validator).unwrap();
    assert!(store.create(&root, "Taken", &validator).is_none());

    let loaded = store.deserialize(original.file_path().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.id(), original.id());
}

#[test]
fn test_create_fails_when_project_file_is_a_directory() {
    let (_temp_dir, root) = temp_root();
    fs::create_dir_all(root.join("Blocked").join(PROJECT_FILE_NAME)).unwrap();

    let store = ProjectStore::default();
    assert!(store.create(&root, "Blocked", &ProjectNameValidator::new()).is_none());
}

#[test]
fn test_deserialize_missing_file_is_none() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();

    let loaded = store.deserialize(&root.join("Nope").join(PROJECT_FILE_NAME)).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn test_corrupt_documents_are_errors() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();

    for (name, contents) in [("Empty", ""), ("Null", "null"), ("Garbage", "{not json"), ("Wrong", "[1, 2]")] {
        let directory = root.join(name);
        fs::create_dir(&directory).unwrap();
        let path = directory.join(PROJECT_FILE_NAME);
        fs::write(&path, contents).unwrap();

        match store.deserialize(&path) {
            Err(ProjectError::Corrupt { path: corrupt, .. }) => assert_eq!(corrupt, path),
            other => panic!("{} should be corrupt, got {:?}", name, other),
        }
    }
}

#[test]
fn test_save_after_rename_writes_new_location() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let validator = ProjectNameValidator::new();

    let mut project = store.create(&root, "Before", &validator).unwrap();
    assert!(project.try_set_name("After", &validator));
    assert!(store.try_save(&project));

    assert!(!root.join("Before").exists());
    let loaded = store.deserialize(&root.join("After").join(PROJECT_FILE_NAME)).unwrap().unwrap();
    assert_eq!(loaded.id(), project.id());
    assert_eq!(loaded.name(), Some("After"));
}

#[test]
fn test_rename_onto_existing_project_fails() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let validator = ProjectNameValidator::new();

    let mut first = store.create(&root, "First", &validator).unwrap();
    store.create(&root, "Second", &validator).unwrap();

    assert!(!first.try_set_name("Second", &validator));
    assert_eq!(first.name(), Some("First"));
    assert!(root.join("First").join(PROJECT_FILE_NAME).is_file());
}

#[tokio::test]
async fn test_async_create_and_load() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let cancel = CancellationToken::new();

    let project = store
        .create_async(&root, "Async_Mod", &ProjectNameValidator::new(), &cancel)
        .await
        .unwrap();

    let loaded = store
        .deserialize_async(project.file_path().unwrap(), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, project);
    assert_eq!(loaded.id(), project.id());
}

#[tokio::test]
async fn test_cancelled_async_operations() {
    let (_temp_dir, root) = temp_root();
    let store = ProjectStore::default();
    let validator = ProjectNameValidator::new();
    let project = store.create(&root, "Existing", &validator).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(store.create_async(&root, "Cancelled", &validator, &cancel).await.is_none());
    assert!(!store.try_save_async(&project, &cancel).await);
    assert!(
        store
            .deserialize_async(project.file_path().unwrap(), &cancel)
            .await
            .unwrap()
            .is_none()
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_created_project_round_trips(name in "[A-Za-z0-9_]{1,16}") {
        let (_temp_dir, root) = temp_root();
        let store = ProjectStore::default();

        let project = store.create(&root, &name, &ProjectNameValidator::new()).unwrap();
        let loaded = store
            .deserialize(&root.join(&name).join(PROJECT_FILE_NAME))
            .unwrap()
            .unwrap();

        prop_assert_eq!(loaded.id(), project.id());
        prop_assert_eq!(loaded.name(), Some(name.as_str()));
        let directory = root.join(&name);
        prop_assert_eq!(loaded.directory_path(), Some(directory.as_path()));
    }

    #[test]
    fn prop_rename_keeps_identity(from in "[a-z]{1,12}", to in "[A-Z]{1,12}") {
        let (_temp_dir, root) = temp_root();
        let store = ProjectStore::default();
        let validator = ProjectNameValidator::new();

        let mut project = store.create(&root, &from, &validator).unwrap();
        prop_assert!(project.try_set_name(&to, &validator));

        prop_assert!(!root.join(&from).exists());
        let loaded = store
            .deserialize(&root.join(&to).join(PROJECT_FILE_NAME))
            .unwrap()
            .unwrap();
        prop_assert_eq!(loaded.id(), project.id());
        prop_assert_eq!(loaded.name(), Some(to.as_str()));
    }
}
