use msrcli::logging::NullLogger;
use msrcli::management::{CompletionStore, StateError, write_atomic};
use std::sync::Arc;

#[tokio::test]
async fn test_missing_file_is_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    let store = CompletionStore::open(&path, NullLogger::shared()).await.unwrap();

    assert!(store.is_empty().await);
    assert!(!store.is_completed("anything").await);
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_mark_completed_persists_sorted_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    let store = CompletionStore::open(&path, NullLogger::shared()).await.unwrap();

    store.mark_completed("Zeta").await.unwrap();
    store.mark_completed("Alpha").await.unwrap();
    store.mark_completed("Mu").await.unwrap();

    let names: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(names, vec!["Alpha", "Mu", "Zeta"]);
    assert_eq!(store.names().await, names);
}

#[tokio::test]
async fn test_mark_completed_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    let store = CompletionStore::open(&path, NullLogger::shared()).await.unwrap();

    store.mark_completed("Album").await.unwrap();
    store.mark_completed("Album").await.unwrap();

    assert_eq!(store.len().await, 1);
    let names: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(names, vec!["Album"]);
}

#[tokio::test]
async fn test_reopen_sees_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");

    {
        let store = CompletionStore::open(&path, NullLogger::shared()).await.unwrap();
        store.mark_completed("First Run").await.unwrap();
    }

    let store = CompletionStore::open(&path, NullLogger::shared()).await.unwrap();
    assert!(store.is_completed("First Run").await);
    assert!(!store.is_completed("first run").await);
}

#[tokio::test]
async fn test_concurrent_marks_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    let store = Arc::new(CompletionStore::open(&path, NullLogger::shared()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.mark_completed(&format!("Album {:02}", i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let names: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(names.len(), 16);
    assert_eq!(names.first().map(String::as_str), Some("Album 00"));

    // no temporary files are left behind
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_visible_names_are_already_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    let store = Arc::new(CompletionStore::open(&path, NullLogger::shared()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        // every worker races on the same name plus one of its own
        handles.push(tokio::spawn(async move {
            store.mark_completed("Shared").await?;
            store.mark_completed(&format!("Own {}", i)).await
        }));
    }

    let reader = {
        let store = Arc::clone(&store);
        let path = path.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let seen = store.snapshot().await;
                if seen.is_empty() {
                    tokio::task::yield_now().await;
                    continue;
                }
                let on_disk: Vec<String> =
                    serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
                assert!(seen.iter().all(|name| on_disk.contains(name)));
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    reader.await.unwrap();

    assert_eq!(store.len().await, 9);
    let names = store.names().await;
    assert_eq!(names.iter().filter(|n| *n == "Shared").count(), 1);
    let on_disk: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, names);
}

#[tokio::test]
async fn test_malformed_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("completed_albums.json");
    std::fs::write(&path, "{not an array").unwrap();

    let err = match CompletionStore::open(&path, NullLogger::shared()).await {
        Ok(_) => panic!("malformed state should not open"),
        Err(e) => e,
    };
    assert!(matches!(err, StateError::SerdeError(..)));
}

#[tokio::test]
async fn test_write_atomic_replaces_and_creates_parents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("file.json");

    write_atomic(&path, b"[1]").await.unwrap();
    write_atomic(&path, b"[1,2]").await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
    let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
    assert_eq!(entries, 1);
}
