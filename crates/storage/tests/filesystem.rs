//! Behavior tests for the filesystem chapter store.

use folio_storage::{ChapterStore, FilesystemStore, OnExist};
use folio_types::ChapterRecord;
use tempfile::TempDir;

fn record(id: &str) -> ChapterRecord {
    ChapterRecord::new(id, format!("Chapter {id}"), format!("Body of {id}"))
}

#[tokio::test]
async fn save_then_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();

    assert!(!store.exists("a").await);
    store.save(record("a"), OnExist::Overwrite).await.unwrap();
    assert!(store.exists("a").await);

    let loaded = store.get("a").await.unwrap().unwrap();
    assert_eq!(loaded.id, "a");
    assert_eq!(loaded.title, "Chapter a");

    assert_eq!(store.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn skip_keeps_existing_record() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();

    store.save(record("a"), OnExist::Overwrite).await.unwrap();
    let replacement = ChapterRecord::new("a", "Replaced", "other text");

    store.save(replacement.clone(), OnExist::Skip).await.unwrap();
    assert_eq!(store.get("a").await.unwrap().unwrap().title, "Chapter a");

    store.save(replacement, OnExist::Overwrite).await.unwrap();
    assert_eq!(store.get("a").await.unwrap().unwrap().title, "Replaced");
}

#[tokio::test]
async fn batching_defers_writes_until_flush() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 3).await.unwrap();

    store.save(record("a"), OnExist::Overwrite).await.unwrap();
    store.save(record("b"), OnExist::Overwrite).await.unwrap();

    // Nothing committed yet, but both records are visible to the writer.
    assert!(!dir.path().join("chapters/a.json").exists());
    assert!(store.exists("a").await);
    assert_eq!(store.get("b").await.unwrap().unwrap().id, "b");

    // Third save reaches the batch size and commits everything.
    store.save(record("c"), OnExist::Overwrite).await.unwrap();
    assert!(dir.path().join("chapters/a.json").exists());
    assert!(dir.path().join("chapters/c.json").exists());

    store.save(record("d"), OnExist::Overwrite).await.unwrap();
    assert!(!dir.path().join("chapters/d.json").exists());
    store.flush().await.unwrap();
    assert!(dir.path().join("chapters/d.json").exists());
}

#[tokio::test]
async fn save_many_commits_as_one_batch() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 10).await.unwrap();

    store
        .save_many(vec![record("a"), record("b"), record("c")], OnExist::Overwrite)
        .await
        .unwrap();

    for id in ["a", "b", "c"] {
        assert!(dir.path().join(format!("chapters/{id}.json")).exists());
    }
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn reopen_repopulates_existing_ids() {
    let dir = TempDir::new().unwrap();
    {
        let store = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();
        store.save(record("a"), OnExist::Overwrite).await.unwrap();
        store.save(record("b"), OnExist::Overwrite).await.unwrap();
        store.close().await.unwrap();
    }

    let store = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();
    assert!(store.exists("a").await);
    assert!(store.exists("b").await);
    assert!(!store.exists("c").await);
    assert_eq!(store.list_ids().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn close_flushes_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 50).await.unwrap();

    store.save(record("a"), OnExist::Overwrite).await.unwrap();
    assert!(!dir.path().join("chapters/a.json").exists());

    store.close().await.unwrap();
    assert!(dir.path().join("chapters/a.json").exists());
    store.close().await.unwrap();

    let err = store.save(record("b"), OnExist::Overwrite).await.unwrap_err();
    assert!(matches!(err, folio_storage::StoreError::Closed));
}

#[tokio::test]
async fn delete_removes_record_and_id() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();

    store.save(record("a"), OnExist::Overwrite).await.unwrap();
    assert!(store.delete("a").await.unwrap());
    assert!(!store.exists("a").await);
    assert!(!dir.path().join("chapters/a.json").exists());
    assert!(!store.delete("a").await.unwrap());
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let dir = TempDir::new().unwrap();
    let plain = FilesystemStore::open(dir.path(), "chapters", 1).await.unwrap();
    let encrypted = FilesystemStore::open(dir.path(), "encrypted_chapters", 1)
        .await
        .unwrap();

    plain.save(record("a"), OnExist::Overwrite).await.unwrap();
    assert!(!encrypted.exists("a").await);
    assert!(dir.path().join("chapters/a.json").exists());
    assert!(!dir.path().join("encrypted_chapters/a.json").exists());
}
