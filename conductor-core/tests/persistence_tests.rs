// ABOUTME: Tests for the SQLite and history-file conversation stores and the fallback loader.
// ABOUTME: Uses temp directories so each test owns its files.

use conductor_core::{
    ConversationMetadata, ConversationStore, HistoryFileStore, PersistenceFallbackLoader,
    RecoveryTier, SqliteConversationStore,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("conversations.db");

    {
        let store = SqliteConversationStore::open(&db_path).unwrap();
        store
            .save(
                &ConversationMetadata::new("c1", "codex")
                    .with_name("Fix tests")
                    .with_extra(json!({"sandbox_mode": "read-only"})),
            )
            .unwrap();
    }

    let store = SqliteConversationStore::open(&db_path).unwrap();
    let loaded = store.load("c1").await.unwrap().unwrap();
    assert_eq!(loaded.conversation_type, "codex");
    assert_eq!(loaded.name.as_deref(), Some("Fix tests"));
    assert_eq!(loaded.extra["sandbox_mode"], "read-only");
    assert!(store.load("missing").await.unwrap().is_none());
}

#[test]
fn test_sqlite_save_replaces_existing_record() {
    let store = SqliteConversationStore::open_in_memory().unwrap();
    store.save(&ConversationMetadata::new("c1", "acp")).unwrap();
    store
        .save(&ConversationMetadata::new("c1", "mock").with_name("renamed"))
        .unwrap();

    let all = store.list().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].conversation_type, "mock");
    assert_eq!(all[0].name.as_deref(), Some("renamed"));
}

#[test]
fn test_sqlite_keeps_unsupported_types() {
    let store = SqliteConversationStore::open_in_memory().unwrap();
    store
        .save(&ConversationMetadata::new("c1", "gemini"))
        .unwrap();
    assert_eq!(store.get("c1").unwrap().unwrap().conversation_type, "gemini");
}

#[tokio::test]
async fn test_history_file_missing_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = HistoryFileStore::new(dir.path().join("history.json"));

    assert!(store.read_all().await.unwrap().is_empty());
    assert!(store.load("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_history_file_save_and_load() {
    let dir = TempDir::new().unwrap();
    let store = HistoryFileStore::new(dir.path().join("sub").join("history.json"));

    store.save(&ConversationMetadata::new("c1", "acp")).await.unwrap();
    store.save(&ConversationMetadata::new("c2", "codex")).await.unwrap();
    store
        .save(&ConversationMetadata::new("c1", "acp").with_name("updated"))
        .await
        .unwrap();

    let all = store.read_all().await.unwrap();
    assert_eq!(all.len(), 2);
    let c1 = store.load("c1").await.unwrap().unwrap();
    assert_eq!(c1.name.as_deref(), Some("updated"));
}

#[tokio::test]
async fn test_history_file_reads_foreign_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(
        &path,
        r#"[{"id": "c9", "type": "codex", "extra": {"binary": "codex"}}]"#,
    )
    .unwrap();

    let store = HistoryFileStore::new(&path);
    let loaded = store.load("c9").await.unwrap().unwrap();
    assert_eq!(loaded.extra["binary"], "codex");
}

#[tokio::test]
async fn test_history_file_corrupt_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "not json").unwrap();

    let store = HistoryFileStore::new(&path);
    assert!(store.load("c1").await.is_err());
}

#[tokio::test]
async fn test_history_file_corrupt_does_not_block_new_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, r#"[{"id":"a","type":"mock"},"#).unwrap();

    let store = HistoryFileStore::new(&path);
    store.save(&ConversationMetadata::new("b", "codex")).await.unwrap();
    store.save(&ConversationMetadata::new("c", "acp")).await.unwrap();

    let ids: Vec<String> = store.read_all().await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["b", "c"]);

    // The damaged content is kept aside rather than discarded
    let backup = std::fs::read_to_string(store.corrupt_backup_path()).unwrap();
    assert!(backup.starts_with(r#"[{"id":"a""#));
}

#[tokio::test]
async fn test_history_file_save_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = HistoryFileStore::new(dir.path().join("history.json"));
    for id in ["a", "b", "a"] {
        store.save(&ConversationMetadata::new(id, "mock")).await.unwrap();
    }

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(store.read_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_loader_tiers() {
    let dir = TempDir::new().unwrap();
    let primary = SqliteConversationStore::open_in_memory().unwrap();
    primary.save(&ConversationMetadata::new("both", "acp")).unwrap();

    let secondary = HistoryFileStore::new(dir.path().join("history.json"));
    secondary.save(&ConversationMetadata::new("both", "mock")).await.unwrap();
    secondary.save(&ConversationMetadata::new("only_history", "codex")).await.unwrap();

    let loader = PersistenceFallbackLoader::new(Arc::new(primary), Arc::new(secondary));

    let (meta, tier) = loader.load("both").await.unwrap();
    assert_eq!(tier, RecoveryTier::Primary);
    assert_eq!(meta.conversation_type, "acp");

    let (meta, tier) = loader.load("only_history").await.unwrap();
    assert_eq!(tier, RecoveryTier::Secondary);
    assert_eq!(meta.conversation_type, "codex");

    assert!(loader.load("nowhere").await.is_none());
}

#[tokio::test]
async fn test_loader_treats_corrupt_secondary_as_miss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "{").unwrap();

    let loader = PersistenceFallbackLoader::new(
        Arc::new(SqliteConversationStore::open_in_memory().unwrap()),
        Arc::new(HistoryFileStore::new(&path)),
    );
    assert!(loader.load("c1").await.is_none());
}
