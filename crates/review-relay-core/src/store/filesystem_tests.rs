//! Tests for the filesystem event store.

use super::*;
use crate::event::{CommitRevision, PushEvent, ReferencePointer};

fn push_event(internal_id: &str, base: &str, head: &str) -> Event {
    Event::Push(PushEvent {
        provider: "github".to_string(),
        internal_id: internal_id.to_string(),
        created_at: Utc::now(),
        commits: 1,
        distinct_commits: 1,
        commit_revision: CommitRevision::new(
            ReferencePointer::new("https://example.com/a/b.git", "refs/heads/main", base),
            ReferencePointer::new("https://example.com/a/b.git", "refs/heads/main", head),
        ),
    })
}

#[tokio::test]
async fn open_on_missing_file_is_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemEventStore::open(dir.path().join("events.json"))
        .await
        .unwrap();

    let event = push_event("1", "aa", "bb");
    let admission = store.admit(&event).await.unwrap();
    assert!(admission.first_seen);
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    let event = push_event("1", "aa", "bb");

    {
        let store = FilesystemEventStore::open(&path).await.unwrap();
        store.admit(&event).await.unwrap();
        store.commit(&event, EventStatus::Success).await.unwrap();
    }

    let reopened = FilesystemEventStore::open(&path).await.unwrap();
    let admission = reopened.admit(&event).await.unwrap();
    assert!(!admission.first_seen);
    assert_eq!(admission.status, EventStatus::Success);

    let duplicate = push_event("2", "aa", "bb");
    assert!(reopened.equivalent_success_exists(&duplicate).await.unwrap());
}

#[tokio::test]
async fn commit_is_exactly_once_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    let event = push_event("1", "aa", "bb");

    {
        let store = FilesystemEventStore::open(&path).await.unwrap();
        store.admit(&event).await.unwrap();
        store.commit(&event, EventStatus::Failed).await.unwrap();
    }

    let reopened = FilesystemEventStore::open(&path).await.unwrap();
    let err = reopened
        .commit(&event, EventStatus::Success)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyCommitted { .. }));
}

#[tokio::test]
async fn snapshot_is_valid_json_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");

    let store = FilesystemEventStore::open(&path).await.unwrap();
    store.admit(&push_event("1", "aa", "bb")).await.unwrap();
    store.admit(&push_event("2", "cc", "dd")).await.unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    let parsed: Vec<ProcessedEventRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 2);
    assert!(parsed.iter().all(|r| r.status == EventStatus::Pending));
}

#[tokio::test]
async fn creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deep").join("events.json");

    let store = FilesystemEventStore::open(&path).await.unwrap();
    store.admit(&push_event("1", "aa", "bb")).await.unwrap();
    assert!(path.exists());
}
