//! Tests for the in-memory event store.

use super::*;
use crate::event::{CommitRevision, PushEvent, ReferencePointer};
use crate::store::EventStatus;

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
async fn admit_creates_pending_record_once() {
    let store = MemoryEventStore::new();
    let event = push_event("1", "aa", "bb");

    let first = store.admit(&event).await.unwrap();
    assert!(first.first_seen);
    assert_eq!(first.status, EventStatus::Pending);

    let second = store.admit(&event).await.unwrap();
    assert!(!second.first_seen);
    assert_eq!(second.status, EventStatus::Pending);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn admit_reports_terminal_status_on_redelivery() {
    let store = MemoryEventStore::new();
    let event = push_event("1", "aa", "bb");

    store.admit(&event).await.unwrap();
    store.commit(&event, EventStatus::Success).await.unwrap();

    let redelivery = store.admit(&event).await.unwrap();
    assert!(!redelivery.first_seen);
    assert_eq!(redelivery.status, EventStatus::Success);
}

#[tokio::test]
async fn commit_is_exactly_once() {
    let store = MemoryEventStore::new();
    let event = push_event("1", "aa", "bb");
    store.admit(&event).await.unwrap();

    store.commit(&event, EventStatus::Success).await.unwrap();
    let err = store.commit(&event, EventStatus::Failed).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::AlreadyCommitted {
            status: EventStatus::Success,
            ..
        }
    ));
    assert_eq!(store.status_of(&event.identity()), Some(EventStatus::Success));
}

#[tokio::test]
async fn commit_requires_admission() {
    let store = MemoryEventStore::new();
    let event = push_event("1", "aa", "bb");

    let err = store.commit(&event, EventStatus::Failed).await.unwrap_err();
    assert!(matches!(err, StoreError::NotAdmitted { .. }));
}

#[tokio::test]
async fn commit_rejects_pending() {
    let store = MemoryEventStore::new();
    let event = push_event("1", "aa", "bb");
    store.admit(&event).await.unwrap();

    let err = store.commit(&event, EventStatus::Pending).await.unwrap_err();
    assert!(matches!(err, StoreError::NonTerminalCommit { .. }));
}

#[tokio::test]
async fn equivalent_success_matches_other_identity_only() {
    let store = MemoryEventStore::new();
    let original = push_event("1", "aa", "bb");
    let duplicate = push_event("2", "aa", "bb");
    let unrelated = push_event("3", "aa", "cc");

    store.admit(&original).await.unwrap();

    // pending records don't count
    assert!(!store.equivalent_success_exists(&duplicate).await.unwrap());

    store.commit(&original, EventStatus::Success).await.unwrap();

    // same identity never matches itself
    assert!(!store.equivalent_success_exists(&original).await.unwrap());
    // other identity, same content
    assert!(store.equivalent_success_exists(&duplicate).await.unwrap());
    // different content
    assert!(!store.equivalent_success_exists(&unrelated).await.unwrap());
}

#[tokio::test]
async fn failed_records_do_not_shadow_content() {
    let store = MemoryEventStore::new();
    let original = push_event("1", "aa", "bb");
    let retry = push_event("2", "aa", "bb");

    store.admit(&original).await.unwrap();
    store.commit(&original, EventStatus::Failed).await.unwrap();

    assert!(!store.equivalent_success_exists(&retry).await.unwrap());
}

#[tokio::test]
async fn concurrent_commits_produce_single_winner() {
    use std::sync::Arc;

    let store = Arc::new(MemoryEventStore::new());
    let event = push_event("1", "aa", "bb");
    store.admit(&event).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let event = event.clone();
        tasks.push(tokio::spawn(async move {
            store.commit(&event, EventStatus::Success).await.is_ok()
        }));
    }

    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}
