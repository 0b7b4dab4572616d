//! Tests for the analyzer RPC transport.

use super::*;
use crate::event::{CommitRevision, ReferencePointer, ReviewEvent};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn review_event() -> ReviewEvent {
    ReviewEvent {
        provider: "github".to_string(),
        internal_id: "1".to_string(),
        number: 4,
        repository_id: 10,
        source: ReferencePointer::default(),
        merge: ReferencePointer::default(),
        is_mergeable: true,
        commit_revision: CommitRevision::new(
            ReferencePointer::new("https://example.com/a/b.git", "refs/heads/main", "aa"),
            ReferencePointer::new("https://example.com/a/b.git", "refs/pull/4/head", "bb"),
        ),
    }
}

#[test]
fn normalize_accepts_http_and_legacy_schemes() {
    assert_eq!(
        normalize_address("http://localhost:10302").unwrap().as_str(),
        "http://localhost:10302/"
    );
    assert_eq!(
        normalize_address("ipv4://localhost:10302").unwrap().as_str(),
        "http://localhost:10302/"
    );
    assert_eq!(
        normalize_address("tcp://analyzer:9000").unwrap().as_str(),
        "http://analyzer:9000/"
    );
}

#[test]
fn normalize_rejects_unknown_scheme_and_garbage() {
    assert!(matches!(
        normalize_address("grpc://localhost:10302"),
        Err(AnalyzerError::InvalidAddress { .. })
    ));
    assert!(matches!(
        normalize_address("::::"),
        Err(AnalyzerError::InvalidAddress { .. })
    ));
}

#[tokio::test]
async fn notify_review_posts_event_and_returns_comments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify-review"))
        .and(body_partial_json(serde_json::json!({
            "internal_id": "1",
            "number": 4,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "comments": [
                {"file": "provider/common.go", "line": 0, "text": "The file has increased in 5 lines."}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        HttpAnalyzerClient::new(&server.uri(), HttpAnalyzerClient::DEFAULT_TIMEOUT).unwrap();
    let comments = client.notify_review(&review_event()).await.unwrap();

    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].file, "provider/common.go");
    // the analyzer never names itself; the orchestrator tags comments
    assert!(comments[0].analyzer.is_empty());
}

#[tokio::test]
async fn remote_error_is_surfaced_with_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify-push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("push error"))
        .mount(&server)
        .await;

    let client =
        HttpAnalyzerClient::new(&server.uri(), HttpAnalyzerClient::DEFAULT_TIMEOUT).unwrap();
    let event = crate::event::PushEvent {
        provider: "github".to_string(),
        internal_id: "2".to_string(),
        created_at: chrono::Utc::now(),
        commits: 1,
        distinct_commits: 1,
        commit_revision: review_event().commit_revision,
    };

    let err = client.notify_push(&event).await.unwrap_err();
    match err {
        AnalyzerError::Remote { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "push error");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn slow_analyzer_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify-review"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"comments": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = HttpAnalyzerClient::new(&server.uri(), Duration::from_millis(100)).unwrap();
    let err = client.notify_review(&review_event()).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Timeout { .. }));
}

#[tokio::test]
async fn empty_comment_list_is_ok() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify-review"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client =
        HttpAnalyzerClient::new(&server.uri(), HttpAnalyzerClient::DEFAULT_TIMEOUT).unwrap();
    let comments = client.notify_review(&review_event()).await.unwrap();
    assert!(comments.is_empty());
}
