//! Tests for the provider-backed poster.

use super::*;
use crate::client::{Client, ClientOptions};
use review_relay_core::event::{CommitRevision, PushEvent, ReferencePointer};
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLONE_URL: &str = "https://github.com/octo/widgets.git";

fn pool(server: &MockServer) -> Arc<ClientPool> {
    let client = Arc::new(Client::new(ClientOptions {
        api_base: Url::parse(&server.uri()).unwrap(),
        user: None,
        token: Some("token".to_string()),
        min_interval: std::time::Duration::from_secs(2),
    }));
    let repo = RepositoryInfo::parse(CLONE_URL).unwrap();
    Arc::new(ClientPool::new(vec![(client, vec![repo])]))
}

fn review_event(number: u32) -> Event {
    Event::Review(ReviewEvent {
        provider: "github".to_string(),
        internal_id: "1".to_string(),
        number,
        repository_id: 1,
        source: ReferencePointer::default(),
        merge: ReferencePointer::default(),
        is_mergeable: true,
        commit_revision: CommitRevision::new(
            ReferencePointer::new(CLONE_URL, "refs/heads/main", "aa"),
            ReferencePointer::new(CLONE_URL, "refs/pull/7/head", "bb"),
        ),
    })
}

fn comment(analyzer: &str, file: &str, line: i32, text: &str) -> Comment {
    Comment {
        analyzer: analyzer.to_string(),
        file: file.to_string(),
        line,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn posts_review_with_inline_and_body_comments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/pulls/7/reviews"))
        .and(body_partial_json(serde_json::json!({
            "event": "COMMENT",
            "comments": [{"path": "src/lib.rs", "line": 5}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let poster = GithubPoster::new(pool(&server), String::new());
    let comments = vec![
        comment("Dummy", "", 0, "overall fine"),
        comment("Dummy", "src/lib.rs", 0, "file got longer"),
        comment("Dummy", "src/lib.rs", 5, "unused import"),
    ];

    poster.post(&review_event(7), &comments).await.unwrap();
}

#[tokio::test]
async fn footer_is_appended_to_rendered_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/pulls/7/reviews"))
        .and(body_partial_json(serde_json::json!({
            "comments": [{"body": "unused import\n\nposted by review-relay"}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let poster = GithubPoster::new(pool(&server), "posted by review-relay".to_string());
    let comments = vec![comment("Dummy", "src/lib.rs", 5, "unused import")];

    poster.post(&review_event(7), &comments).await.unwrap();
}

#[tokio::test]
async fn empty_aggregate_is_a_no_op() {
    let server = MockServer::start().await;
    // no mock mounted: any request would 404 and fail the test

    let poster = GithubPoster::new(pool(&server), String::new());
    poster.post(&review_event(7), &[]).await.unwrap();
}

#[tokio::test]
async fn push_events_are_not_supported() {
    let server = MockServer::start().await;
    let poster = GithubPoster::new(pool(&server), String::new());

    let push = Event::Push(PushEvent {
        provider: "github".to_string(),
        internal_id: "9".to_string(),
        created_at: chrono::Utc::now(),
        commits: 1,
        distinct_commits: 1,
        commit_revision: CommitRevision::new(
            ReferencePointer::new(CLONE_URL, "refs/heads/main", "aa"),
            ReferencePointer::new(CLONE_URL, "refs/heads/main", "bb"),
        ),
    });

    let err = poster
        .post(&push, &[comment("Dummy", "", 0, "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, PostError::EventNotSupported { kind: "push" }));
}

#[tokio::test]
async fn unknown_repository_has_no_client() {
    let server = MockServer::start().await;
    let poster = GithubPoster::new(pool(&server), String::new());

    let mut event = review_event(7);
    if let Event::Review(review) = &mut event {
        review.commit_revision.base.internal_repository_url =
            "https://github.com/other/repo.git".to_string();
    }

    let err = poster
        .post(&event, &[comment("Dummy", "", 0, "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, PostError::NoClient { .. }));
}

#[tokio::test]
async fn provider_rejection_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/pulls/7/reviews"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let poster = GithubPoster::new(pool(&server), String::new());
    let err = poster
        .post(&review_event(7), &[comment("Dummy", "", 0, "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, PostError::Provider { .. }));
}
