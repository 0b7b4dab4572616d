//! Common fixtures for pipeline integration tests.
//!
//! Provides the event constants used across scenarios, a recording
//! poster, a change source with fixed resolution rules, and a helper
//! that mounts an HTTP analyzer fake on a wiremock server.

use async_trait::async_trait;
use review_relay_core::content::{ChangeSource, ContentError, FileDiff};
use review_relay_core::event::CommitRevision;
use review_relay_core::poster::{PostError, Poster};
use review_relay_core::{Comment, Event};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BASE_HASH: &str = "4eebef102d7979570aadf69ff54ae1ffcca7ce00";
pub const HEAD_HASH: &str = "d304499cb2a9cad3ea260f06ad59c1658db4763d";
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000";

/// The review event line from the ingestion protocol, as the JSON
/// provider would deliver it.
pub fn review_event_json(internal_id: &str, base: &str, head: &str) -> String {
    format!(
        r#"{{"event":"review", "internal_id": "{}", "number": 1, "commit_revision":{{"base":{{"internal_repository_url":"https://github.com/octo/widgets.git","reference_name":"refs/heads/master","hash":"{}"}},"head":{{"internal_repository_url":"https://github.com/octo/widgets.git","reference_name":"refs/heads/master","hash":"{}"}}}}}}"#,
        internal_id, base, head
    )
}

pub fn push_event_json(internal_id: &str, base: &str, head: &str) -> String {
    format!(
        r#"{{"event":"push", "internal_id": "{}", "commit_revision":{{"base":{{"internal_repository_url":"https://github.com/octo/widgets.git","reference_name":"refs/heads/master","hash":"{}"}},"head":{{"internal_repository_url":"https://github.com/octo/widgets.git","reference_name":"refs/heads/master","hash":"{}"}}}}}}"#,
        internal_id, base, head
    )
}

pub fn parse_event(json: &str) -> Event {
    serde_json::from_str::<Event>(json)
        .expect("fixture event JSON parses")
        .with_provider("json")
}

/// Change source with the resolution rules the scenarios assume: the
/// all-zeros hash is unknown, everything else resolves to one diff.
pub struct ScenarioChanges;

#[async_trait]
impl ChangeSource for ScenarioChanges {
    async fn get_changes(&self, revision: &CommitRevision) -> Result<Vec<FileDiff>, ContentError> {
        if revision.head.hash == ZERO_HASH {
            return Err(ContentError::UnknownCommit {
                hash: revision.head.hash.clone(),
            });
        }
        Ok(vec![FileDiff {
            old_path: "provider/common.go".to_string(),
            new_path: "provider/common.go".to_string(),
            patch: String::new(),
        }])
    }
}

/// Poster capturing every delivered aggregate.
#[derive(Default)]
pub struct RecordingPoster {
    posts: Mutex<Vec<Vec<Comment>>>,
}

impl RecordingPoster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posts(&self) -> Vec<Vec<Comment>> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Poster for RecordingPoster {
    async fn post(&self, _event: &Event, comments: &[Comment]) -> Result<(), PostError> {
        self.posts.lock().unwrap().push(comments.to_vec());
        Ok(())
    }
}

/// Mount a dummy analyzer on a fresh wiremock server: both operations
/// answer with one file comment.
pub async fn start_dummy_analyzer() -> MockServer {
    let server = MockServer::start().await;
    let response = ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "comments": [
            {"file": "provider/common.go", "line": 0, "text": "The file has increased in 5 lines."}
        ]
    }));

    Mock::given(method("POST"))
        .and(path("/notify-review"))
        .respond_with(response.clone())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify-push"))
        .respond_with(response)
        .mount(&server)
        .await;

    server
}

/// Mount an analyzer that always fails.
pub async fn start_error_analyzer() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify-review"))
        .respond_with(ResponseTemplate::new(500).set_body_string("review error"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify-push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("push error"))
        .mount(&server)
        .await;
    server
}
