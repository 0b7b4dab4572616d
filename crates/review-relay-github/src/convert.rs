//! GitHub payload conversion.
//!
//! Turns the provider's wire shapes (poll responses and webhook hooks)
//! into normalized events. Conversion is total for well-formed payloads
//! and degrades softly: a malformed or missing branch yields a zero
//! reference pointer plus a logged warning, never a hard failure.

use chrono::{DateTime, Utc};
use review_relay_core::event::{
    CommitRevision, Event, PushEvent, ReferencePointer, ReviewEvent,
};
use review_relay_core::RepositoryInfo;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;

/// Error type for payload conversion
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("parse error in event payload: {0}")]
    PayloadParse(#[from] serde_json::Error),
}

// ============================================================================
// Wire shapes
// ============================================================================

/// Pull request item from the list endpoint or a webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestItem {
    pub id: u64,
    pub number: u32,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub head: Option<BranchRef>,
    #[serde(default)]
    pub base: Option<BranchRef>,
}

/// Branch metadata on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    #[serde(default)]
    pub repo: Option<RepoRef>,
}

/// Repository metadata carried on a branch.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRef {
    pub id: u64,
    #[serde(default)]
    pub clone_url: String,
}

/// Item from the repository activity events endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Push payload embedded in an activity event.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityPushPayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub head: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub distinct_size: u32,
}

/// `push` webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushHook {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub commits: Vec<HookCommit>,
    pub repository: HookRepo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookCommit {
    #[serde(default)]
    pub distinct: bool,
}

/// `pull_request` webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestHook {
    #[serde(default)]
    pub action: String,
    pub pull_request: PullRequestItem,
    pub repository: HookRepo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookRepo {
    pub clone_url: String,
}

/// Review submission body for the provider's review endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub body: String,
    pub event: &'static str,
    pub comments: Vec<DraftReviewComment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftReviewComment {
    pub path: String,
    pub line: i32,
    pub body: String,
}

// ============================================================================
// Casting
// ============================================================================

/// Convert a pull request into a review event.
///
/// `clone_url` is the clone URL of the repository the pull request was
/// observed in; head and merge pointers are materialized under its
/// `refs/pull/N/...` namespace, while source and base come from the
/// branch metadata itself.
pub fn cast_pull_request(clone_url: &str, pr: &PullRequestItem) -> ReviewEvent {
    let head_sha = pr
        .head
        .as_ref()
        .map(|b| b.sha.clone())
        .unwrap_or_default();

    ReviewEvent {
        provider: crate::PROVIDER.to_string(),
        internal_id: pr.id.to_string(),
        number: pr.number,
        repository_id: pr
            .head
            .as_ref()
            .and_then(|b| b.repo.as_ref())
            .map(|r| r.id)
            .unwrap_or_default(),
        source: cast_branch(pr.head.as_ref()),
        merge: ReferencePointer::new(
            clone_url,
            format!("refs/pull/{}/merge", pr.number),
            pr.merge_commit_sha.clone().unwrap_or_default(),
        ),
        is_mergeable: pr.mergeable.unwrap_or_default(),
        commit_revision: CommitRevision::new(
            cast_branch(pr.base.as_ref()),
            ReferencePointer::new(
                clone_url,
                format!("refs/pull/{}/head", pr.number),
                head_sha,
            ),
        ),
    }
}

/// Convert branch metadata into a reference pointer.
///
/// Missing branches and branches whose clone URL does not parse map to
/// the zero pointer with a warning.
pub fn cast_branch(branch: Option<&BranchRef>) -> ReferencePointer {
    let Some(branch) = branch else {
        warn!("empty pull request branch given");
        return ReferencePointer::default();
    };

    let clone_url = branch
        .repo
        .as_ref()
        .map(|r| r.clone_url.as_str())
        .unwrap_or_default();

    match RepositoryInfo::parse(clone_url) {
        Ok(repo) => ReferencePointer::new(
            repo.clone_url,
            format!("refs/heads/{}", branch.ref_name),
            branch.sha.clone(),
        ),
        Err(_) => {
            warn!("malformed repository URL on pull request branch");
            ReferencePointer::default()
        }
    }
}

/// Convert an activity event into a normalized event.
///
/// Only push events carry a normalized form; every other activity type
/// maps to `None` and is skipped by the watcher.
pub fn cast_activity_event(
    repo: &RepositoryInfo,
    event: &ActivityEvent,
) -> Result<Option<Event>, ConvertError> {
    if event.kind != "PushEvent" {
        return Ok(None);
    }

    let push: ActivityPushPayload = serde_json::from_value(event.payload.clone())?;

    Ok(Some(Event::Push(PushEvent {
        provider: crate::PROVIDER.to_string(),
        internal_id: event.id.clone(),
        created_at: event.created_at,
        commits: push.size,
        distinct_commits: push.distinct_size,
        commit_revision: CommitRevision::new(
            ReferencePointer::new(&repo.clone_url, &push.ref_name, &push.before),
            ReferencePointer::new(&repo.clone_url, &push.ref_name, &push.head),
        ),
    })))
}

/// Convert a `push` webhook payload.
pub fn cast_push_hook(hook: &PushHook, delivery_id: &str) -> PushEvent {
    let distinct = hook.commits.iter().filter(|c| c.distinct).count() as u32;

    PushEvent {
        provider: crate::PROVIDER.to_string(),
        internal_id: delivery_id.to_string(),
        created_at: Utc::now(),
        commits: hook.commits.len() as u32,
        distinct_commits: distinct,
        commit_revision: CommitRevision::new(
            ReferencePointer::new(&hook.repository.clone_url, &hook.ref_name, &hook.before),
            ReferencePointer::new(&hook.repository.clone_url, &hook.ref_name, &hook.after),
        ),
    }
}

/// Convert a `pull_request` webhook payload.
pub fn cast_pull_request_hook(hook: &PullRequestHook) -> ReviewEvent {
    cast_pull_request(&hook.repository.clone_url, &hook.pull_request)
}
