//! Normalized code-change events.
//!
//! Providers convert their native payloads into these value objects; the
//! orchestrator and every component downstream of it only ever see this
//! model. Events are immutable once constructed.
//!
//! The serde representation doubles as the administrative ingestion
//! protocol: one JSON object per event, tagged with `"event": "push"` or
//! `"event": "review"`, carrying the commit revision under
//! `commit_revision` with `internal_repository_url` / `reference_name` /
//! `hash` reference pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// Reference pointers and revisions
// ============================================================================

/// A commit reachable through a named ref in a remote repository.
///
/// The zero value (all fields empty) is meaningful: providers emit it for
/// malformed or missing branch metadata instead of failing the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferencePointer {
    #[serde(default)]
    pub internal_repository_url: String,

    #[serde(default)]
    pub reference_name: String,

    #[serde(default)]
    pub hash: String,
}

impl ReferencePointer {
    pub fn new(
        repository_url: impl Into<String>,
        reference_name: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            internal_repository_url: repository_url.into(),
            reference_name: reference_name.into(),
            hash: hash.into(),
        }
    }

    /// True for the zero pointer produced from malformed provider data.
    pub fn is_zero(&self) -> bool {
        self.internal_repository_url.is_empty()
            && self.reference_name.is_empty()
            && self.hash.is_empty()
    }

    /// Short form used in log fields: `ref@hash-prefix`.
    pub fn short(&self) -> String {
        let prefix = self.hash.get(..7).unwrap_or(&self.hash);
        format!("{}@{}", self.reference_name, prefix)
    }
}

impl fmt::Display for ReferencePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.internal_repository_url, self.reference_name, self.hash
        )
    }
}

/// The content identity of a code change: base and head of the pushed or
/// proposed range. Two events with the same base and head reference the
/// same change regardless of how they were triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRevision {
    pub base: ReferencePointer,
    pub head: ReferencePointer,
}

impl CommitRevision {
    pub fn new(base: ReferencePointer, head: ReferencePointer) -> Self {
        Self { base, head }
    }

    /// Content-identity key derived from the base and head hashes.
    pub fn signature(&self) -> RevisionSignature {
        let mut hasher = Sha256::new();
        hasher.update(self.base.hash.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.head.hash.as_bytes());
        RevisionSignature(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for CommitRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.base.short(), self.head.short())
    }
}

/// Hex-encoded digest identifying a [`CommitRevision`]'s content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionSignature(String);

impl RevisionSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Provider-scoped event identity: the dedup key for redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    pub provider: String,
    pub internal_id: String,
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.internal_id)
    }
}

/// Discriminates the two event shapes without inspecting the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    Review,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Review => "review",
        }
    }
}

/// A push to a watched branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(default)]
    pub provider: String,

    pub internal_id: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Number of commits in the push
    #[serde(default)]
    pub commits: u32,

    /// Commits not previously seen on any branch of the repository
    #[serde(default)]
    pub distinct_commits: u32,

    pub commit_revision: CommitRevision,
}

/// A pull/merge request opened or updated on the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    #[serde(default)]
    pub provider: String,

    pub internal_id: String,

    #[serde(default)]
    pub number: u32,

    #[serde(default)]
    pub repository_id: u64,

    /// Branch the change was authored on (may live in a fork)
    #[serde(default)]
    pub source: ReferencePointer,

    /// Provider-materialized merge ref (`refs/pull/N/merge`)
    #[serde(default)]
    pub merge: ReferencePointer,

    #[serde(default)]
    pub is_mergeable: bool,

    pub commit_revision: CommitRevision,
}

impl ReviewEvent {
    /// Target branch the change would merge into.
    pub fn base(&self) -> &ReferencePointer {
        &self.commit_revision.base
    }

    /// Tip of the proposed change (`refs/pull/N/head`).
    pub fn head(&self) -> &ReferencePointer {
        &self.commit_revision.head
    }
}

/// Tagged union over the event variants.
///
/// Dispatch never inspects payloads dynamically: every variant exposes
/// the same identity/signature accessors, and the orchestrator branches
/// on [`Event::kind`] exactly once to pick the analyzer RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    Push(PushEvent),
    Review(ReviewEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Push(_) => EventKind::Push,
            Self::Review(_) => EventKind::Review,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Push(e) => &e.provider,
            Self::Review(e) => &e.provider,
        }
    }

    pub fn internal_id(&self) -> &str {
        match self {
            Self::Push(e) => &e.internal_id,
            Self::Review(e) => &e.internal_id,
        }
    }

    pub fn revision(&self) -> &CommitRevision {
        match self {
            Self::Push(e) => &e.commit_revision,
            Self::Review(e) => &e.commit_revision,
        }
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            provider: self.provider().to_string(),
            internal_id: self.internal_id().to_string(),
        }
    }

    pub fn signature(&self) -> RevisionSignature {
        self.revision().signature()
    }

    /// Stamp a provider name onto an event that arrived without one
    /// (the ingestion protocol omits it).
    pub fn with_provider(mut self, provider: &str) -> Self {
        let slot = match &mut self {
            Self::Push(e) => &mut e.provider,
            Self::Review(e) => &mut e.provider,
        };
        if slot.is_empty() {
            *slot = provider.to_string();
        }
        self
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
