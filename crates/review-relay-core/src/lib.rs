//! # Review-Relay Core
//!
//! Core pipeline for the Review-Relay code-review orchestration service.
//!
//! This crate contains the provider-independent half of the system: the
//! normalized event model, the dedup & status store, the analyzer RPC
//! contract, the content-provider contract, the poster contract, and the
//! dispatch orchestrator that ties them together.
//!
//! ## Architecture
//!
//! The pipeline depends only on trait abstractions:
//! - [`store::EventStore`] decides whether an event is new, already
//!   processed, or a content duplicate
//! - [`analyzer::AnalyzerClient`] is the RPC seam to analysis services
//! - [`content::ChangeSource`] resolves the diff context for a revision
//! - [`poster::Poster`] delivers aggregated comments
//!
//! Provider implementations (watchers, API clients, provider-backed
//! posters) live in sibling crates and feed events into the orchestrator
//! through a `tokio::sync::mpsc` channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Normalized event model shared by providers and the orchestrator
pub mod event;

/// Dedup & status store contract and implementations
pub mod store;

/// Analyzer RPC contract and HTTP transport
pub mod analyzer;

/// Content-provider contract (diff/file context for a revision)
pub mod content;

/// Poster contract and the dry-run log poster
pub mod poster;

/// Dispatch orchestrator: dedup, fan-out, aggregate, post, commit
pub mod orchestrator;

// Re-export the types nearly every consumer needs
pub use analyzer::{AnalyzerClient, AnalyzerConfig, AnalyzerError, HttpAnalyzerClient};
pub use content::{ChangeSource, ContentError, FileDiff, FileSource, OfflineChangeSource};
pub use event::{
    CommitRevision, Event, EventIdentity, EventKind, PushEvent, ReferencePointer, ReviewEvent,
    RevisionSignature,
};
pub use orchestrator::{Analyzer, Orchestrator, Outcome};
pub use poster::{LogPoster, PostError, Poster};
pub use store::{Admission, EventStatus, EventStore, MemoryEventStore, StoreError};

// ============================================================================
// Repository identity
// ============================================================================

/// A watched repository, as supplied by configuration.
///
/// Read-only at runtime; the watcher uses it to address provider API
/// endpoints and to stamp converted events with their clone URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Owner login or organization name
    pub username: String,
    /// Repository name without the owner prefix
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    /// HTTPS clone URL
    pub clone_url: String,
}

impl RepositoryInfo {
    /// Parse repository identity out of a clone URL.
    ///
    /// Accepts `https://host/owner/name` with an optional `.git` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryParseError`] when the URL does not parse or
    /// does not carry an owner and a repository segment.
    pub fn parse(clone_url: &str) -> Result<Self, RepositoryParseError> {
        let url = Url::parse(clone_url).map_err(|_| RepositoryParseError::Malformed {
            url: clone_url.to_string(),
        })?;

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if segments.len() < 2 {
            return Err(RepositoryParseError::MissingSegments {
                url: clone_url.to_string(),
            });
        }

        let name_segment = segments.pop().expect("length checked above");
        let username = segments.pop().expect("length checked above").to_string();
        let name = name_segment.trim_end_matches(".git").to_string();

        if username.is_empty() || name.is_empty() {
            return Err(RepositoryParseError::MissingSegments {
                url: clone_url.to_string(),
            });
        }

        Ok(Self {
            full_name: format!("{}/{}", username, name),
            username,
            name,
            clone_url: clone_url.to_string(),
        })
    }

    /// Web link for log correlation (`https://host/owner/name`)
    pub fn link(&self) -> String {
        self.clone_url.trim_end_matches(".git").to_string()
    }
}

impl fmt::Display for RepositoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// Error type for clone-URL parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryParseError {
    #[error("malformed repository URL '{url}'")]
    Malformed { url: String },

    #[error("repository URL '{url}' is missing owner or name segments")]
    MissingSegments { url: String },
}

// ============================================================================
// Comments
// ============================================================================

/// A single finding produced by an analyzer.
///
/// Scope is encoded positionally: an empty `file` is a global comment on
/// the whole event, `line == 0` with a file is a file-level comment, and
/// a positive line is a line-level comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Name of the analyzer that produced the comment. Filled in by the
    /// orchestrator during aggregation; analyzers leave it empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analyzer: String,

    #[serde(default)]
    pub file: String,

    #[serde(default)]
    pub line: i32,

    pub text: String,
}

impl Comment {
    /// Classify where this comment attaches.
    pub fn scope(&self) -> CommentScope {
        if self.file.is_empty() {
            CommentScope::Global
        } else if self.line == 0 {
            CommentScope::File
        } else {
            CommentScope::Line
        }
    }

    /// True when the comment implies placement inside a diff, which only
    /// review events can satisfy.
    pub fn requires_diff_placement(&self) -> bool {
        !self.file.is_empty()
    }
}

/// Attachment point of a [`Comment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentScope {
    Global,
    File,
    Line,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
