//! Content-provider contract.
//!
//! Diff and file context come from an external collaborator (a data
//! service sitting on top of a git object store). The orchestrator only
//! depends on these traits: it resolves the changes for a revision
//! before dispatching analyzers, and fails the event when the revision
//! cannot be resolved.

use crate::event::CommitRevision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One file's before/after state within a revision's change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path before the change; empty for added files.
    #[serde(default)]
    pub old_path: String,

    /// Path after the change; empty for deleted files.
    #[serde(default)]
    pub new_path: String,

    /// Unified diff hunks for the file.
    #[serde(default)]
    pub patch: String,
}

/// A file's full content at a revision head.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    pub content: Vec<u8>,
}

/// Error type for content resolution
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// The revision names a commit the collaborator cannot resolve.
    #[error("unknown commit '{hash}'")]
    UnknownCommit { hash: String },

    #[error("repository '{url}' is unreachable")]
    Unreachable { url: String },

    #[error("content provider failure: {message}")]
    Internal { message: String },
}

/// Supplies the diff context analyzers run against.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn get_changes(&self, revision: &CommitRevision) -> Result<Vec<FileDiff>, ContentError>;
}

/// Supplies full file contents at a revision head.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn get_files(&self, revision: &CommitRevision) -> Result<Vec<File>, ContentError>;
}

/// Stand-in [`ChangeSource`] for deployments without a wired data
/// service.
///
/// Resolution is reduced to validating the revision head: a well-formed
/// non-zero commit hash resolves to an empty change set, while the
/// all-zeros hash or a malformed hash fails with
/// [`ContentError::UnknownCommit`]. Analyzers that fetch content
/// themselves are unaffected; the orchestrator still gets the
/// resolve-before-dispatch gate.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineChangeSource;

impl OfflineChangeSource {
    pub fn new() -> Self {
        Self
    }

    fn is_resolvable(hash: &str) -> bool {
        hash.len() == 40
            && hash.chars().all(|c| c.is_ascii_hexdigit())
            && hash.chars().any(|c| c != '0')
    }
}

#[async_trait]
impl ChangeSource for OfflineChangeSource {
    async fn get_changes(&self, revision: &CommitRevision) -> Result<Vec<FileDiff>, ContentError> {
        if !Self::is_resolvable(&revision.head.hash) {
            return Err(ContentError::UnknownCommit {
                hash: revision.head.hash.clone(),
            });
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
