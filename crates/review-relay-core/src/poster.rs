//! Poster contract and the dry-run log poster.

use crate::event::Event;
use crate::{Comment, CommentScope};
use async_trait::async_trait;
use tracing::info;

#[cfg(test)]
#[path = "poster_tests.rs"]
mod tests;

/// Error type for posting failures
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    /// The poster has no delivery surface for this event kind.
    #[error("event kind '{kind}' is not supported by this poster")]
    EventNotSupported { kind: &'static str },

    #[error("no provider client available for repository '{repository}'")]
    NoClient { repository: String },

    #[error("provider rejected the posted review: {status}")]
    Api { status: u16 },

    #[error("posting failed: {message}")]
    Provider { message: String },
}

/// Delivers aggregated comments for a processed event.
#[async_trait]
pub trait Poster: Send + Sync {
    async fn post(&self, event: &Event, comments: &[Comment]) -> Result<(), PostError>;
}

/// Dry-run poster: records every comment's scope in the log and has no
/// side effects outside the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPoster;

impl LogPoster {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Poster for LogPoster {
    async fn post(&self, _event: &Event, comments: &[Comment]) -> Result<(), PostError> {
        for comment in comments {
            match comment.scope() {
                CommentScope::Global => {
                    info!(analyzer = %comment.analyzer, text = %comment.text, "global comment");
                }
                CommentScope::File => {
                    info!(
                        analyzer = %comment.analyzer,
                        file = %comment.file,
                        text = %comment.text,
                        "file comment"
                    );
                }
                CommentScope::Line => {
                    info!(
                        analyzer = %comment.analyzer,
                        file = %comment.file,
                        line = comment.line,
                        text = %comment.text,
                        "line comment"
                    );
                }
            }
        }

        Ok(())
    }
}
