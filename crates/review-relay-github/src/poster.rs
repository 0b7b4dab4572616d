//! Provider-backed poster.
//!
//! Renders an aggregated comment list as a pull request review and
//! submits it through the pool client owning the target repository.
//! Line comments become inline review comments; file-scope and global
//! comments are folded into the review body. The configured comment
//! footer is appended to every rendered body.

use crate::client::ClientPool;
use crate::convert::{DraftReviewComment, ReviewRequest};
use async_trait::async_trait;
use review_relay_core::event::{Event, ReviewEvent};
use review_relay_core::poster::{PostError, Poster};
use review_relay_core::{Comment, CommentScope, RepositoryInfo};
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "poster_tests.rs"]
mod tests;

/// [`Poster`] that submits pull request reviews.
///
/// Push events have no review surface on the provider; posting one
/// fails with [`PostError::EventNotSupported`]. Deployments that watch
/// pushes run the dry-run poster instead.
pub struct GithubPoster {
    pool: Arc<ClientPool>,
    comment_footer: String,
}

impl GithubPoster {
    pub fn new(pool: Arc<ClientPool>, comment_footer: String) -> Self {
        Self {
            pool,
            comment_footer,
        }
    }

    fn render_body(&self, text: &str) -> String {
        if self.comment_footer.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", text, self.comment_footer)
        }
    }

    fn build_review(&self, comments: &[Comment]) -> ReviewRequest {
        let mut body_sections: Vec<String> = Vec::new();
        let mut inline: Vec<DraftReviewComment> = Vec::new();

        for comment in comments {
            match comment.scope() {
                CommentScope::Global => body_sections.push(self.render_body(&comment.text)),
                CommentScope::File => body_sections.push(self.render_body(&format!(
                    "{}: {}",
                    comment.file, comment.text
                ))),
                CommentScope::Line => inline.push(DraftReviewComment {
                    path: comment.file.clone(),
                    line: comment.line,
                    body: self.render_body(&comment.text),
                }),
            }
        }

        ReviewRequest {
            body: body_sections.join("\n\n"),
            event: "COMMENT",
            comments: inline,
        }
    }

    async fn post_review(
        &self,
        event: &ReviewEvent,
        comments: &[Comment],
    ) -> Result<(), PostError> {
        if comments.is_empty() {
            debug!("no comments to post");
            return Ok(());
        }

        // the review lives in the repository the base branch points at
        let repository_url = &event.base().internal_repository_url;
        let repo =
            RepositoryInfo::parse(repository_url).map_err(|_| PostError::NoClient {
                repository: repository_url.clone(),
            })?;

        let client = self
            .pool
            .client_for(&repo.username, &repo.name)
            .map_err(|_| PostError::NoClient {
                repository: repo.full_name.clone(),
            })?;

        let review = self.build_review(comments);
        client
            .create_review(&repo.username, &repo.name, event.number, &review)
            .await
            .map_err(|err| PostError::Provider {
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl Poster for GithubPoster {
    async fn post(&self, event: &Event, comments: &[Comment]) -> Result<(), PostError> {
        match event {
            Event::Review(review) => self.post_review(review, comments).await,
            Event::Push(_) => Err(PostError::EventNotSupported { kind: "push" }),
        }
    }
}
