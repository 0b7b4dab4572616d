//! Dispatch orchestrator.
//!
//! Consumes normalized events from the watcher channel and runs each one
//! through the processing state machine: dedup lookup, context fetch,
//! concurrent analyzer fan-out with per-analyzer fault isolation,
//! event-kind comment validation, aggregation, posting, and the final
//! exactly-once status commit.

use crate::analyzer::{AnalyzerClient, AnalyzerConfig};
use crate::content::ChangeSource;
use crate::event::{Event, EventKind};
use crate::poster::Poster;
use crate::store::{EventStatus, EventStore, StoreError};
use crate::Comment;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

/// One wired analyzer: its RPC client plus the configuration it was
/// loaded from.
#[derive(Clone)]
pub struct Analyzer {
    pub client: Arc<dyn AnalyzerClient>,
    pub config: AnalyzerConfig,
}

/// How an event left the state machine. Terminal log lines and the
/// store commit derive from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Analyzed, posted, committed success.
    Posted { comments: usize },
    /// Exact identity already succeeded; nothing done.
    SkippedIdentity,
    /// Another identity already succeeded with the same content;
    /// committed success without dispatch or posting.
    SkippedDuplicateContent,
}

/// Error type for event processing failures
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    /// The revision could not be resolved to diff context.
    #[error("content resolution failed: {0}")]
    Content(#[from] crate::content::ContentError),

    #[error("posting failed: {0}")]
    Post(#[from] crate::poster::PostError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates the full per-event pipeline.
///
/// Dependencies are injected as trait objects; the orchestrator itself
/// holds no provider-specific state.
pub struct Orchestrator {
    analyzers: Vec<Analyzer>,
    store: Arc<dyn EventStore>,
    changes: Arc<dyn ChangeSource>,
    poster: Arc<dyn Poster>,
    analyzer_timeout: Duration,
}

impl Orchestrator {
    /// Default bound on a single analyzer invocation.
    pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        analyzers: Vec<Analyzer>,
        store: Arc<dyn EventStore>,
        changes: Arc<dyn ChangeSource>,
        poster: Arc<dyn Poster>,
    ) -> Self {
        Self {
            analyzers: analyzers
                .into_iter()
                .filter(|a| !a.config.disabled)
                .collect(),
            store,
            changes,
            poster,
            analyzer_timeout: Self::DEFAULT_ANALYZER_TIMEOUT,
        }
    }

    pub fn with_analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout = timeout;
        self
    }

    /// Consume the event channel until it closes.
    ///
    /// Each event is processed on its own task so events from different
    /// repositories overlap; the store's per-identity CAS keeps
    /// concurrent deliveries of the same identity from double-posting.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            let orchestrator = Arc::clone(&self);
            tokio::spawn(async move {
                let span = info_span!(
                    "event",
                    provider = %event.provider(),
                    internal_id = %event.internal_id(),
                );
                if let Err(err) = orchestrator.handle_event(&event).instrument(span).await {
                    error!(
                        provider = %event.provider(),
                        internal_id = %event.internal_id(),
                        error = %err,
                        "event processing failed"
                    );
                }
            });
        }
    }

    /// Run one event through the state machine.
    ///
    /// Failures that fail *the event* (context resolution, posting)
    /// commit `Failed` before returning the error, so redelivery sees a
    /// terminal record.
    pub async fn handle_event(&self, event: &Event) -> Result<Outcome, OrchestrateError> {
        let admission = self.store.admit(event).await?;

        if admission.status == EventStatus::Success {
            info!("event successfully processed, skipping...");
            return Ok(Outcome::SkippedIdentity);
        }

        // A failed record stays failed: redelivery of a failed identity is
        // re-attempted only when the record is still pending (first
        // delivery crashed mid-flight) or via administrative record
        // removal. Pending falls through to a full processing attempt.
        if admission.status == EventStatus::Failed {
            info!("event already failed, skipping...");
            return Ok(Outcome::SkippedIdentity);
        }

        let duplicate_content = self.store.equivalent_success_exists(event).await?;

        match event.kind() {
            EventKind::Review => info!("processing pull request"),
            EventKind::Push => info!("processing push"),
        }

        // Resolve the diff context before anything else; an unresolvable
        // revision fails the event even on the duplicate-content path.
        if let Err(err) = self.changes.get_changes(event.revision()).await {
            self.commit(event, EventStatus::Failed).await?;
            return Err(err.into());
        }

        if duplicate_content {
            info!("duplicate content of an already processed event, not posting");
            self.commit(event, EventStatus::Success).await?;
            return Ok(Outcome::SkippedDuplicateContent);
        }

        let comments = self.dispatch(event).await;
        let comments = self.validate(event, comments);

        info!(comments = comments.len(), "posting analysis");
        if let Err(err) = self.poster.post(event, &comments).await {
            self.commit(event, EventStatus::Failed).await?;
            return Err(err.into());
        }

        self.commit(event, EventStatus::Success).await?;
        info!(status = "success", "event processed");

        Ok(Outcome::Posted {
            comments: comments.len(),
        })
    }

    /// Invoke every analyzer concurrently, isolating failures.
    ///
    /// A failing or timed-out analyzer is logged with its name and
    /// excluded from aggregation; it never aborts the others. Within one
    /// analyzer's response, comment order is preserved; across analyzers
    /// the order follows completion and is unspecified.
    async fn dispatch(&self, event: &Event) -> Vec<Comment> {
        let calls = self.analyzers.iter().map(|analyzer| {
            let timeout = self.analyzer_timeout;
            async move {
                let name = analyzer.config.name.as_str();
                let call = async {
                    match event {
                        Event::Review(review) => analyzer.client.notify_review(review).await,
                        Event::Push(push) => analyzer.client.notify_push(push).await,
                    }
                };

                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        error!(analyzer = name, timeout = ?timeout, "analysis failed");
                        return Vec::new();
                    }
                };

                match result {
                    Ok(mut comments) => {
                        for comment in &mut comments {
                            comment.analyzer = name.to_string();
                        }
                        debug!(analyzer = name, comments = comments.len(), "analysis done");
                        comments
                    }
                    Err(err) => {
                        error!(analyzer = name, error = %err, "analysis failed");
                        Vec::new()
                    }
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Drop comments whose placement the event kind cannot satisfy.
    ///
    /// Push events have no diff surface to attach file or line comments
    /// to; such comments are rejected and logged, the rest are kept.
    fn validate(&self, event: &Event, comments: Vec<Comment>) -> Vec<Comment> {
        if event.kind() == EventKind::Review {
            return comments;
        }

        let (rejected, kept): (Vec<_>, Vec<_>) = comments
            .into_iter()
            .partition(|c| c.requires_diff_placement());

        if !rejected.is_empty() {
            warn!(
                "comments can belong only to review event but {} is given",
                rejected.len()
            );
        }

        kept
    }

    /// Commit the terminal status, tolerating a lost CAS race.
    ///
    /// Losing the race means a concurrent delivery of the same identity
    /// already committed; that delivery owns the terminal log line.
    async fn commit(&self, event: &Event, status: EventStatus) -> Result<(), StoreError> {
        match self.store.commit(event, status).await {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyCommitted { identity, status }) => {
                debug!(%identity, %status, "concurrent delivery already committed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
