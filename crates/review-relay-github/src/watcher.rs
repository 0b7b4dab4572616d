//! Poll-mode provider watcher.
//!
//! One loop per (client, category) pair walks that client's repositories
//! forever: request the category's current items with a bounded timeout,
//! convert to normalized events, deliver them to the orchestrator
//! channel, then sleep for the rate-scheduled interval. Classified API
//! errors log and continue; anything else tears the whole watcher down
//! through a shared error channel, first error wins. The
//! [`WatchError::Stopped`] sentinel is the one non-failing termination.

use crate::client::{ApiError, ApiPage, Category, Client, ClientPool};
use crate::convert;
use crate::rate::next_poll_interval;
use crate::ProviderConfig;
use chrono::Utc;
use review_relay_core::{Event, RepositoryInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;

/// Each repository cycle consumes one request per category.
const ENDPOINTS_PER_CYCLE: u32 = 2;

/// Error type for watch loops
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Clean shutdown, not a failure: cancellation was requested or the
    /// orchestrator closed the event channel.
    #[error("watcher stopped")]
    Stopped,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("webhook listener failure: {0}")]
    Listener(#[from] std::io::Error),
}

/// Watches every configured repository and emits normalized events.
pub struct Watcher {
    pool: Arc<ClientPool>,
    config: ProviderConfig,
}

impl Watcher {
    pub fn new(pool: Arc<ClientPool>, config: ProviderConfig) -> Self {
        Self { pool, config }
    }

    /// Run the watcher until cancellation or a fatal error.
    ///
    /// Mode is picked from configuration: an inbound webhook listener,
    /// or polling loops over the client pool. Clean shutdown returns
    /// `Ok(())`.
    pub async fn watch(
        &self,
        events: mpsc::Sender<Event>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), WatchError> {
        let result = if self.config.webhooks {
            crate::webhook::serve(
                &self.config.webhook_address,
                self.config.webhook_secret.clone(),
                events,
                shutdown,
            )
            .await
        } else {
            self.watch_poll(events, shutdown).await
        };

        match result {
            Err(WatchError::Stopped) => Ok(()),
            other => other,
        }
    }

    async fn watch_poll(
        &self,
        events: mpsc::Sender<Event>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WatchError> {
        info!("starting watcher");

        let (err_tx, mut err_rx) = mpsc::channel::<WatchError>(1);

        for (client, repos) in self.pool.shards() {
            for category in [Category::PullRequests, Category::Events] {
                tokio::spawn(watch_loop(
                    Arc::clone(&client),
                    repos.to_vec(),
                    category,
                    events.clone(),
                    shutdown.clone(),
                    err_tx.clone(),
                ));
            }
        }
        drop(err_tx);

        tokio::select! {
            _ = shutdown.changed() => Err(WatchError::Stopped),
            err = err_rx.recv() => match err {
                Some(err) => Err(err),
                // every loop returned without reporting: clean shutdown
                None => Err(WatchError::Stopped),
            },
        }
    }
}

/// Unbounded per-(client, category) loop over the shard's repositories.
async fn watch_loop(
    client: Arc<Client>,
    repos: Vec<RepositoryInfo>,
    category: Category,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
    err_tx: mpsc::Sender<WatchError>,
) {
    if repos.is_empty() {
        return;
    }

    loop {
        for repo in &repos {
            let category_interval = match process_repo(&client, repo, category, &events).await {
                Ok(interval) => interval,
                Err(err) => {
                    // first error wins; a full channel means another loop
                    // already reported
                    let _ = err_tx.try_send(err);
                    return;
                }
            };

            let interval = next_poll_interval(
                &client.quota(),
                client.min_interval(),
                ENDPOINTS_PER_CYCLE,
                Utc::now(),
            )
            .max(category_interval);

            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// One repository iteration: request, convert, deliver.
///
/// Returns the category-specific floor for the following sleep.
async fn process_repo(
    client: &Client,
    repo: &RepositoryInfo,
    category: Category,
    events: &mpsc::Sender<Event>,
) -> Result<Duration, WatchError> {
    let interval = client.poll_interval(category);

    let page = match category {
        Category::PullRequests => match client.list_pull_requests(repo).await {
            Ok(page) => page.map_items(|pr| Some(Event::Review(convert::cast_pull_request(&repo.clone_url, &pr)))),
            Err(err) => return handle_request_error(repo, category, interval, err),
        },
        Category::Events => match client.list_events(repo).await {
            Ok(page) => page.map_items(|activity| {
                match convert::cast_activity_event(repo, &activity) {
                    Ok(converted) => converted,
                    Err(err) => {
                        error!(
                            repository = %repo.full_name,
                            error = %err,
                            "error handling event"
                        );
                        None
                    }
                }
            }),
            Err(err) => return handle_request_error(repo, category, interval, err),
        },
    };

    let ApiPage::Fresh { items, url, etag } = page else {
        debug!(repository = %repo.full_name, ?category, "not modified");
        return Ok(interval);
    };

    for event in items.into_iter().flatten() {
        if events.send(event).await.is_err() {
            return Err(WatchError::Stopped);
        }
    }

    client.validate(&url, etag);
    Ok(interval)
}

fn handle_request_error(
    repo: &RepositoryInfo,
    category: Category,
    interval: Duration,
    err: ApiError,
) -> Result<Duration, WatchError> {
    if err.is_transient() {
        error!(
            repository = %repo.full_name,
            ?category,
            error = %err,
            "repository request failed"
        );
        return Ok(interval);
    }
    Err(err.into())
}
