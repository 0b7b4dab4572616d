//! Authenticated GitHub API client and the repository-sharded pool.
//!
//! Each client owns one credential, the quota state that credential is
//! subject to, and a conditional-request cache: the ETag of the last
//! successful request per URL. Re-requesting a cached URL sends
//! `If-None-Match`, and an unchanged resource surfaces as
//! [`ApiPage::NotModified`] without payload decoding (GitHub does not
//! count validated 304s against the core quota).
//!
//! Sharding repositories across clients with distinct tokens multiplies
//! the effective quota; the pool routes each repository to its owning
//! client.

use crate::convert::{ActivityEvent, PullRequestItem, ReviewRequest};
use crate::rate::QuotaState;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, ETAG, IF_NONE_MATCH, USER_AGENT};
use reqwest::StatusCode;
use review_relay_core::RepositoryInfo;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Max time to wait for one API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Floor between consecutive polls of one repository.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

const API_USER_AGENT: &str = "review-relay";

/// Polled endpoint categories; each watch cycle hits one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    PullRequests,
    Events,
}

/// Error type for API requests
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited until {reset_at:?}")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("authentication rejected ({status})")]
    Unauthorized { status: u16 },

    #[error("API error {status} for {url}")]
    Api { status: u16, url: String },
}

impl ApiError {
    /// Transient errors are retried on the next natural poll cycle;
    /// anything else tears down the owning watch loop.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized { .. } => false,
        }
    }
}

/// Result of a conditional GET.
#[derive(Debug)]
pub enum ApiPage<T> {
    /// Resource unchanged since the cached validator; no payload.
    NotModified,
    Fresh {
        items: Vec<T>,
        /// Request URL, for recording the validator after handling.
        url: String,
        /// ETag returned with the fresh payload.
        etag: Option<String>,
    },
}

impl<T> ApiPage<T> {
    /// Convert the items of a fresh page, keeping the validator intact.
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> ApiPage<U> {
        match self {
            ApiPage::NotModified => ApiPage::NotModified,
            ApiPage::Fresh { items, url, etag } => ApiPage::Fresh {
                items: items.into_iter().map(f).collect(),
                url,
                etag,
            },
        }
    }
}

/// Construction options for a [`Client`].
#[derive(Clone)]
pub struct ClientOptions {
    /// API root; overridden in tests.
    pub api_base: Url,
    pub user: Option<String>,
    pub token: Option<String>,
    pub min_interval: Duration,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("api_base", &self.api_base.as_str())
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: Url::parse("https://api.github.com").expect("static URL"),
            user: None,
            token: None,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// One authenticated API client.
///
/// Quota counters and the validator cache are mutated only by this
/// client's own request path.
pub struct Client {
    http: reqwest::Client,
    options: ClientOptions,
    quota: RwLock<QuotaState>,
    /// Server-suggested minimum poll delay per category
    /// (`X-Poll-Interval`, events endpoint only).
    poll_intervals: RwLock<HashMap<Category, Duration>>,
    /// URL of the last successful request -> its ETag validator.
    validators: RwLock<HashMap<String, String>>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            options,
            quota: RwLock::new(QuotaState::default()),
            poll_intervals: RwLock::new(HashMap::new()),
            validators: RwLock::new(HashMap::new()),
        }
    }

    /// Current quota snapshot for the rate scheduler.
    pub fn quota(&self) -> QuotaState {
        self.quota.read().expect("quota lock poisoned").clone()
    }

    pub fn min_interval(&self) -> Duration {
        self.options.min_interval
    }

    /// Category floor: the larger of the configured minimum and the
    /// server-suggested poll delay.
    pub fn poll_interval(&self, category: Category) -> Duration {
        self.poll_intervals
            .read()
            .expect("poll interval lock poisoned")
            .get(&category)
            .copied()
            .unwrap_or(self.options.min_interval)
            .max(self.options.min_interval)
    }

    /// Record the cache validator for a handled request, so the next
    /// poll of the same URL can short-circuit to `NotModified`.
    pub fn validate(&self, url: &str, etag: Option<String>) {
        if let Some(etag) = etag {
            debug!(url, "request cached");
            self.validators
                .write()
                .expect("validator lock poisoned")
                .insert(url.to_string(), etag);
        }
    }

    /// Open pull requests of a repository.
    pub async fn list_pull_requests(
        &self,
        repo: &RepositoryInfo,
    ) -> Result<ApiPage<PullRequestItem>, ApiError> {
        let url = self.endpoint(&["repos", &repo.username, &repo.name, "pulls"]);
        self.get_json(url, Category::PullRequests).await
    }

    /// Recent activity events of a repository.
    pub async fn list_events(
        &self,
        repo: &RepositoryInfo,
    ) -> Result<ApiPage<ActivityEvent>, ApiError> {
        let url = self.endpoint(&["repos", &repo.username, &repo.name, "events"]);
        self.get_json(url, Category::Events).await
    }

    /// Submit a pull request review.
    pub async fn create_review(
        &self,
        owner: &str,
        repo: &str,
        number: u32,
        review: &ReviewRequest,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&[
            "repos",
            owner,
            repo,
            "pulls",
            &number.to_string(),
            "reviews",
        ]);

        let request = self.decorate(self.http.post(url.clone())).json(review);
        let response = request.send().await.map_err(map_send_error)?;
        self.observe(response.headers(), None);

        let status = response.status();
        if !status.is_success() {
            return Err(self.classify_failure(status, url.as_str()));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.options.api_base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .expect("API base is always a valid base URL");
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request
            .timeout(REQUEST_TIMEOUT)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, API_USER_AGENT);

        if let Some(user) = &self.options.user {
            request = request.basic_auth(user, self.options.token.as_deref());
        } else if let Some(token) = &self.options.token {
            request = request.bearer_auth(token);
        }

        request
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        category: Category,
    ) -> Result<ApiPage<T>, ApiError> {
        let mut request = self.decorate(self.http.get(url.clone()));

        let cached = self
            .validators
            .read()
            .expect("validator lock poisoned")
            .get(url.as_str())
            .cloned();
        if let Some(etag) = cached {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(map_send_error)?;
        self.observe(response.headers(), Some(category));

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(ApiPage::NotModified);
        }
        if !status.is_success() {
            return Err(self.classify_failure(status, url.as_str()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let items: Vec<T> = response.json().await?;

        Ok(ApiPage::Fresh {
            items,
            url: url.to_string(),
            etag,
        })
    }

    /// Fold response headers into the quota and poll-interval state.
    fn observe(&self, headers: &HeaderMap, category: Option<Category>) {
        if let Some(state) = QuotaState::from_headers(headers) {
            *self.quota.write().expect("quota lock poisoned") = state;
        }

        if let Some(category) = category {
            let suggested = headers
                .get("x-poll-interval")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            if let Some(suggested) = suggested {
                self.poll_intervals
                    .write()
                    .expect("poll interval lock poisoned")
                    .insert(category, suggested);
            }
        }
    }

    fn classify_failure(&self, status: StatusCode, url: &str) -> ApiError {
        match status {
            StatusCode::FORBIDDEN if self.quota().is_exhausted() => ApiError::RateLimited {
                reset_at: self.quota().reset_at,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
                status: status.as_u16(),
            },
            _ => ApiError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            },
        }
    }
}

fn map_send_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(err)
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Error type for pool lookups
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("client for {owner}/{name} doesn't exist")]
    NoClient { owner: String, name: String },
}

/// Routes each watched repository to the client holding its credential.
pub struct ClientPool {
    shards: Vec<(Arc<Client>, Vec<RepositoryInfo>)>,
    by_repo: HashMap<String, usize>,
}

impl ClientPool {
    /// Build a pool from (client, repositories) shards. Repository sets
    /// are expected to be disjoint; a repository listed twice routes to
    /// its first shard.
    pub fn new(shards: Vec<(Arc<Client>, Vec<RepositoryInfo>)>) -> Self {
        let mut by_repo = HashMap::new();
        for (index, (_, repos)) in shards.iter().enumerate() {
            for repo in repos {
                by_repo.entry(repo.full_name.clone()).or_insert(index);
            }
        }
        Self { shards, by_repo }
    }

    /// The client responsible for a repository.
    pub fn client_for(&self, owner: &str, name: &str) -> Result<Arc<Client>, PoolError> {
        let full_name = format!("{}/{}", owner, name);
        self.by_repo
            .get(&full_name)
            .map(|index| Arc::clone(&self.shards[*index].0))
            .ok_or_else(|| PoolError::NoClient {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    /// All shards, for the watcher to spawn per-client loops.
    pub fn shards(&self) -> impl Iterator<Item = (Arc<Client>, &[RepositoryInfo])> {
        self.shards
            .iter()
            .map(|(client, repos)| (Arc::clone(client), repos.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
