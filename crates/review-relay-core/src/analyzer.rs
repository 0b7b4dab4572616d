//! Analyzer RPC contract and HTTP transport.
//!
//! Analyzers are independent services addressed by a URL-style endpoint.
//! The orchestrator speaks two unary operations to each of them, one per
//! event kind, and enforces the call timeout itself so a stuck analyzer
//! can never stall the pipeline.

use crate::event::{PushEvent, ReviewEvent};
use crate::Comment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;

/// One configured analyzer plugin, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub name: String,

    /// Endpoint in `scheme://host:port` form. The legacy `ipv4://` and
    /// `tcp://` schemes are accepted and treated as `http://`.
    pub addr: String,

    #[serde(default)]
    pub disabled: bool,

    /// Free-form analyzer-specific settings, forwarded verbatim.
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Wire shape of an analyzer response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Error type for analyzer invocations
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer address '{addr}' is not a valid endpoint: {message}")]
    InvalidAddress { addr: String, message: String },

    #[error("analyzer call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("analyzer transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analyzer returned {status}: {message}")]
    Remote { status: u16, message: String },
}

/// RPC seam to a single analyzer service.
///
/// Both operations are unary and synchronous from the orchestrator's
/// perspective; implementations must respect the timeout they were
/// constructed with.
#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    async fn notify_review(&self, event: &ReviewEvent) -> Result<Vec<Comment>, AnalyzerError>;

    async fn notify_push(&self, event: &PushEvent) -> Result<Vec<Comment>, AnalyzerError>;
}

// ============================================================================
// HTTP transport
// ============================================================================

/// Normalize a configured analyzer address to an HTTP base URL.
///
/// `ipv4://host:port` and `tcp://host:port` come from older analyzer
/// deployments and mean plain HTTP.
pub fn normalize_address(addr: &str) -> Result<Url, AnalyzerError> {
    let rewritten = addr
        .strip_prefix("ipv4://")
        .or_else(|| addr.strip_prefix("tcp://"))
        .map(|rest| format!("http://{}", rest))
        .unwrap_or_else(|| addr.to_string());

    let url = Url::parse(&rewritten).map_err(|e| AnalyzerError::InvalidAddress {
        addr: addr.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AnalyzerError::InvalidAddress {
            addr: addr.to_string(),
            message: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// [`AnalyzerClient`] speaking JSON over HTTP.
///
/// `notify_review` posts the event to `{addr}/notify-review`,
/// `notify_push` to `{addr}/notify-push`; the response body is an
/// [`EventResponse`].
pub struct HttpAnalyzerClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl HttpAnalyzerClient {
    /// Default per-call timeout when none is configured.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(addr: &str, timeout: Duration) -> Result<Self, AnalyzerError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: normalize_address(addr)?,
            timeout,
        })
    }

    fn endpoint(&self, operation: &str) -> Url {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("normalized analyzer URL is always a base");
            segments.pop_if_empty().push(operation);
        }
        url
    }

    async fn call<E: Serialize>(
        &self,
        operation: &str,
        event: &E,
    ) -> Result<Vec<Comment>, AnalyzerError> {
        let response = self
            .http
            .post(self.endpoint(operation))
            .timeout(self.timeout)
            .json(event)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalyzerError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    AnalyzerError::Transport(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let body: EventResponse = response.json().await?;
        Ok(body.comments)
    }
}

#[async_trait]
impl AnalyzerClient for HttpAnalyzerClient {
    async fn notify_review(&self, event: &ReviewEvent) -> Result<Vec<Comment>, AnalyzerError> {
        self.call("notify-review", event).await
    }

    async fn notify_push(&self, event: &PushEvent) -> Result<Vec<Comment>, AnalyzerError> {
        self.call("notify-push", event).await
    }
}
