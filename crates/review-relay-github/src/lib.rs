//! # Review-Relay GitHub Provider
//!
//! GitHub-facing half of the pipeline: authenticated API clients with
//! quota tracking and conditional-request caching, the rate scheduler,
//! the poll/webhook watchers that turn GitHub payloads into normalized
//! [`review_relay_core::Event`]s, and the provider-backed poster.

use serde::{Deserialize, Serialize};

/// Quota state and the polling-interval scheduler
pub mod rate;

/// Authenticated API client and the repository-sharded client pool
pub mod client;

/// GitHub payload to normalized event conversion
pub mod convert;

/// Poll-mode and webhook-mode watchers
pub mod watcher;

/// Inbound webhook listener
pub mod webhook;

/// Provider-backed poster (PR reviews)
pub mod poster;

pub use client::{ApiError, ApiPage, Client, ClientOptions, ClientPool, PoolError};
pub use poster::GithubPoster;
pub use rate::{next_poll_interval, QuotaState};
pub use watcher::{WatchError, Watcher};

/// Provider name stamped on every converted event.
pub const PROVIDER: &str = "github";

/// Provider-specific options from the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Appended to every posted comment body.
    #[serde(default)]
    pub comment_footer: String,

    /// Webhook mode instead of polling.
    #[serde(default)]
    pub webhooks: bool,

    /// Listen address for webhook mode.
    #[serde(default = "default_webhook_address")]
    pub webhook_address: String,

    /// Shared secret validating `X-Hub-Signature-256`.
    #[serde(default)]
    pub webhook_secret: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            comment_footer: String::new(),
            webhooks: false,
            webhook_address: default_webhook_address(),
            webhook_secret: String::new(),
        }
    }
}

fn default_webhook_address() -> String {
    "0.0.0.0:8080".to_string()
}
