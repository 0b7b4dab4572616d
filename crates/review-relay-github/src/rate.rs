//! Quota tracking and poll scheduling.
//!
//! GitHub reports the remaining request budget and the window reset time
//! in `X-RateLimit-*` response headers. The scheduler turns that signal
//! into a polling interval that spreads the remaining calls evenly
//! across the window instead of bursting and then stalling at the limit.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

#[cfg(test)]
#[path = "rate_tests.rs"]
mod tests;

/// Remaining-quota snapshot for one client, updated after every API
/// call from the response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaState {
    /// Maximum requests allowed in the window
    pub limit: u32,
    /// Requests remaining in the current window
    pub remaining: u32,
    /// When the window resets; `None` until the first response is seen
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// Parse quota state from `X-RateLimit-Limit` / `-Remaining` /
    /// `-Reset` headers. Returns `None` when any required header is
    /// missing or unparsable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let parse_u32 = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok())
        };

        let limit = parse_u32("x-ratelimit-limit")?;
        let remaining = parse_u32("x-ratelimit-remaining")?;
        let reset_at = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Compute the next polling delay from the current quota.
///
/// With budget left, the time until reset is divided by the remaining
/// request count (adjusted for how many endpoints one watch cycle
/// consumes) so calls space out evenly. With the budget exhausted, the
/// watcher waits for the reset. The result never drops below
/// `min_interval`. Pure in its inputs; `now` is injected so tests run
/// without real time.
pub fn next_poll_interval(
    quota: &QuotaState,
    min_interval: Duration,
    endpoints_per_cycle: u32,
    now: DateTime<Utc>,
) -> Duration {
    let mut interval = min_interval;

    let adjusted_remaining = quota.remaining / endpoints_per_cycle.max(1);
    if adjusted_remaining > 0 {
        if let Some(reset_at) = quota.reset_at {
            let until_reset = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
            interval = until_reset / adjusted_remaining;
        }
    } else if let Some(reset_at) = quota.reset_at {
        interval = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
    }

    interval.max(min_interval)
}
