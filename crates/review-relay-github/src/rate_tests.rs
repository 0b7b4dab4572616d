//! Tests for quota parsing and the poll scheduler.

use super::*;
use reqwest::header::{HeaderMap, HeaderValue};

const MIN: Duration = Duration::from_secs(2);

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
}

fn quota(remaining: u32, reset_in_secs: i64) -> QuotaState {
    QuotaState {
        limit: 5000,
        remaining,
        reset_at: Some(now() + chrono::Duration::seconds(reset_in_secs)),
    }
}

#[test]
fn spreads_calls_evenly_across_window() {
    // 100 remaining over 1000s, two endpoints per cycle: 50 usable
    // cycles, one every 20s
    let interval = next_poll_interval(&quota(100, 1000), MIN, 2, now());
    assert_eq!(interval, Duration::from_secs(20));
}

#[test]
fn exhausted_quota_waits_for_reset() {
    let interval = next_poll_interval(&quota(0, 600), MIN, 2, now());
    assert_eq!(interval, Duration::from_secs(600));

    // one remaining but two endpoints per cycle is effectively exhausted
    let interval = next_poll_interval(&quota(1, 600), MIN, 2, now());
    assert_eq!(interval, Duration::from_secs(600));
}

#[test]
fn floors_at_min_interval() {
    // plenty of quota: even spacing would be sub-second
    let interval = next_poll_interval(&quota(5000, 10), MIN, 2, now());
    assert_eq!(interval, MIN);

    // reset already passed
    let interval = next_poll_interval(&quota(0, -5), MIN, 2, now());
    assert_eq!(interval, MIN);
}

#[test]
fn unknown_reset_uses_min_interval() {
    let state = QuotaState {
        limit: 5000,
        remaining: 10,
        reset_at: None,
    };
    assert_eq!(next_poll_interval(&state, MIN, 2, now()), MIN);

    let exhausted = QuotaState {
        limit: 5000,
        remaining: 0,
        reset_at: None,
    };
    assert_eq!(next_poll_interval(&exhausted, MIN, 2, now()), MIN);
}

#[test]
fn interval_is_monotone_as_quota_drains() {
    // fixed reset time and min interval: fewer remaining calls never
    // shortens the wait
    let mut previous = Duration::ZERO;
    for remaining in (0..=400).rev() {
        let interval = next_poll_interval(&quota(remaining, 3600), MIN, 2, now());
        assert!(
            interval >= previous,
            "interval shrank from {:?} to {:?} at remaining={}",
            previous,
            interval,
            remaining
        );
        previous = interval;
    }
}

#[test]
fn parses_rate_limit_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
    headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4321"));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from_static("1700000600"),
    );

    let state = QuotaState::from_headers(&headers).unwrap();
    assert_eq!(state.limit, 5000);
    assert_eq!(state.remaining, 4321);
    assert_eq!(
        state.reset_at,
        Utc.timestamp_opt(1_700_000_600, 0).single()
    );
    assert!(!state.is_exhausted());
}

#[test]
fn missing_headers_yield_none() {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
    assert!(QuotaState::from_headers(&headers).is_none());
}
