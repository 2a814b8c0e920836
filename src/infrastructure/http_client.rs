//! HTTP page fetching with rate limiting, retries and cancellation
//!
//! The fetcher retrieves raw pages and nothing else: no parsing, no storage.
//! Transient failures (timeouts, connection resets, 5xx, 429) are retried
//! with exponential backoff and jitter; other 4xx responses fail immediately.
//! The politeness rate limit is global across all workers, not per worker.
//!
//! Cancellation is cooperative at the attempt boundary: a request that is
//! already in flight completes or times out on its own; cancellation only
//! stops the rate-limit wait and further retries.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::events::{AppEvent, EventSink};
use crate::infrastructure::config::CrawlerConfig;

/// Raw page as returned by the external source.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Retried by the fetcher; reported only when retries are exhausted.
    #[error("transient fetch failure for {url}: {reason}")]
    Transient { url: String, reason: String },
    /// Not retried: 4xx (other than 429), invalid URLs and the like.
    #[error("permanent fetch failure for {url}: {reason}")]
    Permanent { url: String, reason: String },
    #[error("retries exhausted for {url} after {attempts} attempts: {reason}")]
    RetriesExhausted { url: String, attempts: u32, reason: String },
    #[error("fetch cancelled for {url}")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Fetch seam; the orchestrator only depends on this trait so tests can
/// inject scripted fetchers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page, retrying transient failures internally.
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<RawPage, FetchError>;
}

/// Production fetcher: reqwest client behind a shared direct rate limiter.
/// Every attempt, retries included, is reported to the event sink.
pub struct HttpFetcher {
    client: Client,
    events: Arc<dyn EventSink>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig, events: Arc<dyn EventSink>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| anyhow::anyhow!("invalid user agent: {e}"))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| anyhow::anyhow!("rate limit must be greater than 0"))?,
        );

        Ok(Self {
            client,
            events,
            rate_limiter: RateLimiter::direct(quota),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        })
    }

    fn classify_status(status: StatusCode, url: &str) -> Option<FetchError> {
        if status.is_success() {
            return None;
        }
        let reason = format!("HTTP status {status}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Some(FetchError::Transient { url: url.to_string(), reason })
        } else {
            Some(FetchError::Permanent { url: url.to_string(), reason })
        }
    }

    fn classify_reqwest(error: &reqwest::Error, url: &str) -> FetchError {
        let reason = error.to_string();
        if error.is_timeout() || error.is_connect() || error.is_body() {
            FetchError::Transient { url: url.to_string(), reason }
        } else if error.is_builder() {
            FetchError::Permanent { url: url.to_string(), reason }
        } else {
            // Connection resets and decode failures surface here.
            FetchError::Transient { url: url.to_string(), reason }
        }
    }

    /// Exponential backoff with jitter, capped at the configured maximum.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let jitter = fastrand::u64(0..=exp_ms / 4 + 1);
        Duration::from_millis(exp_ms.saturating_add(jitter).min(self.max_delay.as_millis() as u64))
    }

    async fn fetch_once(&self, url: &str, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        // The rate-limit wait happens before any request leaves the process,
        // so aborting it on cancellation is still "at the task boundary".
        // Biased so an already-cancelled token never starts a request.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            _ = self.rate_limiter.until_ready() => {}
        }

        debug!(url, "fetching page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify_reqwest(&e, url))?;

        if let Some(err) = Self::classify_status(response.status(), url) {
            return Err(err);
        }

        let html = response
            .text()
            .await
            .map_err(|e| Self::classify_reqwest(&e, url))?;

        debug!(url, chars = html.len(), "fetched page");
        Ok(RawPage { url: url.to_string(), html, fetched_at: Utc::now() })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.events.emit(AppEvent::FetchAttempt { url: url.to_string(), attempt });
            match self.fetch_once(url, cancel).await {
                Ok(page) => return Ok(page),
                Err(FetchError::Transient { url, reason }) => {
                    if attempt > self.max_retries {
                        return Err(FetchError::RetriesExhausted { url, attempts: attempt, reason });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(%url, attempt, ?delay, %reason, "transient fetch failure, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(FetchError::Cancelled { url });
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{ChannelSink, NullSink};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&CrawlerConfig::default(), Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn server_errors_are_transient() {
        let err = HttpFetcher::classify_status(StatusCode::BAD_GATEWAY, "http://x").unwrap();
        assert!(err.is_transient());
        let err =
            HttpFetcher::classify_status(StatusCode::TOO_MANY_REQUESTS, "http://x").unwrap();
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = HttpFetcher::classify_status(StatusCode::NOT_FOUND, "http://x").unwrap();
        assert!(matches!(err, FetchError::Permanent { .. }));
        assert!(HttpFetcher::classify_status(StatusCode::OK, "http://x").is_none());
    }

    #[test]
    fn backoff_grows_and_respects_cap() {
        let f = fetcher();
        let first = f.backoff_delay(1);
        assert!(first >= f.base_delay);
        // Far attempts must clamp to the configured maximum.
        let late = f.backoff_delay(40);
        assert!(late <= f.max_delay);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let f = fetcher();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = f.fetch("http://192.0.2.1/none", &cancel).await;
        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn every_attempt_is_reported_to_the_sink() {
        let (sink, mut rx) = ChannelSink::new();
        let f = HttpFetcher::new(&CrawlerConfig::default(), Arc::new(sink)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let _ = f.fetch("http://192.0.2.1/none", &cancel).await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AppEvent::FetchAttempt { attempt: 1, .. }));
    }
}
