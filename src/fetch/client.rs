//! HTTP client wrapper for fetching catalog resources.
//!
//! This module provides the `Fetcher` struct which issues GET requests with
//! retry on transient failures and records redirect history instead of
//! following redirects silently. The catalog signals "no such book" through
//! redirects, so the redirect trail is part of the answer, not plumbing to
//! hide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Response, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::availability::Availability;
use super::constants::MAX_REDIRECT_HOPS;
use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::config::ArchiveConfig;
use crate::user_agent;

/// Per-request knobs for a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    query: Vec<(String, String)>,
}

impl FetchOptions {
    /// Creates empty options (plain GET of the URL as given).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a query parameter to the request URL.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Result of a completed fetch: the terminal response plus the redirect
/// trail that led to it.
#[derive(Debug)]
pub struct FetchOutcome {
    requested_url: Url,
    history: Vec<Url>,
    attempts: u32,
    response: Response,
}

impl FetchOutcome {
    /// The URL the caller asked for, including any appended query parameters.
    #[must_use]
    pub fn requested_url(&self) -> &Url {
        &self.requested_url
    }

    /// URL the terminal response came from.
    #[must_use]
    pub fn final_url(&self) -> &Url {
        self.response.url()
    }

    /// URLs that answered with a redirect, in hop order. Empty when the
    /// server answered directly.
    #[must_use]
    pub fn history(&self) -> &[Url] {
        &self.history
    }

    /// HTTP status of the terminal response (always 2xx).
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// How many attempts the fetch took (1 = no retries).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true if any redirect occurred on the way to the response.
    #[must_use]
    pub fn was_redirected(&self) -> bool {
        !self.history.is_empty()
    }

    /// Availability verdict derived from the redirect trail.
    #[must_use]
    pub fn availability(&self) -> Availability {
        Availability::from_redirects(&self.history, self.final_url())
    }

    /// Reads the whole body as text, decoding per the response charset.
    ///
    /// The catalog serves windows-1251 pages and says so in Content-Type,
    /// which reqwest honors.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the body cannot be read.
    pub async fn text(self) -> Result<String, FetchError> {
        let url = self.response.url().to_string();
        self.response
            .text()
            .await
            .map_err(|e| FetchError::network(url, e))
    }

    /// Unwraps the terminal response for streaming consumption.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// HTTP client for fetching catalog pages and files.
///
/// This client is designed to be created once and reused for the whole run,
/// taking advantage of connection pooling. Redirects are followed manually
/// (up to [`MAX_REDIRECT_HOPS`]) so the hop trail stays observable, and
/// transient failures are retried per the configured [`RetryPolicy`].
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    retries: AtomicU64,
}

impl Fetcher {
    /// Creates a new fetcher from run configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: &ArchiveConfig) -> Self {
        let client = build_client(config)
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            policy: config.retry.clone(),
            retries: AtomicU64::new(0),
        }
    }

    /// Total retry sleeps performed across all fetches so far.
    #[must_use]
    pub fn retries_performed(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Fetches a URL with retry on transient failures.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if:
    /// - All attempts fail with transient errors (timeout, connection)
    /// - The server returns an error status (4xx, 5xx)
    /// - The redirect chain exceeds the hop limit
    /// - The run is cancelled while the fetch is in flight
    #[instrument(skip(self, cancel), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_with_options(url, FetchOptions::default(), cancel)
            .await
    }

    /// Fetches a URL with per-request options (query parameters).
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch`](Self::fetch).
    #[instrument(skip(self, options, cancel), fields(url = %url))]
    pub async fn fetch_with_options(
        &self,
        url: &Url,
        options: FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let target = apply_query(url, &options.query);

        let mut attempt: u32 = 1;
        loop {
            match self.fetch_once(&target, cancel).await {
                Ok(mut outcome) => {
                    if attempt > 1 {
                        info!(url = %target, attempts = attempt, "fetch succeeded after retry");
                    }
                    outcome.attempts = attempt;
                    return Ok(outcome);
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(error) => {
                    let failure_type = classify_error(&error);
                    match self.policy.should_retry(failure_type, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            warn!(
                                url = %target,
                                attempt,
                                delay_secs = delay.as_secs(),
                                error = %error,
                                "transient failure, will retry"
                            );
                            tokio::select! {
                                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                                () = tokio::time::sleep(delay) => {}
                            }
                            self.retries.fetch_add(1, Ordering::Relaxed);
                            attempt = next_attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %target, attempt, %reason, "giving up");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Single fetch attempt: issues the request and walks the redirect chain
    /// by hand, recording each hop.
    async fn fetch_once(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut current = url.clone();
        let mut history: Vec<Url> = Vec::new();

        loop {
            let send = self.client.get(current.clone()).send();
            let response = tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = send => result.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::timeout(current.as_str())
                    } else {
                        FetchError::network(current.as_str(), e)
                    }
                })?,
            };

            if response.status().is_redirection()
                && let Some(location) = header_str(&response, LOCATION)
            {
                if history.len() >= MAX_REDIRECT_HOPS {
                    return Err(FetchError::too_many_redirects(
                        url.as_str(),
                        MAX_REDIRECT_HOPS,
                    ));
                }
                let next = current
                    .join(location)
                    .map_err(|_| FetchError::invalid_url(location))?;
                debug!(from = %current, to = %next, "following redirect");
                history.push(current);
                current = next;
                continue;
            }

            // A 3xx without a usable Location falls through here and is
            // reported as a plain status error.
            if !response.status().is_success() {
                return Err(FetchError::http_status(
                    current.as_str(),
                    response.status().as_u16(),
                ));
            }

            return Ok(FetchOutcome {
                requested_url: url.clone(),
                history,
                attempts: 1,
                response,
            });
        }
    }
}

/// Returns a copy of `url` with the given query parameters appended.
fn apply_query(url: &Url, query: &[(String, String)]) -> Url {
    if query.is_empty() {
        return url.clone();
    }
    let mut target = url.clone();
    {
        let mut pairs = target.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    target
}

/// Reads a header as a string slice, if present and valid.
fn header_str<'r>(response: &'r Response, name: reqwest::header::HeaderName) -> Option<&'r str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn build_client(config: &ArchiveConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.read_timeout_secs))
        // Redirects carry meaning here; follow them by hand in fetch_once.
        .redirect(redirect::Policy::none())
        .gzip(true)
        .danger_accept_invalid_certs(!config.verify_tls)
        .user_agent(user_agent::default_user_agent())
        .build()
}
