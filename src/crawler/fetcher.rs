//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the crawler's user agent
//! - Single GET requests with per-request timeouts
//! - Surfacing redirects to the worker instead of following them
//! - Classifying status codes and network errors
//! - robots.txt retrieval for the politeness limiter
//!
//! The fetcher never retries: retry policy belongs to the crawl worker.

use crate::config::{Config, UserAgentConfig};
use crate::robots::{RobotsFetchError, RobotsSource};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Result of a single fetch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 2xx response
    Success {
        /// HTTP status code
        status_code: u16,
        /// Response body, cut at the configured size limit
        body: Vec<u8>,
        /// URL the body was served from
        final_url: Url,
        /// Content-Type header value, empty if absent
        content_type: String,
    },

    /// 3xx response with a Location header
    Redirect {
        status_code: u16,
        /// Raw Location value; may be relative to the requested URL
        target: String,
    },

    /// Failure worth retrying later (408, 429, 5xx, network errors)
    TransientFailure { reason: String },

    /// Failure retrying cannot fix (other 4xx, invalid requests)
    PermanentFailure { reason: String },
}

/// How a status code is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Redirect,
    Transient,
    Permanent,
}

/// Classifies an HTTP status code
///
/// | Status | Class |
/// |--------|-------|
/// | 2xx | Success |
/// | 3xx | Redirect |
/// | 408, 429, 5xx | Transient |
/// | other | Permanent |
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status.is_redirection() {
        StatusClass::Redirect
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

/// Capability for retrieving a single URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; they are reported to the
/// caller so the target goes through dedup like any other link.
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `connect_timeout` - Limit on establishing a connection
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use skein::config::UserAgentConfig;
/// use skein::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SkeinBot".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(5)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(connect_timeout)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`] and [`RobotsSource`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
    robots_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client, max_body_bytes: usize, robots_timeout: Duration) -> Self {
        Self {
            client,
            max_body_bytes,
            robots_timeout,
        }
    }

    /// Builds a fetcher from the crawl configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.crawler.connect_timeout())?;
        Ok(Self::new(
            client,
            config.crawler.max_body_bytes,
            config.crawler.fetch_timeout(),
        ))
    }

    /// Reads a response body, stopping at the size limit
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await? {
            let remaining = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > remaining {
                body.extend_from_slice(&chunk[..remaining]);
                tracing::debug!(
                    "Truncated body of {} at {} bytes",
                    response.url(),
                    self.max_body_bytes
                );
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchOutcome {
        let response = match self.client.get(url.clone()).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Redirect => {
                return match response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                {
                    Some(target) => FetchOutcome::Redirect {
                        status_code: status.as_u16(),
                        target: target.to_string(),
                    },
                    None => FetchOutcome::PermanentFailure {
                        reason: format!("HTTP {} without Location", status.as_u16()),
                    },
                };
            }
            StatusClass::Transient => {
                return FetchOutcome::TransientFailure {
                    reason: format!("HTTP {}", status.as_u16()),
                };
            }
            StatusClass::Permanent => {
                return FetchOutcome::PermanentFailure {
                    reason: format!("HTTP {}", status.as_u16()),
                };
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        match self.read_body(response).await {
            Ok(body) => FetchOutcome::Success {
                status_code: status.as_u16(),
                body,
                final_url,
                content_type,
            },
            Err(e) => FetchOutcome::TransientFailure {
                reason: format!("body read failed: {}", e),
            },
        }
    }
}

#[async_trait]
impl RobotsSource for HttpFetcher {
    async fn fetch_robots(&self, robots_url: &Url) -> Result<Option<String>, RobotsFetchError> {
        let response = self
            .client
            .get(robots_url.clone())
            .timeout(self.robots_timeout)
            .send()
            .await
            .map_err(|e| RobotsFetchError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = self
                .read_body(response)
                .await
                .map_err(|e| RobotsFetchError(e.to_string()))?;
            return Ok(Some(String::from_utf8_lossy(&body).into_owned()));
        }

        if status.is_server_error() {
            return Err(RobotsFetchError(format!("HTTP {}", status.as_u16())));
        }

        // Missing, forbidden or redirected robots.txt all mean no rules
        Ok(None)
    }
}

/// Maps a request error to a fetch outcome
fn classify_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        FetchOutcome::TransientFailure {
            reason: "request timeout".to_string(),
        }
    } else if error.is_connect() {
        FetchOutcome::TransientFailure {
            reason: format!("connection failed: {}", error),
        }
    } else if error.is_builder() {
        FetchOutcome::PermanentFailure {
            reason: format!("invalid request: {}", error),
        }
    } else {
        FetchOutcome::TransientFailure {
            reason: error.to_string(),
        }
    }
}
