//! Politeness limiter
//!
//! This module handles:
//! - Lazily creating one `HostState` per host key
//! - Fetching and refreshing robots.txt on first reference to a host
//! - Rejecting URLs disallowed by robots.txt
//! - Enforcing the minimum interval between requests to a host
//! - Backing a host off after transient failures
//!
//! Each host sits behind its own async lock, so callers for different hosts
//! never wait on each other and two callers for the same host can never both
//! be granted the same slot.

use crate::config::Config;
use crate::robots::{load_robots, RobotsSource};
use crate::state::HostState;
use crate::url::host_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// Answer to a request for permission to fetch a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller may fetch now; the next slot for the host is reserved
    Granted,

    /// The host is not ready; ask again at `until`
    Wait { until: Instant },

    /// robots.txt forbids the URL
    Disallowed,
}

/// Per-host rate gate and robots.txt check
pub struct PolitenessLimiter {
    /// Host key -> state; the outer lock is only held to look up an entry
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<HostState>>>>,

    robots: Arc<dyn RobotsSource>,

    /// Configured minimum interval between requests to one host
    interval: Duration,

    /// Ceiling for failure back-off
    backoff_cap: Duration,

    robots_ttl: Duration,

    /// Product token matched against robots.txt user-agent lines
    product_token: String,
}

impl PolitenessLimiter {
    /// Creates a new limiter
    ///
    /// # Arguments
    ///
    /// * `robots` - Source of robots.txt bodies
    /// * `interval` - Minimum time between requests to one host
    /// * `backoff_cap` - Longest penalty after repeated host failures
    /// * `robots_ttl` - Age after which cached robots rules are refetched
    /// * `product_token` - Crawler name used for robots matching
    pub fn new(
        robots: Arc<dyn RobotsSource>,
        interval: Duration,
        backoff_cap: Duration,
        robots_ttl: Duration,
        product_token: impl Into<String>,
    ) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            robots,
            interval,
            backoff_cap,
            robots_ttl,
            product_token: product_token.into(),
        }
    }

    /// Creates a limiter from the crawl configuration
    pub fn from_config(config: &Config, robots: Arc<dyn RobotsSource>) -> Self {
        Self::new(
            robots,
            config.crawler.per_host_interval(),
            config.crawler.retry_backoff_cap(),
            config.crawler.robots_ttl(),
            config.user_agent.robots_token(),
        )
    }

    /// Returns the state of `host`, creating it on first reference
    fn host_state(&self, host: &str) -> Arc<tokio::sync::Mutex<HostState>> {
        let mut hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(HostState::new(host)))),
        )
    }

    /// Asks for permission to fetch `url`
    ///
    /// On first reference to a host (and whenever its cached rules are
    /// stale) robots.txt is fetched while holding the host's lock. A grant
    /// reserves the next slot immediately, so concurrent callers for the
    /// same host are spaced by at least the effective interval.
    pub async fn acquire(&self, url: &Url) -> Admission {
        let host = match host_key(url) {
            Some(host) => host,
            None => return Admission::Disallowed,
        };

        let state = self.host_state(&host);
        let mut state = state.lock().await;

        if state.needs_robots(self.robots_ttl) {
            let rules = load_robots(self.robots.as_ref(), url).await;
            state.update_robots(rules);
        }

        if !state.is_allowed(url, &self.product_token) {
            tracing::debug!("robots.txt disallows {}", url);
            return Admission::Disallowed;
        }

        let now = Instant::now();
        if let Some(wait) = state.time_until_next_request(now) {
            tracing::trace!("Host {} busy for another {:?}", host, wait);
            return Admission::Wait { until: now + wait };
        }

        let interval = state.effective_interval(self.interval, &self.product_token);
        state.record_request(now, interval);
        Admission::Granted
    }

    /// Backs off the host of `url` after a transient failure
    ///
    /// # Returns
    ///
    /// The penalty applied, or `None` if the URL has no host
    pub async fn record_failure(&self, url: &Url) -> Option<Duration> {
        let host = host_key(url)?;
        let state = self.host_state(&host);
        let mut state = state.lock().await;

        let interval = state.effective_interval(self.interval, &self.product_token);
        let penalty = state.record_failure(Instant::now(), interval, self.backoff_cap);
        tracing::debug!(
            "Backing off {} for {:?} after {} consecutive failures",
            host,
            penalty,
            state.consecutive_failures
        );
        Some(penalty)
    }

    /// Clears the failure streak of the host of `url`
    pub async fn record_success(&self, url: &Url) {
        if let Some(host) = host_key(url) {
            let state = self.host_state(&host);
            state.lock().await.record_success();
        }
    }

    /// Number of hosts referenced so far
    pub fn host_count(&self) -> usize {
        self.hosts
            .lock()
            .map(|hosts| hosts.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
