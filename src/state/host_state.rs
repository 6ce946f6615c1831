//! Politeness state of a single host

use crate::robots::{CachedRobots, ParsedRobots};
use std::time::{Duration, Instant};
use url::Url;

/// Tracks the politeness state of one host
///
/// One instance exists per host key inside a crawler process. The politeness
/// limiter keeps each behind its own lock, so every method here runs with
/// exclusive access.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Host key (lowercase host with non-default port)
    pub host: String,

    /// Earliest instant the next request may start; only ever moves forward
    pub next_allowed_fetch_time: Option<Instant>,

    /// Cached robots.txt rules, `None` until first fetched
    pub robots: Option<CachedRobots>,

    /// Transient failures since the last success
    pub consecutive_failures: u32,
}

impl HostState {
    /// Creates a new HostState with no history
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            next_allowed_fetch_time: None,
            robots: None,
            consecutive_failures: 0,
        }
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_allowed_fetch_time {
            Some(next) if next > now => Some(next - now),
            _ => None,
        }
    }

    /// Records a granted request and reserves the following interval
    pub fn record_request(&mut self, now: Instant, interval: Duration) {
        self.advance_to(now + interval);
    }

    /// Moves the next allowed fetch time forward to `until`
    ///
    /// Earlier instants are ignored.
    pub fn advance_to(&mut self, until: Instant) {
        match self.next_allowed_fetch_time {
            Some(current) if current >= until => {}
            _ => self.next_allowed_fetch_time = Some(until),
        }
    }

    /// Records a transient failure and backs the host off
    ///
    /// The penalty doubles with every consecutive failure, starting at
    /// `interval`, and never exceeds `cap`.
    ///
    /// # Returns
    ///
    /// The penalty applied
    pub fn record_failure(&mut self, now: Instant, interval: Duration, cap: Duration) -> Duration {
        let exponent = self.consecutive_failures.min(16);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let penalty = interval
            .checked_mul(1u32 << exponent)
            .unwrap_or(cap)
            .min(cap.max(interval));
        self.advance_to(now + penalty);
        penalty
    }

    /// Clears the failure streak after a successful fetch
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Checks if robots.txt must be (re)fetched before the next decision
    pub fn needs_robots(&self, ttl: Duration) -> bool {
        match &self.robots {
            Some(cached) => cached.is_stale(ttl),
            None => true,
        }
    }

    /// Replaces the cached robots.txt rules
    pub fn update_robots(&mut self, rules: ParsedRobots) {
        self.robots = Some(CachedRobots::new(rules));
    }

    /// Checks a URL against the cached robots rules
    ///
    /// Hosts without cached rules allow everything.
    pub fn is_allowed(&self, url: &Url, product_token: &str) -> bool {
        self.robots
            .as_ref()
            .map_or(true, |cached| cached.rules.is_allowed(url, product_token))
    }

    /// Calculates the interval between requests to this host
    ///
    /// This is the larger of the configured interval and the robots.txt
    /// Crawl-delay for `product_token`.
    pub fn effective_interval(&self, configured: Duration, product_token: &str) -> Duration {
        let robots_delay = self
            .robots
            .as_ref()
            .and_then(|cached| cached.rules.crawl_delay(product_token))
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .unwrap_or(Duration::ZERO);

        configured.max(robots_delay)
    }
}
