//! Robots.txt caching implementation
//!
//! Each host's rules are kept with the time they were fetched so they can be
//! refreshed once they are older than the configured TTL.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub rules: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Wraps freshly fetched rules with the current timestamp
    pub fn new(rules: ParsedRobots) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached rules are older than `ttl`
    pub fn is_stale(&self, ttl: std::time::Duration) -> bool {
        // A TTL too large for chrono never expires
        match Duration::from_std(ttl) {
            Ok(ttl) => self.age() > ttl,
            Err(_) => false,
        }
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
