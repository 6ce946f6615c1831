//! Robots.txt handling module
//!
//! This module provides fetching, parsing, and caching of robots.txt files.
//! Fetching goes through the [`RobotsSource`] capability so the politeness
//! limiter can be exercised without a network.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::url::robots_url;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A robots.txt request that did not produce a usable answer
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RobotsFetchError(pub String);

/// Capability for retrieving a host's robots.txt
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetches the robots.txt at `robots_url`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(body))` - The file exists
    /// * `Ok(None)` - The host has no robots.txt
    /// * `Err(RobotsFetchError)` - The request failed
    async fn fetch_robots(&self, robots_url: &Url) -> Result<Option<String>, RobotsFetchError>;
}

/// Fetches and parses robots.txt for the host of `url`
///
/// Never fails: a missing file or a failed fetch yields rules that allow
/// everything, so a host with a broken robots.txt does not stall the crawl.
pub async fn load_robots(source: &dyn RobotsSource, url: &Url) -> ParsedRobots {
    let robots_url = match robots_url(url) {
        Some(robots_url) => robots_url,
        None => return ParsedRobots::allow_all(),
    };

    match source.fetch_robots(&robots_url).await {
        Ok(Some(body)) => {
            tracing::debug!("Loaded {} ({} bytes)", robots_url, body.len());
            ParsedRobots::from_content(&body)
        }
        Ok(None) => {
            tracing::debug!("No robots.txt at {}", robots_url);
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!(
                "Failed to fetch {}: {}; assuming no restrictions",
                robots_url,
                e
            );
            ParsedRobots::allow_all()
        }
    }
}
