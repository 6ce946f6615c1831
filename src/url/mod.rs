//! URL handling module for Skein
//!
//! This module provides URL normalization, host keys, wildcard host matching,
//! and the link scope that decides which discovered links are worth claiming.

mod host;
mod matcher;
mod normalize;

use crate::config::ScopeConfig;
use std::collections::HashSet;
use url::Url;

// Re-export main functions
pub use host::{host_key, robots_url};
pub use matcher::matches_wildcard;
pub use normalize::normalize;

/// Outcome of checking a normalized link against the session's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeDecision {
    /// The link may be claimed and enqueued
    InScope,
    /// The host matches a deny pattern
    HostDenied,
    /// An allow list is configured and the host matches none of it
    HostNotAllowed,
    /// Links are restricted to seed hosts and this host is not one
    OffSeedHost,
    /// The path ends with a skipped static-resource extension
    StaticResource,
}

impl ScopeDecision {
    /// Returns true if the link should be followed
    pub fn should_follow(&self) -> bool {
        matches!(self, Self::InScope)
    }
}

/// Filters discovered links before they reach the dedup filter
///
/// Checks run in priority order:
/// 1. Static-resource extension
/// 2. Deny patterns
/// 3. Allow patterns (only when the list is non-empty)
/// 4. Seed-host restriction (only when enabled)
#[derive(Debug, Clone, Default)]
pub struct LinkScope {
    allow: Vec<String>,
    deny: Vec<String>,
    seed_hosts: Option<HashSet<String>>,
    skip_extensions: HashSet<String>,
}

impl LinkScope {
    /// Builds a scope from configuration and the session's seed URLs
    ///
    /// # Arguments
    ///
    /// * `scope` - Host allow/deny configuration
    /// * `skip_extensions` - File extensions (without dot) that are never followed
    /// * `seeds` - Normalized seed URLs; their hosts form the seed-host set
    pub fn new(scope: &ScopeConfig, skip_extensions: &[String], seeds: &[Url]) -> Self {
        let seed_hosts = scope
            .stay_on_seed_hosts
            .then(|| seeds.iter().filter_map(host_key).collect());

        Self {
            allow: scope.allow.clone(),
            deny: scope.deny.clone(),
            seed_hosts,
            skip_extensions: skip_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classifies a normalized URL
    pub fn check(&self, url: &Url) -> ScopeDecision {
        if self.is_static_resource(url) {
            return ScopeDecision::StaticResource;
        }

        let host = match host_key(url) {
            Some(host) => host,
            None => return ScopeDecision::HostNotAllowed,
        };

        if self.deny.iter().any(|p| matches_wildcard(p, &host)) {
            return ScopeDecision::HostDenied;
        }

        if !self.allow.is_empty() && !self.allow.iter().any(|p| matches_wildcard(p, &host)) {
            return ScopeDecision::HostNotAllowed;
        }

        if let Some(seed_hosts) = &self.seed_hosts {
            if !seed_hosts.contains(&host) {
                return ScopeDecision::OffSeedHost;
            }
        }

        ScopeDecision::InScope
    }

    fn is_static_resource(&self, url: &Url) -> bool {
        if self.skip_extensions.is_empty() {
            return false;
        }

        let last_segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");

        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.skip_extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }
}
