//! Environment variable overrides
//!
//! Deployments often run several crawler processes from one config file and
//! vary a handful of values per process. Each override replaces the file value
//! when the variable is set and parses; a value that does not parse is ignored
//! with a warning and the file value stays in effect.

use crate::config::types::Config;
use std::str::FromStr;

pub const ENV_SESSION: &str = "SKEIN_SESSION";
pub const ENV_DATABASE_PATH: &str = "SKEIN_DATABASE_PATH";
pub const ENV_CONCURRENCY: &str = "SKEIN_CONCURRENCY";
pub const ENV_MAX_DEPTH: &str = "SKEIN_MAX_DEPTH";
pub const ENV_PER_HOST_INTERVAL_MS: &str = "SKEIN_PER_HOST_INTERVAL_MS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "SKEIN_FETCH_TIMEOUT_MS";
pub const ENV_LEASE_TIMEOUT_MS: &str = "SKEIN_LEASE_TIMEOUT_MS";

/// Applies overrides from the process environment
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Applies overrides using `lookup` to resolve variable names
///
/// Returns the names of the variables that took effect.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();

    if let Some(session) = lookup(ENV_SESSION).filter(|s| !s.trim().is_empty()) {
        config.store.session = session.trim().to_string();
        applied.push(ENV_SESSION);
    }

    if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|s| !s.trim().is_empty()) {
        config.store.database_path = path.trim().to_string();
        applied.push(ENV_DATABASE_PATH);
    }

    if override_number(&lookup, ENV_CONCURRENCY, &mut config.crawler.concurrency) {
        applied.push(ENV_CONCURRENCY);
    }
    if override_number(&lookup, ENV_MAX_DEPTH, &mut config.crawler.max_depth) {
        applied.push(ENV_MAX_DEPTH);
    }
    if override_number(
        &lookup,
        ENV_PER_HOST_INTERVAL_MS,
        &mut config.crawler.per_host_interval_ms,
    ) {
        applied.push(ENV_PER_HOST_INTERVAL_MS);
    }
    if override_number(
        &lookup,
        ENV_FETCH_TIMEOUT_MS,
        &mut config.crawler.fetch_timeout_ms,
    ) {
        applied.push(ENV_FETCH_TIMEOUT_MS);
    }
    if override_number(
        &lookup,
        ENV_LEASE_TIMEOUT_MS,
        &mut config.crawler.lease_timeout_ms,
    ) {
        applied.push(ENV_LEASE_TIMEOUT_MS);
    }

    for name in &applied {
        tracing::debug!("Configuration override from {}", name);
    }

    applied
}

fn override_number<F, T>(lookup: &F, key: &str, target: &mut T) -> bool
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = match lookup(key) {
        Some(raw) => raw,
        None => return false,
    };

    match raw.trim().parse::<T>() {
        Ok(value) => {
            *target = value;
            true
        }
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            false
        }
    }
}
