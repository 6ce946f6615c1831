use crate::config::types::{Config, CrawlerConfig, ScopeConfig, StoreConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_store_config(&config.store)?;
    validate_scope_config(&config.scope)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 1024 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 1024, got {}",
            config.concurrency
        )));
    }

    if config.per_host_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "per-host-interval-ms must be >= 1ms".to_string(),
        ));
    }

    if config.retry_backoff_base_ms < 1 {
        return Err(ConfigError::Validation(
            "retry-backoff-base-ms must be >= 1ms".to_string(),
        ));
    }

    if config.retry_backoff_base_ms > config.retry_backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "retry-backoff-base-ms ({}) must not exceed retry-backoff-cap-ms ({})",
            config.retry_backoff_base_ms, config.retry_backoff_cap_ms
        )));
    }

    if config.fetch_timeout_ms < 1 || config.connect_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "fetch-timeout-ms and connect-timeout-ms must be >= 1ms".to_string(),
        ));
    }

    // Half the lease is reserved for the fetch; the rest bounds the politeness wait
    if config.lease_timeout_ms < config.fetch_timeout_ms.saturating_mul(2) {
        return Err(ConfigError::Validation(format!(
            "lease-timeout-ms ({}) must be at least twice fetch-timeout-ms ({})",
            config.lease_timeout_ms, config.fetch_timeout_ms
        )));
    }

    if config.idle_poll_ms < 1 {
        return Err(ConfigError::Validation(
            "idle-poll-ms must be >= 1ms".to_string(),
        ));
    }

    if config.max_body_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-body-bytes must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.session.trim().is_empty() {
        return Err(ConfigError::Validation(
            "session name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates scope host patterns
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in config.allow.iter().chain(config.deny.iter()) {
        validate_host_pattern(pattern)?;
    }
    Ok(())
}

/// Validates seed URLs
///
/// Seeds may still fail normalization at session start; validation only
/// checks that each one is an absolute http(s) URL.
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates a host pattern (supports a leading "*." wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' is empty",
            pattern
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' contains invalid characters",
            pattern
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' has an empty label",
            pattern
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid contact-email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid contact-email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid contact-email domain: '{}'",
            email
        )));
    }

    Ok(())
}
