use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Skein
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    /// Absolute URLs the session starts from, in order
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs (seeds are depth 0)
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of concurrently running workers in this process
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "per-host-interval-ms", default = "default_per_host_interval_ms")]
    pub per_host_interval_ms: u64,

    /// Retries allowed after the first transient failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "retry-backoff-base-ms", default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    #[serde(rename = "retry-backoff-cap-ms", default = "default_retry_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,

    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long a popped frontier item stays invisible to other workers
    #[serde(rename = "lease-timeout-ms", default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,

    /// How long the frontier must stay drained before the session ends
    #[serde(rename = "quiescence-ms", default = "default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// Sleep between pops when the frontier has nothing visible
    #[serde(rename = "idle-poll-ms", default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    #[serde(rename = "max-redirect-hops", default = "default_max_redirect_hops")]
    pub max_redirect_hops: u32,

    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(rename = "robots-ttl-secs", default = "default_robots_ttl_secs")]
    pub robots_ttl_secs: u64,

    /// Path extensions (without the dot) that are never followed
    #[serde(rename = "skip-extensions", default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also its robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Coordination store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the shared SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Name of the crawl session; processes with the same name cooperate
    #[serde(default = "default_session")]
    pub session: String,
}

/// Which hosts discovered links may lead to
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    #[serde(rename = "stay-on-seed-hosts", default)]
    pub stay_on_seed_hosts: bool,

    /// Host patterns ("example.com" or "*.example.com"); empty allows all
    #[serde(default)]
    pub allow: Vec<String>,

    /// Host patterns that are never followed
    #[serde(default)]
    pub deny: Vec<String>,
}

impl CrawlerConfig {
    pub fn per_host_interval(&self) -> Duration {
        Duration::from_millis(self.per_host_interval_ms)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn retry_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_cap_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Product token matched against robots.txt user-agent groups
    pub fn robots_token(&self) -> &str {
        &self.crawler_name
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            per_host_interval_ms: default_per_host_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            retry_backoff_cap_ms: default_retry_backoff_cap_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            lease_timeout_ms: default_lease_timeout_ms(),
            quiescence_ms: default_quiescence_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            max_redirect_hops: default_max_redirect_hops(),
            max_body_bytes: default_max_body_bytes(),
            robots_ttl_secs: default_robots_ttl_secs(),
            skip_extensions: default_skip_extensions(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session: default_session(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

fn default_concurrency() -> u32 {
    16
}

fn default_per_host_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    500
}

fn default_retry_backoff_cap_ms() -> u64 {
    30_000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_lease_timeout_ms() -> u64 {
    60_000
}

fn default_quiescence_ms() -> u64 {
    2_000
}

fn default_idle_poll_ms() -> u64 {
    250
}

fn default_max_redirect_hops() -> u32 {
    5
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_robots_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_database_path() -> String {
    "./skein.db".to_string()
}

fn default_session() -> String {
    "default".to_string()
}

fn default_skip_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "rar", "tar", "gz", "mp3", "mp4", "avi", "mov", "mkv",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}
