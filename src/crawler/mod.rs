//! Crawler module for fetching pages and coordinating workers
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with status classification
//! - HTML link extraction
//! - Per-host politeness (rate limits, robots.txt)
//! - The per-item worker state machine
//! - Session coordination and termination detection

mod coordinator;
mod extractor;
mod fetcher;
mod limiter;
mod session;
mod worker;

pub use coordinator::{Coordinator, CrawlReport};
pub use extractor::{is_html, page_title, HtmlLinkExtractor, LinkExtractor};
pub use fetcher::{build_http_client, classify_status, FetchOutcome, Fetcher, HttpFetcher, StatusClass};
pub use limiter::{Admission, PolitenessLimiter};
pub use session::{store_retry_delay, Abandoned, CrawlSession, InFlightLease, StoreHealth};
pub use worker::{CrawlWorker, RetryDecision, RetryPolicy, WorkerContext, WorkerStats};

use crate::config::Config;
use crate::SkeinError;

/// Runs a complete crawl session
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the shared store and the named session
/// 2. Seed the frontier
/// 3. Run the worker pool until the frontier drains or `cancel` fires
/// 4. Record the final session status
///
/// # Arguments
///
/// * `config` - The validated crawl configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Reset the session before crawling
/// * `cancel` - Cancels the session cooperatively when triggered
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The session ended
/// * `Err(SkeinError)` - The session could not be started
pub async fn crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<CrawlReport, SkeinError> {
    Coordinator::from_config(config, config_hash)?
        .fresh(fresh)
        .with_cancellation(cancel)
        .run()
        .await
}
