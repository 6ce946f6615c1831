//! Crawl coordinator - session lifecycle and the worker pool
//!
//! This module handles:
//! - Opening, resuming or resetting the named session in the shared store
//! - Seeding the frontier from the configured seed list
//! - Running a bounded pool of crawl workers
//! - Detecting termination (drained frontier, no leases, quiescence)
//! - Cooperative cancellation and the final session status

use crate::config::Config;
use crate::crawler::extractor::{HtmlLinkExtractor, LinkExtractor};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::limiter::PolitenessLimiter;
use crate::crawler::session::{Abandoned, CrawlSession};
use crate::crawler::worker::{CrawlWorker, RetryPolicy, WorkerContext, WorkerStats};
use crate::frontier::{DedupFilter, Frontier};
use crate::robots::RobotsSource;
use crate::sink::{ContentSink, FanoutSink, LogSink, StoreSink};
use crate::storage::{CoordinationStore, SessionStatus, SqliteStore, UrlRecord};
use crate::url::{normalize, LinkScope};
use crate::SkeinError;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Summary of one coordinator run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub session_id: i64,
    pub session_name: String,
    pub status: SessionStatus,

    /// True if the session already existed in the store
    pub resumed: bool,

    /// Seeds newly claimed by this run
    pub seeds_enqueued: usize,

    /// Worker counters summed over the pool
    pub stats: WorkerStats,

    /// Hosts referenced by this process
    pub hosts_seen: usize,

    pub elapsed: Duration,
}

/// Main crawl coordinator
///
/// Every collaborator is a trait object so that tests can swap in fakes for
/// the network and the store.
pub struct Coordinator {
    config: Arc<Config>,
    store: Arc<dyn CoordinationStore>,
    fetcher: Arc<dyn Fetcher>,
    robots: Arc<dyn RobotsSource>,
    extractor: Arc<dyn LinkExtractor>,
    sink: Arc<dyn ContentSink>,
    config_hash: String,
    fresh: bool,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator from explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `store` - Shared coordination store
    /// * `fetcher` - Page fetcher
    /// * `robots` - robots.txt source used by the politeness limiter
    /// * `extractor` - Link extractor
    /// * `sink` - Downstream consumer of fetched documents
    pub fn new(
        config: Config,
        store: Arc<dyn CoordinationStore>,
        fetcher: Arc<dyn Fetcher>,
        robots: Arc<dyn RobotsSource>,
        extractor: Arc<dyn LinkExtractor>,
        sink: Arc<dyn ContentSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            fetcher,
            robots,
            extractor,
            sink,
            config_hash: String::new(),
            fresh: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a coordinator wired to the SQLite store and the network
    ///
    /// Fetched documents go to both the log and the store's document table.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    /// * `config_hash` - Hash of the configuration file, recorded on the session
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Store opened and HTTP client built
    /// * `Err(SkeinError)` - The store could not be opened or the client built
    pub fn from_config(config: Config, config_hash: impl Into<String>) -> Result<Self, SkeinError> {
        let store = Arc::new(SqliteStore::open(Path::new(&config.store.database_path))?);
        let http = Arc::new(HttpFetcher::from_config(&config)?);

        let sink = FanoutSink::new(vec![
            Arc::new(LogSink),
            Arc::new(StoreSink::new(Arc::clone(&store))),
        ]);

        Ok(Self::new(
            config,
            store,
            Arc::clone(&http) as Arc<dyn Fetcher>,
            http,
            Arc::new(HtmlLinkExtractor),
            Arc::new(sink),
        )
        .with_config_hash(config_hash))
    }

    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Resets the session before crawling
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Cancels the run when `cancel` is triggered
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels the run when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the session until the frontier drains or the run is cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The session ended, completed or interrupted
    /// * `Err(SkeinError)` - The session could not be opened or seeded
    pub async fn run(self) -> Result<CrawlReport, SkeinError> {
        let started = Instant::now();
        let name = self.config.store.session.clone();

        if self.fresh {
            tracing::info!("Resetting session '{}'", name);
            self.store.reset_session(&name)?;
        }

        let record = self.store.open_session(&name, &self.config_hash)?;
        let resumed = record.is_resumed();
        if resumed {
            tracing::info!("Resuming session '{}' (id {})", name, record.id);
            if record.config_changed() {
                tracing::warn!(
                    "Configuration changed since session '{}' was last run",
                    name
                );
            }
        } else {
            tracing::info!("Starting session '{}' (id {})", name, record.id);
        }

        let seeds = self.seed_urls();
        if seeds.is_empty() {
            self.store
                .finish_session(record.id, SessionStatus::Interrupted)?;
            return Err(SkeinError::NoSeeds);
        }

        let crawler = &self.config.crawler;
        let session = Arc::new(CrawlSession::new(
            record.id,
            name.as_str(),
            seeds.iter().map(|(_, url)| url.clone()).collect(),
            crawler.max_depth,
            crawler.concurrency as usize,
            self.cancel.clone(),
        ));

        let seeds_enqueued = self.enqueue_seeds(&session, &seeds).await;
        tracing::info!(
            "Seeded {} of {} URLs ({} already claimed)",
            seeds_enqueued,
            seeds.len(),
            seeds.len() - seeds_enqueued
        );

        let frontier = Frontier::new(Arc::clone(&self.store), record.id);
        let limiter = Arc::new(PolitenessLimiter::from_config(
            &self.config,
            Arc::clone(&self.robots),
        ));

        let ctx = Arc::new(WorkerContext {
            session: Arc::clone(&session),
            frontier: frontier.clone(),
            dedup: DedupFilter::new(Arc::clone(&self.store), record.id),
            limiter: Arc::clone(&limiter),
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            scope: LinkScope::new(
                &self.config.scope,
                &crawler.skip_extensions,
                &session.seeds,
            ),
            retry: RetryPolicy::from_config(crawler),
            fetch_timeout: crawler.fetch_timeout(),
            lease_timeout: crawler.lease_timeout(),
            idle_poll: crawler.idle_poll(),
            max_redirect_hops: crawler.max_redirect_hops,
        });

        let mut workers = JoinSet::new();
        for id in 0..session.concurrency {
            workers.spawn(CrawlWorker::new(id, Arc::clone(&ctx)).run());
        }
        tracing::debug!("Spawned {} workers", session.concurrency);

        let status = self.monitor(&session, &frontier).await;
        session.stop();

        let mut stats = WorkerStats::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_stats) => stats += worker_stats,
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        if let Err(e) = self.store.finish_session(record.id, status) {
            tracing::warn!("Failed to record final status of session '{}': {}", name, e);
        }

        let report = CrawlReport {
            session_id: record.id,
            session_name: name,
            status,
            resumed,
            seeds_enqueued,
            stats,
            hosts_seen: limiter.host_count(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Session '{}' {} after {:.1}s: {} completed, {} dropped, {} requeued, {} links enqueued",
            report.session_name,
            report.status.to_db_string(),
            report.elapsed.as_secs_f64(),
            report.stats.completed,
            report.stats.dropped,
            report.stats.requeued,
            report.stats.links_enqueued
        );

        Ok(report)
    }

    /// Claims and enqueues the seeds, riding out store outages
    ///
    /// Stops early if the run is cancelled while the store is down.
    async fn enqueue_seeds(&self, session: &CrawlSession, seeds: &[(String, Url)]) -> usize {
        let mut enqueued = 0;
        for (raw, url) in seeds {
            let record = UrlRecord::seed(raw.as_str(), url.clone());
            match session
                .store_health
                .retry("seed", session.cancel_token(), || {
                    self.store.claim_and_push(session.id, &record)
                })
                .await
            {
                Ok(true) => enqueued += 1,
                Ok(false) => {}
                Err(Abandoned) => {
                    tracing::warn!("Seeding of session '{}' cancelled", session.name);
                    break;
                }
            }
        }
        enqueued
    }

    /// Normalizes the configured seeds, skipping malformed ones
    fn seed_urls(&self) -> Vec<(String, Url)> {
        let mut seeds = Vec::new();
        for raw in &self.config.seeds {
            match normalize(raw, None) {
                Ok(url) => {
                    if !seeds.iter().any(|(_, seen): &(String, Url)| seen == &url) {
                        seeds.push((raw.clone(), url));
                    }
                }
                Err(e) => tracing::warn!("Skipping malformed seed {:?}: {}", raw, e),
            }
        }
        seeds
    }

    /// Polls for termination or cancellation
    ///
    /// The session is complete once the shared frontier has no pending or
    /// leased items, this process holds no leases, and both stay true for the
    /// whole quiescence window.
    async fn monitor(&self, session: &CrawlSession, frontier: &Frontier) -> SessionStatus {
        let quiescence = self.config.crawler.quiescence();
        let poll = self.config.crawler.idle_poll();
        let mut drained_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = session.cancel_token().cancelled() => {
                    tracing::info!(
                        "Cancellation requested; letting {} in-flight items finish",
                        session.in_flight()
                    );
                    return SessionStatus::Interrupted;
                }
                _ = tokio::time::sleep(poll) => {}
            }

            if session.store_health.take_escalation() {
                tracing::error!(
                    "Coordination store has failed {} consecutive calls; workers are stalled until it recovers",
                    session.store_health.consecutive_failures()
                );
            }

            let outstanding = match frontier.outstanding() {
                Ok(outstanding) => outstanding,
                Err(e) => {
                    session.store_health.record_failure();
                    tracing::trace!("Termination check failed: {}", e);
                    drained_since = None;
                    continue;
                }
            };

            let in_flight = session.in_flight();
            tracing::trace!(
                "Frontier has {} outstanding items, {} in flight here",
                outstanding,
                in_flight
            );

            if outstanding == 0 && in_flight == 0 {
                let since = *drained_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= quiescence {
                    tracing::debug!("Frontier drained for {:?}", since.elapsed());
                    return SessionStatus::Completed;
                }
            } else {
                drained_since = None;
            }
        }
    }
}
