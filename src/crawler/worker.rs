//! Crawl worker: the per-item state machine
//!
//! Each worker runs an independent sequential loop:
//!
//! ```text
//! pop -> gate -> fetch -> extract -> normalize -> scope -> claim+push -> sink -> complete
//! ```
//!
//! URL-level failures end in a frontier transition (requeue or drop) and
//! never leave the loop. Store failures are retried with their own back-off,
//! separate from URL retries, and reported to the session's store health.
//! A worker that dies mid-item needs no cleanup: its lease simply expires.

use crate::config::CrawlerConfig;
use crate::crawler::extractor::{is_html, LinkExtractor};
use crate::crawler::fetcher::{FetchOutcome, Fetcher};
use crate::crawler::limiter::{Admission, PolitenessLimiter};
use crate::crawler::session::{Abandoned, CrawlSession};
use crate::frontier::{DedupFilter, Frontier};
use crate::sink::{ContentSink, FetchedDocument};
use crate::state::{DropReason, WorkerPhase};
use crate::storage::{FrontierItem, StoreResult, UrlRecord};
use crate::url::{normalize, LinkScope};
use chrono::Utc;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// What to do after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue, visible again after the delay
    Requeue(Duration),
    /// The retry budget is spent
    GiveUp,
}

/// Retry budget and exponential back-off for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.retry_backoff_base(),
            cap: config.retry_backoff_cap(),
        }
    }

    /// Back-off before attempt `retry_count + 1`: `base * 2^retry_count`, capped
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Decides the fate of an item that failed with `retry_count` retries used
    ///
    /// An item is fetched at most `max_retries + 1` times.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::Requeue(self.backoff(retry_count))
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Counters kept by one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub leased: u64,
    pub fetched: u64,
    pub completed: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub released: u64,
    pub redirects_followed: u64,
    pub links_enqueued: u64,
    pub lost_leases: u64,
    pub sink_failures: u64,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.leased += other.leased;
        self.fetched += other.fetched;
        self.completed += other.completed;
        self.requeued += other.requeued;
        self.dropped += other.dropped;
        self.released += other.released;
        self.redirects_followed += other.redirects_followed;
        self.links_enqueued += other.links_enqueued;
        self.lost_leases += other.lost_leases;
        self.sink_failures += other.sink_failures;
    }
}

/// Everything a worker shares with the rest of the session
pub struct WorkerContext {
    pub session: Arc<CrawlSession>,
    pub frontier: Frontier,
    pub dedup: DedupFilter,
    pub limiter: Arc<PolitenessLimiter>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn LinkExtractor>,
    pub sink: Arc<dyn ContentSink>,
    pub scope: LinkScope,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub lease_timeout: Duration,
    pub idle_poll: Duration,
    pub max_redirect_hops: u32,
}

impl WorkerContext {
    /// Longest a worker may hold a lease before its fetch starts
    ///
    /// The rest of the lease covers a full fetch timeout plus a tenth of the
    /// lease for extraction and settling, so a fetch that starts within the
    /// budget finishes while the lease is still held.
    fn gate_budget(&self) -> Duration {
        self.lease_timeout
            .saturating_sub(self.fetch_timeout)
            .saturating_sub(self.lease_timeout / 10)
    }
}

/// One unit of crawl concurrency
pub struct CrawlWorker {
    id: usize,
    ctx: Arc<WorkerContext>,
    stats: WorkerStats,
}

impl CrawlWorker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self {
            id,
            ctx,
            stats: WorkerStats::default(),
        }
    }

    /// Runs until the session stops
    pub async fn run(mut self) -> WorkerStats {
        tracing::debug!("Worker {} started", self.id);
        let ctx = Arc::clone(&self.ctx);
        let stop = ctx.session.stop_token().clone();

        loop {
            if stop.is_cancelled() {
                break;
            }

            let popped = match self
                .with_store("pop", &stop, || ctx.frontier.pop(ctx.lease_timeout))
                .await
            {
                Ok(popped) => popped,
                Err(Abandoned) => break,
            };

            let item = match popped {
                Some(item) => item,
                None => {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(ctx.idle_poll) => continue,
                    }
                }
            };

            let leased_at = Instant::now();
            let _lease = ctx.session.begin_lease();
            self.stats.leased += 1;
            self.process(item, leased_at).await;
        }

        tracing::debug!("Worker {} stopped: {:?}", self.id, self.stats);
        self.stats
    }

    /// Moves an item through the worker phases until it leaves the worker
    async fn process(&mut self, item: FrontierItem, leased_at: Instant) {
        let ctx = Arc::clone(&self.ctx);
        let mut phase = WorkerPhase::Leased;
        tracing::debug!(
            "Worker {} leased {} (depth {}, retry {})",
            self.id,
            item.url,
            item.depth,
            item.retry_count
        );

        if !self.pass_gate(&item, leased_at, &mut phase).await {
            return;
        }

        self.advance(&item, &mut phase, WorkerPhase::Fetching);
        let outcome = match tokio::time::timeout(
            ctx.fetch_timeout,
            ctx.fetcher.fetch(&item.url, ctx.fetch_timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::TransientFailure {
                reason: format!("timed out after {:?}", ctx.fetch_timeout),
            },
        };
        self.stats.fetched += 1;

        match outcome {
            FetchOutcome::Success {
                status_code,
                body,
                final_url,
                content_type,
            } => {
                ctx.limiter.record_success(&item.url).await;
                self.advance(&item, &mut phase, WorkerPhase::Extracting);

                let document = FetchedDocument {
                    session_id: ctx.session.id,
                    url: item.url.clone(),
                    final_url,
                    status_code,
                    content_type,
                    body,
                    fetched_at: Utc::now(),
                    depth: item.depth,
                    links_found: 0,
                    links_enqueued: 0,
                };

                let document = match self.enqueue_links(&item, document).await {
                    Some(document) => document,
                    None => return,
                };

                if let Err(e) = ctx.sink.accept(&document).await {
                    self.stats.sink_failures += 1;
                    tracing::warn!("Content sink failed for {}: {}", item.url, e);
                }

                self.advance(&item, &mut phase, WorkerPhase::Completing);
                self.complete(&item).await;
            }

            FetchOutcome::Redirect {
                status_code,
                target,
            } => {
                ctx.limiter.record_success(&item.url).await;
                self.follow_redirect(&item, &mut phase, status_code, &target)
                    .await;
            }

            FetchOutcome::TransientFailure { reason } => {
                ctx.limiter.record_failure(&item.url).await;

                match ctx.retry.decide(item.retry_count) {
                    RetryDecision::Requeue(backoff) => {
                        self.advance(&item, &mut phase, WorkerPhase::RetryScheduled);
                        tracing::debug!(
                            "Retrying {} in {:?} after {} (attempt {} of {})",
                            item.url,
                            backoff,
                            reason,
                            item.retry_count + 1,
                            ctx.retry.max_retries + 1
                        );
                        let cancel = ctx.session.cancel_token().clone();
                        match self
                            .with_store("requeue", &cancel, || {
                                ctx.frontier.requeue(&item, backoff, &reason)
                            })
                            .await
                        {
                            Ok(true) => self.stats.requeued += 1,
                            Ok(false) => self.lost_lease(&item, "requeue"),
                            Err(Abandoned) => {}
                        }
                    }
                    RetryDecision::GiveUp => {
                        self.advance(&item, &mut phase, WorkerPhase::Dropped);
                        tracing::warn!(
                            "Giving up on {} after {} attempts: {}",
                            item.url,
                            item.retry_count + 1,
                            reason
                        );
                        self.drop_item(&item, DropReason::RetriesExhausted(reason))
                            .await;
                    }
                }
            }

            FetchOutcome::PermanentFailure { reason } => {
                self.advance(&item, &mut phase, WorkerPhase::Dropped);
                tracing::warn!("Fetch of {} failed: {}", item.url, reason);
                self.drop_item(&item, DropReason::PermanentFailure(reason))
                    .await;
            }
        }
    }

    /// Waits for the politeness limiter
    ///
    /// Time spent here counts against the gate budget from `leased_at`,
    /// including time blocked inside the limiter on a robots.txt fetch.
    ///
    /// # Returns
    ///
    /// true if the item may be fetched; otherwise the item has already left
    /// the worker (dropped or released)
    async fn pass_gate(
        &mut self,
        item: &FrontierItem,
        leased_at: Instant,
        phase: &mut WorkerPhase,
    ) -> bool {
        let ctx = Arc::clone(&self.ctx);
        let stop = ctx.session.stop_token().clone();
        let budget = ctx.gate_budget();

        loop {
            match ctx.limiter.acquire(&item.url).await {
                Admission::Granted => {
                    if leased_at.elapsed() <= budget {
                        return true;
                    }
                    tracing::debug!(
                        "Admission for {} took {:?}, past the gate budget; handing the lease back",
                        item.url,
                        leased_at.elapsed()
                    );
                    self.advance(item, phase, WorkerPhase::Released);
                    self.release(item, Duration::ZERO).await;
                    return false;
                }
                Admission::Disallowed => {
                    self.advance(item, phase, WorkerPhase::Dropped);
                    self.drop_item(item, DropReason::RobotsDisallowed).await;
                    return false;
                }
                Admission::Wait { until } => {
                    if until.saturating_duration_since(leased_at) > budget {
                        let delay = until.saturating_duration_since(Instant::now());
                        tracing::debug!(
                            "Host of {} busy for {:?}; handing the lease back",
                            item.url,
                            delay
                        );
                        self.advance(item, phase, WorkerPhase::Released);
                        self.release(item, delay).await;
                        return false;
                    }

                    tokio::select! {
                        _ = stop.cancelled() => {
                            self.advance(item, phase, WorkerPhase::Released);
                            self.release(item, Duration::ZERO).await;
                            return false;
                        }
                        _ = tokio::time::sleep_until(until.into()) => {}
                    }
                }
            }
        }
    }

    /// Extracts, normalizes, scopes and enqueues the links of a document
    ///
    /// Returns `None` if the session was cancelled while the store was down;
    /// the lease is then left to expire.
    async fn enqueue_links(
        &mut self,
        item: &FrontierItem,
        mut document: FetchedDocument,
    ) -> Option<FetchedDocument> {
        let ctx = Arc::clone(&self.ctx);

        if !is_html(&document.content_type) {
            return Some(document);
        }

        let raw_links = ctx
            .extractor
            .extract_links(&document.text(), &document.final_url);
        document.links_found = raw_links.len();

        let next_depth = item.depth + 1;
        if next_depth > ctx.session.max_depth {
            tracing::debug!(
                "Not following {} links from {}: depth limit {} reached",
                raw_links.len(),
                item.url,
                ctx.session.max_depth
            );
            return Some(document);
        }

        let cancel = ctx.session.cancel_token().clone();
        for raw in raw_links {
            let url = match normalize(&raw, Some(&document.final_url)) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping link {:?} on {}: {}", raw, item.url, e);
                    continue;
                }
            };

            let decision = ctx.scope.check(&url);
            if !decision.should_follow() {
                tracing::debug!("Skipping {}: {:?}", url, decision);
                continue;
            }

            let record = UrlRecord::discovered(raw, url, next_depth, &item.url);
            match self
                .with_store("claim", &cancel, || ctx.dedup.try_claim_and_push(&record))
                .await
            {
                Ok(true) => {
                    tracing::debug!("Enqueued {} at depth {}", record.url, next_depth);
                    document.links_enqueued += 1;
                }
                Ok(false) => {}
                Err(Abandoned) => return None,
            }
        }

        self.stats.links_enqueued += document.links_enqueued as u64;
        Some(document)
    }

    /// Treats a redirect target as a link discovered at the item's depth
    async fn follow_redirect(
        &mut self,
        item: &FrontierItem,
        phase: &mut WorkerPhase,
        status_code: u16,
        target: &str,
    ) {
        let ctx = Arc::clone(&self.ctx);

        let url = match normalize(target, Some(&item.url)) {
            Ok(url) => url,
            Err(e) => {
                self.advance(item, phase, WorkerPhase::Dropped);
                tracing::warn!("Redirect from {} to {:?} is unusable: {}", item.url, target, e);
                self.drop_item(
                    item,
                    DropReason::MalformedRedirect(format!("{} -> {}", target, e)),
                )
                .await;
                return;
            }
        };

        let hops = item.redirect_hops + 1;
        if hops > ctx.max_redirect_hops {
            tracing::debug!(
                "Not following redirect {} -> {}: {} hops exceed the limit of {}",
                item.url,
                url,
                hops,
                ctx.max_redirect_hops
            );
        } else if self.redirect_in_scope(&url) {
            let record = UrlRecord::redirect_target(target, url, item);
            let cancel = ctx.session.cancel_token().clone();
            match self
                .with_store("claim", &cancel, || ctx.dedup.try_claim_and_push(&record))
                .await
            {
                Ok(true) => {
                    tracing::debug!("HTTP {} {} -> {}", status_code, item.url, record.url);
                    self.stats.redirects_followed += 1;
                }
                Ok(false) => {
                    tracing::debug!("Redirect target {} already claimed", record.url);
                }
                Err(Abandoned) => return,
            }
        }

        self.advance(item, phase, WorkerPhase::Completing);
        self.complete(item).await;
    }

    fn redirect_in_scope(&self, url: &Url) -> bool {
        let decision = self.ctx.scope.check(url);
        if !decision.should_follow() {
            tracing::debug!("Not following redirect to {}: {:?}", url, decision);
        }
        decision.should_follow()
    }

    async fn complete(&mut self, item: &FrontierItem) {
        let ctx = Arc::clone(&self.ctx);
        let cancel = ctx.session.cancel_token().clone();
        match self
            .with_store("complete", &cancel, || ctx.frontier.complete(item))
            .await
        {
            Ok(true) => self.stats.completed += 1,
            Ok(false) => self.lost_lease(item, "complete"),
            Err(Abandoned) => {}
        }
    }

    async fn drop_item(&mut self, item: &FrontierItem, reason: DropReason) {
        let ctx = Arc::clone(&self.ctx);
        let cancel = ctx.session.cancel_token().clone();
        tracing::debug!("Dropping {}: {}", item.url, reason);
        match self
            .with_store("drop", &cancel, || ctx.frontier.drop_item(item, &reason))
            .await
        {
            Ok(true) => self.stats.dropped += 1,
            Ok(false) => self.lost_lease(item, "drop"),
            Err(Abandoned) => {}
        }
    }

    async fn release(&mut self, item: &FrontierItem, delay: Duration) {
        let ctx = Arc::clone(&self.ctx);
        let cancel = ctx.session.cancel_token().clone();
        match self
            .with_store("release", &cancel, || ctx.frontier.release(item, delay))
            .await
        {
            Ok(true) => self.stats.released += 1,
            Ok(false) => self.lost_lease(item, "release"),
            Err(Abandoned) => {}
        }
    }

    fn lost_lease(&mut self, item: &FrontierItem, operation: &str) {
        self.stats.lost_leases += 1;
        tracing::warn!(
            "Lease on {} expired before {}; another worker owns it now",
            item.url,
            operation
        );
    }

    fn advance(&self, item: &FrontierItem, phase: &mut WorkerPhase, next: WorkerPhase) {
        debug_assert!(
            phase.can_transition_to(next),
            "illegal worker transition {:?} -> {:?}",
            phase,
            next
        );
        tracing::trace!("{}: {:?} -> {:?}", item.url, phase, next);
        *phase = next;
    }

    /// Runs a store call through the session's store health
    async fn with_store<T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: impl FnMut() -> StoreResult<T>,
    ) -> Result<T, Abandoned> {
        self.ctx
            .session
            .store_health
            .retry(operation, cancel, call)
            .await
    }
}
