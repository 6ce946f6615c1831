//! Process-wide state of a running crawl session

use crate::storage::StoreResult;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Consecutive store failures after which the session counts as degraded
const DEGRADED_AFTER: u32 = 5;

/// Shared view of coordination store health
///
/// Workers report every store call; the coordinator escalates once a run
/// of failures crosses the degraded threshold.
#[derive(Debug, Default)]
pub struct StoreHealth {
    consecutive_failures: AtomicU32,
    escalated: AtomicBool,
}

impl StoreHealth {
    /// Records a failed store call and returns the current failure streak
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a successful store call
    ///
    /// # Returns
    ///
    /// true if this ends a degraded period
    pub fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.escalated.swap(false, Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Returns true while the store has failed persistently
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures() >= DEGRADED_AFTER
    }

    /// Returns true exactly once per degraded period
    pub fn take_escalation(&self) -> bool {
        self.is_degraded() && !self.escalated.swap(true, Ordering::SeqCst)
    }

    /// Runs a store call, retrying with back-off until it succeeds
    ///
    /// Every attempt is recorded here. Gives up only when `cancel` fires
    /// between attempts.
    pub async fn retry<T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: impl FnMut() -> StoreResult<T>,
    ) -> Result<T, Abandoned> {
        loop {
            match call() {
                Ok(value) => {
                    if self.record_success() {
                        tracing::info!("Coordination store reachable again");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let failures = self.record_failure();
                    let delay = store_retry_delay(failures);
                    if e.is_unavailable() {
                        tracing::warn!(
                            "Store {} failed ({} in a row), retrying in {:?}: {}",
                            operation,
                            failures,
                            delay,
                            e
                        );
                    } else {
                        tracing::error!(
                            "Store {} failed ({} in a row), retrying in {:?}: {}",
                            operation,
                            failures,
                            delay,
                            e
                        );
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Abandoned),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// A store call given up because its cancellation token fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

/// Delay before retrying a failed store call
///
/// Doubles from 100 ms with each consecutive failure, up to 5 s.
pub fn store_retry_delay(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(6);
    Duration::from_millis(100 * (1u64 << exponent)).min(Duration::from_secs(5))
}

/// A crawl session as seen by the workers of one process
///
/// Two cancellation tokens govern shutdown: `cancel` is the external
/// request (Ctrl-C, caller), and `stop` (a child of `cancel`) tells workers
/// to stop popping, either because of cancellation or because the
/// coordinator detected termination.
#[derive(Debug)]
pub struct CrawlSession {
    pub id: i64,
    pub name: String,
    pub seeds: Vec<Url>,
    pub max_depth: u32,
    pub concurrency: usize,

    /// Leases currently being worked on in this process
    in_flight: AtomicUsize,

    cancel: CancellationToken,
    stop: CancellationToken,

    pub store_health: StoreHealth,
}

impl CrawlSession {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        seeds: Vec<Url>,
        max_depth: u32,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        let stop = cancel.child_token();
        Self {
            id,
            name: name.into(),
            seeds,
            max_depth,
            concurrency,
            in_flight: AtomicUsize::new(0),
            cancel,
            stop,
            store_health: StoreHealth::default(),
        }
    }

    /// Counts a newly leased item until the returned guard drops
    pub fn begin_lease(&self) -> InFlightLease<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightLease { session: self }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Requests cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tells workers to stop taking new work
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}

/// Guard held by a worker while it works on a lease
#[derive(Debug)]
pub struct InFlightLease<'a> {
    session: &'a CrawlSession,
}

impl Drop for InFlightLease<'_> {
    fn drop(&mut self) {
        self.session.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;

    fn create_test_session() -> CrawlSession {
        CrawlSession::new(1, "test", Vec::new(), 3, 4, CancellationToken::new())
    }

    #[test]
    fn test_lease_guard_tracks_in_flight() {
        let session = create_test_session();
        {
            let _a = session.begin_lease();
            let _b = session.begin_lease();
            assert_eq!(session.in_flight(), 2);
        }
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn test_cancel_stops_workers() {
        let session = create_test_session();
        session.cancel();
        assert!(session.is_cancelled());
        assert!(session.stop_token().is_cancelled());
    }

    #[test]
    fn test_stop_does_not_cancel() {
        let session = create_test_session();
        session.stop();
        assert!(session.stop_token().is_cancelled());
        assert!(!session.is_cancelled());
    }

    #[test]
    fn test_store_health_escalates_once() {
        let health = StoreHealth::default();
        for _ in 0..DEGRADED_AFTER - 1 {
            health.record_failure();
        }
        assert!(!health.is_degraded());
        assert!(!health.take_escalation());

        health.record_failure();
        assert!(health.is_degraded());
        assert!(health.take_escalation());
        assert!(!health.take_escalation());

        assert!(health.record_success());
        assert!(!health.is_degraded());
        assert!(!health.record_success());
    }

    #[tokio::test]
    async fn test_retry_until_store_answers() {
        let health = StoreHealth::default();
        let mut attempts = 0;

        let result = health
            .retry("pop", &CancellationToken::new(), || {
                attempts += 1;
                if attempts < 3 {
                    Err(StoreError::Unavailable("database is locked".to_string()))
                } else {
                    Ok(attempts)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_retry_abandoned_on_cancel() {
        let health = StoreHealth::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let result: Result<(), Abandoned> = health
            .retry("complete", &cancel, || {
                Err(StoreError::Unavailable("disk I/O error".to_string()))
            })
            .await;

        assert_eq!(result, Err(Abandoned));
        assert!(health.consecutive_failures() >= 1);
    }

    #[test]
    fn test_store_retry_delay() {
        assert_eq!(store_retry_delay(1), Duration::from_millis(100));
        assert_eq!(store_retry_delay(2), Duration::from_millis(200));
        assert_eq!(store_retry_delay(4), Duration::from_millis(800));
        assert_eq!(store_retry_delay(100), Duration::from_secs(5));
    }
}
