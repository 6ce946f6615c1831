//! Frontier: the shared, durable work queue of a crawl session
//!
//! Both the frontier and the [`DedupFilter`] are thin, session-scoped views
//! over a [`CoordinationStore`]. They hold no state of their own, so any
//! number of workers in any number of processes can use them at once.

mod dedup;

pub use dedup::DedupFilter;

use crate::state::DropReason;
use crate::storage::{CoordinationStore, FrontierItem, StoreResult, UrlRecord};
use std::sync::Arc;
use std::time::Duration;

/// Leased work queue of one crawl session
#[derive(Clone)]
pub struct Frontier {
    store: Arc<dyn CoordinationStore>,
    session_id: i64,
}

impl Frontier {
    /// Creates a frontier view for `session_id`
    pub fn new(store: Arc<dyn CoordinationStore>, session_id: i64) -> Self {
        Self { store, session_id }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Enqueues a record
    ///
    /// Callers are expected to have claimed the URL through the
    /// [`DedupFilter`] first.
    pub fn push(&self, record: &UrlRecord) -> StoreResult<()> {
        self.store.push(self.session_id, record)
    }

    /// Leases the next visible item
    ///
    /// If the lease is not settled with [`complete`](Self::complete),
    /// [`requeue`](Self::requeue), [`drop_item`](Self::drop_item) or
    /// [`release`](Self::release) within `lease_timeout`, the item becomes
    /// poppable again.
    pub fn pop(&self, lease_timeout: Duration) -> StoreResult<Option<FrontierItem>> {
        self.store.pop(self.session_id, lease_timeout)
    }

    /// Marks an item completed
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The item is completed
    /// * `Ok(false)` - The lease was lost to another worker
    pub fn complete(&self, item: &FrontierItem) -> StoreResult<bool> {
        self.store.complete(item)
    }

    /// Schedules another attempt after `backoff`, consuming one retry
    pub fn requeue(&self, item: &FrontierItem, backoff: Duration, reason: &str) -> StoreResult<bool> {
        self.store.requeue(item, backoff, reason)
    }

    /// Drops an item without further attempts
    pub fn drop_item(&self, item: &FrontierItem, reason: &DropReason) -> StoreResult<bool> {
        self.store.drop_item(item, reason)
    }

    /// Hands an unfetched item back, visible again after `delay`
    pub fn release(&self, item: &FrontierItem, delay: Duration) -> StoreResult<bool> {
        self.store.release(item, delay)
    }

    /// Counts pending and leased items
    pub fn outstanding(&self) -> StoreResult<u64> {
        self.store.outstanding(self.session_id)
    }
}
