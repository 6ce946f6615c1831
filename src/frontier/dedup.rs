use crate::storage::{CoordinationStore, StoreResult, UrlRecord};
use std::sync::Arc;
use url::Url;

/// Session-wide set of claimed URLs
///
/// A URL is claimed by its normalized string form. Claims are never
/// released: permanently failed URLs stay claimed so rediscovering them
/// does not schedule them again. Only a session reset clears the set.
#[derive(Clone)]
pub struct DedupFilter {
    store: Arc<dyn CoordinationStore>,
    session_id: i64,
}

impl DedupFilter {
    pub fn new(store: Arc<dyn CoordinationStore>, session_id: i64) -> Self {
        Self { store, session_id }
    }

    /// Claims a normalized URL
    ///
    /// Among any number of concurrent callers for the same URL, in this or
    /// other processes, exactly one receives `true`.
    pub fn try_claim(&self, url: &Url) -> StoreResult<bool> {
        self.store.try_claim(self.session_id, url.as_str())
    }

    /// Claims the record's URL and enqueues it if the claim succeeded
    pub fn try_claim_and_push(&self, record: &UrlRecord) -> StoreResult<bool> {
        self.store.claim_and_push(self.session_id, record)
    }
}
