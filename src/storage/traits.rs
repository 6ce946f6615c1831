//! Coordination store trait and error types
//!
//! The crawl core never touches SQL directly: the frontier and dedup filter
//! talk to a [`CoordinationStore`], which provides atomic add-if-absent, a
//! leased durable queue, and lease expiry. Any backend offering those three
//! primitives can stand in for the SQLite implementation.

use crate::state::DropReason;
use crate::storage::{FrontierItem, SessionRecord, SessionStatus, UrlRecord};
use rusqlite::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached right now; the operation may be retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true for infrastructure failures that warrant retrying the
    /// store operation itself
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::CannotOpen
                        | ErrorCode::SystemIoFailure
                ) =>
            {
                Self::Unavailable(err.to_string())
            }
            _ => Self::Sqlite(err),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared state used to coordinate crawler processes
///
/// Every method is atomic with respect to all other callers, including
/// callers in other processes sharing the same backing store. Implementations
/// must be safe to share between worker tasks.
pub trait CoordinationStore: Send + Sync {
    // ===== Session Management =====

    /// Creates the named session, or resumes it if it already exists
    ///
    /// The session is marked running and its config hash replaced. The
    /// returned record carries the hash stored before this call in
    /// `previous_config_hash` when the session was resumed.
    fn open_session(&self, name: &str, config_hash: &str) -> StoreResult<SessionRecord>;

    /// Deletes every claim, frontier item and document of the named session
    ///
    /// Resetting a session that does not exist is a no-op.
    fn reset_session(&self, name: &str) -> StoreResult<()>;

    /// Records the final status of a session
    fn finish_session(&self, session_id: i64, status: SessionStatus) -> StoreResult<()>;

    // ===== Dedup =====

    /// Claims a normalized URL for the session
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - This caller is the first to claim the URL
    /// * `Ok(false)` - The URL was already claimed
    fn try_claim(&self, session_id: i64, url: &str) -> StoreResult<bool>;

    /// Claims a URL and, if the claim succeeds, pushes it to the frontier
    ///
    /// Both steps happen in one transaction, so a URL is never left claimed
    /// but unqueued.
    fn claim_and_push(&self, session_id: i64, record: &UrlRecord) -> StoreResult<bool>;

    // ===== Frontier =====

    /// Enqueues a record, visible immediately
    fn push(&self, session_id: i64, record: &UrlRecord) -> StoreResult<()>;

    /// Leases the next visible item for `lease`
    ///
    /// Items whose previous lease expired are visible again.
    fn pop(&self, session_id: i64, lease: Duration) -> StoreResult<Option<FrontierItem>>;

    /// Marks a leased item completed
    ///
    /// Returns false if the caller no longer holds the lease.
    fn complete(&self, item: &FrontierItem) -> StoreResult<bool>;

    /// Returns a leased item to the queue after `delay`, consuming one retry
    fn requeue(&self, item: &FrontierItem, delay: Duration, reason: &str) -> StoreResult<bool>;

    /// Drops a leased item for good
    fn drop_item(&self, item: &FrontierItem, reason: &DropReason) -> StoreResult<bool>;

    /// Hands back an unfetched lease, visible again after `delay`
    ///
    /// Unlike [`requeue`](Self::requeue) this does not touch the retry count.
    fn release(&self, item: &FrontierItem, delay: Duration) -> StoreResult<bool>;

    /// Counts pending and leased items of the session
    fn outstanding(&self, session_id: i64) -> StoreResult<u64>;
}
