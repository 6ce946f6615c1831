//! Frontier item states, drop reasons and the worker phase machine
use std::fmt;

/// Durable lifecycle state of a frontier item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Enqueued (or requeued) and waiting for its visibility time
    Pending,

    /// Popped by a worker; reverts to poppable when the lease expires
    Leased,

    /// Fetched and processed; removed from the work queue for good
    Completed,

    /// Given up on; see the recorded drop reason
    Dropped,
}

impl ItemState {
    /// Returns true if the item still counts as outstanding work
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Leased)
    }

    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dropped)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Leased => "leased",
            Self::Completed => "completed",
            Self::Dropped => "dropped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "leased" => Some(Self::Leased),
            "completed" => Some(Self::Completed),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    pub fn all() -> [ItemState; 4] {
        [Self::Pending, Self::Leased, Self::Completed, Self::Dropped]
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Why a frontier item was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// robots.txt disallows the URL for our product token
    RobotsDisallowed,

    /// The fetch failed in a way retrying cannot fix
    PermanentFailure(String),

    /// Transient failures used up the retry budget; holds the last reason
    RetriesExhausted(String),

    /// A redirect target could not be turned into a crawlable URL
    MalformedRedirect(String),

    /// The stored row could not be read back as a frontier item
    CorruptRecord(String),
}

impl DropReason {
    /// Stable machine-readable kind, stored alongside the detail
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
            Self::PermanentFailure(_) => "permanent_failure",
            Self::RetriesExhausted(_) => "retries_exhausted",
            Self::MalformedRedirect(_) => "malformed_redirect",
            Self::CorruptRecord(_) => "corrupt_record",
        }
    }

    /// Human-readable detail, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::RobotsDisallowed => None,
            Self::PermanentFailure(detail)
            | Self::RetriesExhausted(detail)
            | Self::MalformedRedirect(detail)
            | Self::CorruptRecord(detail) => Some(detail),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.kind(), detail),
            None => f.write_str(self.kind()),
        }
    }
}

/// Phase of a leased item inside a crawl worker
///
/// ```text
/// Leased -> Fetching -> Extracting     -> Completing
///                    -> RetryScheduled
///                    -> Dropped
/// ```
///
/// `Leased` may also go straight to `Dropped` (robots) or `Released` (the
/// lease is handed back unfetched on cancellation or a long politeness wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerPhase {
    Leased,
    Fetching,
    Extracting,
    RetryScheduled,
    Dropped,
    Completing,
    Released,
}

impl WorkerPhase {
    /// Checks if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: WorkerPhase) -> bool {
        use WorkerPhase::*;
        matches!(
            (self, next),
            (Leased, Fetching)
                | (Leased, Dropped)
                | (Leased, Released)
                | (Fetching, Extracting)
                | (Fetching, RetryScheduled)
                | (Fetching, Dropped)
                | (Fetching, Completing)
                | (Extracting, Completing)
        )
    }

    /// Returns true if the item has left the worker
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::RetryScheduled | Self::Dropped | Self::Completing | Self::Released
        )
    }
}
