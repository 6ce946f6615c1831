//! Storage module for the shared coordination store
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Named crawl sessions and their reset/resume lifecycle
//! - The per-session dedup set of claimed URLs
//! - The leased, durable frontier queue
//! - Document records written by the store sink

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{CoordinationStore, StoreError, StoreResult};

use crate::state::ItemState;
use crate::url::host_key;
use chrono::{DateTime, Utc};
use url::Url;

/// A URL waiting to be enqueued
#[derive(Debug, Clone)]
pub struct UrlRecord {
    /// The string the URL was discovered as
    pub raw_url: String,

    /// Normalized URL; its string form is the dedup key
    pub url: Url,

    pub depth: u32,

    /// Normalized URL of the page that linked here, `None` for seeds
    pub discovered_from: Option<String>,

    /// Redirects followed to reach this URL
    pub redirect_hops: u32,

    pub enqueued_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Creates a record for a seed URL at depth 0
    pub fn seed(raw_url: impl Into<String>, url: Url) -> Self {
        Self {
            raw_url: raw_url.into(),
            url,
            depth: 0,
            discovered_from: None,
            redirect_hops: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Creates a record for a link found on `parent`
    pub fn discovered(raw_url: impl Into<String>, url: Url, depth: u32, parent: &Url) -> Self {
        Self {
            raw_url: raw_url.into(),
            url,
            depth,
            discovered_from: Some(parent.to_string()),
            redirect_hops: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Creates a record for the target of a redirect served for `item`
    ///
    /// The target keeps the item's depth and adds one redirect hop.
    pub fn redirect_target(raw_url: impl Into<String>, url: Url, item: &FrontierItem) -> Self {
        Self {
            raw_url: raw_url.into(),
            url,
            depth: item.depth,
            discovered_from: Some(item.url.to_string()),
            redirect_hops: item.redirect_hops + 1,
            enqueued_at: Utc::now(),
        }
    }

    /// Host key used for per-host statistics
    pub fn host(&self) -> String {
        host_key(&self.url).unwrap_or_default()
    }
}

/// A frontier item leased to a worker
#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub id: i64,
    pub session_id: i64,
    pub url: Url,
    pub raw_url: String,
    pub depth: u32,
    pub discovered_from: Option<String>,
    pub enqueued_at: DateTime<Utc>,

    /// Requeues consumed so far
    pub retry_count: u32,

    pub redirect_hops: u32,

    /// Lease generation; completion only applies while it still matches
    pub lease_id: i64,
}

/// Row view of a frontier item, used for inspection and statistics
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: String,
    pub host: String,
    pub depth: u32,
    pub state: ItemState,
    pub retry_count: u32,
    pub redirect_hops: u32,
    pub drop_reason: Option<String>,
    pub last_error: Option<String>,
}

/// Metadata of a fetched document persisted by the store sink
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub content_type: String,
    pub body_bytes: usize,
    pub body_sha256: String,
    pub depth: u32,
    pub links_found: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub name: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,

    /// Hash stored before the session was reopened, `None` for new sessions
    pub previous_config_hash: Option<String>,
}

impl SessionRecord {
    /// Returns true if this session existed before it was opened
    pub fn is_resumed(&self) -> bool {
        self.previous_config_hash.is_some()
    }

    /// Returns true if the session was resumed with a different config file
    pub fn config_changed(&self) -> bool {
        self.previous_config_hash
            .as_deref()
            .map_or(false, |previous| previous != self.config_hash)
    }
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}
