//! Session statistics from the coordination store
//!
//! This module provides functionality for extracting and displaying
//! per-session crawl statistics.

use crate::state::ItemState;
use crate::storage::{SessionRecord, SqliteStore, StoreError};
use crate::SkeinError;
use std::collections::HashMap;
use std::io::{self, Write};

/// Number of hosts listed in the busiest-hosts table
const TOP_HOSTS: usize = 10;

/// Crawl statistics of one session
#[derive(Debug, Clone)]
pub struct SessionStatistics {
    pub session: SessionRecord,

    /// Frontier items by state; every state is present
    pub items_by_state: HashMap<ItemState, u64>,

    /// URLs claimed by the dedup filter
    pub claims: u64,

    /// Documents recorded by the store sink
    pub documents: u64,

    /// Dropped items grouped by drop reason kind, most frequent first
    pub drop_reasons: Vec<(String, u64)>,

    /// Hosts with the most frontier items, most frequent first
    pub top_hosts: Vec<(String, u64)>,
}

impl SessionStatistics {
    /// Total number of frontier items
    pub fn total_items(&self) -> u64 {
        self.items_by_state.values().sum()
    }

    pub fn count(&self, state: ItemState) -> u64 {
        self.items_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Share of settled items that completed, in percent
    pub fn completion_rate(&self) -> f64 {
        let completed = self.count(ItemState::Completed);
        let settled = completed + self.count(ItemState::Dropped);
        if settled == 0 {
            0.0
        } else {
            completed as f64 / settled as f64 * 100.0
        }
    }
}

/// Loads the statistics of the named session
///
/// # Arguments
///
/// * `store` - The store to query
/// * `session_name` - Name of the session
///
/// # Returns
///
/// * `Ok(SessionStatistics)` - Successfully loaded statistics
/// * `Err(SkeinError)` - The session does not exist or a query failed
pub fn load_statistics(
    store: &SqliteStore,
    session_name: &str,
) -> Result<SessionStatistics, SkeinError> {
    let session = store
        .find_session(session_name)?
        .ok_or_else(|| StoreError::SessionNotFound(session_name.to_string()))?;

    Ok(SessionStatistics {
        items_by_state: store.count_items_by_state(session.id)?,
        claims: store.count_claims(session.id)?,
        documents: store.count_documents(session.id)?,
        drop_reasons: store.drop_reason_summary(session.id)?,
        top_hosts: store.top_hosts(session.id, TOP_HOSTS)?,
        session,
    })
}

/// Writes statistics in a human-readable layout
pub fn write_statistics<W: Write>(stats: &SessionStatistics, out: &mut W) -> io::Result<()> {
    let session = &stats.session;
    writeln!(out, "=== Session '{}' ===\n", session.name)?;
    writeln!(out, "  Status: {}", session.status.to_db_string())?;
    writeln!(out, "  Started: {}", session.started_at)?;
    if let Some(finished) = &session.finished_at {
        writeln!(out, "  Finished: {}", finished)?;
    }
    writeln!(out, "  Config hash: {}", session.config_hash)?;
    writeln!(out)?;

    writeln!(out, "Overview:")?;
    writeln!(out, "  URLs claimed: {}", stats.claims)?;
    writeln!(out, "  Frontier items: {}", stats.total_items())?;
    writeln!(out, "  Documents stored: {}", stats.documents)?;
    writeln!(out)?;

    writeln!(out, "Items by State:")?;
    let total = stats.total_items();
    for state in ItemState::all() {
        let count = stats.count(state);
        let percentage = if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        writeln!(out, "  {}: {} ({:.1}%)", state, count, percentage)?;
    }
    writeln!(out)?;

    if !stats.drop_reasons.is_empty() {
        writeln!(out, "Drop Reasons:")?;
        for (reason, count) in &stats.drop_reasons {
            writeln!(out, "  {}: {}", reason, count)?;
        }
        writeln!(out)?;
    }

    if !stats.top_hosts.is_empty() {
        writeln!(out, "Busiest Hosts:")?;
        for (host, count) in &stats.top_hosts {
            writeln!(out, "  - {} ({})", host, count)?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "Completion Rate: {:.1}% ({} completed, {} dropped)",
        stats.completion_rate(),
        stats.count(ItemState::Completed),
        stats.count(ItemState::Dropped)
    )
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &SessionStatistics) {
    let stdout = io::stdout();
    if let Err(e) = write_statistics(stats, &mut stdout.lock()) {
        tracing::warn!("Failed to print statistics: {}", e);
    }
}
