//! SQLite coordination store
//!
//! This module provides a SQLite-based implementation of the
//! [`CoordinationStore`] trait. Several crawler processes may open the same
//! database file: WAL journaling and a busy timeout let their writers queue,
//! and every read-then-write sequence runs in an `IMMEDIATE` transaction so
//! it holds the write lock from its first statement.

use crate::state::{DropReason, ItemState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CoordinationStore, StoreError, StoreResult};
use crate::storage::{
    DocumentRecord, FrontierEntry, FrontierItem, SessionRecord, SessionStatus, UrlRecord,
};
use chrono::{TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// How long a connection waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const FRONTIER_ITEM_COLUMNS: &str = "id, session_id, url, raw_url, depth, discovered_from, \
     enqueued_at, retry_count, redirect_hops, lease_id";

const FRONTIER_ENTRY_COLUMNS: &str =
    "url, host, depth, state, retry_count, redirect_hops, drop_reason, last_error";

/// SQLite coordination store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        tracing::debug!("Opened coordination store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a private in-memory store
    ///
    /// Only callers sharing this instance see its data, which is enough for
    /// a single-process crawl and for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    // ===== Sessions =====

    /// Looks up a session by name
    pub fn find_session(&self, name: &str) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row("SELECT id FROM sessions WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;

        match id {
            Some(id) => Ok(Some(load_session(&conn, id, None)?)),
            None => Ok(None),
        }
    }

    /// Lists all sessions, oldest first
    pub fn list_sessions(&self) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|id| load_session(&conn, id, None))
            .collect()
    }

    // ===== Documents =====

    /// Records a fetched document
    pub fn record_document(&self, session_id: i64, document: &DocumentRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (session_id, url, final_url, status_code, content_type,
             body_bytes, body_sha256, depth, links_found, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session_id,
                document.url,
                document.final_url,
                document.status_code,
                document.content_type,
                document.body_bytes as i64,
                document.body_sha256,
                document.depth,
                document.links_found as i64,
                document.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ===== Statistics =====

    /// Counts frontier items of the session by state
    pub fn count_items_by_state(&self, session_id: i64) -> StoreResult<HashMap<ItemState, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM frontier WHERE session_id = ?1 GROUP BY state",
        )?;

        let mut counts: HashMap<ItemState, u64> =
            ItemState::all().into_iter().map(|state| (state, 0)).collect();
        let rows = stmt.query_map([session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state, count) = row?;
            let state = ItemState::from_db_string(&state)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown item state '{}'", state)))?;
            counts.insert(state, count as u64);
        }

        Ok(counts)
    }

    /// Counts URLs claimed in the session
    pub fn count_claims(&self, session_id: i64) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM claims WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Counts documents recorded for the session
    pub fn count_documents(&self, session_id: i64) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Counts dropped items by drop reason, most common first
    pub fn drop_reason_summary(&self, session_id: i64) -> StoreResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT drop_reason, COUNT(*) AS n FROM frontier
             WHERE session_id = ?1 AND state = ?2 AND drop_reason IS NOT NULL
             GROUP BY drop_reason ORDER BY n DESC, drop_reason ASC",
        )?;

        let summary = stmt
            .query_map(
                params![session_id, ItemState::Dropped.to_db_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summary)
    }

    /// Returns the hosts with the most frontier items
    pub fn top_hosts(&self, session_id: i64, limit: usize) -> StoreResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT host, COUNT(*) AS n FROM frontier WHERE session_id = ?1
             GROUP BY host ORDER BY n DESC, host ASC LIMIT ?2",
        )?;

        let hosts = stmt
            .query_map(params![session_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hosts)
    }

    /// Lists every frontier item of the session in enqueue order
    pub fn frontier_entries(&self, session_id: i64) -> StoreResult<Vec<FrontierEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM frontier WHERE session_id = ?1 ORDER BY id ASC",
            FRONTIER_ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([session_id], map_frontier_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Looks up the frontier item for a normalized URL
    pub fn frontier_entry(&self, session_id: i64, url: &str) -> StoreResult<Option<FrontierEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM frontier WHERE session_id = ?1 AND url = ?2
                     ORDER BY id DESC LIMIT 1",
                    FRONTIER_ENTRY_COLUMNS
                ),
                params![session_id, url],
                map_frontier_entry,
            )
            .optional()?;
        Ok(entry)
    }
}

impl CoordinationStore for SqliteStore {
    // ===== Session Management =====

    fn open_session(&self, name: &str, config_hash: &str) -> StoreResult<SessionRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, config_hash FROM sessions WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, previous_hash) = match existing {
            Some((id, previous_hash)) => {
                tx.execute(
                    "UPDATE sessions SET status = ?1, config_hash = ?2, finished_at = NULL
                     WHERE id = ?3",
                    params![SessionStatus::Running.to_db_string(), config_hash, id],
                )?;
                (id, Some(previous_hash))
            }
            None => {
                tx.execute(
                    "INSERT INTO sessions (name, started_at, config_hash, status)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        name,
                        Utc::now().to_rfc3339(),
                        config_hash,
                        SessionStatus::Running.to_db_string()
                    ],
                )?;
                (tx.last_insert_rowid(), None)
            }
        };

        let session = load_session(&tx, id, previous_hash)?;
        tx.commit()?;
        Ok(session)
    }

    fn reset_session(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id: Option<i64> = tx
            .query_row("SELECT id FROM sessions WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(id) = id {
            tx.execute("DELETE FROM documents WHERE session_id = ?1", [id])?;
            tx.execute("DELETE FROM frontier WHERE session_id = ?1", [id])?;
            tx.execute("DELETE FROM claims WHERE session_id = ?1", [id])?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
        }

        tx.commit()?;
        Ok(())
    }

    fn finish_session(&self, session_id: i64, status: SessionStatus) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), session_id],
        )?;

        if changed == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    // ===== Dedup =====

    fn try_claim(&self, session_id: i64, url: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        Ok(insert_claim(&conn, session_id, url)?)
    }

    fn claim_and_push(&self, session_id: i64, record: &UrlRecord) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !insert_claim(&tx, session_id, record.url.as_str())? {
            return Ok(false);
        }
        insert_frontier_item(&tx, session_id, record)?;

        tx.commit()?;
        Ok(true)
    }

    // ===== Frontier =====

    fn push(&self, session_id: i64, record: &UrlRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_frontier_item(&conn, session_id, record)?;
        Ok(())
    }

    fn pop(&self, session_id: i64, lease: Duration) -> StoreResult<Option<FrontierItem>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();

        // Rows that cannot be read back are dropped so they never block the head
        // of the queue
        let mut item = loop {
            let id = tx
                .query_row(
                    "SELECT id FROM frontier
                     WHERE session_id = ?1
                       AND ((state = ?2 AND visible_at <= ?4)
                         OR (state = ?3 AND lease_expires_at <= ?4))
                     ORDER BY visible_at ASC, id ASC
                     LIMIT 1",
                    params![
                        session_id,
                        ItemState::Pending.to_db_string(),
                        ItemState::Leased.to_db_string(),
                        now
                    ],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;

            let id = match id {
                Some(id) => id,
                None => {
                    tx.commit()?;
                    return Ok(None);
                }
            };

            let read = tx.query_row(
                &format!("SELECT {} FROM frontier WHERE id = ?1", FRONTIER_ITEM_COLUMNS),
                params![id],
                map_frontier_item,
            );

            match read {
                Ok(item) => break item,
                Err(
                    e @ (rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..)),
                ) => {
                    tracing::error!("Dropping unreadable frontier row {}: {}", id, e);
                    let reason = DropReason::CorruptRecord(e.to_string());
                    tx.execute(
                        "UPDATE frontier SET state = ?1, lease_expires_at = NULL, drop_reason = ?2,
                         last_error = ?3, updated_at = ?4
                         WHERE id = ?5",
                        params![
                            ItemState::Dropped.to_db_string(),
                            reason.kind(),
                            reason.detail(),
                            now,
                            id
                        ],
                    )?;
                }
                Err(e) => return Err(e.into()),
            }
        };

        item.lease_id += 1;
        tx.execute(
            "UPDATE frontier SET state = ?1, lease_id = ?2, lease_expires_at = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                ItemState::Leased.to_db_string(),
                item.lease_id,
                now.saturating_add(duration_ms(lease)),
                now,
                item.id
            ],
        )?;

        tx.commit()?;
        Ok(Some(item))
    }

    fn complete(&self, item: &FrontierItem) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE frontier SET state = ?1, lease_expires_at = NULL, updated_at = ?2
             WHERE id = ?3 AND state = ?4 AND lease_id = ?5",
            params![
                ItemState::Completed.to_db_string(),
                now_ms(),
                item.id,
                ItemState::Leased.to_db_string(),
                item.lease_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn requeue(&self, item: &FrontierItem, delay: Duration, reason: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let now = now_ms();
        let changed = conn.execute(
            "UPDATE frontier SET state = ?1, retry_count = retry_count + 1, visible_at = ?2,
             lease_expires_at = NULL, last_error = ?3, updated_at = ?4
             WHERE id = ?5 AND state = ?6 AND lease_id = ?7",
            params![
                ItemState::Pending.to_db_string(),
                now.saturating_add(duration_ms(delay)),
                reason,
                now,
                item.id,
                ItemState::Leased.to_db_string(),
                item.lease_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn drop_item(&self, item: &FrontierItem, reason: &DropReason) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE frontier SET state = ?1, lease_expires_at = NULL, drop_reason = ?2,
             last_error = COALESCE(?3, last_error), updated_at = ?4
             WHERE id = ?5 AND state = ?6 AND lease_id = ?7",
            params![
                ItemState::Dropped.to_db_string(),
                reason.kind(),
                reason.detail(),
                now_ms(),
                item.id,
                ItemState::Leased.to_db_string(),
                item.lease_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn release(&self, item: &FrontierItem, delay: Duration) -> StoreResult<bool> {
        let conn = self.conn()?;
        let now = now_ms();
        let changed = conn.execute(
            "UPDATE frontier SET state = ?1, visible_at = ?2, lease_expires_at = NULL,
             updated_at = ?3
             WHERE id = ?4 AND state = ?5 AND lease_id = ?6",
            params![
                ItemState::Pending.to_db_string(),
                now.saturating_add(duration_ms(delay)),
                now,
                item.id,
                ItemState::Leased.to_db_string(),
                item.lease_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn outstanding(&self, session_id: i64) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM frontier WHERE session_id = ?1 AND state IN (?2, ?3)",
            params![
                session_id,
                ItemState::Pending.to_db_string(),
                ItemState::Leased.to_db_string()
            ],
            |row| row.get(0),
        )?;
        tracing::trace!("Session {} has {} outstanding items", session_id, count);
        Ok(count as u64)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn insert_claim(conn: &Connection, session_id: i64, url: &str) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO claims (session_id, url, claimed_at) VALUES (?1, ?2, ?3)",
        params![session_id, url, now_ms()],
    )?;
    Ok(inserted == 1)
}

fn insert_frontier_item(
    conn: &Connection,
    session_id: i64,
    record: &UrlRecord,
) -> rusqlite::Result<()> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO frontier (session_id, url, raw_url, host, depth, discovered_from,
         redirect_hops, enqueued_at, state, visible_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            session_id,
            record.url.as_str(),
            record.raw_url,
            record.host(),
            record.depth,
            record.discovered_from,
            record.redirect_hops,
            record.enqueued_at.timestamp_millis(),
            ItemState::Pending.to_db_string(),
            now
        ],
    )?;
    Ok(())
}

fn load_session(
    conn: &Connection,
    id: i64,
    previous_config_hash: Option<String>,
) -> StoreResult<SessionRecord> {
    let session = conn
        .query_row(
            "SELECT id, name, started_at, finished_at, config_hash, status
             FROM sessions WHERE id = ?1",
            [id],
            |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    config_hash: row.get(4)?,
                    status: SessionStatus::from_db_string(&row.get::<_, String>(5)?)
                        .unwrap_or(SessionStatus::Interrupted),
                    previous_config_hash: None,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;

    Ok(SessionRecord {
        previous_config_hash,
        ..session
    })
}

fn map_frontier_item(row: &Row<'_>) -> rusqlite::Result<FrontierItem> {
    let url: String = row.get(2)?;
    let url = Url::parse(&url)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let enqueued_at: i64 = row.get(6)?;

    Ok(FrontierItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        url,
        raw_url: row.get(3)?,
        depth: row.get(4)?,
        discovered_from: row.get(5)?,
        enqueued_at: Utc
            .timestamp_millis_opt(enqueued_at)
            .single()
            .unwrap_or_else(Utc::now),
        retry_count: row.get(7)?,
        redirect_hops: row.get(8)?,
        lease_id: row.get(9)?,
    })
}

fn map_frontier_entry(row: &Row<'_>) -> rusqlite::Result<FrontierEntry> {
    let state: String = row.get(3)?;
    Ok(FrontierEntry {
        url: row.get(0)?,
        host: row.get(1)?,
        depth: row.get(2)?,
        state: ItemState::from_db_string(&state).unwrap_or(ItemState::Pending),
        retry_count: row.get(4)?,
        redirect_hops: row.get(5)?,
        drop_reason: row.get(6)?,
        last_error: row.get(7)?,
    })
}
