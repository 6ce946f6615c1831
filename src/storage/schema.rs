//! Database schema definitions
//!
//! This module contains the SQL schema of the shared coordination store.
//! Times used for leases and visibility are wall-clock milliseconds so
//! they compare correctly across processes.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Named crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Normalized URLs claimed in a session (the dedup set)
CREATE TABLE IF NOT EXISTS claims (
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    url TEXT NOT NULL,
    claimed_at INTEGER NOT NULL,
    PRIMARY KEY (session_id, url)
);

-- Durable leased work queue
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    url TEXT NOT NULL,
    raw_url TEXT NOT NULL,
    host TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_from TEXT,
    redirect_hops INTEGER NOT NULL DEFAULT 0,
    enqueued_at INTEGER NOT NULL,
    state TEXT NOT NULL,
    visible_at INTEGER NOT NULL,
    lease_id INTEGER NOT NULL DEFAULT 0,
    lease_expires_at INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    drop_reason TEXT,
    last_error TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_pop ON frontier(session_id, state, visible_at);
CREATE INDEX IF NOT EXISTS idx_frontier_host ON frontier(session_id, host);

-- Documents handed to the store sink
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    body_bytes INTEGER NOT NULL,
    body_sha256 TEXT NOT NULL,
    depth INTEGER NOT NULL,
    links_found INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_session ON documents(session_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
