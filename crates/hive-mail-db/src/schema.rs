//! Database schema
//!
//! One events table (the append-only log) plus four projection tables and
//! the cursor table. All DDL is idempotent; indexes are advisory.

use rusqlite::Connection;

use crate::error::DbResult;

/// Idempotent DDL for all tables and indexes.
pub const CREATE_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER NOT NULL,
    project_key TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,
    PRIMARY KEY (project_key, seq)
);
CREATE INDEX IF NOT EXISTS idx_events_kind_seq ON events(project_key, kind, seq);

CREATE TABLE IF NOT EXISTS agents (
    project_key TEXT NOT NULL,
    name TEXT NOT NULL,
    program TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    task_description TEXT NOT NULL DEFAULT '',
    first_seen_ts INTEGER NOT NULL,
    last_seen_ts INTEGER NOT NULL,
    PRIMARY KEY (project_key, name)
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    project_key TEXT NOT NULL,
    from_agent TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    thread_id TEXT,
    importance TEXT NOT NULL DEFAULT 'normal',
    ack_required INTEGER NOT NULL DEFAULT 0,
    created_ts INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_project_created ON messages(project_key, created_ts, id);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(project_key, thread_id);

CREATE TABLE IF NOT EXISTS message_recipients (
    message_id INTEGER NOT NULL,
    agent_name TEXT NOT NULL,
    read_ts INTEGER,
    ack_ts INTEGER,
    PRIMARY KEY (message_id, agent_name)
);
CREATE INDEX IF NOT EXISTS idx_recipients_agent ON message_recipients(agent_name, message_id);

CREATE TABLE IF NOT EXISTS file_reservations (
    id INTEGER PRIMARY KEY,
    project_key TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    path_pattern TEXT NOT NULL,
    exclusive INTEGER NOT NULL DEFAULT 1,
    reason TEXT NOT NULL DEFAULT '',
    created_ts INTEGER NOT NULL,
    expires_ts INTEGER NOT NULL,
    released_ts INTEGER
);
CREATE INDEX IF NOT EXISTS idx_reservations_active
    ON file_reservations(project_key, released_ts, expires_ts);
CREATE INDEX IF NOT EXISTS idx_reservations_agent
    ON file_reservations(project_key, agent_name, released_ts);

CREATE TABLE IF NOT EXISTS cursors (
    project_key TEXT NOT NULL,
    consumer_id TEXT NOT NULL,
    last_seq INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_key, consumer_id)
);
";

/// Names of all tables, in drop-safe order.
pub const TABLE_NAMES: &[&str] = &[
    "events",
    "agents",
    "messages",
    "message_recipients",
    "file_reservations",
    "cursors",
];

/// Create all tables and indexes if they do not exist.
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(CREATE_TABLES_SQL)?;
    Ok(())
}

/// Drop and recreate every table — test support only.
pub fn reset_schema(conn: &Connection) -> DbResult<()> {
    for table in TABLE_NAMES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    }
    init_schema(conn)
}
