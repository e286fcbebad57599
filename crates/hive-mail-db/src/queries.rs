//! Read-model queries over the projection tables
//!
//! Readers query projections, never the log. All helpers take an open
//! connection so callers can compose them with appends inside one
//! transaction. Cross-project reads are impossible by construction: every
//! query is keyed by `project_key`.

use hive_mail_core::models::{Agent, FileReservation, Message, MessageRecipient};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// A message joined with the querying recipient's delivery state.
#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub message: Message,
    pub recipient: MessageRecipient,
}

/// Row counts of the projections plus the log, for one project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreStats {
    pub events: i64,
    pub agents: i64,
    pub messages: i64,
    pub reservations: i64,
}

fn agent_from_row(project_key: &str, row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        project_key: project_key.to_string(),
        name: row.get("name")?,
        program: row.get("program")?,
        model: row.get("model")?,
        task_description: row.get("task_description")?,
        first_seen_ts: row.get("first_seen_ts")?,
        last_seen_ts: row.get("last_seen_ts")?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: Some(row.get("id")?),
        project_key: row.get("project_key")?,
        from_agent: row.get("from_agent")?,
        subject: row.get("subject")?,
        body: row.get("body")?,
        thread_id: row.get("thread_id")?,
        importance: row.get("importance")?,
        ack_required: row.get::<_, i64>("ack_required")? != 0,
        created_ts: row.get("created_ts")?,
    })
}

fn reservation_from_row(row: &Row<'_>) -> rusqlite::Result<FileReservation> {
    Ok(FileReservation {
        id: Some(row.get("id")?),
        project_key: row.get("project_key")?,
        agent_name: row.get("agent_name")?,
        path_pattern: row.get("path_pattern")?,
        exclusive: row.get::<_, i64>("exclusive")? != 0,
        reason: row.get("reason")?,
        created_ts: row.get("created_ts")?,
        expires_ts: row.get("expires_ts")?,
        released_ts: row.get("released_ts")?,
    })
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

pub fn get_agent(conn: &Connection, project_key: &str, name: &str) -> DbResult<Option<Agent>> {
    let agent = conn
        .query_row(
            "SELECT name, program, model, task_description, first_seen_ts, last_seen_ts \
             FROM agents WHERE project_key = ?1 AND name = ?2",
            params![project_key, name],
            |row| agent_from_row(project_key, row),
        )
        .optional()?;
    Ok(agent)
}

pub fn list_agents(conn: &Connection, project_key: &str) -> DbResult<Vec<Agent>> {
    let mut stmt = conn.prepare(
        "SELECT name, program, model, task_description, first_seen_ts, last_seen_ts \
         FROM agents WHERE project_key = ?1 ORDER BY name",
    )?;
    let agents = stmt
        .query_map(params![project_key], |row| agent_from_row(project_key, row))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(agents)
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub fn get_message(
    conn: &Connection,
    project_key: &str,
    message_id: i64,
) -> DbResult<Option<Message>> {
    let message = conn
        .query_row(
            "SELECT id, project_key, from_agent, subject, body, thread_id, importance, \
             ack_required, created_ts FROM messages WHERE project_key = ?1 AND id = ?2",
            params![project_key, message_id],
            |row| message_from_row(row),
        )
        .optional()?;
    Ok(message)
}

pub fn get_recipient(
    conn: &Connection,
    message_id: i64,
    agent: &str,
) -> DbResult<Option<MessageRecipient>> {
    let recipient = conn
        .query_row(
            "SELECT read_ts, ack_ts FROM message_recipients \
             WHERE message_id = ?1 AND agent_name = ?2",
            params![message_id, agent],
            |row| {
                Ok(MessageRecipient {
                    message_id,
                    agent_name: agent.to_string(),
                    read_ts: row.get(0)?,
                    ack_ts: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(recipient)
}

pub fn list_recipients(conn: &Connection, message_id: i64) -> DbResult<Vec<MessageRecipient>> {
    let mut stmt = conn.prepare(
        "SELECT agent_name, read_ts, ack_ts FROM message_recipients \
         WHERE message_id = ?1 ORDER BY agent_name",
    )?;
    let recipients = stmt
        .query_map(params![message_id], |row| {
            Ok(MessageRecipient {
                message_id,
                agent_name: row.get(0)?,
                read_ts: row.get(1)?,
                ack_ts: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(recipients)
}

fn inbox_filter_sql(urgent_only: bool, unread_only: bool) -> String {
    let mut sql = String::from(
        "FROM message_recipients r \
         JOIN messages m ON m.id = r.message_id \
         WHERE m.project_key = ? AND r.agent_name = ?",
    );
    if urgent_only {
        sql.push_str(" AND m.importance IN ('high', 'urgent')");
    }
    if unread_only {
        sql.push_str(" AND r.read_ts IS NULL");
    }
    sql
}

/// Fetch inbox entries for an agent, newest first.
///
/// Ordering is `created_ts DESC` with a stable `id DESC` tie-break. Filters
/// compose by `AND`. The caller enforces the inbox hard cap; this helper
/// applies whatever limit it is handed.
pub fn fetch_inbox(
    conn: &Connection,
    project_key: &str,
    agent: &str,
    urgent_only: bool,
    unread_only: bool,
    limit: usize,
) -> DbResult<Vec<InboxEntry>> {
    let sql = format!(
        "SELECT m.id, m.project_key, m.from_agent, m.subject, m.body, m.thread_id, \
         m.importance, m.ack_required, m.created_ts, r.read_ts, r.ack_ts \
         {} ORDER BY m.created_ts DESC, m.id DESC LIMIT ?",
        inbox_filter_sql(urgent_only, unread_only)
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let values: Vec<Value> = vec![
        Value::Text(project_key.to_string()),
        Value::Text(agent.to_string()),
        Value::Integer(limit),
    ];

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let message = message_from_row(row)?;
            let message_id = message.id.unwrap_or_default();
            Ok(InboxEntry {
                message,
                recipient: MessageRecipient {
                    message_id,
                    agent_name: agent.to_string(),
                    read_ts: row.get("read_ts")?,
                    ack_ts: row.get("ack_ts")?,
                },
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(entries)
}

/// Total matching inbox rows, ignoring any fetch limit.
pub fn count_inbox(
    conn: &Connection,
    project_key: &str,
    agent: &str,
    urgent_only: bool,
    unread_only: bool,
) -> DbResult<usize> {
    let sql = format!(
        "SELECT COUNT(*) {}",
        inbox_filter_sql(urgent_only, unread_only)
    );
    let values: Vec<Value> = vec![
        Value::Text(project_key.to_string()),
        Value::Text(agent.to_string()),
    ];
    let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// All messages in a thread, oldest first.
pub fn list_thread(
    conn: &Connection,
    project_key: &str,
    thread_id: &str,
) -> DbResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_key, from_agent, subject, body, thread_id, importance, \
         ack_required, created_ts FROM messages \
         WHERE project_key = ?1 AND thread_id = ?2 ORDER BY created_ts, id",
    )?;
    let messages = stmt
        .query_map(params![project_key, thread_id], |row| message_from_row(row))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(messages)
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// Reservations active at `now_us` (not released, not expired).
pub fn active_reservations(
    conn: &Connection,
    project_key: &str,
    now_us: i64,
) -> DbResult<Vec<FileReservation>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_key, agent_name, path_pattern, exclusive, reason, \
         created_ts, expires_ts, released_ts FROM file_reservations \
         WHERE project_key = ?1 AND released_ts IS NULL AND expires_ts > ?2 \
         ORDER BY id",
    )?;
    let reservations = stmt
        .query_map(params![project_key, now_us], |row| {
            reservation_from_row(row)
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(reservations)
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

pub fn stats(conn: &Connection, project_key: &str) -> DbResult<StoreStats> {
    let count = |sql: &str| -> DbResult<i64> {
        Ok(conn.query_row(sql, params![project_key], |row| row.get(0))?)
    };
    Ok(StoreStats {
        events: count("SELECT COUNT(*) FROM events WHERE project_key = ?1")?,
        agents: count("SELECT COUNT(*) FROM agents WHERE project_key = ?1")?,
        messages: count("SELECT COUNT(*) FROM messages WHERE project_key = ?1")?,
        reservations: count("SELECT COUNT(*) FROM file_reservations WHERE project_key = ?1")?,
    })
}
