//! Append-only event log
//!
//! `seq` is strictly monotonic per project and assigned at append time, in
//! the same transaction that updates the projections. No event is ever
//! mutated or deleted. Readers use [`scan_events`] (or the cursor layer)
//! rather than the projections when they need the raw history.

use hive_mail_core::events::{EventKind, EventPayload, EventRecord};
use rusqlite::{Connection, params};
use tokio_util::sync::CancellationToken;

use crate::adapter::Db;
use crate::error::{DbError, DbResult};
use crate::projections::{self, Applied};
use crate::timestamps::now_micros;

/// Chunk size for recipient-filtered scans.
const RECIPIENT_SCAN_CHUNK: usize = 256;

/// Result of appending one event.
#[derive(Debug)]
pub struct AppendOutcome {
    /// Sequence number assigned to the event.
    pub seq: i64,
    /// Event timestamp (microseconds since epoch).
    pub occurred_at: i64,
    /// Projection side effects (assigned ids, affected row counts).
    pub applied: Applied,
}

/// Append an event and apply its projection inside an open transaction.
///
/// Used directly by operations that need to read projection state and
/// append in the same transaction (e.g. idempotent acknowledge).
pub fn append_in_conn(
    conn: &Connection,
    project_key: &str,
    payload: &EventPayload,
    occurred_at: i64,
) -> DbResult<AppendOutcome> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE project_key = ?1",
        params![project_key],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO events (seq, project_key, kind, payload, occurred_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            seq,
            project_key,
            payload.kind().as_str(),
            payload.to_json()?,
            occurred_at
        ],
    )?;

    let applied = projections::apply_event(conn, project_key, occurred_at, payload)?;

    tracing::debug!(
        kind = payload.kind().as_str(),
        seq,
        project = project_key,
        "event appended"
    );

    Ok(AppendOutcome {
        seq,
        occurred_at,
        applied,
    })
}

/// Append an event in its own transaction.
pub async fn append_event(
    db: &Db,
    cancel: &CancellationToken,
    project_key: &str,
    payload: EventPayload,
) -> DbResult<AppendOutcome> {
    let occurred_at = now_micros();
    db.transaction(cancel, |conn| {
        append_in_conn(conn, project_key, &payload, occurred_at)
    })
    .await
}

fn record_from_parts(
    project_key: &str,
    seq: i64,
    kind: &str,
    payload: &str,
    occurred_at: i64,
) -> DbResult<EventRecord> {
    let kind = EventKind::parse(kind)
        .ok_or_else(|| DbError::Internal(format!("unknown event kind '{kind}' at seq {seq}")))?;
    Ok(EventRecord {
        seq,
        project_key: project_key.to_string(),
        payload: EventPayload::from_kind_json(kind, payload)?,
        occurred_at,
    })
}

/// Scan events with `seq > from_seq`, oldest first, up to `limit`.
pub fn scan_in_conn(
    conn: &Connection,
    project_key: &str,
    from_seq: i64,
    limit: usize,
) -> DbResult<Vec<EventRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        "SELECT seq, kind, payload, occurred_at FROM events \
         WHERE project_key = ?1 AND seq > ?2 ORDER BY seq LIMIT ?3",
    )?;
    let rows: Vec<(i64, String, String, i64)> = stmt
        .query_map(params![project_key, from_seq, limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<rusqlite::Result<_>>()?;

    rows.into_iter()
        .map(|(seq, kind, payload, occurred_at)| {
            record_from_parts(project_key, seq, &kind, &payload, occurred_at)
        })
        .collect()
}

/// Scan `message_sent` events addressed to `agent`, oldest first.
///
/// Walks the log in chunks so a long tail of foreign messages cannot starve
/// the caller's `limit`.
pub fn scan_for_recipient_in_conn(
    conn: &Connection,
    project_key: &str,
    agent: &str,
    from_seq: i64,
    limit: usize,
) -> DbResult<Vec<EventRecord>> {
    let mut out = Vec::new();
    let mut position = from_seq;

    loop {
        let chunk_limit = i64::try_from(RECIPIENT_SCAN_CHUNK).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT seq, kind, payload, occurred_at FROM events \
             WHERE project_key = ?1 AND kind = ?2 AND seq > ?3 \
             ORDER BY seq LIMIT ?4",
        )?;
        let rows: Vec<(i64, String, String, i64)> = stmt
            .query_map(
                params![
                    project_key,
                    EventKind::MessageSent.as_str(),
                    position,
                    chunk_limit
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?
            .collect::<rusqlite::Result<_>>()?;

        if rows.is_empty() {
            return Ok(out);
        }

        for (seq, kind, payload, occurred_at) in rows {
            position = seq;
            let record = record_from_parts(project_key, seq, &kind, &payload, occurred_at)?;
            let addressed = match &record.payload {
                EventPayload::MessageSent(p) => p.to.iter().any(|name| name == agent),
                _ => false,
            };
            if addressed {
                out.push(record);
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
    }
}

/// Scan events with `seq > from_seq`, oldest first.
pub async fn scan_events(
    db: &Db,
    cancel: &CancellationToken,
    project_key: &str,
    from_seq: i64,
    limit: usize,
) -> DbResult<Vec<EventRecord>> {
    db.with_conn(cancel, |conn| {
        scan_in_conn(conn, project_key, from_seq, limit)
    })
    .await
}

/// Scan `message_sent` events addressed to `agent` with `seq > from_seq`.
pub async fn scan_events_for_recipient(
    db: &Db,
    cancel: &CancellationToken,
    project_key: &str,
    agent: &str,
    from_seq: i64,
    limit: usize,
) -> DbResult<Vec<EventRecord>> {
    db.with_conn(cancel, |conn| {
        scan_for_recipient_in_conn(conn, project_key, agent, from_seq, limit)
    })
    .await
}
