//! Projection updaters
//!
//! A single exhaustive dispatch maps each event kind to its projection
//! effect. Updates run in the same transaction as the event append, so
//! readers see the event and its projection together or not at all.
//!
//! Every updater is pure over `(event, current projection state)`: all
//! written timestamps come from the event's `occurred_at`, never from the
//! wall clock at apply time. Replaying the full log into empty projection
//! tables therefore reproduces them byte for byte, which
//! [`replay_in_conn`] and [`projection_digest`] make testable.

use hive_mail_core::events::{
    AgentHeartbeat, AgentRegistered, EventKind, EventPayload, FileReleased, FileReserved,
    MessageAcked, MessageRead, MessageSent, ReservationExpired,
};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

use crate::error::{DbError, DbResult};

/// Identifier(s) assigned or rows affected while applying an event.
///
/// Returned to the appender so callers learn projection ids atomically,
/// inside the append transaction, instead of racing a read-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    None,
    /// `message_sent`: the projection id of the inserted message.
    MessageId(i64),
    /// `file_reserved`: projection ids of the inserted reservations,
    /// in path order.
    ReservationIds(Vec<i64>),
    /// `file_released` / `reservation_expired`: rows transitioned.
    ReleasedCount(usize),
}

/// Apply one event to the projection tables.
pub fn apply_event(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    payload: &EventPayload,
) -> DbResult<Applied> {
    let applied = match payload {
        EventPayload::AgentRegistered(p) => apply_agent_registered(conn, project_key, occurred_at, p),
        EventPayload::AgentHeartbeat(p) => apply_agent_heartbeat(conn, project_key, occurred_at, p),
        EventPayload::MessageSent(p) => apply_message_sent(conn, project_key, occurred_at, p),
        EventPayload::MessageRead(p) => apply_message_read(conn, occurred_at, p),
        EventPayload::MessageAcked(p) => apply_message_acked(conn, occurred_at, p),
        EventPayload::FileReserved(p) => apply_file_reserved(conn, project_key, occurred_at, p),
        EventPayload::FileReleased(p) => apply_file_released(conn, project_key, occurred_at, p),
        EventPayload::ReservationExpired(p) => {
            apply_reservation_expired(conn, project_key, occurred_at, p)
        }
    }?;

    // Any event whose payload names an agent advances that agent's
    // last_seen. Unregistered names (e.g. recipients that never called
    // init) simply match no row.
    for name in payload.agent_names() {
        conn.execute(
            "UPDATE agents SET last_seen_ts = ?1 \
             WHERE project_key = ?2 AND name = ?3 AND last_seen_ts < ?1",
            params![occurred_at, project_key, name],
        )?;
    }

    Ok(applied)
}

fn apply_agent_registered(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &AgentRegistered,
) -> DbResult<Applied> {
    conn.execute(
        "INSERT INTO agents (project_key, name, program, model, task_description, \
         first_seen_ts, last_seen_ts) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
         ON CONFLICT(project_key, name) DO UPDATE SET \
         program = excluded.program, \
         model = excluded.model, \
         task_description = excluded.task_description, \
         last_seen_ts = excluded.last_seen_ts",
        params![project_key, p.agent, p.program, p.model, p.task_description, occurred_at],
    )?;
    Ok(Applied::None)
}

fn apply_agent_heartbeat(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &AgentHeartbeat,
) -> DbResult<Applied> {
    conn.execute(
        "UPDATE agents SET last_seen_ts = ?1 WHERE project_key = ?2 AND name = ?3",
        params![occurred_at, project_key, p.agent],
    )?;
    Ok(Applied::None)
}

fn apply_message_sent(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &MessageSent,
) -> DbResult<Applied> {
    conn.execute(
        "INSERT INTO messages (project_key, from_agent, subject, body, thread_id, \
         importance, ack_required, created_ts) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            project_key,
            p.from,
            p.subject,
            p.body,
            p.thread_id,
            p.importance,
            i64::from(p.ack_required),
            occurred_at
        ],
    )?;
    let message_id = conn.last_insert_rowid();

    // One recipient row per distinct `to` entry; duplicates collapse.
    for recipient in &p.to {
        conn.execute(
            "INSERT OR IGNORE INTO message_recipients (message_id, agent_name) VALUES (?1, ?2)",
            params![message_id, recipient],
        )?;
    }

    Ok(Applied::MessageId(message_id))
}

fn apply_message_read(conn: &Connection, occurred_at: i64, p: &MessageRead) -> DbResult<Applied> {
    conn.execute(
        "UPDATE message_recipients SET read_ts = ?1 \
         WHERE message_id = ?2 AND agent_name = ?3 AND read_ts IS NULL",
        params![occurred_at, p.message_id, p.agent],
    )?;
    Ok(Applied::None)
}

fn apply_message_acked(conn: &Connection, occurred_at: i64, p: &MessageAcked) -> DbResult<Applied> {
    // Acking implies reading: read_ts backfills if still null.
    conn.execute(
        "UPDATE message_recipients SET ack_ts = ?1, read_ts = COALESCE(read_ts, ?1) \
         WHERE message_id = ?2 AND agent_name = ?3 AND ack_ts IS NULL",
        params![occurred_at, p.message_id, p.agent],
    )?;
    Ok(Applied::None)
}

fn apply_file_reserved(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &FileReserved,
) -> DbResult<Applied> {
    let expires_ts = occurred_at.saturating_add(p.ttl_seconds.saturating_mul(1_000_000));
    let mut ids = Vec::with_capacity(p.paths.len());
    for path in &p.paths {
        conn.execute(
            "INSERT INTO file_reservations (project_key, agent_name, path_pattern, \
             exclusive, reason, created_ts, expires_ts, released_ts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
            params![
                project_key,
                p.agent,
                path,
                i64::from(p.exclusive),
                p.reason,
                occurred_at,
                expires_ts
            ],
        )?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(Applied::ReservationIds(ids))
}

fn apply_file_released(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &FileReleased,
) -> DbResult<Applied> {
    // Only active rows transition: a reservation that already expired stays
    // terminal in the Expired state.
    let mut sql = String::from(
        "UPDATE file_reservations SET released_ts = ? \
         WHERE project_key = ? AND agent_name = ? \
         AND released_ts IS NULL AND expires_ts > ?",
    );
    let mut values: Vec<Value> = vec![
        Value::Integer(occurred_at),
        Value::Text(project_key.to_string()),
        Value::Text(p.agent.clone()),
        Value::Integer(occurred_at),
    ];

    if let Some(ids) = &p.reservation_ids {
        sql.push_str(" AND id IN (");
        push_placeholders(&mut sql, ids.len());
        sql.push(')');
        values.extend(ids.iter().map(|id| Value::Integer(*id)));
    }

    if let Some(paths) = &p.paths {
        sql.push_str(" AND path_pattern IN (");
        push_placeholders(&mut sql, paths.len());
        sql.push(')');
        values.extend(paths.iter().map(|path| Value::Text(path.clone())));
    }

    let released = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(Applied::ReleasedCount(released))
}

fn apply_reservation_expired(
    conn: &Connection,
    project_key: &str,
    occurred_at: i64,
    p: &ReservationExpired,
) -> DbResult<Applied> {
    if p.reservation_ids.is_empty() {
        return Ok(Applied::ReleasedCount(0));
    }
    let mut sql = String::from(
        "UPDATE file_reservations SET released_ts = ? \
         WHERE project_key = ? AND released_ts IS NULL AND id IN (",
    );
    push_placeholders(&mut sql, p.reservation_ids.len());
    sql.push(')');

    let mut values: Vec<Value> = vec![
        Value::Integer(occurred_at),
        Value::Text(project_key.to_string()),
    ];
    values.extend(p.reservation_ids.iter().map(|id| Value::Integer(*id)));

    let released = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(Applied::ReleasedCount(released))
}

fn push_placeholders(sql: &mut String, count: usize) {
    for i in 0..count {
        if i > 0 {
            sql.push(',');
        }
        sql.push('?');
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Truncate all projection tables and rebuild them from the event log.
///
/// Events replay per project in `seq` order. Cursor rows are not
/// projections and survive untouched. Returns the number of events
/// replayed.
pub fn replay_in_conn(conn: &Connection) -> DbResult<usize> {
    conn.execute_batch(
        "DELETE FROM agents;\n\
         DELETE FROM messages;\n\
         DELETE FROM message_recipients;\n\
         DELETE FROM file_reservations;",
    )?;

    let mut stmt = conn.prepare(
        "SELECT project_key, seq, kind, payload, occurred_at \
         FROM events ORDER BY project_key, seq",
    )?;
    let rows: Vec<(String, i64, String, String, i64)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    let mut replayed = 0;
    for (project_key, seq, kind, payload, occurred_at) in rows {
        let kind = EventKind::parse(&kind).ok_or_else(|| {
            DbError::Internal(format!("unknown event kind '{kind}' at seq {seq}"))
        })?;
        let payload = EventPayload::from_kind_json(kind, &payload)?;
        apply_event(conn, &project_key, occurred_at, &payload)?;
        replayed += 1;
    }
    Ok(replayed)
}

/// Canonical text snapshot of all four projection tables.
///
/// Rows are dumped in a fixed order with a fixed format; two projections
/// are identical iff their digests compare equal.
pub fn projection_digest(conn: &Connection) -> DbResult<String> {
    let mut digest = String::new();

    let mut stmt = conn.prepare(
        "SELECT project_key, name, program, model, task_description, first_seen_ts, last_seen_ts \
         FROM agents ORDER BY project_key, name",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        digest.push_str(&format!(
            "agent|{}|{}|{}|{}|{}|{}|{}\n",
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
        ));
    }
    drop(rows);
    drop(stmt);

    let mut stmt = conn.prepare(
        "SELECT id, project_key, from_agent, subject, body, thread_id, importance, \
         ack_required, created_ts FROM messages ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        digest.push_str(&format!(
            "message|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            row.get::<_, String>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, i64>(8)?,
        ));
    }
    drop(rows);
    drop(stmt);

    let mut stmt = conn.prepare(
        "SELECT message_id, agent_name, read_ts, ack_ts \
         FROM message_recipients ORDER BY message_id, agent_name",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        digest.push_str(&format!(
            "recipient|{}|{}|{:?}|{:?}\n",
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<i64>>(3)?,
        ));
    }
    drop(rows);
    drop(stmt);

    let mut stmt = conn.prepare(
        "SELECT id, project_key, agent_name, path_pattern, exclusive, reason, \
         created_ts, expires_ts, released_ts FROM file_reservations ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        digest.push_str(&format!(
            "reservation|{}|{}|{}|{}|{}|{}|{}|{}|{:?}\n",
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, Option<i64>>(8)?,
        ));
    }

    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn registered(agent: &str) -> EventPayload {
        EventPayload::AgentRegistered(AgentRegistered {
            agent: agent.to_string(),
            program: "claude-code".to_string(),
            model: "opus".to_string(),
            task_description: String::new(),
        })
    }

    #[test]
    fn register_sets_first_seen_once() {
        let conn = test_conn();
        apply_event(&conn, "/p", 100, &registered("BlueLake")).unwrap();
        apply_event(&conn, "/p", 200, &registered("BlueLake")).unwrap();

        let (first, last): (i64, i64) = conn
            .query_row(
                "SELECT first_seen_ts, last_seen_ts FROM agents \
                 WHERE project_key = '/p' AND name = 'BlueLake'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(first, 100, "first_seen must survive re-registration");
        assert_eq!(last, 200);
    }

    #[test]
    fn message_sent_inserts_message_and_recipients() {
        let conn = test_conn();
        let payload = EventPayload::MessageSent(MessageSent {
            from: "BlueLake".into(),
            to: vec!["GreenRiver".into(), "GreenRiver".into(), "RedStone".into()],
            subject: "hello".into(),
            body: "world".into(),
            thread_id: None,
            importance: "normal".into(),
            ack_required: false,
        });
        let applied = apply_event(&conn, "/p", 100, &payload).unwrap();
        let Applied::MessageId(id) = applied else {
            panic!("expected MessageId, got {applied:?}");
        };

        let recipients: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM message_recipients WHERE message_id = ?1",
                [id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(recipients, 2, "duplicate recipients collapse");
    }

    #[test]
    fn ack_backfills_read_ts() {
        let conn = test_conn();
        let applied = apply_event(
            &conn,
            "/p",
            100,
            &EventPayload::MessageSent(MessageSent {
                from: "BlueLake".into(),
                to: vec!["GreenRiver".into()],
                subject: "s".into(),
                body: "b".into(),
                thread_id: None,
                importance: "normal".into(),
                ack_required: true,
            }),
        )
        .unwrap();
        let Applied::MessageId(id) = applied else {
            panic!()
        };

        apply_event(
            &conn,
            "/p",
            200,
            &EventPayload::MessageAcked(MessageAcked {
                message_id: id,
                agent: "GreenRiver".into(),
            }),
        )
        .unwrap();

        let (read_ts, ack_ts): (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT read_ts, ack_ts FROM message_recipients WHERE message_id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(read_ts, Some(200));
        assert_eq!(ack_ts, Some(200));
    }

    #[test]
    fn second_ack_is_a_no_op() {
        let conn = test_conn();
        let Applied::MessageId(id) = apply_event(
            &conn,
            "/p",
            100,
            &EventPayload::MessageSent(MessageSent {
                from: "A".into(),
                to: vec!["B".into()],
                subject: "s".into(),
                body: "b".into(),
                thread_id: None,
                importance: "normal".into(),
                ack_required: true,
            }),
        )
        .unwrap() else {
            panic!()
        };

        let ack = |ts: i64| {
            apply_event(
                &conn,
                "/p",
                ts,
                &EventPayload::MessageAcked(MessageAcked {
                    message_id: id,
                    agent: "B".into(),
                }),
            )
            .unwrap()
        };
        ack(200);
        ack(300);

        let ack_ts: Option<i64> = conn
            .query_row(
                "SELECT ack_ts FROM message_recipients WHERE message_id = ?1",
                [id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(ack_ts, Some(200), "re-ack must not move the timestamp");
    }

    #[test]
    fn release_skips_expired_rows() {
        let conn = test_conn();
        let Applied::ReservationIds(ids) = apply_event(
            &conn,
            "/p",
            100,
            &EventPayload::FileReserved(FileReserved {
                agent: "BlueLake".into(),
                paths: vec!["src/a.ts".into()],
                exclusive: true,
                reason: String::new(),
                ttl_seconds: 1,
            }),
        )
        .unwrap() else {
            panic!()
        };
        assert_eq!(ids.len(), 1);

        // Expiry is 100 + 1s; release at a later instant matches nothing.
        let Applied::ReleasedCount(n) = apply_event(
            &conn,
            "/p",
            100 + 2_000_000,
            &EventPayload::FileReleased(FileReleased {
                agent: "BlueLake".into(),
                paths: None,
                reservation_ids: None,
            }),
        )
        .unwrap() else {
            panic!()
        };
        assert_eq!(n, 0, "expired reservations stay terminal");
    }

    #[test]
    fn release_by_path_set() {
        let conn = test_conn();
        apply_event(
            &conn,
            "/p",
            100,
            &EventPayload::FileReserved(FileReserved {
                agent: "GreenRiver".into(),
                paths: vec!["src/a.ts".into(), "src/b.ts".into()],
                exclusive: true,
                reason: String::new(),
                ttl_seconds: 3600,
            }),
        )
        .unwrap();

        let release = |ts: i64| {
            let Applied::ReleasedCount(n) = apply_event(
                &conn,
                "/p",
                ts,
                &EventPayload::FileReleased(FileReleased {
                    agent: "GreenRiver".into(),
                    paths: Some(vec!["src/a.ts".into()]),
                    reservation_ids: None,
                }),
            )
            .unwrap() else {
                panic!()
            };
            n
        };
        assert_eq!(release(200), 1);
        assert_eq!(release(300), 0, "second release of same path matches nothing");
    }

    #[test]
    fn replay_reproduces_digest() {
        let conn = test_conn();
        let events: Vec<EventPayload> = vec![
            registered("BlueLake"),
            registered("GreenRiver"),
            EventPayload::MessageSent(MessageSent {
                from: "BlueLake".into(),
                to: vec!["GreenRiver".into()],
                subject: "hello".into(),
                body: "world".into(),
                thread_id: Some("T-1".into()),
                importance: "urgent".into(),
                ack_required: true,
            }),
            EventPayload::MessageRead(MessageRead {
                message_id: 1,
                agent: "GreenRiver".into(),
            }),
            EventPayload::FileReserved(FileReserved {
                agent: "BlueLake".into(),
                paths: vec!["src/a.ts".into(), "src/*.rs".into()],
                exclusive: true,
                reason: "editing".into(),
                ttl_seconds: 3600,
            }),
            EventPayload::FileReleased(FileReleased {
                agent: "BlueLake".into(),
                paths: Some(vec!["src/a.ts".into()]),
                reservation_ids: None,
            }),
        ];

        for (i, payload) in events.iter().enumerate() {
            let seq = i64::try_from(i).unwrap() + 1;
            let occurred_at = seq * 1_000_000;
            conn.execute(
                "INSERT INTO events (seq, project_key, kind, payload, occurred_at) \
                 VALUES (?1, '/p', ?2, ?3, ?4)",
                params![
                    seq,
                    payload.kind().as_str(),
                    payload.to_json().unwrap(),
                    occurred_at
                ],
            )
            .unwrap();
            apply_event(&conn, "/p", occurred_at, payload).unwrap();
        }

        let before = projection_digest(&conn).unwrap();
        assert!(!before.is_empty());

        let replayed = replay_in_conn(&conn).unwrap();
        assert_eq!(replayed, events.len());

        let after = projection_digest(&conn).unwrap();
        assert_eq!(before, after, "replay must be deterministic");
    }
}
