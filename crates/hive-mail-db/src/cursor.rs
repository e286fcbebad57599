//! Persistent per-consumer cursors over the event log
//!
//! A cursor is a committed offset: `next_batch` always reads from the last
//! *committed* position, so a consumer that crashes between reading and
//! committing re-reads the same events on restart (at-least-once delivery).
//! Commit is idempotent and monotonic — committing an older offset is a
//! no-op.

use hive_mail_core::events::EventRecord;
use hive_mail_core::models::CursorState;
use rusqlite::{OptionalExtension, params};
use tokio_util::sync::CancellationToken;

use crate::adapter::Db;
use crate::error::DbResult;
use crate::log;

/// A positioned consumer over one project's event log.
#[derive(Debug)]
pub struct Cursor {
    state: CursorState,
}

impl Cursor {
    /// Open (or resume) the cursor for `consumer_id` in `project_key`.
    ///
    /// An unknown consumer starts at offset 0; nothing is persisted until
    /// the first commit.
    pub async fn open(
        db: &Db,
        cancel: &CancellationToken,
        project_key: &str,
        consumer_id: &str,
    ) -> DbResult<Self> {
        let last_seq = db
            .with_conn(cancel, |conn| {
                let seq: Option<i64> = conn
                    .query_row(
                        "SELECT last_seq FROM cursors \
                         WHERE project_key = ?1 AND consumer_id = ?2",
                        params![project_key, consumer_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(seq.unwrap_or(0))
            })
            .await?;

        Ok(Self {
            state: CursorState {
                project_key: project_key.to_string(),
                consumer_id: consumer_id.to_string(),
                last_seq,
            },
        })
    }

    /// The last committed offset.
    #[must_use]
    pub const fn position(&self) -> i64 {
        self.state.last_seq
    }

    /// The persisted state row this cursor mirrors.
    #[must_use]
    pub const fn state(&self) -> &CursorState {
        &self.state
    }

    /// Events with `seq` past the committed offset, plus the new offset to
    /// commit once they are processed.
    pub async fn next_batch(
        &self,
        db: &Db,
        cancel: &CancellationToken,
        limit: usize,
    ) -> DbResult<(Vec<EventRecord>, i64)> {
        let events =
            log::scan_events(db, cancel, &self.state.project_key, self.state.last_seq, limit)
                .await?;
        let new_offset = events.last().map_or(self.state.last_seq, |e| e.seq);
        Ok((events, new_offset))
    }

    /// Recipient-filtered variant for inbox draining: only `message_sent`
    /// events addressed to `agent`.
    pub async fn next_batch_for_recipient(
        &self,
        db: &Db,
        cancel: &CancellationToken,
        agent: &str,
        limit: usize,
    ) -> DbResult<(Vec<EventRecord>, i64)> {
        let events = log::scan_events_for_recipient(
            db,
            cancel,
            &self.state.project_key,
            agent,
            self.state.last_seq,
            limit,
        )
        .await?;
        let new_offset = events.last().map_or(self.state.last_seq, |e| e.seq);
        Ok((events, new_offset))
    }

    /// Persist `offset` as the committed position.
    ///
    /// Monotonic: an offset at or below the committed position changes
    /// nothing, in memory or on disk.
    pub async fn commit(
        &mut self,
        db: &Db,
        cancel: &CancellationToken,
        offset: i64,
    ) -> DbResult<()> {
        db.with_conn(cancel, |conn| {
            conn.execute(
                "INSERT INTO cursors (project_key, consumer_id, last_seq) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(project_key, consumer_id) DO UPDATE SET \
                 last_seq = MAX(last_seq, excluded.last_seq)",
                params![self.state.project_key, self.state.consumer_id, offset],
            )?;
            Ok(())
        })
        .await?;
        self.state.last_seq = self.state.last_seq.max(offset);
        Ok(())
    }
}
