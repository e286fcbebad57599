//! Mailbox operations
//!
//! Multi-recipient send, capped inbox fetches, per-recipient read/ack, and
//! threading. The inbox hard cap is the substrate's backpressure device: no
//! call delivers more than [`INBOX_HARD_CAP`] messages, whatever limit the
//! caller asks for.

use hive_mail_core::events::{EventPayload, MessageAcked, MessageRead, MessageSent};
use hive_mail_core::models::{Importance, Message, MessageRecipient};
use hive_mail_core::{Error, Result, is_valid_thread_id};
use hive_mail_db::{Applied, Store, log, micros_to_iso, now_micros, queries};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Fixed upper bound on inbox fetch size.
pub const INBOX_HARD_CAP: usize = 5;

/// Subjects longer than this are truncated at send time.
const MAX_SUBJECT_CHARS: usize = 200;

// =============================================================================
// Requests / responses
// =============================================================================

/// Send request. `importance` defaults to `normal`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub ack_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub recipient_count: usize,
}

/// Inbox fetch request. `limit` is clamped to [`INBOX_HARD_CAP`].
#[derive(Debug, Clone, Deserialize)]
pub struct GetInbox {
    pub agent: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub urgent_only: bool,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub include_bodies: bool,
}

/// Inbox entry: headers are always present, the body only on request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: i64,
    pub from: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub importance: String,
    pub ack_required: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxResponse {
    pub messages: Vec<InboxMessage>,
    /// Matching rows before the cap; tells the consumer how much remains.
    pub total: usize,
}

/// Single-message read request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadMessage {
    pub message_id: i64,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub mark_as_read: bool,
}

/// Full message view, including body and the caller's delivery state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub importance: String,
    pub ack_required: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub message_id: i64,
    pub acknowledged: bool,
    pub acknowledged_at: String,
}

/// Reply request: recipients, thread, and subject derive from the original.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMessage {
    pub message_id: i64,
    pub from: String,
    pub body: String,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub ack_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetThread {
    pub thread_id: String,
    #[serde(default)]
    pub include_bodies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: i64,
    pub from: String,
    pub subject: String,
    pub importance: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub messages: Vec<ThreadMessage>,
}

// =============================================================================
// Validation helpers
// =============================================================================

fn validate_importance(importance: Option<String>) -> Result<String> {
    let value = importance.unwrap_or_else(|| Importance::Normal.as_str().to_string());
    Importance::parse(&value)
        .map(|level| level.as_str().to_string())
        .ok_or(Error::InvalidImportance(value))
}

fn normalize_thread_id(thread_id: Option<String>) -> Result<Option<String>> {
    let thread_id = thread_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(tid) = &thread_id {
        if !is_valid_thread_id(tid) {
            return Err(Error::InvalidThreadId(tid.clone()));
        }
    }
    Ok(thread_id)
}

fn truncate_subject(subject: String) -> String {
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        tracing::warn!(
            chars = subject.chars().count(),
            "subject exceeds {MAX_SUBJECT_CHARS} characters; truncating"
        );
        subject.chars().take(MAX_SUBJECT_CHARS).collect()
    } else {
        subject
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Send a message to one or more recipients, emitting `message_sent`.
///
/// The returned id is assigned inside the append transaction; there is no
/// read-back race against concurrent senders.
pub async fn send_message(
    store: &Store,
    cancel: &CancellationToken,
    req: SendMessage,
) -> Result<SendMessageResponse> {
    if req.to.is_empty() {
        return Err(Error::MissingField("to".into()));
    }
    let importance = validate_importance(req.importance)?;
    let thread_id = normalize_thread_id(req.thread_id)?;
    let subject = truncate_subject(req.subject);

    let mut to = req.to;
    to.sort_unstable();
    to.dedup();
    let recipient_count = to.len();

    let payload = EventPayload::MessageSent(MessageSent {
        from: req.from,
        to,
        subject,
        body: req.body,
        thread_id: thread_id.clone(),
        importance,
        ack_required: req.ack_required,
    });
    let outcome = log::append_event(store.db(), cancel, store.project_key(), payload).await?;
    let Applied::MessageId(message_id) = outcome.applied else {
        return Err(Error::Storage("send did not assign a message id".into()));
    };

    Ok(SendMessageResponse {
        message_id,
        thread_id,
        recipient_count,
    })
}

fn inbox_message(entry: queries::InboxEntry, include_bodies: bool) -> InboxMessage {
    let queries::InboxEntry { message, recipient } = entry;
    InboxMessage {
        id: message.id.unwrap_or_default(),
        from: message.from_agent,
        subject: message.subject,
        thread_id: message.thread_id,
        importance: message.importance,
        ack_required: message.ack_required,
        created_at: micros_to_iso(message.created_ts),
        read_at: recipient.read_ts.map(micros_to_iso),
        acked_at: recipient.ack_ts.map(micros_to_iso),
        body: include_bodies.then_some(message.body),
    }
}

/// Fetch an agent's inbox, newest first, hard-capped at
/// [`INBOX_HARD_CAP`] messages per call.
pub async fn get_inbox(
    store: &Store,
    cancel: &CancellationToken,
    req: GetInbox,
) -> Result<InboxResponse> {
    let GetInbox {
        agent,
        limit,
        urgent_only,
        unread_only,
        include_bodies,
    } = req;
    let limit = limit.unwrap_or(INBOX_HARD_CAP).min(INBOX_HARD_CAP);
    let project_key = store.project_key().to_string();

    let (entries, total) = store
        .db()
        .with_conn(cancel, move |conn| {
            let entries = queries::fetch_inbox(
                conn,
                &project_key,
                &agent,
                urgent_only,
                unread_only,
                limit,
            )?;
            let total =
                queries::count_inbox(conn, &project_key, &agent, urgent_only, unread_only)?;
            Ok((entries, total))
        })
        .await?;

    Ok(InboxResponse {
        messages: entries
            .into_iter()
            .map(|entry| inbox_message(entry, include_bodies))
            .collect(),
        total,
    })
}

fn message_view(
    message: Message,
    recipients: &[MessageRecipient],
    caller: Option<&MessageRecipient>,
) -> MessageView {
    MessageView {
        id: message.id.unwrap_or_default(),
        from: message.from_agent,
        to: recipients.iter().map(|r| r.agent_name.clone()).collect(),
        subject: message.subject,
        body: message.body,
        thread_id: message.thread_id,
        importance: message.importance,
        ack_required: message.ack_required,
        created_at: micros_to_iso(message.created_ts),
        read_at: caller.and_then(|r| r.read_ts).map(micros_to_iso),
        acked_at: caller.and_then(|r| r.ack_ts).map(micros_to_iso),
    }
}

/// Read one message, optionally marking it read for `agent`.
///
/// Returns `None` for an unknown id, and for an `agent` the message was
/// never addressed to — recipient isolation is a read-side `null`, not an
/// error.
pub async fn read_message(
    store: &Store,
    cancel: &CancellationToken,
    req: ReadMessage,
) -> Result<Option<MessageView>> {
    let project_key = store.project_key().to_string();
    let marking = req.mark_as_read && req.agent.is_some();

    let run = move |conn: &hive_mail_db::rusqlite::Connection| -> hive_mail_db::DbResult<Option<MessageView>> {
        let Some(message) = queries::get_message(conn, &project_key, req.message_id)? else {
            return Ok(None);
        };
        let recipients = queries::list_recipients(conn, req.message_id)?;

        let mut caller_state = None;
        if let Some(agent) = &req.agent {
            let Some(mut recipient) = queries::get_recipient(conn, req.message_id, agent)? else {
                return Ok(None);
            };
            if req.mark_as_read && recipient.read_ts.is_none() {
                let occurred_at = now_micros();
                log::append_in_conn(
                    conn,
                    &project_key,
                    &EventPayload::MessageRead(MessageRead {
                        message_id: req.message_id,
                        agent: agent.clone(),
                    }),
                    occurred_at,
                )?;
                recipient.read_ts = Some(occurred_at);
            }
            caller_state = Some(recipient);
        }

        Ok(Some(message_view(message, &recipients, caller_state.as_ref())))
    };

    let view = if marking {
        store.db().transaction(cancel, run).await?
    } else {
        store.db().with_conn(cancel, run).await?
    };
    Ok(view)
}

/// Acknowledge a message, emitting `message_acked`.
///
/// Idempotent: acknowledging twice returns the original timestamp and
/// appends nothing.
pub async fn acknowledge_message(
    store: &Store,
    cancel: &CancellationToken,
    message_id: i64,
    agent: &str,
) -> Result<AckResponse> {
    let project_key = store.project_key().to_string();
    let agent_name = agent.to_string();

    let acked_at = store
        .db()
        .transaction(cancel, move |conn| {
            if queries::get_message(conn, &project_key, message_id)?.is_none() {
                return Err(hive_mail_db::DbError::not_found(
                    "message",
                    message_id.to_string(),
                ));
            }
            let Some(recipient) = queries::get_recipient(conn, message_id, &agent_name)? else {
                return Err(hive_mail_db::DbError::not_found("recipient", agent_name));
            };

            if let Some(existing) = recipient.ack_ts {
                return Ok(existing);
            }

            let occurred_at = now_micros();
            log::append_in_conn(
                conn,
                &project_key,
                &EventPayload::MessageAcked(MessageAcked {
                    message_id,
                    agent: agent_name,
                }),
                occurred_at,
            )?;
            Ok(occurred_at)
        })
        .await
        .map_err(|e| match e {
            hive_mail_db::DbError::NotFound {
                entity: "message", ..
            } => Error::MessageNotFound(message_id),
            hive_mail_db::DbError::NotFound { identifier, .. } => Error::AgentNotFound(identifier),
            other => other.into(),
        })?;

    Ok(AckResponse {
        message_id,
        acknowledged: true,
        acknowledged_at: micros_to_iso(acked_at),
    })
}

/// Prepend `"Re: "` exactly once.
fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re: ") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Reply to a message: the original sender (plus the other recipients)
/// receive it, on the original thread or one derived from the message id.
pub async fn reply_message(
    store: &Store,
    cancel: &CancellationToken,
    req: ReplyMessage,
) -> Result<SendMessageResponse> {
    let importance = validate_importance(req.importance)?;
    let project_key = store.project_key().to_string();
    let reply_to = req.message_id;

    let (outcome, thread_id, recipient_count) = store
        .db()
        .transaction(cancel, move |conn| {
            let Some(original) = queries::get_message(conn, &project_key, req.message_id)? else {
                return Err(hive_mail_db::DbError::not_found(
                    "message",
                    req.message_id.to_string(),
                ));
            };

            let mut to: Vec<String> = vec![original.from_agent.clone()];
            to.extend(
                queries::list_recipients(conn, req.message_id)?
                    .into_iter()
                    .map(|r| r.agent_name),
            );
            to.sort_unstable();
            to.dedup();
            to.retain(|name| *name != req.from);
            if to.is_empty() {
                // Self-reply on a self-addressed message: deliver to sender.
                to.push(req.from.clone());
            }
            let recipient_count = to.len();

            let thread_id = original
                .thread_id
                .clone()
                .unwrap_or_else(|| format!("msg-{}", req.message_id));

            let payload = EventPayload::MessageSent(MessageSent {
                from: req.from,
                to,
                subject: reply_subject(&original.subject),
                body: req.body,
                thread_id: Some(thread_id.clone()),
                importance,
                ack_required: req.ack_required,
            });
            let outcome = log::append_in_conn(conn, &project_key, &payload, now_micros())?;
            Ok((outcome, thread_id, recipient_count))
        })
        .await
        .map_err(|e| match e {
            hive_mail_db::DbError::NotFound {
                entity: "message", ..
            } => Error::MessageNotFound(reply_to),
            other => other.into(),
        })?;

    let Applied::MessageId(message_id) = outcome.applied else {
        return Err(Error::Storage("reply did not assign a message id".into()));
    };
    Ok(SendMessageResponse {
        message_id,
        thread_id: Some(thread_id),
        recipient_count,
    })
}

/// All messages on a thread, oldest first.
pub async fn get_thread(
    store: &Store,
    cancel: &CancellationToken,
    req: GetThread,
) -> Result<ThreadResponse> {
    let thread_id = normalize_thread_id(Some(req.thread_id))?
        .ok_or_else(|| Error::MissingField("thread_id".into()))?;
    let project_key = store.project_key().to_string();
    let lookup = thread_id.clone();

    let messages = store
        .db()
        .with_conn(cancel, move |conn| {
            queries::list_thread(conn, &project_key, &lookup)
        })
        .await?;

    Ok(ThreadResponse {
        thread_id,
        messages: messages
            .into_iter()
            .map(|m| ThreadMessage {
                id: m.id.unwrap_or_default(),
                from: m.from_agent,
                subject: m.subject,
                importance: m.importance,
                created_at: micros_to_iso(m.created_ts),
                body: req.include_bodies.then_some(m.body),
            })
            .collect(),
    })
}
