//! Event vocabulary for the append-only log
//!
//! Eight domain event kinds drive every projection table. Payloads carry
//! everything a projector needs so that projection updates are pure over
//! `(event, current projection state)` — in particular, projectors take
//! their timestamps from the event record, never from the wall clock, which
//! is what makes log replay deterministic.

use serde::{Deserialize, Serialize};

/// The kind tag of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentRegistered,
    AgentHeartbeat,
    MessageSent,
    MessageRead,
    MessageAcked,
    FileReserved,
    FileReleased,
    ReservationExpired,
}

impl EventKind {
    /// The canonical string stored in the `events.kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentRegistered => "agent_registered",
            Self::AgentHeartbeat => "agent_heartbeat",
            Self::MessageSent => "message_sent",
            Self::MessageRead => "message_read",
            Self::MessageAcked => "message_acked",
            Self::FileReserved => "file_reserved",
            Self::FileReleased => "file_released",
            Self::ReservationExpired => "reservation_expired",
        }
    }

    /// Parse the column form back into a kind.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "agent_registered" => Some(Self::AgentRegistered),
            "agent_heartbeat" => Some(Self::AgentHeartbeat),
            "message_sent" => Some(Self::MessageSent),
            "message_read" => Some(Self::MessageRead),
            "message_acked" => Some(Self::MessageAcked),
            "file_reserved" => Some(Self::FileReserved),
            "file_released" => Some(Self::FileReleased),
            "reservation_expired" => Some(Self::ReservationExpired),
            _ => None,
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Payload of `agent_registered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistered {
    pub agent: String,
    pub program: String,
    pub model: String,
    #[serde(default)]
    pub task_description: String,
}

/// Payload of `agent_heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub agent: String,
}

/// Payload of `message_sent`.
///
/// The projection id of the inserted message is assigned at apply time; the
/// payload deliberately does not carry one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSent {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub importance: String,
    #[serde(default)]
    pub ack_required: bool,
}

/// Payload of `message_read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRead {
    pub message_id: i64,
    pub agent: String,
}

/// Payload of `message_acked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAcked {
    pub message_id: i64,
    pub agent: String,
}

/// Payload of `file_reserved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReserved {
    pub agent: String,
    pub paths: Vec<String>,
    pub exclusive: bool,
    #[serde(default)]
    pub reason: String,
    pub ttl_seconds: i64,
}

/// Payload of `file_released`.
///
/// Match selection: by id set, by path set, or all of the agent's active
/// reservations when neither is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReleased {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_ids: Option<Vec<i64>>,
}

/// Payload of `reservation_expired`.
///
/// Never emitted by this implementation (expiry is evaluated at query time);
/// kept in the vocabulary so logs from compacting writers replay cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationExpired {
    pub reservation_ids: Vec<i64>,
}

// =============================================================================
// Envelope
// =============================================================================

/// A typed event payload, one variant per kind.
#[derive(Debug, Clone)]
pub enum EventPayload {
    AgentRegistered(AgentRegistered),
    AgentHeartbeat(AgentHeartbeat),
    MessageSent(MessageSent),
    MessageRead(MessageRead),
    MessageAcked(MessageAcked),
    FileReserved(FileReserved),
    FileReleased(FileReleased),
    ReservationExpired(ReservationExpired),
}

impl EventPayload {
    /// The kind tag for this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::AgentRegistered(_) => EventKind::AgentRegistered,
            Self::AgentHeartbeat(_) => EventKind::AgentHeartbeat,
            Self::MessageSent(_) => EventKind::MessageSent,
            Self::MessageRead(_) => EventKind::MessageRead,
            Self::MessageAcked(_) => EventKind::MessageAcked,
            Self::FileReserved(_) => EventKind::FileReserved,
            Self::FileReleased(_) => EventKind::FileReleased,
            Self::ReservationExpired(_) => EventKind::ReservationExpired,
        }
    }

    /// Serialize the payload body for the `events.payload` column.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::AgentRegistered(p) => serde_json::to_string(p),
            Self::AgentHeartbeat(p) => serde_json::to_string(p),
            Self::MessageSent(p) => serde_json::to_string(p),
            Self::MessageRead(p) => serde_json::to_string(p),
            Self::MessageAcked(p) => serde_json::to_string(p),
            Self::FileReserved(p) => serde_json::to_string(p),
            Self::FileReleased(p) => serde_json::to_string(p),
            Self::ReservationExpired(p) => serde_json::to_string(p),
        }
    }

    /// Decode a payload column for the given kind tag.
    pub fn from_kind_json(kind: EventKind, json: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            EventKind::AgentRegistered => Self::AgentRegistered(serde_json::from_str(json)?),
            EventKind::AgentHeartbeat => Self::AgentHeartbeat(serde_json::from_str(json)?),
            EventKind::MessageSent => Self::MessageSent(serde_json::from_str(json)?),
            EventKind::MessageRead => Self::MessageRead(serde_json::from_str(json)?),
            EventKind::MessageAcked => Self::MessageAcked(serde_json::from_str(json)?),
            EventKind::FileReserved => Self::FileReserved(serde_json::from_str(json)?),
            EventKind::FileReleased => Self::FileReleased(serde_json::from_str(json)?),
            EventKind::ReservationExpired => Self::ReservationExpired(serde_json::from_str(json)?),
        })
    }

    /// Names of agents this payload touches, for `last_seen` bookkeeping.
    ///
    /// The acting agent comes first; message recipients follow.
    #[must_use]
    pub fn agent_names(&self) -> Vec<&str> {
        match self {
            Self::AgentRegistered(p) => vec![p.agent.as_str()],
            Self::AgentHeartbeat(p) => vec![p.agent.as_str()],
            Self::MessageSent(p) => {
                let mut names = vec![p.from.as_str()];
                names.extend(p.to.iter().map(String::as_str));
                names
            }
            Self::MessageRead(p) => vec![p.agent.as_str()],
            Self::MessageAcked(p) => vec![p.agent.as_str()],
            Self::FileReserved(p) => vec![p.agent.as_str()],
            Self::FileReleased(p) => vec![p.agent.as_str()],
            Self::ReservationExpired(_) => Vec::new(),
        }
    }
}

/// An immutable record in a project's append-only log.
///
/// `seq` is strictly monotonic per project and assigned at append. Events
/// for one project are totally ordered; cross-project ordering is
/// unspecified.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub seq: i64,
    pub project_key: String,
    pub payload: EventPayload,
    pub occurred_at: i64,
}

impl EventRecord {
    /// The kind tag of this record's payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
