//! Data models for the Hive Mail coordination substrate
//!
//! These models mirror the projection tables one-to-one. All timestamps are
//! `i64` microseconds since the Unix epoch (naive UTC); conversion helpers
//! live in the db crate.

use serde::{Deserialize, Serialize};

// =============================================================================
// Agent
// =============================================================================

/// An agent registered in a project.
///
/// # Constraints
/// - Unique: `(project_key, name)` — names are unique per project.
/// - `first_seen` is set by `agent_registered` and never changes.
/// - `last_seen` advances with every event whose payload names the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub project_key: String,
    pub name: String,
    pub program: String,
    pub model: String,
    pub task_description: String,
    pub first_seen_ts: i64,
    pub last_seen_ts: i64,
}

// =============================================================================
// Message
// =============================================================================

/// A message sent between agents.
///
/// # Constraints
/// - `id` is assigned at insertion into the projection; it is NOT the event
///   sequence number.
/// - Immutable once written.
/// - `thread_id` is an opaque sender-chosen string, indexed but not
///   interpreted. Pattern: `^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$`.
/// - `importance`: "low" | "normal" | "high" | "urgent"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub project_key: String,
    pub from_agent: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub importance: String,
    pub ack_required: bool,
    pub created_ts: i64,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: None,
            project_key: String::new(),
            from_agent: String::new(),
            subject: String::new(),
            body: String::new(),
            thread_id: None,
            importance: Importance::Normal.as_str().to_string(),
            ack_required: false,
            created_ts: 0,
        }
    }
}

// =============================================================================
// MessageRecipient
// =============================================================================

/// Per-recipient delivery state for a message.
///
/// # Constraints
/// - Composite key `(message_id, agent_name)`.
/// - Every message has at least one recipient row.
/// - `read_ts <= ack_ts` when both are set (acking implies reading).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRecipient {
    pub message_id: i64,
    pub agent_name: String,
    pub read_ts: Option<i64>,
    pub ack_ts: Option<i64>,
}

// =============================================================================
// FileReservation
// =============================================================================

/// An advisory, TTL-bounded claim over a file path or glob pattern.
///
/// Active iff `released_ts IS NULL AND expires_ts > now`. Expired rows are
/// kept for audit and excluded from active queries. The two terminal
/// transitions are `Active -> Released` (explicit) and `Active -> Expired`
/// (TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReservation {
    pub id: Option<i64>,
    pub project_key: String,
    pub agent_name: String,
    pub path_pattern: String,
    pub exclusive: bool,
    pub reason: String,
    pub created_ts: i64,
    pub expires_ts: i64,
    pub released_ts: Option<i64>,
}

impl FileReservation {
    /// Whether the reservation is active at the given instant.
    #[must_use]
    pub const fn is_active_at(&self, now_us: i64) -> bool {
        self.released_ts.is_none() && self.expires_ts > now_us
    }
}

// =============================================================================
// CursorState
// =============================================================================

/// Persistent per-consumer offset over a project's event log.
///
/// Advanced monotonically by `commit`; a consumer that crashes before
/// committing re-reads from its last committed offset (at-least-once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorState {
    pub project_key: String,
    pub consumer_id: String,
    pub last_seq: i64,
}

// =============================================================================
// Importance
// =============================================================================

/// Message importance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Normal,
    High,
    Urgent,
}

impl Importance {
    /// The canonical lowercase label stored in rows and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Parse a label; any other value is rejected.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Whether this level passes the `urgent_only` inbox filter.
    ///
    /// The filter admits both `high` and `urgent`.
    #[must_use]
    pub const fn is_high_or_urgent(self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

// =============================================================================
// Thread ID Validation
// =============================================================================

/// Validate a sender-chosen thread id.
///
/// Thread ids are opaque to the substrate but syntactically bounded: max 128
/// chars, first char alphanumeric, rest alphanumeric or `.`, `_`, `-`.
#[must_use]
pub fn is_valid_thread_id(thread_id: &str) -> bool {
    let mut chars = thread_id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    if thread_id.len() > 128 {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}
