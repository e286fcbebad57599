//! Core types for the Hive Mail coordination substrate
//!
//! This crate provides:
//! - Data models (`Agent`, `Message`, `FileReservation`, etc.)
//! - The event vocabulary driving the append-only log
//! - Agent name generation and validation
//! - Reservation path-pattern overlap semantics
//! - Common error types

#![forbid(unsafe_code)]

pub mod error;
pub mod events;
pub mod models;
pub mod names;
pub mod pattern_overlap;

pub use error::{Error, Result};
pub use events::{
    AgentHeartbeat, AgentRegistered, EventKind, EventPayload, EventRecord, FileReleased,
    FileReserved, MessageAcked, MessageRead, MessageSent, ReservationExpired,
};
pub use models::{
    Agent, CursorState, FileReservation, Importance, Message, MessageRecipient,
    is_valid_thread_id,
};
pub use names::{
    ADJECTIVES, NOUNS, generate_agent_name, is_valid_agent_name, sanitize_agent_name,
};
pub use pattern_overlap::{CompiledPattern, patterns_overlap};
