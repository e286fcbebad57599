//! Storage layer for the Hive Mail coordination substrate
//!
//! This crate provides:
//! - The database adapter over embedded `SQLite` (persistent + in-memory)
//! - The append-only event log with same-transaction projection updates
//! - Materialized read models (agents, messages, recipients, reservations)
//! - Persistent per-consumer cursors
//! - Per-project stores and a bounded store cache
//!
//! # Timestamp Convention
//!
//! All timestamps are stored as `i64` microseconds since the Unix epoch.
//! Helpers in [`timestamps`] convert to/from `chrono` types and ISO-8601.

#![forbid(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod cursor;
pub mod error;
pub mod log;
pub mod projections;
pub mod queries;
pub mod schema;
pub mod store;
pub mod timestamps;

pub use adapter::Db;
pub use config::StoreConfig;
pub use cursor::Cursor;
pub use error::{DbError, DbResult};
pub use log::{AppendOutcome, append_event, append_in_conn, scan_events, scan_events_for_recipient};
pub use projections::{Applied, apply_event, projection_digest, replay_in_conn};
pub use queries::{InboxEntry, StoreStats};
pub use store::{Store, StoreCache};
pub use timestamps::{micros_to_iso, micros_to_naive, naive_to_micros, now_micros};

// Re-export the SQL driver so callers composing in-transaction closures can
// name the connection type without a direct dependency.
pub use rusqlite;
