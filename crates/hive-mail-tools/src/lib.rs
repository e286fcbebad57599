//! Public operation surface of the Hive Mail coordination substrate
//!
//! Every operation takes a project [`Store`], a cancellation token, and a
//! typed request; it returns a typed serde response. Writers append domain
//! events whose projections update in the same transaction; readers query
//! the projections directly.
//!
//! The in-memory vs persistent choice is made once, at `Store`
//! construction — operations never select an adapter per call.
//!
//! [`Store`]: hive_mail_db::Store

#![forbid(unsafe_code)]

pub mod admin;
pub mod identity;
pub mod messaging;
pub mod reservations;

pub use admin::{AgentView, HealthResponse, check_health, get_stats, list_agents, reset_project};
pub use identity::{AgentContext, InitAgent, heartbeat, init_agent};
pub use messaging::{
    AckResponse, GetInbox, GetThread, INBOX_HARD_CAP, InboxMessage, InboxResponse, MessageView,
    ReadMessage, ReplyMessage, SendMessage, SendMessageResponse, ThreadMessage, ThreadResponse,
    acknowledge_message, get_inbox, get_thread, read_message, reply_message, send_message,
};
pub use reservations::{
    GrantedReservation, ReleaseFiles, ReleaseFilesResponse, ReservationConflict, ReservationView,
    ReserveFiles, ReserveFilesResponse, list_reservations, release_files, reserve_files,
};
