//! Chat sessions
//!
//! A session is an append-only log of messages. `history` holds the persistence
//! operations, `service` the per-mode turn flows built on the generation engine.

pub mod history;
pub mod service;

pub use history::{MessageWithAttachments, SessionDetail, DEFAULT_TITLE};
pub use service::{ChatService, ChatTurn};
