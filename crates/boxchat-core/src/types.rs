//! Core types for BoxChat

pub mod contact;
pub mod message;

pub use contact::Contact;
pub use message::{Direction, IncomingMessage, OutgoingDraft, OutgoingMessage, StoredMessage};

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
