//! Chat events broadcast to observers
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ChatEvent: what changed, for whoever renders it                │
//! │  ├── LoggedIn / LoggedOut: active identity changed              │
//! │  ├── PollStatusChanged: relay became reachable/unreachable      │
//! │  ├── MessagesStored: rows written for one or more peers         │
//! │  ├── NewIncoming: a never-seen incoming message arrived         │
//! │  ├── Acknowledged: relay confirmed it may drop these ids        │
//! │  ├── MessageRead: an incoming message got its read mark         │
//! │  └── ContactsChanged: address book edited                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Observers re-query the store on an event rather than trusting the payload
//! as state; a lagging receiver loses events, never data.

use tokio::sync::broadcast;

/// Capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification that local state changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A keypair was installed as the active identity
    LoggedIn { public_key: String },
    /// The session was torn down (explicitly or after auth rejection)
    LoggedOut,
    /// Poll fetch started failing (`available = false`) or recovered
    PollStatusChanged { available: bool },
    /// Messages were written for these peers
    MessagesStored { peers: Vec<String>, count: usize },
    /// A new incoming message was persisted
    NewIncoming { id: String, sender: String },
    /// The relay accepted the acknowledgement for these ids
    Acknowledged { ids: Vec<String> },
    /// An incoming message was marked read
    MessageRead { id: String },
    /// A contact was added, renamed or removed
    ContactsChanged,
}

/// Create the shared event channel.
pub fn event_channel() -> broadcast::Sender<ChatEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Send an event, ignoring the no-subscriber case.
pub(crate) fn emit(tx: &broadcast::Sender<ChatEvent>, event: ChatEvent) {
    let _ = tx.send(event);
}
