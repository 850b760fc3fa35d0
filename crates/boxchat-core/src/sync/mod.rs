//! Relay synchronization layer
//!
//! ## Overview
//!
//! The local store is authoritative. The relay is a mailbox that is polled,
//! drained into the store, and told which ids it may forget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Poller (fixed delay, restarted after each cycle)               │
//! │  └── SyncEngine::run_cycle (at most one in flight)              │
//! │      ├── AuthSession::call (token, single-flight refresh)       │
//! │      ├── Storage (filter_known_ids, add_messages, marks)        │
//! │      └── ChatEvent broadcast                                    │
//! │                                                                 │
//! │  SyncEngine::send_message (immediate, no background resend)     │
//! │                                                                 │
//! │  ReadTracker (dwell timers) ──► read ids ──► Storage            │
//! │  merge_messages (ascending, idempotent conversation view)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A message is acknowledged only after it is persisted.
//! - Every fetched id is stored at most once and acknowledged at most once
//!   per cycle.
//! - Results from an identity that logged out mid-cycle are discarded.

pub mod engine;
pub mod events;
pub mod merge;
pub mod poller;
pub mod read_tracker;

pub use engine::{CycleReport, SyncEngine};
pub use events::{event_channel, ChatEvent, EVENT_CHANNEL_CAPACITY};
pub use merge::merge_messages;
pub use poller::Poller;
pub use read_tracker::ReadTracker;
