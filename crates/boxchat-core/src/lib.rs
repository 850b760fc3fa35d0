//! BoxChat Core Library
//!
//! Local-first, end-to-end encrypted one-to-one chat over a store-and-forward
//! relay.
//!
//! ## Overview
//!
//! An account is an Ed25519 keypair derived from a 24-word BIP-39 phrase.
//! Messages are sealed with a public-key box for the recipient before they
//! leave the device. The relay only queues ciphertext until the recipient
//! fetches and acknowledges it; the local store is the source of truth.
//!
//! ## Core Principles
//!
//! - **Local-first**: conversations and contacts live in an embedded redb file
//! - **Relay as mailbox**: polled, drained, acknowledged, forgotten
//! - **Persist before acknowledge**: a crash never loses a message
//!
//! ## Quick Start
//!
//! ```ignore
//! use boxchat_core::{ClientConfig, Messenger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let messenger = Messenger::open("~/.boxchat", ClientConfig::default())?;
//!     messenger.login("abandon abandon ... art").await?;
//!     messenger.start();
//!
//!     messenger.add_or_rename_contact(&peer_hex, "Alice")?;
//!     messenger.send_message("hello").await?;
//!
//!     for contact in messenger.contacts()? {
//!         println!("{} ({} unread)", contact.name, contact.unread);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod identity;
pub mod logging;
pub mod messenger;
pub mod relay;
pub mod storage;
pub mod sync;
pub mod types;

// Re-exports
pub use auth::AuthSession;
pub use config::ClientConfig;
pub use directory::{ContactDirectory, ContactSummary, MessagePreview};
pub use error::{ChatError, ChatResult};
pub use identity::{derive_keypair, generate_seed, validate_seed, KeyPair, PublicKeyHex};
pub use messenger::Messenger;
pub use relay::{HttpRelay, RelayApi, RelayError};
pub use storage::{LoadMessagesParams, Storage};
pub use sync::{ChatEvent, CycleReport, Poller, ReadTracker, SyncEngine};
pub use types::*;
