//! Persistent storage using redb.
//!
//! This module is the single source of truth for:
//! - Contacts (owner-scoped address book, with a case-folded name index)
//! - Messages (ciphertext only, indexed per conversation by time)
//!
//! ```text
//! contacts            (owner, id)                    -> Contact
//! contacts_by_name    (owner, name_lower, id)        -> ()
//! messages            id                             -> StoredMessage
//! conversations       (owner, peer, created_at, id)  -> ()
//! peers               (owner, peer)                  -> message count
//! ```
//!
//! Every write runs in a single redb transaction, so the indexes can never
//! disagree with the primary tables.

use crate::error::ChatResult;
use parking_lot::RwLock;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

// Submodules
mod contacts;
mod messages;

use contacts::{CONTACTS_TABLE, CONTACT_NAME_INDEX};
use messages::{CONVERSATION_INDEX, MESSAGES_TABLE, PEER_INDEX};

pub use messages::LoadMessagesParams;

/// File name of the database inside the data directory
pub const DATABASE_FILE: &str = "boxchat.redb";

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn new(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CONTACTS_TABLE)?;
            let _ = write_txn.open_table(CONTACT_NAME_INDEX)?;
            let _ = write_txn.open_table(MESSAGES_TABLE)?;
            let _ = write_txn.open_table(CONVERSATION_INDEX)?;
            let _ = write_txn.open_table(PEER_INDEX)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "opened message store");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Open the database file inside `data_dir`.
    pub fn open_in(data_dir: impl AsRef<Path>) -> ChatResult<Self> {
        Self::new(data_dir.as_ref().join(DATABASE_FILE))
    }
}
