//! Contact directory: the ordered sidebar list
//!
//! ```text
//! explicit contacts (Storage::list_contacts)
//!        ∪                                   ──► ContactSummary per peer ──► order
//! discovered peers  (Storage::list_unique_peer_ids − explicit − self)
//! ```
//!
//! Discovered peers get a placeholder name until the user names them, which
//! turns them into explicit contacts. The last message is decrypted on demand
//! for the preview only; plaintext never reaches the store.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::crypto;
use crate::error::ChatResult;
use crate::identity::{short_id, KeyPair};
use crate::storage::{LoadMessagesParams, Storage};
use crate::types::{Direction, StoredMessage};

/// Preview text shown for a message that does not authenticate
pub const UNDECRYPTABLE: &str = "Undecryptable";

/// Decrypted preview of a conversation's newest message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePreview {
    Text(String),
    Undecryptable,
}

impl fmt::Display for MessagePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePreview::Text(text) => write!(f, "{}", text),
            MessagePreview::Undecryptable => write!(f, "{}", UNDECRYPTABLE),
        }
    }
}

/// One row of the contact list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSummary {
    /// Peer's hex public key
    pub id: String,
    /// Assigned name, or a placeholder for discovered peers
    pub name: String,
    /// Whether the user named this peer
    pub explicit: bool,
    pub last_message: Option<MessagePreview>,
    pub last_direction: Option<Direction>,
    /// `created_at` of the newest message
    pub timestamp: Option<i64>,
    pub unread: usize,
}

/// Display name for a peer known only from message history.
pub fn placeholder_name(peer_id: &str) -> String {
    format!("Unknown ({})", short_id(peer_id))
}

/// Unread incoming messages at the newest end of a conversation.
///
/// `newest_first` must be ordered newest first. Counting stops at the first
/// incoming message that has been read; outgoing messages are skipped.
pub fn unread_count(newest_first: &[StoredMessage]) -> usize {
    let mut unread = 0;
    for msg in newest_first {
        if let StoredMessage::Incoming(incoming) = msg {
            if incoming.read_at.is_some() {
                break;
            }
            unread += 1;
        }
    }
    unread
}

/// Decrypt `msg` for display, falling back to [`MessagePreview::Undecryptable`].
pub fn preview(msg: &StoredMessage, me: &KeyPair) -> MessagePreview {
    match crypto::decrypt_text(msg.encrypted(), msg.peer(), me) {
        Ok(text) => MessagePreview::Text(text),
        Err(e) => {
            tracing::warn!(id = %msg.id(), error = %e, "message could not be decrypted");
            MessagePreview::Undecryptable
        }
    }
}

fn compare(a: &ContactSummary, b: &ContactSummary) -> Ordering {
    b.timestamp
        .unwrap_or(0)
        .cmp(&a.timestamp.unwrap_or(0))
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Newest conversation first; ties by case-insensitive name.
pub fn order_contacts(contacts: &mut [ContactSummary]) {
    contacts.sort_by(compare);
}

/// Projects the store into the contact list.
#[derive(Clone)]
pub struct ContactDirectory {
    storage: Storage,
    contact_limit: usize,
    message_limit: usize,
}

impl ContactDirectory {
    pub fn new(storage: Storage, contact_limit: usize, message_limit: usize) -> Self {
        Self {
            storage,
            contact_limit,
            message_limit,
        }
    }

    /// The full ordered list for `me`, optionally filtered by name.
    pub fn list(&self, me: &KeyPair, search: Option<&str>) -> ChatResult<Vec<ContactSummary>> {
        let owner = me.public_key_hex();
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let explicit = self
            .storage
            .list_contacts(&owner, search, Some(self.contact_limit))?;
        let shown: HashSet<&str> = explicit.iter().map(|c| c.id.as_str()).collect();

        let mut summaries = Vec::new();
        for contact in &explicit {
            summaries.push(self.summarize(me, &contact.id, &contact.name, true));
        }

        // Named peers cut by the limit or the search stay out of the
        // discovered list
        let needle = search.map(str::to_lowercase);
        for peer in self.storage.list_unique_peer_ids(&owner)? {
            if peer.is_empty() || peer == owner || shown.contains(peer.as_str()) {
                continue;
            }
            if self.storage.get_contact(&peer, &owner)?.is_some() {
                continue;
            }
            let name = placeholder_name(&peer);
            if let Some(needle) = &needle {
                if !name.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            summaries.push(self.summarize(me, &peer, &name, false));
        }

        order_contacts(&mut summaries);
        Ok(summaries)
    }

    /// Build the row for one peer from its conversation.
    ///
    /// A conversation that fails to load still yields a row, without metadata.
    pub fn summarize(&self, me: &KeyPair, peer: &str, name: &str, explicit: bool) -> ContactSummary {
        let mut summary = ContactSummary {
            id: peer.to_string(),
            name: name.to_string(),
            explicit,
            last_message: None,
            last_direction: None,
            timestamp: None,
            unread: 0,
        };

        let owner = me.public_key_hex();
        let params = LoadMessagesParams::new(&owner, peer).limit(self.message_limit);
        let messages = match self.storage.load_messages(&params) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "failed to load conversation");
                return summary;
            }
        };

        summary.unread = unread_count(&messages);
        if let Some(newest) = messages.first() {
            summary.last_message = Some(preview(newest, me));
            summary.last_direction = Some(newest.direction());
            summary.timestamp = Some(newest.created_at());
        }
        summary
    }
}
