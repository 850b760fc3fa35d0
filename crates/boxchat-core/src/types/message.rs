//! Stored message types
//!
//! A message is either [`Incoming`](StoredMessage::Incoming) or
//! [`Outgoing`](StoredMessage::Outgoing). Delivery bookkeeping lives only on
//! the variant it applies to: `read_at`/`deleted_from_server` on incoming,
//! `delivered` on outgoing.
//!
//! The `encrypted` field is always base64 of `nonce ‖ ciphertext`; plaintext
//! is never stored.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::identity::PublicKeyHex;

/// Which side of the conversation wrote the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the peer to us
    Incoming,
    /// Sent by us to the peer
    Outgoing,
}

/// A message received from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Relay-assigned identifier
    pub id: String,
    /// base64 of `nonce ‖ ciphertext`
    pub encrypted: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Sender's hex public key
    pub sender: PublicKeyHex,
    /// Local identity this row belongs to
    pub owner: PublicKeyHex,
    /// When the user read it (ms), if ever
    pub read_at: Option<i64>,
    /// Whether the relay has been told it may drop this message
    pub deleted_from_server: bool,
}

impl IncomingMessage {
    /// Set `read_at` if not already set. Returns whether anything changed.
    pub fn mark_read(&mut self, at: i64) -> bool {
        if self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at);
        true
    }

    /// Set `deleted_from_server`. Returns whether anything changed.
    pub fn mark_deleted_from_server(&mut self) -> bool {
        !std::mem::replace(&mut self.deleted_from_server, true)
    }

    /// Whether the relay still needs an acknowledgement for this message.
    pub fn needs_ack(&self) -> bool {
        !self.deleted_from_server
    }
}

/// A message we sent to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Relay-assigned identifier
    pub id: String,
    /// base64 of `nonce ‖ ciphertext`
    pub encrypted: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Recipient's hex public key
    pub recipient: PublicKeyHex,
    /// Local identity this row belongs to
    pub owner: PublicKeyHex,
    /// Whether the relay accepted the message
    pub delivered: bool,
}

impl OutgoingMessage {
    /// Set `delivered`. Returns whether anything changed.
    pub fn mark_delivered(&mut self) -> bool {
        !std::mem::replace(&mut self.delivered, true)
    }
}

/// An outgoing message before the relay has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDraft {
    /// base64 of `nonce ‖ ciphertext`
    pub encrypted: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Recipient's hex public key
    pub recipient: PublicKeyHex,
    /// Local identity sending it
    pub owner: PublicKeyHex,
}

impl OutgoingDraft {
    /// Attach the relay-assigned id.
    pub fn into_stored(self, id: String, delivered: bool) -> StoredMessage {
        StoredMessage::Outgoing(OutgoingMessage {
            id,
            encrypted: self.encrypted,
            created_at: self.created_at,
            recipient: self.recipient,
            owner: self.owner,
            delivered,
        })
    }
}

/// A persisted message of either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredMessage {
    /// Received from a peer
    Incoming(IncomingMessage),
    /// Sent to a peer
    Outgoing(OutgoingMessage),
}

impl StoredMessage {
    pub fn id(&self) -> &str {
        match self {
            StoredMessage::Incoming(m) => &m.id,
            StoredMessage::Outgoing(m) => &m.id,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            StoredMessage::Incoming(m) => &m.owner,
            StoredMessage::Outgoing(m) => &m.owner,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            StoredMessage::Incoming(m) => m.created_at,
            StoredMessage::Outgoing(m) => m.created_at,
        }
    }

    pub fn encrypted(&self) -> &str {
        match self {
            StoredMessage::Incoming(m) => &m.encrypted,
            StoredMessage::Outgoing(m) => &m.encrypted,
        }
    }

    /// The other party: sender for incoming, recipient for outgoing.
    pub fn peer(&self) -> &str {
        match self {
            StoredMessage::Incoming(m) => &m.sender,
            StoredMessage::Outgoing(m) => &m.recipient,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            StoredMessage::Incoming(_) => Direction::Incoming,
            StoredMessage::Outgoing(_) => Direction::Outgoing,
        }
    }

    pub fn as_incoming(&self) -> Option<&IncomingMessage> {
        match self {
            StoredMessage::Incoming(m) => Some(m),
            StoredMessage::Outgoing(_) => None,
        }
    }

    pub fn as_outgoing(&self) -> Option<&OutgoingMessage> {
        match self {
            StoredMessage::Outgoing(m) => Some(m),
            StoredMessage::Incoming(_) => None,
        }
    }

    /// Incoming and not yet acknowledged to the relay.
    pub fn needs_ack(&self) -> bool {
        self.as_incoming().is_some_and(IncomingMessage::needs_ack)
    }

    /// Incoming and not yet read.
    pub fn is_unread(&self) -> bool {
        self.as_incoming().is_some_and(|m| m.read_at.is_none())
    }

    /// Reject rows missing a required field before any I/O happens.
    pub fn validate(&self) -> ChatResult<()> {
        if self.id().is_empty() {
            return Err(ChatError::Validation("message.id is required".into()));
        }
        if self.owner().is_empty() {
            return Err(ChatError::Validation("owner is required".into()));
        }
        if self.created_at() <= 0 {
            return Err(ChatError::Validation("createdAt is required".into()));
        }
        if self.encrypted().is_empty() {
            return Err(ChatError::Validation("encrypted is required".into()));
        }
        match self {
            StoredMessage::Incoming(m) if m.sender.is_empty() => Err(ChatError::Validation(
                "sender is required for incoming messages".into(),
            )),
            StoredMessage::Outgoing(m) if m.recipient.is_empty() => Err(ChatError::Validation(
                "recipient is required for outgoing messages".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Carry forward progress already recorded on `existing` so an overwrite
    /// never moves `read_at`, `deleted_from_server` or `delivered` backwards.
    pub fn keep_progress_from(&mut self, existing: &StoredMessage) {
        match (self, existing) {
            (StoredMessage::Incoming(new), StoredMessage::Incoming(old)) => {
                if new.read_at.is_none() {
                    new.read_at = old.read_at;
                }
                new.deleted_from_server |= old.deleted_from_server;
            }
            (StoredMessage::Outgoing(new), StoredMessage::Outgoing(old)) => {
                new.delivered |= old.delivered;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(id: &str, created_at: i64) -> StoredMessage {
        StoredMessage::Incoming(IncomingMessage {
            id: id.to_string(),
            encrypted: "AAAA".to_string(),
            created_at,
            sender: "peer".to_string(),
            owner: "me".to_string(),
            read_at: None,
            deleted_from_server: false,
        })
    }

    fn outgoing(id: &str, created_at: i64) -> StoredMessage {
        StoredMessage::Outgoing(OutgoingMessage {
            id: id.to_string(),
            encrypted: "AAAA".to_string(),
            created_at,
            recipient: "peer".to_string(),
            owner: "me".to_string(),
            delivered: false,
        })
    }

    #[test]
    fn test_accessors_follow_direction() {
        let msg = incoming("m1", 100);
        assert_eq!(msg.direction(), Direction::Incoming);
        assert_eq!(msg.peer(), "peer");
        assert!(msg.as_outgoing().is_none());
        assert!(msg.needs_ack());
        assert!(msg.is_unread());

        let msg = outgoing("m2", 200);
        assert_eq!(msg.direction(), Direction::Outgoing);
        assert_eq!(msg.peer(), "peer");
        assert!(!msg.needs_ack());
        assert!(!msg.is_unread());
    }

    #[test]
    fn test_mark_read_is_monotonic() {
        let StoredMessage::Incoming(mut msg) = incoming("m1", 100) else {
            unreachable!()
        };
        assert!(msg.mark_read(500));
        assert!(!msg.mark_read(900));
        assert_eq!(msg.read_at, Some(500));
    }

    #[test]
    fn test_flag_transitions_report_change_once() {
        let StoredMessage::Incoming(mut msg) = incoming("m1", 100) else {
            unreachable!()
        };
        assert!(msg.mark_deleted_from_server());
        assert!(!msg.mark_deleted_from_server());

        let StoredMessage::Outgoing(mut msg) = outgoing("m2", 100) else {
            unreachable!()
        };
        assert!(msg.mark_delivered());
        assert!(!msg.mark_delivered());
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(incoming("m1", 100).validate().is_ok());
        assert!(incoming("", 100).validate().is_err());
        assert!(incoming("m1", 0).validate().is_err());

        let mut msg = incoming("m1", 100);
        if let StoredMessage::Incoming(m) = &mut msg {
            m.sender.clear();
        }
        assert!(matches!(msg.validate(), Err(ChatError::Validation(_))));

        let mut msg = outgoing("m2", 100);
        if let StoredMessage::Outgoing(m) = &mut msg {
            m.recipient.clear();
        }
        assert!(msg.validate().is_err());

        let mut msg = outgoing("m2", 100);
        if let StoredMessage::Outgoing(m) = &mut msg {
            m.encrypted.clear();
        }
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_keep_progress_never_reverts() {
        let mut old = incoming("m1", 100);
        if let StoredMessage::Incoming(m) = &mut old {
            m.read_at = Some(150);
            m.deleted_from_server = true;
        }
        let mut fresh = incoming("m1", 100);
        fresh.keep_progress_from(&old);
        assert_eq!(fresh, old);

        let mut old = outgoing("m2", 100);
        if let StoredMessage::Outgoing(m) = &mut old {
            m.delivered = true;
        }
        let mut fresh = outgoing("m2", 100);
        fresh.keep_progress_from(&old);
        assert!(fresh.as_outgoing().unwrap().delivered);
    }

    #[test]
    fn test_draft_into_stored() {
        let draft = OutgoingDraft {
            encrypted: "AAAA".into(),
            created_at: 42,
            recipient: "peer".into(),
            owner: "me".into(),
        };
        let stored = draft.into_stored("relay-1".into(), true);
        assert_eq!(stored.id(), "relay-1");
        assert!(stored.as_outgoing().unwrap().delivered);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let msg = incoming("m1", 100);
        let bytes = postcard::to_allocvec(&msg).unwrap();
        let decoded: StoredMessage = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
