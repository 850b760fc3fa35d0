//! Message Storage - ciphertext rows and their conversation indexes
//!
//! Rows are keyed by relay-assigned id. The conversation index orders every
//! owner/peer pair by `created_at`, so "newest N" and "last message" are a
//! reversed range scan. The peer index counts rows per `(owner, peer)` and
//! answers "which peers have history" without touching message bodies.

use std::collections::HashSet;

use crate::error::{ChatError, ChatResult};
use crate::types::{now_millis, StoredMessage};
use redb::{ReadableTable, Table, TableDefinition};

use super::Storage;

type ConversationKey = (&'static str, &'static str, i64, &'static str);
type PeerKey = (&'static str, &'static str);

/// Table for messages (key: message id, value: serialized StoredMessage)
pub(crate) const MESSAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Conversation index (key: (owner, peer, created_at, id))
pub(crate) const CONVERSATION_INDEX: TableDefinition<ConversationKey, ()> =
    TableDefinition::new("conversations");

/// Peer index (key: (owner, peer), value: number of stored messages)
pub(crate) const PEER_INDEX: TableDefinition<PeerKey, u64> = TableDefinition::new("peers");

/// Result cap applied when the caller does not pass a limit
pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

/// Sorts after any relay-assigned id within one timestamp.
const ID_UPPER_BOUND: &str = "\u{10FFFF}";

/// Query for one conversation, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMessagesParams<'a> {
    pub owner: &'a str,
    pub peer: &'a str,
    /// At most this many messages ([`DEFAULT_MESSAGE_LIMIT`] when `None`)
    pub limit: Option<usize>,
    /// Only messages with `created_at >= date_gte`
    pub date_gte: Option<i64>,
    /// Only messages with `created_at <= date_lte`
    pub date_lte: Option<i64>,
}

impl<'a> LoadMessagesParams<'a> {
    pub fn new(owner: &'a str, peer: &'a str) -> Self {
        Self {
            owner,
            peer,
            limit: None,
            date_gte: None,
            date_lte: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn between(mut self, date_gte: Option<i64>, date_lte: Option<i64>) -> Self {
        self.date_gte = date_gte;
        self.date_lte = date_lte;
        self
    }
}

fn decode(data: &[u8]) -> ChatResult<StoredMessage> {
    postcard::from_bytes(data).map_err(|e| ChatError::Serialization(e.to_string()))
}

fn index_message(
    conversations: &mut Table<'_, ConversationKey, ()>,
    peers: &mut Table<'_, PeerKey, u64>,
    msg: &StoredMessage,
) -> ChatResult<()> {
    conversations.insert((msg.owner(), msg.peer(), msg.created_at(), msg.id()), ())?;
    let key = (msg.owner(), msg.peer());
    let count = peers.get(key)?.map(|v| v.value()).unwrap_or(0);
    peers.insert(key, count + 1)?;
    Ok(())
}

fn unindex_message(
    conversations: &mut Table<'_, ConversationKey, ()>,
    peers: &mut Table<'_, PeerKey, u64>,
    msg: &StoredMessage,
) -> ChatResult<()> {
    conversations.remove((msg.owner(), msg.peer(), msg.created_at(), msg.id()))?;
    let key = (msg.owner(), msg.peer());
    let count = peers.get(key)?.map(|v| v.value()).unwrap_or(0);
    if count <= 1 {
        peers.remove(key)?;
    } else {
        peers.insert(key, count - 1)?;
    }
    Ok(())
}

impl Storage {
    // ═══════════════════════════════════════════════════════════════════════
    // Message Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Idempotent bulk upsert keyed by message id.
    ///
    /// The whole batch is validated before any write; one bad row rejects the
    /// batch. Re-adding a known id overwrites it but keeps any read, delivered
    /// or acknowledged state already recorded. Returns how many ids were new.
    pub fn add_messages(&self, batch: &[StoredMessage]) -> ChatResult<usize> {
        for msg in batch {
            msg.validate()?;
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let mut inserted = 0;
        {
            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            let mut conversations = write_txn.open_table(CONVERSATION_INDEX)?;
            let mut peers = write_txn.open_table(PEER_INDEX)?;

            for msg in batch {
                let mut msg = msg.clone();
                let existing = match messages.get(msg.id())? {
                    Some(data) => Some(decode(data.value())?),
                    None => None,
                };
                match &existing {
                    Some(old) => {
                        msg.keep_progress_from(old);
                        unindex_message(&mut conversations, &mut peers, old)?;
                    }
                    None => inserted += 1,
                }

                let serialized = postcard::to_allocvec(&msg)
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                messages.insert(msg.id(), serialized.as_slice())?;
                index_message(&mut conversations, &mut peers, &msg)?;
            }
        }
        write_txn.commit()?;

        tracing::debug!(count = batch.len(), inserted, "messages stored");
        Ok(inserted)
    }

    /// Apply `update` to one message and persist it if it reports a change.
    ///
    /// Missing ids are a no-op returning `false`.
    fn update_message<F>(&self, id: &str, update: F) -> ChatResult<bool>
    where
        F: FnOnce(&mut StoredMessage) -> bool,
    {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let changed = {
            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            let current = match messages.get(id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            match current {
                Some(mut msg) => {
                    let changed = update(&mut msg);
                    if changed {
                        let serialized = postcard::to_allocvec(&msg)
                            .map_err(|e| ChatError::Serialization(e.to_string()))?;
                        messages.insert(id, serialized.as_slice())?;
                    }
                    changed
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(changed)
    }

    /// Set `read_at` to now on an incoming message that has none.
    pub fn mark_as_read(&self, id: &str) -> ChatResult<bool> {
        self.mark_as_read_at(id, now_millis())
    }

    /// Set `read_at` to `at` on an incoming message that has none.
    pub fn mark_as_read_at(&self, id: &str, at: i64) -> ChatResult<bool> {
        self.update_message(id, |msg| match msg {
            StoredMessage::Incoming(m) => m.mark_read(at),
            StoredMessage::Outgoing(_) => false,
        })
    }

    /// Set `delivered` on an outgoing message.
    pub fn mark_as_delivered(&self, id: &str) -> ChatResult<bool> {
        self.update_message(id, |msg| match msg {
            StoredMessage::Outgoing(m) => m.mark_delivered(),
            StoredMessage::Incoming(_) => false,
        })
    }

    /// Set `deleted_from_server` on an incoming message.
    pub fn mark_as_deleted_from_server(&self, id: &str) -> ChatResult<bool> {
        self.update_message(id, |msg| match msg {
            StoredMessage::Incoming(m) => m.mark_deleted_from_server(),
            StoredMessage::Outgoing(_) => false,
        })
    }

    /// Remove one message and its index entries.
    pub fn delete_message(&self, id: &str) -> ChatResult<bool> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let removed = {
            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            let mut conversations = write_txn.open_table(CONVERSATION_INDEX)?;
            let mut peers = write_txn.open_table(PEER_INDEX)?;

            let existing = match messages.remove(id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            match existing {
                Some(msg) => {
                    unindex_message(&mut conversations, &mut peers, &msg)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Remove every message exchanged between `owner` and `peer`.
    ///
    /// Returns the number of messages removed.
    pub fn delete_conversation(&self, owner: &str, peer: &str) -> ChatResult<usize> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let removed = {
            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            let mut conversations = write_txn.open_table(CONVERSATION_INDEX)?;
            let mut peers = write_txn.open_table(PEER_INDEX)?;

            let mut keys = Vec::new();
            for entry in
                conversations.range((owner, peer, i64::MIN, "")..=(owner, peer, i64::MAX, ID_UPPER_BOUND))?
            {
                let (key, _) = entry?;
                let (_, _, created_at, id) = key.value();
                keys.push((created_at, id.to_string()));
            }

            for (created_at, id) in &keys {
                conversations.remove((owner, peer, *created_at, id.as_str()))?;
                messages.remove(id.as_str())?;
            }
            peers.remove((owner, peer))?;
            keys.len()
        };
        write_txn.commit()?;

        tracing::debug!(owner, peer, removed, "conversation deleted");
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Message Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Messages of one conversation, newest first.
    pub fn load_messages(&self, params: &LoadMessagesParams<'_>) -> ChatResult<Vec<StoredMessage>> {
        let limit = params.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
        let lo = params.date_gte.unwrap_or(i64::MIN);
        let hi = params.date_lte.unwrap_or(i64::MAX);
        if limit == 0 || lo > hi {
            return Ok(Vec::new());
        }

        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let conversations = read_txn.open_table(CONVERSATION_INDEX)?;
        let messages = read_txn.open_table(MESSAGES_TABLE)?;

        let (owner, peer) = (params.owner, params.peer);
        let mut result = Vec::new();
        for entry in conversations
            .range((owner, peer, lo, "")..=(owner, peer, hi, ID_UPPER_BOUND))?
            .rev()
            .take(limit)
        {
            let (key, _) = entry?;
            let (_, _, _, id) = key.value();
            if let Some(data) = messages.get(id)? {
                result.push(decode(data.value())?);
            }
        }
        Ok(result)
    }

    /// Newest message of one conversation.
    pub fn last_message(&self, owner: &str, peer: &str) -> ChatResult<Option<StoredMessage>> {
        let params = LoadMessagesParams::new(owner, peer).limit(1);
        Ok(self.load_messages(&params)?.into_iter().next())
    }

    /// Load a single message by id.
    pub fn get_message(&self, id: &str) -> ChatResult<Option<StoredMessage>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let messages = read_txn.open_table(MESSAGES_TABLE)?;

        match messages.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// The subset of `ids` that already have a stored row.
    pub fn filter_known_ids(&self, ids: &[String]) -> ChatResult<HashSet<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let messages = read_txn.open_table(MESSAGES_TABLE)?;

        let mut known = HashSet::new();
        for id in ids {
            if messages.get(id.as_str())?.is_some() {
                known.insert(id.clone());
            }
        }
        Ok(known)
    }

    /// Fetch the stored rows for `ids`, skipping ids that are not stored.
    pub fn get_messages_by_ids(&self, ids: &[String]) -> ChatResult<Vec<StoredMessage>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let messages = read_txn.open_table(MESSAGES_TABLE)?;

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = messages.get(id.as_str())? {
                result.push(decode(data.value())?);
            }
        }
        Ok(result)
    }

    /// Distinct peers with at least one stored message for `owner`.
    pub fn list_unique_peer_ids(&self, owner: &str) -> ChatResult<Vec<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let peers = read_txn.open_table(PEER_INDEX)?;

        let mut result = Vec::new();
        for entry in peers.range((owner, "")..)? {
            let (key, _) = entry?;
            let (row_owner, peer) = key.value();
            if row_owner != owner {
                break;
            }
            result.push(peer.to_string());
        }
        Ok(result)
    }
}
