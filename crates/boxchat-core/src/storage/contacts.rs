//! Contact Storage - owner-scoped address book
//!
//! Contacts are keyed by `(owner, id)`. A secondary index keyed by
//! `(owner, lowercase name, id)` serves listing in name order and
//! case-insensitive search without decoding every row.

use crate::error::{ChatError, ChatResult};
use crate::types::Contact;
use redb::{ReadableTable, TableDefinition};

use super::Storage;

/// Table for contacts (key: (owner, peer id), value: serialized Contact)
pub(crate) const CONTACTS_TABLE: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("contacts");

/// Name index (key: (owner, lowercase name, peer id))
pub(crate) const CONTACT_NAME_INDEX: TableDefinition<(&str, &str, &str), ()> =
    TableDefinition::new("contacts_by_name");

/// Result cap applied when the caller does not pass a limit
pub const DEFAULT_CONTACT_LIMIT: usize = 1000;

impl Storage {
    // ═══════════════════════════════════════════════════════════════════════
    // Contact Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace a contact by `(id, owner)`.
    ///
    /// Rejects contacts with an empty id, name or owner before touching the database.
    pub fn upsert_contact(&self, contact: &Contact) -> ChatResult<()> {
        contact.validate()?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            let mut index = write_txn.open_table(CONTACT_NAME_INDEX)?;
            let key = (contact.owner.as_str(), contact.id.as_str());

            let previous: Option<Contact> = match table.get(key)? {
                Some(data) => Some(
                    postcard::from_bytes(data.value())
                        .map_err(|e| ChatError::Serialization(e.to_string()))?,
                ),
                None => None,
            };
            if let Some(previous) = previous {
                let old_name = previous.name_key();
                index.remove((key.0, old_name.as_str(), key.1))?;
            }

            let serialized = postcard::to_allocvec(contact)
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            table.insert(key, serialized.as_slice())?;

            let name = contact.name_key();
            index.insert((key.0, name.as_str(), key.1), ())?;
        }
        write_txn.commit()?;

        tracing::debug!(owner = %contact.owner, peer = %contact.id, "contact saved");
        Ok(())
    }

    /// Load a contact by peer id within one owner's address book.
    pub fn get_contact(&self, id: &str, owner: &str) -> ChatResult<Option<Contact>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(CONTACTS_TABLE)?;

        if let Some(data) = table.get((owner, id))? {
            let contact: Contact = postcard::from_bytes(data.value())
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            Ok(Some(contact))
        } else {
            Ok(None)
        }
    }

    /// List an owner's contacts in case-insensitive name order.
    ///
    /// `search` keeps only names containing it (case-insensitive); at most
    /// `limit` contacts are returned ([`DEFAULT_CONTACT_LIMIT`] when `None`).
    pub fn list_contacts(
        &self,
        owner: &str,
        search: Option<&str>,
        limit: Option<usize>,
    ) -> ChatResult<Vec<Contact>> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let limit = limit.unwrap_or(DEFAULT_CONTACT_LIMIT);

        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let index = read_txn.open_table(CONTACT_NAME_INDEX)?;
        let table = read_txn.open_table(CONTACTS_TABLE)?;

        let mut contacts = Vec::new();
        for entry in index.range((owner, "", "")..)? {
            if contacts.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let (row_owner, name, id) = key.value();
            if row_owner != owner {
                break;
            }
            if let Some(needle) = &needle {
                if !name.contains(needle.as_str()) {
                    continue;
                }
            }
            if let Some(data) = table.get((owner, id))? {
                let contact: Contact = postcard::from_bytes(data.value())
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                contacts.push(contact);
            }
        }

        Ok(contacts)
    }

    /// Delete a contact.
    ///
    /// Returns whether a contact was removed; a missing contact is not an error.
    pub fn delete_contact(&self, id: &str, owner: &str) -> ChatResult<bool> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            let mut index = write_txn.open_table(CONTACT_NAME_INDEX)?;

            let previous: Option<Contact> = match table.remove((owner, id))? {
                Some(data) => Some(
                    postcard::from_bytes(data.value())
                        .map_err(|e| ChatError::Serialization(e.to_string()))?,
                ),
                None => None,
            };
            match previous {
                Some(previous) => {
                    let name = previous.name_key();
                    index.remove((owner, name.as_str(), id))?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
