//! Address book entries

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::identity::PublicKeyHex;

/// A named peer in one local identity's address book.
///
/// Unique by `(id, owner)`: two local accounts can name the same peer differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Peer's hex public key
    pub id: PublicKeyHex,
    /// User-assigned display name
    pub name: String,
    /// Local identity that owns this entry
    pub owner: PublicKeyHex,
}

impl Contact {
    pub fn new(
        id: impl Into<PublicKeyHex>,
        name: impl Into<String>,
        owner: impl Into<PublicKeyHex>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Case-folded name used by the search index.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.id.is_empty() {
            return Err(ChatError::Validation("id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ChatError::Validation("name is required".into()));
        }
        if self.owner.is_empty() {
            return Err(ChatError::Validation("owner is required".into()));
        }
        Ok(())
    }
}
