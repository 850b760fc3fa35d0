//! Conversation view merging

use std::collections::HashMap;

use crate::types::StoredMessage;

/// Merge `newest` into the cached conversation `local`.
///
/// The result is sorted ascending by `created_at` (ties by id) with one entry
/// per id. An id present on both sides takes the newer row but keeps any
/// progress flag the cached row already had. Merging the same batch twice
/// yields the same view.
pub fn merge_messages(local: &[StoredMessage], newest: &[StoredMessage]) -> Vec<StoredMessage> {
    let mut by_id: HashMap<&str, StoredMessage> = HashMap::with_capacity(local.len() + newest.len());
    for msg in local {
        by_id.insert(msg.id(), msg.clone());
    }
    for msg in newest {
        let mut merged = msg.clone();
        if let Some(existing) = by_id.get(msg.id()) {
            merged.keep_progress_from(existing);
        }
        by_id.insert(msg.id(), merged);
    }

    let mut merged: Vec<StoredMessage> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    merged
}
