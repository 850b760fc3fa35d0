//! Poll cycle and outgoing send
//!
//! ```text
//!  fetch ──► parse ──► dedupe ──► split(known?) ──► persist new
//!                                       │                │
//!                                       ▼                ▼
//!                               re-check known ──► acknowledge ──► mark deleted_from_server
//! ```
//!
//! Acknowledgement only ever follows a successful write, so a crash between
//! the two steps re-serves the message and the next cycle re-acknowledges it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::auth::AuthSession;
use crate::crypto;
use crate::error::{ChatError, ChatResult};
use crate::relay::{OutgoingPayload, RelayApi};
use crate::storage::Storage;
use crate::sync::events::{emit, ChatEvent};
use crate::types::{now_millis, OutgoingDraft, StoredMessage};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Another cycle was running; nothing was done
    pub skipped: bool,
    /// The identity changed mid-cycle and the results were thrown away
    pub discarded: bool,
    /// Messages served by the relay
    pub fetched: usize,
    /// Served messages that were malformed or addressed to someone else
    pub dropped: usize,
    /// Ids persisted for the first time
    pub new_ids: Vec<String>,
    /// Ids sent in the acknowledgement batch
    pub ack_ids: Vec<String>,
    /// Whether the acknowledgement batch was accepted
    pub acknowledged: bool,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn discarded(fetched: usize) -> Self {
        Self {
            discarded: true,
            fetched,
            ..Self::default()
        }
    }
}

/// Keeps the local store and the relay consistent.
pub struct SyncEngine {
    storage: Storage,
    session: Arc<AuthSession>,
    relay: Arc<dyn RelayApi>,
    events: broadcast::Sender<ChatEvent>,
    poll_unavailable: AtomicBool,
    cycle: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        storage: Storage,
        session: Arc<AuthSession>,
        relay: Arc<dyn RelayApi>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            storage,
            session,
            relay,
            events,
            poll_unavailable: AtomicBool::new(false),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether the last fetch could not reach the relay.
    pub fn poll_unavailable(&self) -> bool {
        self.poll_unavailable.load(Ordering::SeqCst)
    }

    fn set_poll_unavailable(&self, unavailable: bool) {
        let previous = self.poll_unavailable.swap(unavailable, Ordering::SeqCst);
        if previous != unavailable {
            if unavailable {
                tracing::warn!("relay poll unavailable");
            } else {
                tracing::info!("relay poll recovered");
            }
            emit(
                &self.events,
                ChatEvent::PollStatusChanged {
                    available: !unavailable,
                },
            );
        }
    }

    /// Forget the poll status of a previous identity.
    pub fn reset(&self) {
        self.set_poll_unavailable(false);
    }

    /// Run one fetch/persist/acknowledge cycle.
    ///
    /// Returns immediately with [`CycleReport::skipped`] set if a cycle is
    /// already running. A fetch that cannot reach the relay sets the
    /// poll-unavailable flag and returns the error; a failed acknowledgement is logged and retried on
    /// the next cycle.
    pub async fn run_cycle(&self) -> ChatResult<CycleReport> {
        let Ok(_running) = self.cycle.try_lock() else {
            tracing::debug!("poll cycle already running");
            return Ok(CycleReport::skipped());
        };

        let generation = self.session.generation();
        let owner = self
            .session
            .public_key_hex()
            .ok_or(ChatError::NotAuthenticated)?;

        // 1. Fetch
        let relay = &self.relay;
        let served = match self
            .session
            .call(|token| async move { relay.fetch_messages(&token).await })
            .await
        {
            Ok(served) => {
                self.set_poll_unavailable(false);
                served
            }
            Err(e) if e.is_network() => {
                self.set_poll_unavailable(true);
                return Err(e);
            }
            Err(e) => {
                if !self.session.is_logged_in() {
                    self.reset();
                }
                return Err(e);
            }
        };

        let fetched = served.len();
        if !self.session.is_current(generation) {
            tracing::debug!(fetched, "identity changed during fetch, discarding");
            return Ok(CycleReport::discarded(fetched));
        }

        // 2. Parse and dedupe within the batch
        let mut report = CycleReport {
            fetched,
            ..CycleReport::default()
        };
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(fetched);
        for server_message in served {
            let id = server_message.id.clone();
            if !seen.insert(id.clone()) {
                continue;
            }
            match server_message.into_incoming(&owner) {
                Ok(msg) => parsed.push(msg),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "dropping relay message");
                    report.dropped += 1;
                }
            }
        }

        // 3. Split into new and known
        let ids: Vec<String> = parsed.iter().map(|m| m.id().to_string()).collect();
        let known = self.storage.filter_known_ids(&ids)?;
        let (known_ids, new): (Vec<String>, Vec<StoredMessage>) = {
            let mut known_ids = Vec::new();
            let mut new = Vec::new();
            for msg in parsed {
                if known.contains(msg.id()) {
                    known_ids.push(msg.id().to_string());
                } else {
                    new.push(msg);
                }
            }
            (known_ids, new)
        };

        // 4. Persist new
        if !new.is_empty() {
            self.storage.add_messages(&new)?;
            self.announce_stored(&new);
            for msg in &new {
                emit(
                    &self.events,
                    ChatEvent::NewIncoming {
                        id: msg.id().to_string(),
                        sender: msg.peer().to_string(),
                    },
                );
            }
        }
        report.new_ids = new.iter().map(|m| m.id().to_string()).collect();

        // 5. Re-check known rows for a missed acknowledgement
        let mut ack_ids: Vec<String> = new
            .iter()
            .filter(|m| m.needs_ack())
            .map(|m| m.id().to_string())
            .collect();
        if !known_ids.is_empty() {
            ack_ids.extend(
                self.storage
                    .get_messages_by_ids(&known_ids)?
                    .iter()
                    .filter(|m| m.needs_ack())
                    .map(|m| m.id().to_string()),
            );
        }

        tracing::debug!(
            owner = %owner,
            fetched,
            new = report.new_ids.len(),
            known = known_ids.len(),
            ack = ack_ids.len(),
            "poll cycle"
        );

        // 6. Acknowledge
        if ack_ids.is_empty() {
            return Ok(report);
        }
        let batch = &ack_ids;
        let ack = self
            .session
            .call(|token| async move { relay.acknowledge(&token, batch).await })
            .await;
        report.ack_ids = ack_ids.clone();

        match ack {
            Ok(()) if self.session.is_current(generation) => {
                for id in &ack_ids {
                    if let Err(e) = self.storage.mark_as_deleted_from_server(id) {
                        tracing::warn!(id = %id, error = %e, "failed to record acknowledgement");
                    }
                }
                report.acknowledged = true;
                emit(&self.events, ChatEvent::Acknowledged { ids: ack_ids });
            }
            Ok(()) => {
                tracing::debug!("identity changed during acknowledgement, discarding");
            }
            Err(e) => {
                tracing::warn!(count = ack_ids.len(), error = %e, "acknowledgement failed");
            }
        }

        Ok(report)
    }

    /// Encrypt `text` for `recipient`, post it, and persist it as delivered.
    ///
    /// Nothing is stored if the relay does not accept the message; the caller
    /// decides whether to resubmit.
    pub async fn send_message(&self, recipient: &str, text: &str) -> ChatResult<StoredMessage> {
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        let generation = self.session.generation();
        let keypair = self.session.keypair().ok_or(ChatError::NotAuthenticated)?;
        let owner = keypair.public_key_hex();

        let draft = OutgoingDraft {
            encrypted: crypto::encrypt_text(text, &keypair, recipient)?,
            created_at: now_millis(),
            recipient: recipient.to_string(),
            owner: owner.clone(),
        };
        let payload = OutgoingPayload {
            sender: owner,
            recipient: recipient.to_string(),
            message: crypto::decode_base64(&draft.encrypted)?,
        };

        let relay = &self.relay;
        let payload = &payload;
        let id = self
            .session
            .call(|token| async move { relay.send_message(&token, payload).await })
            .await?;

        if !self.session.is_current(generation) {
            return Err(ChatError::SessionClosed(
                "identity changed while sending".to_string(),
            ));
        }

        let stored = draft.into_stored(id, true);
        self.storage.add_messages(std::slice::from_ref(&stored))?;
        tracing::info!(id = %stored.id(), recipient = %recipient, "message sent");
        self.announce_stored(std::slice::from_ref(&stored));
        Ok(stored)
    }

    fn announce_stored(&self, messages: &[StoredMessage]) {
        let mut peers: Vec<String> = Vec::new();
        for msg in messages {
            if !peers.iter().any(|p| p == msg.peer()) {
                peers.push(msg.peer().to_string());
            }
        }
        emit(
            &self.events,
            ChatEvent::MessagesStored {
                peers,
                count: messages.len(),
            },
        );
    }
}
