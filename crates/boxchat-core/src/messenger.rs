//! Messenger: the handle a UI or CLI drives
//!
//! Wires the store, auth session, sync engine, poller, read tracker and
//! contact directory together, and keeps the view state (selected contact,
//! search, merged conversation) they project into.
//!
//! ```text
//!            ┌──────────── Messenger ────────────┐
//! UI ──────► │ login / select / send / read      │
//!            │   │          │        │           │
//!            │   ▼          ▼        ▼           │
//!            │ AuthSession  View   SyncEngine ◄── Poller
//!            │              ▲        │           │
//!            │  event pump ─┘        ▼           │
//!            │                    Storage ◄── read pump ◄── ReadTracker
//!            └───────────────────────────────────┘
//! ```
//!
//! `Messenger` is a cheap `Clone` handle. Background tasks hold only weak
//! references, so dropping the last handle stops them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::auth::AuthSession;
use crate::config::ClientConfig;
use crate::directory::{self, ContactDirectory, ContactSummary, MessagePreview};
use crate::error::{ChatError, ChatResult};
use crate::identity::{derive_keypair, parse_public_key_hex, KeyPair};
use crate::relay::{HttpRelay, RelayApi};
use crate::storage::{LoadMessagesParams, Storage};
use crate::sync::{
    event_channel, merge_messages, ChatEvent, CycleReport, Poller, ReadTracker, SyncEngine,
};
use crate::types::{Contact, StoredMessage};

#[derive(Default)]
struct ViewState {
    selected: Option<String>,
    search: Option<String>,
    /// Selected conversation, ascending by `created_at`
    messages: Vec<StoredMessage>,
}

struct Tasks {
    poller: Option<Poller>,
    pumps: Vec<JoinHandle<()>>,
}

impl Drop for Tasks {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

struct Inner {
    config: ClientConfig,
    storage: Storage,
    session: Arc<AuthSession>,
    engine: Arc<SyncEngine>,
    directory: ContactDirectory,
    events: broadcast::Sender<ChatEvent>,
    view: RwLock<ViewState>,
    online: AtomicBool,
    tracker: ReadTracker,
    read_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    tasks: Mutex<Option<Tasks>>,
}

/// Chat client facade.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

impl Messenger {
    /// Assemble a client over an existing store and relay.
    pub fn new(storage: Storage, relay: Arc<dyn RelayApi>, config: ClientConfig) -> Self {
        let events = event_channel();
        let session = Arc::new(AuthSession::new(relay.clone(), events.clone()));
        let engine = Arc::new(SyncEngine::new(
            storage.clone(),
            session.clone(),
            relay,
            events.clone(),
        ));
        let directory = ContactDirectory::new(
            storage.clone(),
            config.contact_list_limit,
            config.message_page_limit,
        );
        let (tracker, read_rx) = ReadTracker::new(config.read_dwell());

        Self {
            inner: Arc::new(Inner {
                config,
                storage,
                session,
                engine,
                directory,
                events,
                view: RwLock::new(ViewState::default()),
                online: AtomicBool::new(true),
                tracker,
                read_rx: Mutex::new(Some(read_rx)),
                tasks: Mutex::new(None),
            }),
        }
    }

    /// Open the store in `data_dir` and talk to the configured HTTP relay.
    pub fn open(data_dir: impl AsRef<Path>, config: ClientConfig) -> ChatResult<Self> {
        let storage = Storage::open_in(data_dir)?;
        let relay = HttpRelay::new(config.relay_url.clone(), config.request_timeout())?;
        Ok(Self::new(storage, Arc::new(relay), config))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Background Tasks
    // ═══════════════════════════════════════════════════════════════════════

    /// Start the poller and the event/read pumps. Idempotent.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        if tasks.is_some() {
            return;
        }

        let poller = Poller::start(self.inner.engine.clone(), self.inner.config.poll_interval());
        let mut pumps = vec![spawn_event_pump(
            Arc::downgrade(&self.inner),
            self.inner.events.subscribe(),
        )];
        if let Some(read_rx) = self.inner.read_rx.lock().take() {
            pumps.push(spawn_read_pump(Arc::downgrade(&self.inner), read_rx));
        }

        *tasks = Some(Tasks {
            poller: Some(poller),
            pumps,
        });
        tracing::debug!("messenger started");
    }

    /// Stop the poller after its current cycle and end the pumps.
    pub async fn shutdown(&self) {
        let tasks = self.inner.tasks.lock().take();
        if let Some(poller) = tasks.and_then(|mut tasks| tasks.poller.take()) {
            poller.stop().await;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════

    /// Derive the identity from `seed`, install it and authenticate.
    ///
    /// An unreachable relay leaves the identity installed and usable offline;
    /// a relay that refuses the login leaves the session logged out.
    pub async fn login(&self, seed: &str) -> ChatResult<String> {
        let keypair = derive_keypair(seed)?;
        let public_key = keypair.public_key_hex();
        self.reset_view();
        self.inner.engine.reset();

        match self.inner.session.login(keypair).await {
            Ok(_) => {}
            Err(e) if e.is_network() => {
                tracing::warn!(error = %e, "relay unreachable at login, continuing offline");
            }
            Err(e) => return Err(e),
        }

        self.ensure_selection()?;
        Ok(public_key)
    }

    /// Install the identity from `seed` without contacting the relay.
    pub fn login_offline(&self, seed: &str) -> ChatResult<String> {
        let keypair = derive_keypair(seed)?;
        let public_key = keypair.public_key_hex();
        self.reset_view();
        self.inner.engine.reset();
        self.inner.session.install(keypair);
        self.ensure_selection()?;
        Ok(public_key)
    }

    /// Tear down the session: keys, token, view and pending read timers.
    pub fn logout(&self) {
        self.inner.session.logout();
        self.reset_view();
        self.inner.engine.reset();
    }

    pub fn public_key_hex(&self) -> Option<String> {
        self.inner.session.public_key_hex()
    }

    fn keypair(&self) -> ChatResult<Arc<KeyPair>> {
        self.inner.session.keypair().ok_or(ChatError::NotAuthenticated)
    }

    fn owner(&self) -> ChatResult<String> {
        self.inner
            .session
            .public_key_hex()
            .ok_or(ChatError::NotAuthenticated)
    }

    fn reset_view(&self) {
        self.inner.tracker.reset();
        let mut view = self.inner.view.write();
        *view = ViewState::default();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Contacts
    // ═══════════════════════════════════════════════════════════════════════

    /// Name a peer, creating the contact or renaming it.
    pub fn add_or_rename_contact(&self, id: &str, name: &str) -> ChatResult<Contact> {
        let owner = self.owner()?;
        parse_public_key_hex(id)?;
        let contact = Contact::new(id, name.trim(), owner);
        self.inner.storage.upsert_contact(&contact)?;
        tracing::info!(peer = %id, "contact saved");
        crate::sync::events::emit(&self.inner.events, ChatEvent::ContactsChanged);

        if self.selected_contact().is_none() {
            self.select_contact(id)?;
        }
        Ok(contact)
    }

    /// Remove a contact; with `purge_history` its conversation goes too.
    ///
    /// Without purging, a peer with history reappears as a discovered contact.
    pub fn delete_contact(&self, id: &str, purge_history: bool) -> ChatResult<bool> {
        let owner = self.owner()?;
        let removed = self.inner.storage.delete_contact(id, &owner)?;
        if purge_history {
            let purged = self.inner.storage.delete_conversation(&owner, id)?;
            tracing::info!(peer = %id, purged, "conversation deleted");
        }

        let was_selected = self.selected_contact().as_deref() == Some(id);
        if was_selected {
            self.reset_view_keep_search();
        }
        crate::sync::events::emit(&self.inner.events, ChatEvent::ContactsChanged);
        self.ensure_selection()?;
        Ok(removed)
    }

    fn reset_view_keep_search(&self) {
        self.inner.tracker.reset();
        let mut view = self.inner.view.write();
        view.selected = None;
        view.messages.clear();
    }

    pub fn get_contact(&self, id: &str) -> ChatResult<Option<Contact>> {
        let owner = self.owner()?;
        self.inner.storage.get_contact(id, &owner)
    }

    /// Filter the contact list by name.
    pub fn set_search(&self, search: Option<&str>) {
        self.inner.view.write().search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    /// The ordered contact list, explicit and discovered.
    ///
    /// Selects the first entry if nothing is selected yet.
    pub fn contacts(&self) -> ChatResult<Vec<ContactSummary>> {
        let keypair = self.keypair()?;
        let search = self.inner.view.read().search.clone();
        let list = self.inner.directory.list(&keypair, search.as_deref())?;

        if self.selected_contact().is_none() {
            if let Some(first) = list.first() {
                self.select_contact(&first.id)?;
            }
        }
        Ok(list)
    }

    fn ensure_selection(&self) -> ChatResult<()> {
        if self.selected_contact().is_none() && self.inner.session.is_logged_in() {
            self.contacts()?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Conversation
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the conversation with `id`, replacing the cached view.
    pub fn select_contact(&self, id: &str) -> ChatResult<()> {
        let owner = self.owner()?;
        self.inner.tracker.reset();

        let params = LoadMessagesParams::new(&owner, id).limit(self.inner.config.message_page_limit);
        let newest_first = self.inner.storage.load_messages(&params)?;
        let messages = merge_messages(&[], &newest_first);

        let mut view = self.inner.view.write();
        view.selected = Some(id.to_string());
        view.messages = messages;
        tracing::debug!(peer = %id, count = view.messages.len(), "conversation opened");
        Ok(())
    }

    pub fn selected_contact(&self) -> Option<String> {
        self.inner.view.read().selected.clone()
    }

    /// The selected conversation, oldest first.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.inner.view.read().messages.clone()
    }

    /// Decrypt a stored message for display.
    pub fn render(&self, msg: &StoredMessage) -> ChatResult<MessagePreview> {
        let keypair = self.keypair()?;
        Ok(directory::preview(msg, &keypair))
    }

    /// Re-read the newest page of the selected conversation into the view.
    fn refresh_selected(&self) -> ChatResult<()> {
        let Some(peer) = self.selected_contact() else {
            return Ok(());
        };
        let owner = self.owner()?;
        let params = LoadMessagesParams::new(&owner, &peer).limit(self.inner.config.message_page_limit);
        let newest_first = self.inner.storage.load_messages(&params)?;

        let mut view = self.inner.view.write();
        if view.selected.as_deref() == Some(peer.as_str()) {
            view.messages = merge_messages(&view.messages, &newest_first);
        }
        Ok(())
    }

    fn merge_into_view(&self, peer: &str, messages: &[StoredMessage]) {
        let mut view = self.inner.view.write();
        if view.selected.as_deref() == Some(peer) {
            view.messages = merge_messages(&view.messages, messages);
        }
    }

    /// Send `text` to the selected contact.
    pub async fn send_message(&self, text: &str) -> ChatResult<StoredMessage> {
        let peer = self
            .selected_contact()
            .ok_or_else(|| ChatError::Validation("no contact selected".to_string()))?;
        self.send_message_to(&peer, text).await
    }

    /// Send `text` to `peer`. Nothing is stored if the relay refuses it.
    pub async fn send_message_to(&self, peer: &str, text: &str) -> ChatResult<StoredMessage> {
        let stored = self.inner.engine.send_message(peer, text).await?;
        self.merge_into_view(peer, std::slice::from_ref(&stored));
        Ok(stored)
    }

    /// Run one poll cycle now and refresh the open conversation.
    pub async fn sync_now(&self) -> ChatResult<CycleReport> {
        let report = self.inner.engine.run_cycle().await?;
        if !report.new_ids.is_empty() {
            self.refresh_selected()?;
        }
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Read State
    // ═══════════════════════════════════════════════════════════════════════

    /// Mark an incoming message read. Returns whether anything changed.
    pub fn mark_message_as_read(&self, id: &str) -> ChatResult<bool> {
        if !self.inner.storage.mark_as_read(id)? {
            return Ok(false);
        }
        if let Some(updated) = self.inner.storage.get_message(id)? {
            self.merge_into_view(updated.peer(), std::slice::from_ref(&updated));
        }
        tracing::debug!(id = %id, "message read");
        crate::sync::events::emit(&self.inner.events, ChatEvent::MessageRead { id: id.to_string() });
        Ok(true)
    }

    /// A message of the open conversation scrolled into view.
    pub fn message_visible(&self, id: &str) {
        let cached = {
            let view = self.inner.view.read();
            view.messages.iter().find(|m| m.id() == id).cloned()
        };
        let msg = match cached {
            Some(msg) => Some(msg),
            None => self.inner.storage.get_message(id).ok().flatten(),
        };
        if let Some(msg) = msg {
            self.inner.tracker.message_visible(id, !msg.is_unread());
        }
    }

    pub fn message_hidden(&self, id: &str) {
        self.inner.tracker.message_hidden(id);
    }

    /// Window focus changed.
    pub fn set_focused(&self, focused: bool) {
        self.inner.tracker.set_focused(focused);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connectivity
    // ═══════════════════════════════════════════════════════════════════════

    /// Host-reported network connectivity.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Offline or the last poll failed.
    pub fn show_offline_banner(&self) -> bool {
        !self.inner.online.load(Ordering::SeqCst) || self.inner.engine.poll_unavailable()
    }
}

fn upgrade(inner: &Weak<Inner>) -> Option<Messenger> {
    inner.upgrade().map(|inner| Messenger { inner })
}

/// Keep the open conversation in step with what the engine stores.
fn spawn_event_pump(inner: Weak<Inner>, mut rx: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event pump lagged, refreshing view");
                    ChatEvent::MessagesStored {
                        peers: Vec::new(),
                        count: 0,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(messenger) = upgrade(&inner) else {
                break;
            };

            match event {
                ChatEvent::MessagesStored { .. } | ChatEvent::Acknowledged { .. } => {
                    if let Err(e) = messenger.refresh_selected() {
                        tracing::warn!(error = %e, "failed to refresh conversation");
                    }
                }
                ChatEvent::LoggedOut if !messenger.inner.session.is_logged_in() => {
                    messenger.reset_view();
                    messenger.inner.engine.reset();
                }
                _ => {}
            }
        }
    })
}

/// Persist read marks fired by the tracker.
fn spawn_read_pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(id) = rx.recv().await {
            let Some(messenger) = upgrade(&inner) else {
                break;
            };
            if let Err(e) = messenger.mark_message_as_read(&id) {
                tracing::warn!(id = %id, error = %e, "failed to mark message read");
            }
        }
    })
}
