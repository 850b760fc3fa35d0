//! Shared fixtures for integration tests: an in-memory relay and helpers
//! for building identities and sealed relay messages.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use boxchat_core::crypto;
use boxchat_core::identity::parse_public_key_hex;
use boxchat_core::relay::{AuthRequest, OutgoingPayload, RelayApi, RelayError, ServerMessage};
use boxchat_core::storage::Storage;
use boxchat_core::KeyPair;

/// 24-word all-zero-entropy BIP-39 vector
pub const TEST_SEED: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
abandon abandon abandon abandon art";

#[derive(Default)]
struct RelayState {
    reachable: bool,
    reject_login: bool,
    fail_sends: bool,
    fail_acks: bool,
    fail_fetches: bool,
    auth_delay: Option<Duration>,
    fetch_delay: Option<Duration>,
    next_token: u64,
    next_id: u64,
    /// token -> public key hex
    valid_tokens: HashMap<String, String>,
    serve_misaddressed: bool,
    mailbox: Vec<ServerMessage>,
    acked: Vec<Vec<String>>,
    sent: Vec<OutgoingPayload>,
}

/// Scriptable in-memory relay.
///
/// Posted messages land in a shared mailbox and stay there until the
/// recipient acknowledges them. Every bearer token stays valid until revoked.
/// Fetches return the caller's own messages unless misaddressed serving is
/// switched on.
pub struct MockRelay {
    state: Mutex<RelayState>,
    auth_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RelayState {
                reachable: true,
                ..RelayState::default()
            }),
            auth_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn enqueue(&self, msg: ServerMessage) {
        self.state.lock().mailbox.push(msg);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn set_reject_login(&self, reject: bool) {
        self.state.lock().reject_login = reject;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn set_fail_acks(&self, fail: bool) {
        self.state.lock().fail_acks = fail;
    }

    /// Answer fetches with a 500 while the relay stays reachable.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.state.lock().fail_fetches = fail;
    }

    pub fn set_auth_delay(&self, delay: Duration) {
        self.state.lock().auth_delay = Some(delay);
    }

    /// Serve every queued message to every caller.
    pub fn set_serve_misaddressed(&self, serve: bool) {
        self.state.lock().serve_misaddressed = serve;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = Some(delay);
    }

    /// Expire every issued token; the next request gets a 401.
    pub fn revoke_tokens(&self) {
        self.state.lock().valid_tokens.clear();
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> Vec<Vec<String>> {
        self.state.lock().acked.clone()
    }

    pub fn sent(&self) -> Vec<OutgoingPayload> {
        self.state.lock().sent.clone()
    }

    pub fn mailbox_len(&self) -> usize {
        self.state.lock().mailbox.len()
    }

    /// The identity behind `token`.
    fn check(&self, token: &str) -> Result<String, RelayError> {
        let state = self.state.lock();
        if !state.reachable {
            return Err(RelayError::Unreachable("connection refused".to_string()));
        }
        state
            .valid_tokens
            .get(token)
            .cloned()
            .ok_or(RelayError::Unauthorized { status: 401 })
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn authenticate(&self, request: &AuthRequest) -> Result<String, RelayError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().auth_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let verifying_key = parse_public_key_hex(&request.public_key)
            .map_err(|e| RelayError::Http { status: 400, message: e.to_string() })?;
        let bytes: [u8; 64] = hex::decode(&request.signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(RelayError::Http { status: 400, message: "bad signature".to_string() })?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        let challenge = format!("login:{}", request.timestamp);

        let mut state = self.state.lock();
        if !state.reachable {
            return Err(RelayError::Unreachable("connection refused".to_string()));
        }
        if state.reject_login || verifying_key.verify_strict(challenge.as_bytes(), &signature).is_err() {
            return Err(RelayError::Unauthorized { status: 401 });
        }
        state.next_token += 1;
        let token = format!("token-{}", state.next_token);
        state
            .valid_tokens
            .insert(token.clone(), request.public_key.clone());
        Ok(token)
    }

    async fn fetch_messages(&self, token: &str) -> Result<Vec<ServerMessage>, RelayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let owner = self.check(token)?;
        let delay = self.state.lock().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        if state.fail_fetches {
            return Err(RelayError::Http { status: 500, message: "internal error".to_string() });
        }
        Ok(state
            .mailbox
            .iter()
            .filter(|m| state.serve_misaddressed || m.recipient == owner)
            .cloned()
            .collect())
    }

    async fn send_message(
        &self,
        token: &str,
        payload: &OutgoingPayload,
    ) -> Result<String, RelayError> {
        self.check(token)?;
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(RelayError::Http { status: 500, message: "internal error".to_string() });
        }
        state.next_id += 1;
        let id = format!("srv-{}", state.next_id);
        state.sent.push(payload.clone());
        state.mailbox.push(ServerMessage {
            sender: payload.sender.clone(),
            recipient: payload.recipient.clone(),
            message: hex::encode(&payload.message),
            id: id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        Ok(id)
    }

    async fn acknowledge(&self, token: &str, ids: &[String]) -> Result<(), RelayError> {
        self.check(token)?;
        let mut state = self.state.lock();
        if state.fail_acks {
            return Err(RelayError::Http { status: 500, message: "internal error".to_string() });
        }
        state.mailbox.retain(|m| !ids.contains(&m.id));
        state.acked.push(ids.to_vec());
        Ok(())
    }
}

pub fn keypair(n: u8) -> KeyPair {
    KeyPair::from_signing_seed(&[n; 32])
}

/// A relay message from `from` to `to`, sealed the way a real client sends it.
pub fn sealed(from: &KeyPair, to: &KeyPair, id: &str, timestamp: i64, text: &str) -> ServerMessage {
    let payload = crypto::encrypt(text.as_bytes(), from, &to.verifying_key()).unwrap();
    ServerMessage {
        sender: from.public_key_hex(),
        recipient: to.public_key_hex(),
        message: hex::encode(payload),
        id: id.to_string(),
        timestamp,
    }
}

pub fn temp_storage() -> (TempDir, Storage) {
    let temp = TempDir::new().unwrap();
    let storage = Storage::open_in(temp.path()).unwrap();
    (temp, storage)
}
