//! Relay client
//!
//! The relay stores and forwards ciphertext between identities. It never sees
//! plaintext and never holds more than the messages a client has not yet
//! acknowledged.
//!
//! ```text
//! POST /auth            {publicKey, signature, timestamp}  -> {ok, token}
//! GET  /user/messages   (bearer)                           -> [ServerMessage]
//! POST /message         (bearer, msgpack OutgoingPayload)  -> {ok, id}
//! POST /message/read    (bearer, JSON [id])                -> {ok}
//! ```
//!
//! [`RelayApi`] is the seam the sync engine and auth session talk through;
//! [`HttpRelay`] is the production implementation.

mod http;

pub use http::HttpRelay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto;
use crate::error::{ChatError, ChatResult};
use crate::identity::KeyPair;
use crate::types::{IncomingMessage, StoredMessage};

/// Prefix of the string signed during login
pub const SIGN_PREFIX: &str = "login:";

/// Relay transport and protocol errors.
///
/// `Clone` so a single shared token refresh can hand the same outcome to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No response reached us (connect failure, timeout, DNS)
    #[error("Relay unreachable: {0}")]
    Unreachable(String),

    /// 401 or 403: the bearer token (or login signature) was refused
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 2xx response whose envelope reported failure
    #[error("Relay rejected request: {0}")]
    Rejected(String),

    /// Body could not be encoded or decoded
    #[error("Malformed relay payload: {0}")]
    Decode(String),
}

impl RelayError {
    pub fn is_network(&self) -> bool {
        matches!(self, RelayError::Unreachable(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RelayError::Unauthorized { .. })
    }
}

/// Login challenge: a signature over `"login:" + timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Hex public key
    pub public_key: String,
    /// Hex Ed25519 signature
    pub signature: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl AuthRequest {
    /// Sign the login challenge for `timestamp` with `keypair`.
    pub fn sign(keypair: &KeyPair, timestamp: i64) -> Self {
        let challenge = format!("{}{}", SIGN_PREFIX, timestamp);
        let signature = keypair.sign(challenge.as_bytes());
        Self {
            public_key: keypair.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
            timestamp,
        }
    }
}

/// A message as served by `GET /user/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub sender: String,
    pub recipient: String,
    /// Hex of `nonce ‖ ciphertext`
    pub message: String,
    pub id: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl ServerMessage {
    /// Convert into a stored incoming row owned by `owner`.
    ///
    /// Fails when the relay served a message addressed to someone else or
    /// with a ciphertext that is not hex.
    pub fn into_incoming(self, owner: &str) -> ChatResult<StoredMessage> {
        if self.recipient != owner {
            return Err(ChatError::Validation(format!(
                "message {} addressed to {}, not to us",
                self.id, self.recipient
            )));
        }
        let encrypted = crypto::hex_to_base64(&self.message)?;
        Ok(StoredMessage::Incoming(IncomingMessage {
            id: self.id,
            encrypted,
            created_at: self.timestamp,
            sender: self.sender,
            owner: owner.to_string(),
            read_at: None,
            deleted_from_server: false,
        }))
    }
}

/// Body of `POST /message`, sent as a MessagePack map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPayload {
    /// Sender's hex public key
    pub sender: String,
    /// Recipient's hex public key
    pub recipient: String,
    /// Raw `nonce ‖ ciphertext`, packed as msgpack `bin`
    #[serde(with = "serde_bytes")]
    pub message: Vec<u8>,
}

impl OutgoingPayload {
    /// Pack as a named-field MessagePack map.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, RelayError> {
        rmp_serde::to_vec_named(self).map_err(|e| RelayError::Decode(e.to_string()))
    }
}

/// Operations the client needs from a relay.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Exchange a signed login challenge for a bearer token.
    async fn authenticate(&self, request: &AuthRequest) -> Result<String, RelayError>;

    /// Messages waiting for the token's identity.
    async fn fetch_messages(&self, token: &str) -> Result<Vec<ServerMessage>, RelayError>;

    /// Post one ciphertext; returns the relay-assigned id.
    async fn send_message(&self, token: &str, payload: &OutgoingPayload)
        -> Result<String, RelayError>;

    /// Tell the relay these ids are safely stored and may be dropped.
    async fn acknowledge(&self, token: &str, ids: &[String]) -> Result<(), RelayError>;
}
