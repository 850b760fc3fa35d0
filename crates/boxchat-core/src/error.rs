//! Error types for BoxChat

use thiserror::Error;

use crate::relay::RelayError;

/// Main error type for BoxChat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// A required field was missing or malformed on a store write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation on a row that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed persisted or wire data
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Mnemonic failed wordlist or checksum validation
    #[error("Invalid seed phrase")]
    InvalidSeed,

    /// A hex public key could not be parsed into an Ed25519 point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Ciphertext did not authenticate (wrong key, tampered data, or malformed input)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// No active session (no keypair or token)
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session was torn down while the operation was in flight
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Relay transport or protocol error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Anything else, with the original message preserved
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ChatError {
    /// Whether the failure means the relay could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, ChatError::Relay(e) if e.is_network())
    }

    /// Whether the failure is an authorization rejection (401/403).
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Relay(e) if e.is_auth())
    }
}

impl From<postcard::Error> for ChatError {
    fn from(e: postcard::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;
