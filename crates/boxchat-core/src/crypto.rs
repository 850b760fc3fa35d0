//! Pairwise authenticated encryption ("box")
//!
//! Both parties' Ed25519 keys are converted to X25519, the shared secret keys
//! an XSalsa20-Poly1305 box, and a fresh random nonce is prepended to every
//! ciphertext. Compatible with libsodium's `crypto_box_easy`.
//!
//! # Wire Format
//!
//! `[nonce (24 bytes)] + [ciphertext + auth_tag (16 bytes)]`
//!
//! At rest the bytes are base64 (URL-safe alphabet, no padding); on the relay
//! they are hex. [`hex_to_base64`] and [`base64_to_hex`] convert losslessly.
//!
//! # Example
//!
//! ```
//! use boxchat_core::crypto;
//! use boxchat_core::identity::KeyPair;
//!
//! let alice = KeyPair::from_signing_seed(&[1u8; 32]);
//! let bob = KeyPair::from_signing_seed(&[2u8; 32]);
//!
//! let sealed = crypto::encrypt(b"hi", &alice, &bob.verifying_key()).unwrap();
//! let opened = crypto::decrypt(&sealed, &alice.verifying_key(), &bob).unwrap();
//! assert_eq!(opened, b"hi");
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;

use crate::error::{ChatError, ChatResult};
use crate::identity::{parse_public_key_hex, x25519_public, KeyPair};

/// Nonce size for XSalsa20-Poly1305 (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size
pub const MAC_SIZE: usize = 16;

/// Encrypt `plaintext` from `sender` to `recipient`.
///
/// Returns `nonce ‖ ciphertext`. The same plaintext encrypts differently every time.
pub fn encrypt(plaintext: &[u8], sender: &KeyPair, recipient: &VerifyingKey) -> ChatResult<Vec<u8>> {
    let salsa_box = SalsaBox::new(&x25519_public(recipient), &sender.x25519_secret());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(GenericArray::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| ChatError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open a `nonce ‖ ciphertext` payload sent by `sender` to `recipient`.
///
/// Every failure (wrong key, tampered bytes, truncated input) is a
/// [`ChatError::DecryptionFailed`]; nothing here panics.
pub fn decrypt(encoded: &[u8], sender: &VerifyingKey, recipient: &KeyPair) -> ChatResult<Vec<u8>> {
    if encoded.len() < NONCE_SIZE + MAC_SIZE {
        return Err(ChatError::DecryptionFailed(format!(
            "payload too short: {} bytes",
            encoded.len()
        )));
    }

    let (nonce, ciphertext) = encoded.split_at(NONCE_SIZE);
    let salsa_box = SalsaBox::new(&x25519_public(sender), &recipient.x25519_secret());

    salsa_box
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| ChatError::DecryptionFailed("ciphertext did not authenticate".to_string()))
}

/// Encrypt UTF-8 text for a hex-identified recipient, returning the stored base64 form.
pub fn encrypt_text(text: &str, sender: &KeyPair, recipient_hex: &str) -> ChatResult<String> {
    let recipient = parse_public_key_hex(recipient_hex)?;
    let sealed = encrypt(text.as_bytes(), sender, &recipient)?;
    Ok(encode_base64(&sealed))
}

/// Decrypt a stored base64 payload exchanged with `peer_hex` back into text.
///
/// The box is symmetric in the two keys, so this opens both messages the peer
/// sent to us and messages we sent to the peer.
pub fn decrypt_text(encrypted: &str, peer_hex: &str, me: &KeyPair) -> ChatResult<String> {
    let peer = parse_public_key_hex(peer_hex)?;
    let bytes = decode_base64(encrypted)
        .map_err(|e| ChatError::DecryptionFailed(format!("malformed encoding: {}", e)))?;
    let plaintext = decrypt(&bytes, &peer, me)?;
    String::from_utf8(plaintext)
        .map_err(|e| ChatError::DecryptionFailed(format!("plaintext is not UTF-8: {}", e)))
}

/// Encode raw bytes in the at-rest base64 form.
pub fn encode_base64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode the at-rest base64 form.
pub fn decode_base64(encoded: &str) -> ChatResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| ChatError::Serialization(format!("invalid base64: {}", e)))
}

/// Relay hex ciphertext -> at-rest base64.
pub fn hex_to_base64(hex_payload: &str) -> ChatResult<String> {
    let bytes = hex::decode(hex_payload)
        .map_err(|e| ChatError::Serialization(format!("invalid hex: {}", e)))?;
    Ok(encode_base64(&bytes))
}

/// At-rest base64 -> relay hex ciphertext.
pub fn base64_to_hex(encoded: &str) -> ChatResult<String> {
    Ok(hex::encode(decode_base64(encoded)?))
}
