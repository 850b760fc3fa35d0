//! Ed25519 account keypair
//!
//! The signing key doubles as the account's box-encryption key through the
//! standard Ed25519 -> X25519 conversion, so one 32-byte seed is the whole
//! identity.

use crate::error::{ChatError, ChatResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

/// Length of an Ed25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 private key in libsodium layout (`seed ‖ public`)
pub const PRIVATE_KEY_LENGTH: usize = 64;

/// Account keypair: a 32-byte Ed25519 public key and a 64-byte private key.
///
/// Only ever built from a derived seed (see [`derive_keypair`](super::derive_keypair)),
/// never generated independently of the mnemonic.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Expand a 32-byte signing seed into a keypair.
    pub fn from_signing_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild a keypair from a 64-byte private key (`seed ‖ public`).
    ///
    /// Rejects keys whose trailing half does not match the seed's public key.
    pub fn from_private_key(bytes: &[u8]) -> ChatResult<Self> {
        let bytes: &[u8; PRIVATE_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ChatError::Crypto(format!(
                "private key must be {} bytes, got {}",
                PRIVATE_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        let signing = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| ChatError::Crypto(format!("invalid private key: {}", e)))?;
        Ok(Self { signing })
    }

    /// The raw 32-byte public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing.verifying_key().to_bytes()
    }

    /// The 64-byte private key in libsodium layout (`seed ‖ public`).
    pub fn private_key(&self) -> Zeroizing<[u8; PRIVATE_KEY_LENGTH]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    /// Lowercase hex of the public key: the account's identity on the wire and in storage.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// The Ed25519 verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Detached Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Verify a detached signature made by this keypair.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing.verifying_key().verify(message, signature).is_ok()
    }

    /// X25519 secret scalar derived from the signing key.
    ///
    /// Same as libsodium's `crypto_sign_ed25519_sk_to_curve25519`: the low half
    /// of SHA-512(seed). Clamping happens inside the DH.
    pub(crate) fn x25519_secret(&self) -> crypto_box::SecretKey {
        crypto_box::SecretKey::from(self.signing.to_scalar_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for KeyPair {}

/// Parse a hex-encoded Ed25519 public key.
pub fn parse_public_key_hex(public_key_hex: &str) -> ChatResult<VerifyingKey> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| ChatError::InvalidPublicKey(format!("{}: {}", public_key_hex, e)))?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
        ChatError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LENGTH,
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| ChatError::InvalidPublicKey(format!("{}: {}", public_key_hex, e)))
}

/// X25519 public key for an Ed25519 verifying key (birational map to Montgomery form).
pub(crate) fn x25519_public(key: &VerifyingKey) -> crypto_box::PublicKey {
    crypto_box::PublicKey::from(key.to_montgomery().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sizes() {
        let keypair = KeyPair::from_signing_seed(&[7u8; 32]);
        assert_eq!(keypair.public_key().len(), PUBLIC_KEY_LENGTH);
        assert_eq!(keypair.private_key().len(), PRIVATE_KEY_LENGTH);
        assert_eq!(keypair.public_key_hex().len(), 64);
    }

    #[test]
    fn test_private_key_embeds_public_key() {
        let keypair = KeyPair::from_signing_seed(&[9u8; 32]);
        let private = keypair.private_key();
        assert_eq!(&private[..32], &[9u8; 32]);
        assert_eq!(&private[32..], &keypair.public_key());
    }

    #[test]
    fn test_private_key_roundtrip() {
        let keypair = KeyPair::from_signing_seed(&[3u8; 32]);
        let restored = KeyPair::from_private_key(keypair.private_key().as_slice()).unwrap();
        assert_eq!(keypair, restored);
    }

    #[test]
    fn test_private_key_with_foreign_public_half_rejected() {
        let a = KeyPair::from_signing_seed(&[1u8; 32]);
        let b = KeyPair::from_signing_seed(&[2u8; 32]);
        let mut bytes = *a.private_key();
        bytes[32..].copy_from_slice(&b.public_key());
        assert!(KeyPair::from_private_key(&bytes).is_err());
        assert!(KeyPair::from_private_key(&bytes[..10]).is_err());
    }

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::from_signing_seed(&[5u8; 32]);
        let other = KeyPair::from_signing_seed(&[6u8; 32]);
        let signature = keypair.sign(b"login:1700000000000");

        assert!(keypair.verify(b"login:1700000000000", &signature));
        assert!(!keypair.verify(b"login:1700000000001", &signature));
        assert!(!other.verify(b"login:1700000000000", &signature));
    }

    #[test]
    fn test_parse_public_key_hex() {
        let keypair = KeyPair::from_signing_seed(&[4u8; 32]);
        let parsed = parse_public_key_hex(&keypair.public_key_hex()).unwrap();
        assert_eq!(parsed, keypair.verifying_key());

        assert!(parse_public_key_hex("not-hex").is_err());
        assert!(parse_public_key_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keypair = KeyPair::from_signing_seed(&[8u8; 32]);
        let debug = format!("{:?}", keypair);
        assert!(debug.contains(&keypair.public_key_hex()));
        assert!(!debug.contains(&hex::encode([8u8; 32])));
    }
}
