//! Mnemonic seed handling and deterministic key derivation
//!
//! ```text
//! mnemonic (24 words, 256-bit entropy)
//!   └─ BIP-39 seed (PBKDF2-HMAC-SHA512, empty passphrase, 64 bytes)
//!        └─ master key   = BLAKE2b-256(seed, key = "USERSIGN")
//!             └─ signing seed = KDF(master key, subkey 1, ctx "USERSIGN")
//!                  └─ Ed25519 keypair
//! ```
//!
//! The hash and KDF steps match libsodium's `crypto_generichash` and
//! `crypto_kdf_derive_from_key`, so a phrase restores the same account on any
//! client built on either library.

use bip39::{Language, Mnemonic};
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use rand::RngCore;
use zeroize::Zeroizing;

use super::KeyPair;
use crate::error::{ChatError, ChatResult};

/// Domain separation context for both the keyed hash and the KDF.
pub const KEY_CONTEXT: &[u8; 8] = b"USERSIGN";

/// KDF sub-key index of the signing seed.
pub const SIGNING_SUBKEY_ID: u64 = 1;

/// Entropy of a freshly generated mnemonic, in bytes (24 words).
const SEED_ENTROPY_BYTES: usize = 32;

/// Generate a new 24-word English mnemonic from 256 bits of entropy.
pub fn generate_seed() -> Zeroizing<String> {
    let mut entropy = Zeroizing::new([0u8; SEED_ENTROPY_BYTES]);
    rand::rng().fill_bytes(entropy.as_mut());
    // 32 bytes is always a valid BIP-39 entropy length
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
        .unwrap_or_else(|_| unreachable!("32-byte entropy is a valid BIP-39 length"));
    Zeroizing::new(mnemonic.to_string())
}

/// Check wordlist membership and checksum of a mnemonic.
pub fn validate_seed(seed: &str) -> bool {
    parse_mnemonic(seed).is_some()
}

/// Deterministically derive the account keypair from a mnemonic.
///
/// Fails with [`ChatError::InvalidSeed`] when [`validate_seed`] would return false.
pub fn derive_keypair(seed: &str) -> ChatResult<KeyPair> {
    let mnemonic = parse_mnemonic(seed).ok_or(ChatError::InvalidSeed)?;
    let bip39_seed = Zeroizing::new(mnemonic.to_seed_normalized(""));

    let master_key = keyed_hash(KEY_CONTEXT, bip39_seed.as_ref())?;
    let signing_seed = kdf_derive_from_key(&master_key, SIGNING_SUBKEY_ID, KEY_CONTEXT)?;

    Ok(KeyPair::from_signing_seed(&signing_seed))
}

/// Normalize whitespace and case before parsing so pasted phrases still match.
fn parse_mnemonic(seed: &str) -> Option<Mnemonic> {
    let normalized = Zeroizing::new(
        seed.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );
    if normalized.is_empty() {
        return None;
    }
    Mnemonic::parse_in_normalized(Language::English, &normalized).ok()
}

/// BLAKE2b-256 of `data` keyed with `key` (libsodium `crypto_generichash`).
fn keyed_hash(key: &[u8], data: &[u8]) -> ChatResult<Zeroizing<[u8; 32]>> {
    let mut mac = Blake2bMac::<U32>::new_with_salt_and_personal(key, &[], &[])
        .map_err(|e| ChatError::Crypto(format!("keyed hash init failed: {}", e)))?;
    mac.update(data);
    Ok(Zeroizing::new(mac.finalize().into_bytes().into()))
}

/// libsodium `crypto_kdf_derive_from_key`: BLAKE2b keyed with the master key,
/// salt = little-endian sub-key id, personal = context.
fn kdf_derive_from_key(
    master_key: &[u8; 32],
    subkey_id: u64,
    context: &[u8; 8],
) -> ChatResult<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 16];
    salt[..8].copy_from_slice(&subkey_id.to_le_bytes());
    let mut personal = [0u8; 16];
    personal[..8].copy_from_slice(context);

    let mac = Blake2bMac::<U32>::new_with_salt_and_personal(master_key, &salt, &personal)
        .map_err(|e| ChatError::Crypto(format!("kdf init failed: {}", e)))?;
    Ok(Zeroizing::new(mac.finalize().into_bytes().into()))
}
