//! Identity module for BoxChat
//!
//! An account is an Ed25519 keypair derived deterministically from a BIP-39
//! mnemonic. The lowercase hex of the public key is the account's identity on
//! the relay and the owner key of every local row.
//!
//! ## Example
//!
//! ```rust
//! use boxchat_core::identity::{derive_keypair, generate_seed, validate_seed};
//!
//! let seed = generate_seed();
//! assert!(validate_seed(&seed));
//!
//! let keypair = derive_keypair(&seed).unwrap();
//! let again = derive_keypair(&seed).unwrap();
//! assert_eq!(keypair.public_key_hex(), again.public_key_hex());
//! ```

mod keypair;
mod seed;

pub use keypair::{parse_public_key_hex, KeyPair, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH};
pub(crate) use keypair::x25519_public;
pub use seed::{derive_keypair, generate_seed, validate_seed, KEY_CONTEXT, SIGNING_SUBKEY_ID};

/// Lowercase hex of an Ed25519 public key; the primary key of accounts and peers.
pub type PublicKeyHex = String;

/// Short display form of a hex identity: first 6 and last 4 characters.
pub fn short_id(public_key_hex: &str) -> String {
    let chars: Vec<char> = public_key_hex.chars().collect();
    if chars.len() <= 10 {
        return public_key_hex.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_identity_workflow() {
        let seed = generate_seed();
        let keypair = derive_keypair(&seed).unwrap();

        // Identity is the lowercase hex public key
        let id = keypair.public_key_hex();
        assert_eq!(id, id.to_lowercase());
        assert_eq!(parse_public_key_hex(&id).unwrap(), keypair.verifying_key());

        // Re-entering the same phrase restores the same identity
        let restored = derive_keypair(&seed).unwrap();
        assert_eq!(restored.public_key_hex(), id);

        let message = b"login:1700000000000";
        assert!(keypair.verify(message, &restored.sign(message)));
    }

    #[test]
    fn test_short_id() {
        let id = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert_eq!(short_id(id), "012345…cdef");
        assert_eq!(short_id("abc"), "abc");
    }
}
