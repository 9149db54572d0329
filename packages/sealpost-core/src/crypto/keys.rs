//! # Key Management
//!
//! Session key pairs for envelope encryption.
//!
//! ## Key Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SESSION KEY LIFECYCLE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Session start ──► KeyPair::generate()                                 │
//! │                     │  32 bytes from OsRng                             │
//! │                     │  X25519 secret (clamped)                         │
//! │                     ▼                                                   │
//! │                  public = X25519(secret, basepoint)                    │
//! │                     │                                                   │
//! │                     ├──► shared with senders (directory, out of band)  │
//! │                     └──► stamped into every envelope we send           │
//! │                                                                         │
//! │  Session end ───► KeyPair dropped, secret zeroized                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are never persisted. A recipient is only reachable with the key of
//! its live session; that is an accepted limitation of the scheme.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::PUBLIC_KEY_SIZE;

/// X25519 key pair owned by one session.
///
/// The secret scalar is zeroized when the pair is dropped
/// (`StaticSecret` handles its own zeroization).
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    ///
    /// Draws 32 bytes from the operating system's secure random number
    /// generator. Fails with [`Error::CryptoUnavailable`] when the random
    /// source cannot be read; the caller cannot continue without it.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(bytes.as_mut_slice())
            .map_err(|e| Error::CryptoUnavailable(format!("OS random source failed: {}", e)))?;
        Ok(Self::from_secret_bytes(&bytes))
    }

    /// Rebuild a key pair from secret bytes
    ///
    /// The public key is always recomputed from the secret, so the two can
    /// never disagree.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    /// Public half of the pair
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Returns `None` when the result is non-contributory, i.e. the other
    /// public key is a low-order point and the output is all zeros.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Option<Zeroizing<[u8; 32]>> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(their_public.0));
        if !shared.was_contributory() {
            return None;
        }
        Some(Zeroizing::new(shared.to_bytes()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// X25519 public key (32 bytes)
///
/// Serialized as 64 lower-case hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex_bytes")] [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create a PublicKey from raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Encode as lower-case hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex (either case)
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.trim();
        if hex_str.len() != PUBLIC_KEY_SIZE * 2 {
            return Err(Error::InvalidInput(format!(
                "Public key hex must be {} characters",
                PUBLIC_KEY_SIZE * 2
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::InvalidInput(format!("Invalid public key hex: {}", e)))?;
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidInput("Invalid public key length".into()))?;

        Ok(Self(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serde helper for serializing byte arrays as hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} bytes", N)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = KeyPair::generate().unwrap();
        let kp2 = KeyPair::generate().unwrap();

        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_public_key_derived_from_secret() {
        let kp = KeyPair::from_secret_bytes(&[9u8; 32]);
        let restored = KeyPair::from_secret_bytes(&[9u8; 32]);

        assert_eq!(kp.public_key(), restored.public_key());
        assert_ne!(kp.public_key(), KeyPair::from_secret_bytes(&[8u8; 32]).public_key());
    }

    #[test]
    fn test_diffie_hellman() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();

        let alice_shared = alice.diffie_hellman(bob.public_key()).unwrap();
        let bob_shared = bob.diffie_hellman(alice.public_key()).unwrap();

        assert_eq!(*alice_shared, *bob_shared);
    }

    #[test]
    fn test_diffie_hellman_rejects_low_order_point() {
        let alice = KeyPair::generate().unwrap();
        let identity_point = PublicKey::from_bytes([0u8; 32]);

        assert!(alice.diffie_hellman(&identity_point).is_none());
    }

    #[test]
    fn test_public_key_hex() {
        let kp = KeyPair::generate().unwrap();
        let hex = kp.public_key().to_hex();

        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(PublicKey::from_hex(&hex).unwrap(), *kp.public_key());
        assert_eq!(
            PublicKey::from_hex(&hex.to_uppercase()).unwrap(),
            *kp.public_key()
        );
    }

    #[test]
    fn test_public_key_hex_rejects_bad_input() {
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex(&"zz".repeat(32)).is_err());
        assert!(PublicKey::from_hex(&"a".repeat(63)).is_err());
    }

    #[test]
    fn test_public_key_serialization() {
        let kp = KeyPair::generate().unwrap();

        let json = serde_json::to_string(kp.public_key()).unwrap();
        let restored: PublicKey = serde_json::from_str(&json).unwrap();

        assert_eq!(json, format!("\"{}\"", kp.public_key().to_hex()));
        assert_eq!(restored, *kp.public_key());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let kp = KeyPair::from_secret_bytes(&[7u8; 32]);
        let debug = format!("{:?}", kp);

        assert!(!debug.contains(&hex::encode([7u8; 32])));
        assert!(debug.contains(&kp.public_key().to_hex()));
    }
}
