//! # Encryption Module
//!
//! XChaCha20-Poly1305 sealing for envelope payloads.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENVELOPE ENCRYPTION FLOW                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER (Alice)                                                        │
//! │                                                                         │
//! │  1. X25519: alice_secret × bob_public → shared (32 bytes)              │
//! │  2. HKDF-SHA256(shared, "sealpost-envelope-v1") → key                  │
//! │  3. nonce = 24 random bytes                                            │
//! │  4. XChaCha20-Poly1305(key, nonce, plaintext, aad)                     │
//! │       → ciphertext || 16-byte tag                                      │
//! │                                                                         │
//! │  RECIPIENT (Bob)                                                       │
//! │                                                                         │
//! │  1. X25519: bob_secret × alice_public → same shared secret             │
//! │  2. Same HKDF                                                          │
//! │  3. Open with the received nonce and the same aad                      │
//! │       → plaintext, or DecryptionFailed if anything was altered         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The 192-bit nonce is drawn at random for every envelope. At that size
//! random nonces do not collide in practice, so no counter state is kept.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{Error, Result};

use super::kdf::{derive_envelope_key, EnvelopeKey};
use super::{KeyPair, PublicKey};

/// Size of the XChaCha20-Poly1305 nonce in bytes (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// A nonce (number used once) for XChaCha20-Poly1305
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce under the same key pair.** Reuse leaks the XOR of
/// the two plaintexts and allows forgeries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::CryptoUnavailable(format!("OS random source failed: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// Seal a plaintext under a fresh random nonce
///
/// Returns the nonce and the ciphertext with its tag appended.
pub fn encrypt(key: &EnvelopeKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce.0),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::InvalidInput("Message too large to encrypt".into()))?;

    Ok((nonce, ciphertext))
}

/// Open a sealed ciphertext
///
/// ## Errors
///
/// Returns [`Error::DecryptionFailed`] if the ciphertext, nonce, aad or key
/// differ in any way from what was sealed. The error carries no detail.
pub fn decrypt(key: &EnvelopeKey, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(
            XNonce::from_slice(&nonce.0),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}

/// Encrypt for a recipient's public key
///
/// ```text
/// X25519(our_secret, their_public) → HKDF → XChaCha20-Poly1305
/// ```
///
/// A low-order recipient key is rejected as [`Error::InvalidInput`] before
/// anything is sealed.
pub fn encrypt_for_recipient(
    ours: &KeyPair,
    their_public_key: &PublicKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Nonce, Vec<u8>)> {
    let shared = ours.diffie_hellman(their_public_key).ok_or_else(|| {
        Error::InvalidInput("Recipient public key is not a usable curve point".into())
    })?;
    let key = derive_envelope_key(&shared)?;

    encrypt(&key, plaintext, aad)
}

/// Decrypt a message from a sender's public key
///
/// Every failure, including a low-order sender key, is the same opaque
/// [`Error::DecryptionFailed`].
pub fn decrypt_from_sender(
    ours: &KeyPair,
    their_public_key: &PublicKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let shared = ours
        .diffie_hellman(their_public_key)
        .ok_or(Error::DecryptionFailed)?;
    let key = derive_envelope_key(&shared).map_err(|_| Error::DecryptionFailed)?;

    decrypt(&key, nonce, ciphertext, aad)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = EnvelopeKey::from_bytes([42u8; 32]);
        let plaintext = b"Hello, World!";
        let aad = b"context";

        let (nonce, ciphertext) = encrypt(&key, plaintext, aad).unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, aad).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = EnvelopeKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"", b"").unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, b"").unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EnvelopeKey::from_bytes([42u8; 32]);

        let (nonce, mut ciphertext) = encrypt(&key, b"Hello, World!", b"context").unwrap();
        ciphertext[0] ^= 0x01;

        let result = decrypt(&key, &nonce, &ciphertext, b"context");
        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = EnvelopeKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"Hello, World!", b"context").unwrap();
        let result = decrypt(&key, &nonce, &ciphertext, b"wrong context");

        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_random_nonces_differ() {
        let n1 = Nonce::random().unwrap();
        let n2 = Nonce::random().unwrap();

        assert_ne!(n1, n2);
    }

    #[test]
    fn test_encrypt_for_recipient_round_trip() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let aad = b"alice|bob|timestamp";

        let (nonce, ciphertext) =
            encrypt_for_recipient(&alice, bob.public_key(), b"Secret for Bob", aad).unwrap();
        let decrypted =
            decrypt_from_sender(&bob, alice.public_key(), &nonce, &ciphertext, aad).unwrap();

        assert_eq!(decrypted, b"Secret for Bob");
    }

    #[test]
    fn test_third_party_cannot_decrypt() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let eve = KeyPair::generate().unwrap();

        let (nonce, ciphertext) =
            encrypt_for_recipient(&alice, bob.public_key(), b"Secret", b"").unwrap();
        let result = decrypt_from_sender(&eve, alice.public_key(), &nonce, &ciphertext, b"");

        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        let alice = KeyPair::generate().unwrap();
        let zero = PublicKey::from_bytes([0u8; 32]);

        let result = encrypt_for_recipient(&alice, &zero, b"hi", b"");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
