//! # Key Derivation
//!
//! Turns a raw X25519 shared secret into the symmetric key that seals one
//! sender/recipient pair's envelopes.
//!
//! ```text
//! sender_secret × recipient_public  (== recipient_secret × sender_public)
//!       │
//!       ▼
//! HKDF-SHA256(ikm = dh_output, salt = none, info = "sealpost-envelope-v1")
//!       │
//!       ▼
//! 32-byte XChaCha20-Poly1305 key
//! ```
//!
//! | Aspect | Choice |
//! |--------|--------|
//! | KDF | HKDF-SHA256 |
//! | Key separation | distinct `info` strings per purpose |
//! | Version | "-v1" suffix |

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

use super::KEY_SIZE;

/// Domain separation strings for HKDF and AEAD associated data
pub mod domain {
    /// Domain for envelope key derivation, also the AAD prefix
    pub const ENVELOPE: &[u8] = b"sealpost-envelope-v1";
}

/// Symmetric key for one sender/recipient pair
///
/// Zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EnvelopeKey([u8; KEY_SIZE]);

impl EnvelopeKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derive the envelope key from a Diffie-Hellman output
pub fn derive_envelope_key(dh_output: &[u8; 32]) -> Result<EnvelopeKey> {
    let hkdf = Hkdf::<Sha256>::new(None, dh_output);

    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(domain::ENVELOPE, &mut key)
        .map_err(|_| Error::CryptoUnavailable("HKDF expansion failed".into()))?;

    let derived = EnvelopeKey(key);
    key.zeroize();
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let k1 = derive_envelope_key(&[9u8; 32]).unwrap();
        let k2 = derive_envelope_key(&[9u8; 32]).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let k1 = derive_envelope_key(&[1u8; 32]).unwrap();
        let k2 = derive_envelope_key(&[2u8; 32]).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_key_is_not_the_shared_secret() {
        let dh = [5u8; 32];
        let key = derive_envelope_key(&dh).unwrap();

        assert_ne!(key.as_bytes(), &dh);
    }
}
