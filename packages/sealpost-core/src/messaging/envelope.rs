//! # Envelope Codec
//!
//! Builds and opens sealed envelopes, and converts them to and from the JSON
//! wire form that goes into content storage.
//!
//! ## Wire Format
//!
//! ```json
//! {
//!   "encrypted": "<hex ciphertext || 16-byte tag>",
//!   "nonce":     "<48 hex>",
//!   "sender":    "<64 hex, sender X25519 public key>",
//!   "timestamp": 1700000000000
//! }
//! ```
//!
//! Hex is written lower-case and read in either case.
//!
//! ## Associated Data
//!
//! ```text
//! "sealpost-envelope-v1" || sender_public (32) || recipient_public (32) || timestamp_ms (8, BE)
//! ```
//!
//! Binding both keys and the timestamp means an envelope cannot be replayed
//! under a different sender key or time without failing authentication.

use serde::{Deserialize, Serialize};

use crate::crypto::{
    decrypt_from_sender, domain, encrypt_for_recipient, KeyPair, Nonce, PublicKey, NONCE_SIZE,
    PUBLIC_KEY_SIZE, TAG_SIZE,
};
use crate::error::{Error, Result};
use crate::time::now_timestamp_millis;

/// One sealed message
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    ciphertext: Vec<u8>,
    nonce: Nonce,
    sender_public_key: PublicKey,
    timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    encrypted: String,
    nonce: String,
    sender: String,
    timestamp: i64,
}

impl Envelope {
    /// Seal `plaintext` for `recipient`, stamped with the current time
    pub fn encrypt(plaintext: &str, recipient: &PublicKey, sender: &KeyPair) -> Result<Self> {
        Self::encrypt_at(plaintext, recipient, sender, now_timestamp_millis())
    }

    /// Seal `plaintext` with an explicit timestamp (milliseconds)
    pub fn encrypt_at(
        plaintext: &str,
        recipient: &PublicKey,
        sender: &KeyPair,
        timestamp: i64,
    ) -> Result<Self> {
        let aad = associated_data(sender.public_key(), recipient, timestamp);
        let (nonce, ciphertext) =
            encrypt_for_recipient(sender, recipient, plaintext.as_bytes(), &aad)?;

        Ok(Self {
            ciphertext,
            nonce,
            sender_public_key: *sender.public_key(),
            timestamp,
        })
    }

    /// Open the envelope as its recipient
    ///
    /// `sender` is the key the envelope is expected to come from, normally
    /// [`sender_public_key`](Self::sender_public_key). Every failure is the
    /// opaque [`Error::DecryptionFailed`].
    pub fn decrypt(&self, sender: &PublicKey, recipient: &KeyPair) -> Result<String> {
        let aad = associated_data(sender, recipient.public_key(), self.timestamp);
        let plaintext = decrypt_from_sender(recipient, sender, &self.nonce, &self.ciphertext, &aad)?;

        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }

    /// Ciphertext with the authentication tag appended
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Nonce used to seal
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Public key the sender sealed with
    pub fn sender_public_key(&self) -> &PublicKey {
        &self.sender_public_key
    }

    /// Sealing time, milliseconds since the epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        let wire = WireEnvelope {
            encrypted: hex::encode(&self.ciphertext),
            nonce: hex::encode(self.nonce.as_bytes()),
            sender: self.sender_public_key.to_hex(),
            timestamp: self.timestamp,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parse the JSON wire form
    ///
    /// Rejects missing fields, odd-length or non-hex strings, and fields of
    /// the wrong size with [`Error::MalformedEnvelope`].
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_str(json)?;

        let ciphertext = decode_hex("encrypted", &wire.encrypted)?;
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "encrypted must be at least {} bytes",
                TAG_SIZE
            )));
        }
        let nonce: [u8; NONCE_SIZE] = decode_fixed("nonce", &wire.nonce)?;
        let sender: [u8; PUBLIC_KEY_SIZE] = decode_fixed("sender", &wire.sender)?;

        Ok(Self {
            ciphertext,
            nonce: Nonce::from_bytes(nonce),
            sender_public_key: PublicKey::from_bytes(sender),
            timestamp: wire.timestamp,
        })
    }
}

/// AEAD associated data for one envelope
pub fn associated_data(sender: &PublicKey, recipient: &PublicKey, timestamp: i64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(domain::ENVELOPE.len() + 2 * PUBLIC_KEY_SIZE + 8);
    aad.extend_from_slice(domain::ENVELOPE);
    aad.extend_from_slice(sender.as_bytes());
    aad.extend_from_slice(recipient.as_bytes());
    aad.extend_from_slice(&timestamp.to_be_bytes());
    aad
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    if value.len() % 2 != 0 {
        return Err(Error::MalformedEnvelope(format!("{} has odd length", field)));
    }
    hex::decode(value).map_err(|_| Error::MalformedEnvelope(format!("{} is not hex", field)))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    decode_hex(field, value)?.try_into().map_err(|bytes: Vec<u8>| {
        Error::MalformedEnvelope(format!(
            "{} must be {} bytes, got {}",
            field,
            N,
            bytes.len()
        ))
    })
}
