//! # Cryptography Module
//!
//! Primitives behind Sealpost envelopes.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Session KeyPair (X25519, generated per session, never stored)         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  X25519 ECDH  ──►  HKDF-SHA256  ──►  XChaCha20-Poly1305                │
//! │  (sender secret     ("sealpost-      (24-byte random nonce,            │
//! │   × recipient        envelope-v1")    16-byte tag, aad binds           │
//! │   public)                             both keys + timestamp)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | X25519 | Key agreement between sender and recipient |
//! | HKDF-SHA256 | Envelope key derivation |
//! | XChaCha20-Poly1305 | Authenticated encryption, nonce large enough to draw at random |
//! | SHA-512 (truncated) | Lookup keys, see [`crate::discovery`] |
//!
//! Decryption success proves the envelope was produced by the holder of the
//! sender secret (or by the recipient itself), so no separate signature is
//! needed. There is no forward secrecy.

mod encryption;
mod kdf;
mod keys;

pub use encryption::{
    decrypt, decrypt_from_sender, encrypt, encrypt_for_recipient, Nonce, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{derive_envelope_key, domain, EnvelopeKey};
pub use keys::{KeyPair, PublicKey};

pub(crate) use keys::hex_bytes;

/// Size of symmetric envelope keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
