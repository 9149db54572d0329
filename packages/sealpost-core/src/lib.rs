//! # Sealpost Core
//!
//! Confidential messages between ledger identities. The ciphertext lives in
//! content-addressed storage; the public ledger only carries a pointer made
//! of two hashes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SEALPOST CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │   Crypto    │  │  Identity   │  │  Discovery  │  │  Messaging   │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - X25519    │  │ - Address   │  │ - LookupKey │  │ - Envelope   │   │
//! │  │ - HKDF      │  │ - Directory │  │ - Schemes   │  │ - Inbox sync │   │
//! │  │ - XChaCha20 │  │             │  │             │  │              │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │                          ┌───────┴───────┐                              │
//! │                          │    Session    │                              │
//! │                          └───────┬───────┘                              │
//! │                 ┌────────────────┴────────────────┐                     │
//! │  ┌──────────────┴──────────────┐  ┌───────────────┴─────────────────┐  │
//! │  │          Network            │  │            Storage              │  │
//! │  │                             │  │                                 │  │
//! │  │ - Ledger trait              │  │ - ContentStore trait            │  │
//! │  │ - MemoryLedger              │  │ - MemoryStore                   │  │
//! │  │ - RpcLedger (JSON-RPC)      │  │ - IpfsStore (HTTP API)          │  │
//! │  └─────────────────────────────┘  └─────────────────────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type for the entire library
//! - [`crypto`] - Key pairs, key derivation, authenticated encryption
//! - [`identity`] - Canonical addresses and the address book
//! - [`discovery`] - Lookup keys for recipients and storage identifiers
//! - [`storage`] - Content-addressed envelope storage
//! - [`network`] - The pointer ledger
//! - [`messaging`] - Envelope codec and inbox synchronization
//! - [`session`] - The per-party context object
//! - [`config`] - TOML configuration
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Content: X25519 + HKDF-SHA256 + XChaCha20-Poly1305                    │
//! │  ─────────────────────────────────────────────────                      │
//! │  Only the recipient's session key opens an envelope, and opening it    │
//! │  proves the sender's session key sealed it.                            │
//! │                                                                         │
//! │  Metadata: truncated SHA-512 lookup keys                               │
//! │  ───────────────────────────────────────                                │
//! │  The ledger shows who sent, when, and a hash of the recipient.         │
//! │  The hash only hides the recipient from someone without a list of      │
//! │  candidate addresses.                                                  │
//! │                                                                         │
//! │  Keys are generated per session and never stored. There is no          │
//! │  forward secrecy and no key rotation.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sealpost_core::{
//!     Address, Backend, Directory, MemoryLedger, MemoryStore, Session, SessionOptions,
//! };
//!
//! # async fn demo() -> sealpost_core::Result<()> {
//! let backend = Backend::simulated(Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new()));
//! let alice = Session::start(
//!     Address::parse("0x71C7656EC7ab88b098defB751B7401B5f6d8976F")?,
//!     backend.clone(),
//!     Directory::demo(),
//!     SessionOptions::default(),
//! )?;
//! let bob = Session::start(
//!     Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")?,
//!     backend,
//!     Directory::demo(),
//!     SessionOptions::default(),
//! )?;
//!
//! alice.send(&bob.as_recipient(), "hello").await?;
//!
//! let mut inbox = bob.synchronizer();
//! inbox.catch_up().await?;
//! assert_eq!(inbox.inbox()[0].plaintext, "hello");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod network;
pub mod session;
pub mod storage;
/// Clock helpers for envelope and pointer timestamps.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{Mode, SealpostConfig};
pub use crypto::{KeyPair, PublicKey};
pub use discovery::{derive_lookup_key, LookupKey, LookupScheme};
pub use error::{Error, Result};
pub use identity::{Address, Directory, DirectoryEntry, KeyCheck, UNKNOWN_SENDER};
pub use messaging::{Envelope, InboxEntry, InboxSynchronizer, SyncEvent, SyncState};
pub use network::{Ledger, MemoryLedger, Pointer, PointerFilter, PointerSubscription, Receipt, RpcLedger};
pub use session::{Backend, Recipient, SentMessage, Session, SessionOptions};
pub use storage::{ContentId, ContentStore, IpfsStore, MemoryStore};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Sealpost Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
