//! # Messaging Module
//!
//! Sealed envelopes and the inbox built from them.
//!
//! ## Message Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MESSAGE FLOW                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice)                                                        │
//! │  ─────────────────────────────────────────────────────────────         │
//! │  "hello" ──► Envelope::encrypt(bob_public, alice_keys)                 │
//! │          ──► to_json() ──► store.put() ──► cid                         │
//! │          ──► ledger.submit_pointer(alice, H(bob), H(cid))              │
//! │                                                                         │
//! │  Recipient (Bob)                                                       │
//! │  ─────────────────────────────────────────────────────────────         │
//! │  pointer where recipient_key == H(bob)                                 │
//! │          ──► store.resolve(storage_key) ──► cid ──► store.get(cid)     │
//! │          ──► Envelope::from_json() ──► decrypt(sender key, bob_keys)   │
//! │          ──► InboxEntry { sender: alice, plaintext: "hello" }          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sending half lives on [`crate::Session::send`]; this module holds the
//! codec and the receiving half.

mod envelope;
mod inbox;

pub use envelope::{associated_data, Envelope};
pub use inbox::{
    CatchUpSummary, InboxEntry, InboxSynchronizer, PointerOutcome, SyncEvent, SyncHandle,
    SyncState,
};
