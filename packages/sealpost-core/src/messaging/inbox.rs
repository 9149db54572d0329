//! # Inbox Synchronizer
//!
//! Rebuilds a user's inbox from ledger pointers.
//!
//! ## State Machine
//!
//! ```text
//!   Idle ──subscribe──► Subscribed ──pointer for me──► Resolving
//!                          ▲                              │
//!                          └──── entry added / skipped ───┘
//!   any state ──cancel──► Closed
//! ```
//!
//! ## Run Order
//!
//! ```text
//! 1. subscribe()               live pointers start queueing
//! 2. catch_up()                history, oldest first
//! 3. drain the queue           skipping storage keys already handled
//! 4. follow the live stream    until cancelled
//! ```
//!
//! Subscribing first means nothing emitted while catch-up runs is lost; the
//! storage-key check keeps a pointer seen in both phases from being handled
//! twice.
//!
//! Failures on one pointer never stop the loop. They are reported once as
//! [`SyncEvent::Skipped`]; a later sighting of the same storage key is a
//! [`PointerOutcome::Duplicate`], so failures are not retried.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::crypto::KeyPair;
use crate::discovery::LookupKey;
use crate::error::{Error, Result};
use crate::identity::{Address, Directory, KeyCheck, UNKNOWN_SENDER};
use crate::network::{Ledger, Pointer, PointerFilter};
use crate::session::Session;
use crate::storage::ContentStore;
use crate::time::seconds_to_millis;

use super::Envelope;

/// One decrypted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    /// Address that published the pointer
    pub sender: Address,
    /// Directory name of the sender, if known
    pub sender_name: Option<String>,
    /// Ledger time of the pointer, milliseconds since the epoch
    pub timestamp: i64,
    /// Time the sender sealed the envelope, milliseconds since the epoch
    pub sent_at: i64,
    /// Decrypted text
    pub plaintext: String,
    /// Storage lookup key the envelope was found under
    pub storage_key: LookupKey,
    /// Envelope key compared with the sender's declared key
    pub sender_key: KeyCheck,
}

impl InboxEntry {
    /// Sender name, or the unknown-sender label
    pub fn display_name(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(UNKNOWN_SENDER)
    }
}

/// Where the synchronizer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not subscribed yet
    Idle,
    /// Waiting for pointers
    Subscribed,
    /// Resolving a pointer addressed to us
    Resolving,
    /// Cancelled; no further events
    Closed,
}

/// Notification emitted while synchronizing
#[derive(Debug)]
pub enum SyncEvent {
    /// Historical query started
    CatchUpStarted,
    /// Historical pointers processed
    CatchUpFinished {
        /// Entries added
        resolved: usize,
        /// Pointers that failed
        skipped: usize,
    },
    /// Historical query itself failed; live pointers are still followed
    CatchUpFailed {
        /// Why
        error: Error,
    },
    /// A new entry was prepended to the inbox
    Received(InboxEntry),
    /// A pointer addressed to us could not be turned into an entry
    Skipped {
        /// Storage key of the pointer
        storage_key: LookupKey,
        /// Why; always recoverable
        error: Error,
    },
    /// The synchronizer stopped
    Closed,
}

/// What happened to one pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// Addressed to someone else
    Ignored,
    /// Storage key already handled
    Duplicate,
    /// Entry added
    Received,
    /// Failed; reported as [`SyncEvent::Skipped`]
    Skipped,
}

/// Counts from one catch-up pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpSummary {
    /// Entries added
    pub resolved: usize,
    /// Pointers that failed
    pub skipped: usize,
}

/// Turns ledger pointers into inbox entries for one session
pub struct InboxSynchronizer {
    my_lookup_key: LookupKey,
    keypair: Arc<KeyPair>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ContentStore>,
    directory: Arc<Directory>,
    look_back_blocks: u64,
    token: CancellationToken,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    /// Newest first
    inbox: Vec<InboxEntry>,
    /// Storage keys already handled, whether they resolved or not
    seen: HashSet<LookupKey>,
    state: SyncState,
}

impl InboxSynchronizer {
    pub(crate) fn new(session: &Session) -> Self {
        Self {
            my_lookup_key: session.my_lookup_key(),
            keypair: session.keypair(),
            ledger: session.backend().ledger(),
            store: session.backend().store(),
            directory: session.directory(),
            look_back_blocks: session.options().look_back_blocks,
            token: session.token().child_token(),
            events: None,
            inbox: Vec::new(),
            seen: HashSet::new(),
            state: SyncState::Idle,
        }
    }

    /// Deliver [`SyncEvent`]s to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Entries so far, newest first
    pub fn inbox(&self) -> &[InboxEntry] {
        &self.inbox
    }

    /// Take the entries, newest first
    pub fn into_inbox(self) -> Vec<InboxEntry> {
        self.inbox
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Recipient key this synchronizer filters on
    pub fn my_lookup_key(&self) -> LookupKey {
        self.my_lookup_key
    }

    /// Token that stops this synchronizer (a child of the session's)
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(event);
        }
    }

    /// Process historical pointers addressed to us, oldest first
    pub async fn catch_up(&mut self) -> Result<CatchUpSummary> {
        self.emit(SyncEvent::CatchUpStarted);

        let filter = PointerFilter::for_recipient(self.my_lookup_key);
        let pointers = self
            .ledger
            .query_historical(&filter, self.look_back_blocks)
            .await?;

        tracing::debug!(count = pointers.len(), "Historical pointers found");

        let mut summary = CatchUpSummary::default();
        for pointer in pointers {
            if self.token.is_cancelled() {
                break;
            }
            match self.handle_pointer(pointer).await {
                PointerOutcome::Received => summary.resolved += 1,
                PointerOutcome::Skipped => summary.skipped += 1,
                PointerOutcome::Ignored | PointerOutcome::Duplicate => {}
            }
        }

        self.emit(SyncEvent::CatchUpFinished {
            resolved: summary.resolved,
            skipped: summary.skipped,
        });
        tracing::info!(
            resolved = summary.resolved,
            skipped = summary.skipped,
            "Inbox catch-up finished"
        );
        Ok(summary)
    }

    /// Process one pointer from either phase
    pub async fn handle_pointer(&mut self, pointer: Pointer) -> PointerOutcome {
        if pointer.recipient_key != self.my_lookup_key {
            return PointerOutcome::Ignored;
        }
        if !self.seen.insert(pointer.storage_key) {
            return PointerOutcome::Duplicate;
        }

        let previous = self.state;
        self.state = SyncState::Resolving;
        tracing::debug!(block = pointer.block, sender = %pointer.sender, "Resolving pointer");

        let outcome = match self.resolve(&pointer).await {
            Ok(entry) => {
                self.inbox.insert(0, entry.clone());
                tracing::info!(sender = %entry.sender, from = entry.display_name(), "Message received");
                self.emit(SyncEvent::Received(entry));
                PointerOutcome::Received
            }
            Err(error) => {
                tracing::warn!(
                    block = pointer.block,
                    storage_key = %pointer.storage_key,
                    error = %error,
                    "Skipping pointer"
                );
                self.emit(SyncEvent::Skipped {
                    storage_key: pointer.storage_key,
                    error,
                });
                PointerOutcome::Skipped
            }
        };

        if self.state == SyncState::Resolving {
            self.state = previous;
        }
        outcome
    }

    /// Fetch and open the envelope a pointer refers to
    pub async fn resolve(&self, pointer: &Pointer) -> Result<InboxEntry> {
        let cid = self.store.resolve(&pointer.storage_key).await?;
        let json = self.store.get(&cid).await?;
        let envelope = Envelope::from_json(&json)?;

        let sender_key = *envelope.sender_public_key();
        let plaintext = envelope.decrypt(&sender_key, &self.keypair)?;

        Ok(InboxEntry {
            sender: pointer.sender.clone(),
            sender_name: self
                .directory
                .lookup(&pointer.sender)
                .map(|entry| entry.name.clone()),
            timestamp: seconds_to_millis(pointer.timestamp),
            sent_at: envelope.timestamp(),
            plaintext,
            storage_key: pointer.storage_key,
            sender_key: self.directory.check_sender_key(&pointer.sender, &sender_key),
        })
    }

    /// Subscribe, catch up, then follow live pointers until cancelled
    ///
    /// Fails only when the live subscription cannot be opened. A failed
    /// catch-up is reported as [`SyncEvent::CatchUpFailed`].
    pub async fn run(&mut self) -> Result<()> {
        if self.token.is_cancelled() {
            self.close();
            return Ok(());
        }

        let mut subscription = match self.ledger.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        self.state = SyncState::Subscribed;
        tracing::info!(lookup_key = %self.my_lookup_key, "Inbox synchronizer subscribed");

        let token = self.token.clone();
        let catch_up = tokio::select! {
            _ = token.cancelled() => None,
            result = self.catch_up() => Some(result),
        };
        if let Some(Err(error)) = catch_up {
            tracing::warn!(error = %error, "Catch-up failed, following live pointers only");
            self.emit(SyncEvent::CatchUpFailed { error });
        }

        while !token.is_cancelled() {
            let pointer = tokio::select! {
                _ = token.cancelled() => break,
                next = subscription.next() => match next {
                    Some(pointer) => pointer,
                    None => break,
                },
            };

            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.handle_pointer(pointer) => {}
            }
        }

        subscription.cancel();
        self.close();
        Ok(())
    }

    /// Run on a spawned task
    pub fn start(mut self) -> SyncHandle {
        let token = self.token.clone();
        let task = tokio::spawn(async move {
            let result = self.run().await;
            result.map(|()| self)
        });
        SyncHandle { token, task }
    }

    fn close(&mut self) {
        if self.state != SyncState::Closed {
            self.state = SyncState::Closed;
            self.token.cancel();
            self.emit(SyncEvent::Closed);
            tracing::info!(entries = self.inbox.len(), "Inbox synchronizer closed");
        }
    }
}

/// Handle to a synchronizer running on its own task
pub struct SyncHandle {
    token: CancellationToken,
    task: JoinHandle<Result<InboxSynchronizer>>,
}

impl SyncHandle {
    /// Ask the synchronizer to stop
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Wait for the synchronizer to finish and take it back
    pub async fn join(self) -> Result<InboxSynchronizer> {
        self.task
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("Synchronizer task ended abnormally: {}", e)))?
    }
}
