//! # Network Module
//!
//! The public ledger that carries message pointers.
//!
//! ## Pointer Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          POINTER LIFECYCLE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                                                │
//! │    submit_pointer(sender, recipient_key, storage_key) ──► Receipt      │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │  Ledger (append-only)                                                  │
//! │    block N: Pointer { sender, recipient_key, storage_key, timestamp }  │
//! │                                  │                                      │
//! │                  ┌───────────────┴───────────────┐                      │
//! │                  ▼                               ▼                      │
//! │  query_historical(filter, look_back)     subscribe() (live stream)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A pointer holds no content and no plaintext identity of the recipient.
//! Everything on it is public, including the sender address.
//!
//! ## Implementations
//!
//! | Ledger | Backing | Live events |
//! |--------|---------|-------------|
//! | [`MemoryLedger`] | in-process log, one block per submission | pushed to subscribers |
//! | [`RpcLedger`] | Ethereum JSON-RPC, `MessageSent` logs | polled every interval |

mod memory;
mod rpc;

pub use memory::MemoryLedger;
pub use rpc::{RpcLedger, MESSAGE_SENT_TOPIC, SEND_MESSAGE_SELECTOR};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::discovery::LookupKey;
use crate::error::Result;
use crate::identity::Address;

/// Public record announcing an envelope for a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    /// Address that submitted the pointer
    pub sender: Address,
    /// Hash of the recipient's address
    pub recipient_key: LookupKey,
    /// Hash of the envelope's storage identifier
    pub storage_key: LookupKey,
    /// Ledger time, seconds since the epoch
    pub timestamp: u64,
    /// Block the pointer was included in
    pub block: u64,
    /// Transaction that emitted it, when the ledger has one
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Criteria for pointer queries
///
/// Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerFilter {
    /// Only pointers for this recipient key
    pub recipient_key: Option<LookupKey>,
    /// Only pointers from this sender
    pub sender: Option<Address>,
}

impl PointerFilter {
    /// Filter on a recipient key
    pub fn for_recipient(key: LookupKey) -> Self {
        Self {
            recipient_key: Some(key),
            sender: None,
        }
    }

    /// Whether a pointer satisfies every set criterion
    pub fn matches(&self, pointer: &Pointer) -> bool {
        self.recipient_key
            .map_or(true, |key| key == pointer.recipient_key)
            && self
                .sender
                .as_ref()
                .map_or(true, |sender| sender == &pointer.sender)
    }
}

/// Confirmation of a submitted pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction hash (`0x` + 64 hex)
    pub tx_hash: String,
    /// Block the pointer landed in
    pub block: u64,
    /// Ledger time of that block, seconds since the epoch
    pub timestamp: u64,
}

/// Append-only pointer ledger
///
/// Calls fail with [`crate::Error::LedgerUnavailable`] when the ledger cannot
/// be reached. The core never retries on its own.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Publish a pointer from `sender`
    async fn submit_pointer(
        &self,
        sender: &Address,
        recipient_key: &LookupKey,
        storage_key: &LookupKey,
    ) -> Result<Receipt>;

    /// Start receiving pointers emitted from now on
    ///
    /// Every call returns an independent subscription; subscribing again
    /// after cancelling restarts the feed.
    async fn subscribe(&self) -> Result<PointerSubscription>;

    /// Pointers matching `filter` from the last `look_back_blocks` blocks,
    /// oldest first
    async fn query_historical(
        &self,
        filter: &PointerFilter,
        look_back_blocks: u64,
    ) -> Result<Vec<Pointer>>;
}

/// A cancellable live feed of pointers
///
/// Ends (yields `None`) once cancelled or once the ledger stops feeding it.
/// Dropping the subscription cancels it.
pub struct PointerSubscription {
    rx: mpsc::UnboundedReceiver<Pointer>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl PointerSubscription {
    /// Wrap a channel fed by a ledger; `token` stops the producer
    pub fn new(rx: mpsc::UnboundedReceiver<Pointer>, token: CancellationToken) -> Self {
        let cancelled = Box::pin(token.clone().cancelled_owned());
        Self {
            rx,
            token,
            cancelled,
        }
    }

    /// Stop the feed
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token the producer watches
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Stream for PointerSubscription {
    type Item = Pointer;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Pointer>> {
        let this = self.get_mut();
        if this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for PointerSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for PointerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerSubscription")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::derive_lookup_key;
    use futures::StreamExt;

    fn pointer(recipient: &str, sender: &str) -> Pointer {
        Pointer {
            sender: Address::parse(sender).unwrap(),
            recipient_key: derive_lookup_key(recipient),
            storage_key: derive_lookup_key("QmAbc"),
            timestamp: 1_700_000_000,
            block: 1,
            tx_hash: None,
        }
    }

    #[test]
    fn test_filter_matches() {
        let alice = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
        let p = pointer("bob", alice);

        assert!(PointerFilter::default().matches(&p));
        assert!(PointerFilter::for_recipient(derive_lookup_key("bob")).matches(&p));
        assert!(!PointerFilter::for_recipient(derive_lookup_key("carol")).matches(&p));

        let wrong_sender = PointerFilter {
            recipient_key: None,
            sender: Some(Address::parse("0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc").unwrap()),
        };
        assert!(!wrong_sender.matches(&p));
    }

    #[tokio::test]
    async fn test_subscription_yields_until_cancelled() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = PointerSubscription::new(rx, CancellationToken::new());
        let p = pointer("bob", "0x71c7656ec7ab88b098defb751b7401b5f6d8976f");

        tx.send(p.clone()).unwrap();
        assert_eq!(sub.next().await, Some(p.clone()));

        sub.cancel();
        tx.send(p).unwrap();
        assert_eq!(sub.next().await, None);
        assert!(sub.is_cancelled());
    }

    #[tokio::test]
    async fn test_subscription_ends_when_producer_drops() {
        let (tx, rx) = mpsc::unbounded_channel::<Pointer>();
        let mut sub = PointerSubscription::new(rx, CancellationToken::new());

        drop(tx);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn test_drop_cancels_producer_token() {
        let (_tx, rx) = mpsc::unbounded_channel::<Pointer>();
        let sub = PointerSubscription::new(rx, CancellationToken::new());
        let token = sub.token();

        drop(sub);
        assert!(token.is_cancelled());
    }
}
