//! In-process ledger.
//!
//! Every submission becomes its own block. Live subscribers receive
//! submissions in order over unbounded channels; closed subscribers are
//! pruned on the next submission.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::discovery::LookupKey;
use crate::error::{Error, Result};
use crate::identity::Address;
use crate::time::now_timestamp;

use super::{Ledger, Pointer, PointerFilter, PointerSubscription, Receipt};

struct Subscriber {
    tx: mpsc::UnboundedSender<Pointer>,
    token: CancellationToken,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.tx.is_closed() && !self.token.is_cancelled()
    }
}

#[derive(Default)]
struct Inner {
    log: Vec<Pointer>,
    subscribers: Vec<Subscriber>,
    offline: bool,
}

/// Ledger held in memory
///
/// Share one instance (behind an `Arc`) between the sessions of a
/// simulation.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Current head block (0 when empty)
    pub fn head(&self) -> u64 {
        self.inner.lock().log.len() as u64
    }

    /// Every pointer ever submitted, oldest first
    pub fn pointers(&self) -> Vec<Pointer> {
        self.inner.lock().log.clone()
    }

    /// Number of subscriptions still receiving
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(Subscriber::is_live);
        inner.subscribers.len()
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    fn check_online(inner: &Inner) -> Result<()> {
        if inner.offline {
            return Err(Error::LedgerUnavailable("Simulated ledger is offline".into()));
        }
        Ok(())
    }

    fn tx_hash(sender: &Address, recipient_key: &LookupKey, storage_key: &LookupKey, block: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_str().as_bytes());
        hasher.update(recipient_key.as_bytes());
        hasher.update(storage_key.as_bytes());
        hasher.update(block.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit_pointer(
        &self,
        sender: &Address,
        recipient_key: &LookupKey,
        storage_key: &LookupKey,
    ) -> Result<Receipt> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;

        let block = inner.log.len() as u64 + 1;
        let tx_hash = Self::tx_hash(sender, recipient_key, storage_key, block);
        let pointer = Pointer {
            sender: sender.clone(),
            recipient_key: *recipient_key,
            storage_key: *storage_key,
            timestamp: now_timestamp(),
            block,
            tx_hash: Some(tx_hash.clone()),
        };

        inner.log.push(pointer.clone());
        inner
            .subscribers
            .retain(|sub| sub.is_live() && sub.tx.send(pointer.clone()).is_ok());

        tracing::debug!(block, sender = %sender, "Pointer appended to memory ledger");

        Ok(Receipt {
            tx_hash,
            block,
            timestamp: pointer.timestamp,
        })
    }

    async fn subscribe(&self) -> Result<PointerSubscription> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        inner.subscribers.push(Subscriber {
            tx,
            token: token.clone(),
        });

        Ok(PointerSubscription::new(rx, token))
    }

    async fn query_historical(
        &self,
        filter: &PointerFilter,
        look_back_blocks: u64,
    ) -> Result<Vec<Pointer>> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;

        let head = inner.log.len() as u64;
        let from_block = head.saturating_sub(look_back_blocks);

        Ok(inner
            .log
            .iter()
            .filter(|p| p.block > from_block && filter.matches(p))
            .cloned()
            .collect())
    }
}
