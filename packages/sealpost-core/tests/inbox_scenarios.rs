//! End-to-end scenarios over the in-memory collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sealpost_core::messaging::{PointerOutcome, SyncEvent, SyncState};
use sealpost_core::{
    Address, Backend, ContentId, ContentStore, Directory, Error, Ledger, LookupKey, LookupScheme,
    MemoryLedger, MemoryStore, Mode, Pointer, PointerFilter, PointerSubscription, Receipt,
    Recipient, Result, Session, SessionOptions,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ALICE: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
const BOB: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const CHARLIE: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

struct World {
    ledger: Arc<MemoryLedger>,
    store: Arc<MemoryStore>,
    options: SessionOptions,
}

impl World {
    fn new() -> Self {
        Self::with_scheme(LookupScheme::Legacy)
    }

    fn with_scheme(scheme: LookupScheme) -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            store: Arc::new(MemoryStore::with_scheme(scheme)),
            options: SessionOptions {
                lookup_scheme: scheme,
                ..SessionOptions::default()
            },
        }
    }

    fn backend(&self) -> Backend {
        Backend::simulated(self.ledger.clone(), self.store.clone())
    }

    fn session(&self, address: &str) -> Session {
        self.session_on(address, self.backend())
    }

    fn session_on(&self, address: &str, backend: Backend) -> Session {
        Session::start(
            Address::parse(address).unwrap(),
            backend,
            Directory::demo(),
            self.options.clone(),
        )
        .unwrap()
    }
}

/// Store whose first `failures` reads fail
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
    reads: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn put(&self, content: &str) -> Result<ContentId> {
        self.inner.put(content).await
    }

    async fn get(&self, cid: &ContentId) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::StorageUnavailable("gateway timeout".into()));
        }
        self.inner.get(cid).await
    }

    async fn resolve(&self, storage_key: &LookupKey) -> Result<ContentId> {
        self.inner.resolve(storage_key).await
    }

    fn lookup_scheme(&self) -> Option<LookupScheme> {
        self.inner.lookup_scheme()
    }
}

/// Ledger whose live feed replays its whole history, then ends
struct ReplayLedger {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl Ledger for ReplayLedger {
    async fn submit_pointer(
        &self,
        sender: &Address,
        recipient_key: &LookupKey,
        storage_key: &LookupKey,
    ) -> Result<Receipt> {
        self.inner.submit_pointer(sender, recipient_key, storage_key).await
    }

    async fn subscribe(&self) -> Result<PointerSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        for pointer in self.inner.pointers() {
            let _ = tx.send(pointer);
        }
        Ok(PointerSubscription::new(rx, CancellationToken::new()))
    }

    async fn query_historical(
        &self,
        filter: &PointerFilter,
        look_back_blocks: u64,
    ) -> Result<Vec<Pointer>> {
        self.inner.query_historical(filter, look_back_blocks).await
    }
}

/// Ledger that serves live pointers but has lost its history
struct NoHistoryLedger {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl Ledger for NoHistoryLedger {
    async fn submit_pointer(
        &self,
        sender: &Address,
        recipient_key: &LookupKey,
        storage_key: &LookupKey,
    ) -> Result<Receipt> {
        self.inner.submit_pointer(sender, recipient_key, storage_key).await
    }

    async fn subscribe(&self) -> Result<PointerSubscription> {
        self.inner.subscribe().await
    }

    async fn query_historical(&self, _: &PointerFilter, _: u64) -> Result<Vec<Pointer>> {
        Err(Error::LedgerUnavailable("eth_getLogs: block range too large".into()))
    }
}

async fn next_received(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> String {
    while let Some(event) = rx.recv().await {
        if let SyncEvent::Received(entry) = event {
            return entry.plaintext;
        }
    }
    panic!("synchronizer stopped before a message arrived");
}

#[tokio::test]
async fn alice_sends_hello_to_bob() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);

    alice.send(&bob.as_recipient(), "hello").await.unwrap();

    let mut sync = bob.synchronizer();
    sync.catch_up().await.unwrap();

    let inbox = sync.inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].plaintext, "hello");
    assert_eq!(inbox[0].sender, Address::parse(ALICE).unwrap());
    assert_eq!(inbox[0].display_name(), "Alice");
}

#[tokio::test]
async fn pointer_for_someone_else_leaves_inbox_empty() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);
    let charlie = world.session(CHARLIE);

    alice.send(&charlie.as_recipient(), "for charlie").await.unwrap();

    let mut sync = bob.synchronizer();
    let summary = sync.catch_up().await.unwrap();

    assert_eq!(summary.resolved + summary.skipped, 0);
    assert!(sync.inbox().is_empty());

    let pointer = world.ledger.pointers().remove(0);
    assert_eq!(sync.handle_pointer(pointer).await, PointerOutcome::Ignored);
    assert!(sync.inbox().is_empty());
}

#[tokio::test]
async fn storage_failure_is_skipped_and_later_pointers_processed() {
    let world = World::new();
    let flaky = Backend::new(
        Mode::Simulated,
        world.ledger.clone(),
        Arc::new(FlakyStore::new(world.store.clone(), 1)),
    );
    let alice = world.session(ALICE);
    let bob = world.session_on(BOB, flaky);

    alice.send(&bob.as_recipient(), "lost").await.unwrap();
    alice.send(&bob.as_recipient(), "kept").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sync = bob.synchronizer().with_events(tx);
    let summary = sync.catch_up().await.unwrap();

    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(sync.inbox()[0].plaintext, "kept");

    assert!(matches!(rx.recv().await, Some(SyncEvent::CatchUpStarted)));
    match rx.recv().await {
        Some(SyncEvent::Skipped { error, .. }) => {
            assert!(matches!(error, Error::StorageUnavailable(_)));
            assert!(error.is_recoverable());
        }
        other => panic!("expected a skipped pointer, got {:?}", other),
    }
}

#[tokio::test]
async fn synchronizer_only_sees_its_own_recipient_key() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);
    let charlie = world.session(CHARLIE);

    let k1 = alice.as_recipient();
    let k2 = bob.as_recipient();
    let k3 = charlie.as_recipient();

    let sender = world.session(ALICE);
    for (to, text) in [
        (&k1, "a1"),
        (&k2, "b1"),
        (&k3, "c1"),
        (&k2, "b2"),
        (&k1, "a2"),
        (&k2, "b3"),
    ] {
        sender.send(to, text).await.unwrap();
    }

    let mut sync = bob.synchronizer();
    sync.catch_up().await.unwrap();

    let texts: Vec<_> = sync.inbox().iter().map(|e| e.plaintext.as_str()).collect();
    assert_eq!(texts, vec!["b3", "b2", "b1"]);
}

#[tokio::test]
async fn history_then_live_in_order() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);

    alice.send(&bob.as_recipient(), "before").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = bob.synchronizer().with_events(tx).start();

    assert_eq!(next_received(&mut rx).await, "before");
    alice.send(&bob.as_recipient(), "after").await.unwrap();
    assert_eq!(next_received(&mut rx).await, "after");

    bob.close();
    let sync = handle.join().await.unwrap();

    let texts: Vec<_> = sync.inbox().iter().map(|e| e.plaintext.as_str()).collect();
    assert_eq!(texts, vec!["after", "before"]);
    assert_eq!(sync.state(), SyncState::Closed);
}

#[tokio::test]
async fn pointer_seen_in_history_and_live_yields_one_entry() {
    let world = World::new();
    let replay = Backend::new(
        Mode::Simulated,
        Arc::new(ReplayLedger {
            inner: world.ledger.clone(),
        }),
        world.store.clone(),
    );
    let alice = world.session(ALICE);
    let bob = world.session_on(BOB, replay);

    alice.send(&bob.as_recipient(), "once").await.unwrap();

    let mut sync = bob.synchronizer();
    // The replayed feed ends after the history, which ends the run
    sync.run().await.unwrap();

    assert_eq!(sync.inbox().len(), 1);
    assert_eq!(sync.inbox()[0].plaintext, "once");
}

#[tokio::test]
async fn send_rejects_empty_text_without_side_effects() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);

    let result = alice.send(&bob.as_recipient(), "  ").await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(world.store.is_empty());
    assert_eq!(world.ledger.head(), 0);
}

#[tokio::test]
async fn send_to_unusable_key_is_invalid_input() {
    let world = World::new();
    let alice = world.session(ALICE);
    let nobody = Recipient::new(
        Address::parse(BOB).unwrap(),
        sealpost_core::PublicKey::from_bytes([0u8; 32]),
    );

    let result = alice.send(&nobody, "hello").await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(world.store.is_empty());
}

#[tokio::test]
async fn message_for_previous_session_key_is_skipped() {
    let world = World::new();
    let alice = world.session(ALICE);
    let old_bob = world.session(BOB);
    alice.send(&old_bob.as_recipient(), "to the old key").await.unwrap();
    old_bob.close();

    let new_bob = world.session(BOB);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sync = new_bob.synchronizer().with_events(tx);
    let summary = sync.catch_up().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(sync.inbox().is_empty());
    rx.recv().await;
    assert!(matches!(
        rx.recv().await,
        Some(SyncEvent::Skipped {
            error: Error::DecryptionFailed,
            ..
        })
    ));
}

#[tokio::test]
async fn domain_separated_deployment_round_trip() {
    let world = World::with_scheme(LookupScheme::DomainSeparated);
    let alice = world.session(ALICE);
    let bob = world.session(BOB);

    let sent = alice.send(&bob.as_recipient(), "separated").await.unwrap();
    assert_eq!(
        sent.recipient_key.to_hex(),
        "0xb8c1d85bc95dc37074b6e957ee791cd04aaf4906c6de09c5b6b941e710b764a7"
    );

    let mut sync = bob.synchronizer();
    sync.catch_up().await.unwrap();
    assert_eq!(sync.inbox()[0].plaintext, "separated");
}

#[tokio::test]
async fn closed_session_synchronizer_stops_immediately() {
    let world = World::new();
    let bob = world.session(BOB);
    bob.close();

    let mut sync = bob.synchronizer();
    sync.run().await.unwrap();

    assert_eq!(sync.state(), SyncState::Closed);
    assert_eq!(world.ledger.subscriber_count(), 0);
}

#[tokio::test]
async fn failed_pointer_seen_again_live_is_not_retried() {
    let world = World::new();
    let store = Arc::new(FlakyStore::new(world.store.clone(), 1));
    let backend = Backend::new(
        Mode::Simulated,
        Arc::new(ReplayLedger {
            inner: world.ledger.clone(),
        }),
        store.clone(),
    );
    let alice = world.session(ALICE);
    let bob = world.session_on(BOB, backend);

    alice.send(&bob.as_recipient(), "lost").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sync = bob.synchronizer().with_events(tx);
    sync.run().await.unwrap();
    drop(sync);

    let mut skipped = 0;
    let mut received = 0;
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Skipped { .. } => skipped += 1,
            SyncEvent::Received(_) => received += 1,
            _ => {}
        }
    }

    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    assert_eq!(skipped, 1);
    assert_eq!(received, 0);
}

#[tokio::test]
async fn live_pointers_followed_after_catch_up_fails() {
    let world = World::new();
    let backend = Backend::new(
        Mode::Simulated,
        Arc::new(NoHistoryLedger {
            inner: world.ledger.clone(),
        }),
        world.store.clone(),
    );
    let alice = world.session(ALICE);
    let bob = world.session_on(BOB, backend);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = bob.synchronizer().with_events(tx).start();

    assert!(matches!(rx.recv().await, Some(SyncEvent::CatchUpStarted)));
    match rx.recv().await {
        Some(SyncEvent::CatchUpFailed { error }) => {
            assert!(matches!(error, Error::LedgerUnavailable(_)));
        }
        other => panic!("expected the catch-up to fail, got {:?}", other),
    }

    alice.send(&bob.as_recipient(), "live").await.unwrap();
    assert_eq!(next_received(&mut rx).await, "live");

    bob.close();
    let sync = handle.join().await.unwrap();
    assert_eq!(sync.inbox().len(), 1);
}

#[tokio::test]
async fn session_survives_ledger_outage() {
    let world = World::new();
    let alice = world.session(ALICE);
    let bob = world.session(BOB);

    world.ledger.set_offline(true);
    let result = alice.send(&bob.as_recipient(), "dropped").await;
    assert!(matches!(result, Err(Error::LedgerUnavailable(_))));
    assert!(!alice.is_closed());

    world.ledger.set_offline(false);
    alice.send(&bob.as_recipient(), "delivered").await.unwrap();

    let mut sync = bob.synchronizer();
    sync.catch_up().await.unwrap();
    let texts: Vec<_> = sync.inbox().iter().map(|e| e.plaintext.as_str()).collect();
    assert_eq!(texts, vec!["delivered"]);
}
