//! # Session
//!
//! The context object every operation runs against.
//!
//! ```text
//! Session
//!   ├── address        who we are on the ledger (canonical)
//!   ├── keypair        X25519, generated at start, never persisted
//!   ├── backend        ledger + content store, chosen once
//!   ├── directory      address book for labels
//!   ├── options        lookup scheme, look-back window
//!   └── token          cancelled by close(); parent of every synchronizer
//! ```
//!
//! Nothing here is global: two sessions in one process (as in the simulated
//! demo) share only what their [`Backend`] shares.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{Mode, SealpostConfig, DEFAULT_LOOK_BACK_BLOCKS};
use crate::crypto::{KeyPair, PublicKey};
use crate::discovery::{LookupKey, LookupScheme};
use crate::error::{Error, Result};
use crate::identity::{Address, Directory, DirectoryEntry};
use crate::messaging::{Envelope, InboxSynchronizer};
use crate::network::{Ledger, MemoryLedger, Receipt, RpcLedger};
use crate::storage::{ContentId, ContentStore, IpfsStore, MemoryStore};

/// The ledger and content store a session talks to
#[derive(Clone)]
pub struct Backend {
    mode: Mode,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ContentStore>,
}

impl Backend {
    /// In-memory collaborators, shareable between sessions
    pub fn simulated(ledger: Arc<MemoryLedger>, store: Arc<MemoryStore>) -> Self {
        Self {
            mode: Mode::Simulated,
            ledger,
            store,
        }
    }

    /// Any pair of collaborators
    pub fn new(mode: Mode, ledger: Arc<dyn Ledger>, store: Arc<dyn ContentStore>) -> Self {
        Self {
            mode,
            ledger,
            store,
        }
    }

    /// Build the collaborators selected by `config`
    ///
    /// Live mode checks that the node serves the configured chain.
    pub async fn connect(config: &SealpostConfig) -> Result<Self> {
        match config.mode {
            Mode::Simulated => Ok(Self::simulated(
                Arc::new(MemoryLedger::new()),
                Arc::new(MemoryStore::with_scheme(config.lookup_scheme)),
            )),
            Mode::Live => {
                let ledger = RpcLedger::new(&config.network, config.sync.poll_interval())?;
                ledger.verify_chain().await?;
                let store = IpfsStore::new(
                    config.ipfs.api_url.clone(),
                    config.ipfs.gateway_url.clone(),
                    config.lookup_scheme,
                )?;
                Ok(Self::new(Mode::Live, Arc::new(ledger), Arc::new(store)))
            }
        }
    }

    /// Which kind of collaborators these are
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The ledger
    pub fn ledger(&self) -> Arc<dyn Ledger> {
        Arc::clone(&self.ledger)
    }

    /// The content store
    pub fn store(&self) -> Arc<dyn ContentStore> {
        Arc::clone(&self.store)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("mode", &self.mode).finish_non_exhaustive()
    }
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Lookup key derivation
    pub lookup_scheme: LookupScheme,
    /// Blocks searched during catch-up
    pub look_back_blocks: u64,
}

impl SessionOptions {
    /// Options from a configuration
    pub fn from_config(config: &SealpostConfig) -> Self {
        Self {
            lookup_scheme: config.lookup_scheme,
            look_back_blocks: config.sync.look_back_blocks,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            lookup_scheme: LookupScheme::default(),
            look_back_blocks: DEFAULT_LOOK_BACK_BLOCKS,
        }
    }
}

/// Who a message goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Ledger address, hashed into the recipient key
    pub address: Address,
    /// Envelope key of the recipient's current session
    pub public_key: PublicKey,
}

impl Recipient {
    /// Recipient from parts
    pub fn new(address: Address, public_key: PublicKey) -> Self {
        Self {
            address,
            public_key,
        }
    }

    /// Recipient from user input
    pub fn parse(address: &str, public_key: &str) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(Error::InvalidInput("Recipient address is required".into()));
        }
        if public_key.trim().is_empty() {
            return Err(Error::InvalidInput("Recipient public key is required".into()));
        }
        Ok(Self::new(Address::parse(address)?, PublicKey::from_hex(public_key)?))
    }

    /// Recipient from a directory entry with a declared key
    pub fn from_entry(entry: &DirectoryEntry) -> Result<Self> {
        let public_key = entry.public_key.ok_or_else(|| {
            Error::InvalidInput(format!("{} has not published a public key", entry.name))
        })?;
        Ok(Self::new(entry.address.clone(), public_key))
    }
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    /// Where the envelope was stored
    pub cid: ContentId,
    /// Recipient key on the pointer
    pub recipient_key: LookupKey,
    /// Storage key on the pointer
    pub storage_key: LookupKey,
    /// Envelope timestamp, milliseconds since the epoch
    pub sent_at: i64,
    /// Ledger confirmation
    pub receipt: Receipt,
}

/// One party's session
pub struct Session {
    address: Address,
    keypair: Arc<KeyPair>,
    backend: Backend,
    directory: Arc<Directory>,
    options: SessionOptions,
    token: CancellationToken,
}

impl Session {
    /// Start a session: generates the key pair and fixes the collaborators
    ///
    /// Fails with [`Error::CryptoUnavailable`] when no secure randomness is
    /// available; nothing else can be done without it. A content store that
    /// indexes with a different lookup scheme than `options` is
    /// [`Error::Config`], since none of its pointers would resolve.
    pub fn start(
        address: Address,
        backend: Backend,
        directory: Directory,
        options: SessionOptions,
    ) -> Result<Self> {
        if let Some(scheme) = backend.store.lookup_scheme() {
            if scheme != options.lookup_scheme {
                return Err(Error::Config(format!(
                    "Content store indexes with the {} lookup scheme but the session uses {}",
                    scheme, options.lookup_scheme
                )));
            }
        }

        let keypair = KeyPair::generate()?;

        tracing::info!(
            address = %address,
            mode = %backend.mode(),
            scheme = %options.lookup_scheme,
            public_key = %keypair.public_key(),
            "Session started"
        );

        Ok(Self {
            address,
            keypair: Arc::new(keypair),
            backend,
            directory: Arc::new(directory),
            options,
            token: CancellationToken::new(),
        })
    }

    /// Our address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Our envelope public key for this session
    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    /// Recipient key other parties address us with
    pub fn my_lookup_key(&self) -> LookupKey {
        self.options.lookup_scheme.recipient_key(&self.address)
    }

    /// Ourselves as a recipient
    pub fn as_recipient(&self) -> Recipient {
        Recipient::new(self.address.clone(), *self.public_key())
    }

    /// Look up a recipient in the directory by name or address
    pub fn recipient(&self, name_or_address: &str) -> Result<Recipient> {
        let entry = self.directory.find(name_or_address).ok_or_else(|| {
            Error::InvalidInput(format!("{} is not in the directory", name_or_address))
        })?;
        Recipient::from_entry(entry)
    }

    /// Session settings
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The collaborators
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The address book
    pub fn directory(&self) -> Arc<Directory> {
        Arc::clone(&self.directory)
    }

    pub(crate) fn keypair(&self) -> Arc<KeyPair> {
        Arc::clone(&self.keypair)
    }

    /// Token cancelled by [`close`](Self::close)
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Encrypt, store, and announce a message
    ///
    /// Empty text is rejected with [`Error::InvalidInput`] before any crypto
    /// or network call. Storage and ledger failures surface as
    /// [`Error::StorageUnavailable`] and [`Error::LedgerUnavailable`].
    pub async fn send(&self, recipient: &Recipient, text: &str) -> Result<SentMessage> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Message must not be empty".into()));
        }
        if self.token.is_cancelled() {
            return Err(Error::InvalidInput("Session is closed".into()));
        }

        let envelope = Envelope::encrypt(text, &recipient.public_key, &self.keypair)?;
        let json = envelope.to_json()?;

        let cid = self.backend.store.put(&json).await?;
        let scheme = self.options.lookup_scheme;
        let recipient_key = scheme.recipient_key(&recipient.address);
        let storage_key = scheme.storage_key(&cid);

        let receipt = self
            .backend
            .ledger
            .submit_pointer(&self.address, &recipient_key, &storage_key)
            .await?;

        tracing::info!(
            to = %recipient.address,
            cid = %cid,
            tx_hash = %receipt.tx_hash,
            block = receipt.block,
            "Message sent"
        );

        Ok(SentMessage {
            cid,
            recipient_key,
            storage_key,
            sent_at: envelope.timestamp(),
            receipt,
        })
    }

    /// A synchronizer for this session's inbox
    pub fn synchronizer(&self) -> InboxSynchronizer {
        InboxSynchronizer::new(self)
    }

    /// Cancel every live stream of this session
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            tracing::info!(address = %self.address, "Session closed");
        }
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("public_key", self.public_key())
            .field("backend", &self.backend)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> Session {
        let directory = Directory::demo();
        let address = directory.find(name).unwrap().address.clone();
        Session::start(
            address,
            Backend::simulated(Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new())),
            directory,
            SessionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_sessions_have_distinct_keys() {
        let a = session("Alice");
        let b = session("Alice");

        assert_ne!(a.public_key(), b.public_key());
        assert_eq!(a.my_lookup_key(), b.my_lookup_key());
    }

    #[tokio::test]
    async fn test_send_returns_pointer_keys() {
        let alice = session("Alice");
        let bob = KeyPair::generate().unwrap();
        let to = Recipient::new(
            Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap(),
            *bob.public_key(),
        );

        let sent = alice.send(&to, "hello").await.unwrap();

        assert!(sent.cid.as_str().starts_with("Qm"));
        assert_eq!(
            sent.recipient_key.to_hex(),
            "0xad6b59ceb122bd9fd053ae27141f0a30f55561416a6845c9547d7667e3e345d7"
        );
        assert_eq!(sent.storage_key, LookupScheme::Legacy.storage_key(&sent.cid));
        assert_eq!(sent.receipt.block, 1);
    }

    #[tokio::test]
    async fn test_send_rejects_blank_text() {
        let alice = session("Alice");
        let to = alice.as_recipient();

        for text in ["", "   ", "\n\t"] {
            assert!(matches!(alice.send(&to, text).await, Err(Error::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_send_after_close_rejected() {
        let alice = session("Alice");
        alice.close();

        assert!(alice.is_closed());
        assert!(alice.send(&alice.as_recipient(), "late").await.is_err());
    }

    #[test]
    fn test_recipient_parse() {
        let key = KeyPair::generate().unwrap().public_key().to_hex();

        assert!(Recipient::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", &key).is_ok());
        assert!(matches!(Recipient::parse("  ", &key), Err(Error::InvalidInput(_))));
        assert!(matches!(
            Recipient::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", ""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_recipient_from_directory() {
        let alice = session("Alice");

        let bob = alice.recipient("bob").unwrap();
        assert_eq!(bob.address.as_str(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert!(alice.recipient("mallory").is_err());
    }

    #[test]
    fn test_start_rejects_scheme_mismatch() {
        let directory = Directory::demo();
        let address = directory.find("Bob").unwrap().address.clone();
        let options = SessionOptions {
            lookup_scheme: LookupScheme::DomainSeparated,
            ..SessionOptions::default()
        };

        let mismatched = Backend::simulated(Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new()));
        assert!(matches!(
            Session::start(address.clone(), mismatched, directory.clone(), options.clone()),
            Err(Error::Config(_))
        ));

        let matched = Backend::simulated(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryStore::with_scheme(LookupScheme::DomainSeparated)),
        );
        assert!(Session::start(address, matched, directory, options).is_ok());
    }

    #[tokio::test]
    async fn test_connect_simulated() {
        let backend = Backend::connect(&SealpostConfig::default()).await.unwrap();
        assert_eq!(backend.mode(), Mode::Simulated);
    }
}
