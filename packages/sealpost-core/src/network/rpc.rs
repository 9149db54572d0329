//! Ethereum JSON-RPC ledger.
//!
//! Pointers are `MessageSent` events of a small contract:
//!
//! ```text
//! function sendMessage(bytes32 recipientHash, bytes32 messageHash)
//! event MessageSent(address indexed sender, bytes32 indexed recipientHash,
//!                   bytes32 messageHash, uint256 timestamp)
//!
//! log.topics = [MESSAGE_SENT_TOPIC, pad32(sender), recipientHash]
//! log.data   = messageHash (32) || timestamp (32, big-endian)
//! ```
//!
//! Submissions go through `eth_sendTransaction` from the sender address, so
//! the node (or the wallet behind it) must hold that account. Live events are
//! found by polling `eth_blockNumber` and fetching new logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::NetworkConfig;
use crate::discovery::LookupKey;
use crate::error::{Error, Result};
use crate::identity::Address;
use crate::time::now_timestamp;

use super::{Ledger, Pointer, PointerFilter, PointerSubscription, Receipt};

/// `keccak256("sendMessage(bytes32,bytes32)")[..4]`
pub const SEND_MESSAGE_SELECTOR: &str = "fa2c9ba3";

/// `keccak256("MessageSent(address,bytes32,bytes32,uint256)")`
pub const MESSAGE_SENT_TOPIC: &str =
    "0xc4000978bc5d62a8acb546015f63152beb81aa28b17da9a720993e0ee004845c";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between receipt polls
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// Shared by the ledger handle and its polling tasks
struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::LedgerUnavailable(format!("{} failed: {}", method, e)))?
            .json()
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("{} returned invalid JSON: {}", method, e)))?;

        if let Some(err) = response.error {
            return Err(Error::LedgerUnavailable(format!(
                "{} rejected ({}): {}",
                method, err.code, err.message
            )));
        }

        serde_json::from_value(response.result).map_err(|e| {
            Error::LedgerUnavailable(format!("{} returned an unexpected result: {}", method, e))
        })
    }

    async fn block_number(&self) -> Result<u64> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn logs(&self, contract: &Address, topics: Value, from_block: u64, to_block: Option<u64>) -> Result<Vec<Pointer>> {
        let to_block = match to_block {
            Some(block) => format!("{:#x}", block),
            None => "latest".to_string(),
        };
        let filter = json!({
            "address": contract.as_str(),
            "fromBlock": format!("{:#x}", from_block),
            "toBlock": to_block,
            "topics": topics,
        });

        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter])).await?;
        Ok(logs
            .iter()
            .filter_map(|log| match decode_log(log) {
                Ok(pointer) => Some(pointer),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring undecodable log");
                    None
                }
            })
            .collect())
    }
}

/// Ledger backed by an Ethereum node
pub struct RpcLedger {
    rpc: Arc<RpcClient>,
    contract: Address,
    chain_id: u64,
    network_name: String,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcLedger {
    /// Create a ledger client from network settings
    pub fn new(network: &NetworkConfig, poll_interval: Duration) -> Result<Self> {
        if network.contract_address.evm_bytes().is_none() {
            return Err(Error::Config(format!(
                "Contract address is not an EVM address: {}",
                network.contract_address
            )));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc: Arc::new(RpcClient {
                client,
                url: network.rpc_url.clone(),
                next_id: AtomicU64::new(1),
            }),
            contract: network.contract_address.clone(),
            chain_id: network.chain_id,
            network_name: network.network_name.clone(),
            poll_interval,
            receipt_timeout: network.receipt_timeout(),
        })
    }

    /// Check that the node serves the configured chain
    pub async fn verify_chain(&self) -> Result<()> {
        let quantity: String = self.rpc.call("eth_chainId", json!([])).await?;
        let actual = parse_quantity(&quantity)?;

        if actual != self.chain_id {
            return Err(Error::Config(format!(
                "Wrong network: expected {} ({}), node reports chain {}",
                self.network_name, self.chain_id, actual
            )));
        }

        tracing::info!(chain_id = actual, network = %self.network_name, "Connected to ledger");
        Ok(())
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + self.receipt_timeout;

        loop {
            let receipt: Option<TransactionReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.block_number.is_some() {
                    return Ok(receipt);
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::LedgerUnavailable(format!(
                    "Transaction {} not mined after {}s",
                    tx_hash,
                    self.receipt_timeout.as_secs()
                )));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn submit_pointer(
        &self,
        sender: &Address,
        recipient_key: &LookupKey,
        storage_key: &LookupKey,
    ) -> Result<Receipt> {
        if sender.evm_bytes().is_none() {
            return Err(Error::InvalidInput(format!(
                "Sender must be an EVM address to submit, got {}",
                sender
            )));
        }

        let tx = json!({
            "from": sender.as_str(),
            "to": self.contract.as_str(),
            "data": encode_send_message(recipient_key, storage_key),
        });
        let tx_hash: String = self.rpc.call("eth_sendTransaction", json!([tx])).await?;
        tracing::info!(tx_hash = %tx_hash, "Pointer transaction submitted");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        if receipt.status.as_deref() == Some("0x0") {
            return Err(Error::LedgerUnavailable(format!(
                "Transaction {} reverted",
                receipt.transaction_hash
            )));
        }

        let block = receipt
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .unwrap_or_default();
        let timestamp = receipt
            .logs
            .iter()
            .find_map(|log| decode_log(log).ok())
            .map(|pointer| pointer.timestamp)
            .unwrap_or_else(now_timestamp);

        tracing::info!(tx_hash = %receipt.transaction_hash, block, "Pointer confirmed");

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            block,
            timestamp,
        })
    }

    async fn subscribe(&self) -> Result<PointerSubscription> {
        let head = self.rpc.block_number().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        tokio::spawn(poll_new_logs(
            Arc::clone(&self.rpc),
            self.contract.clone(),
            head + 1,
            self.poll_interval,
            tx,
            token.clone(),
        ));

        Ok(PointerSubscription::new(rx, token))
    }

    async fn query_historical(
        &self,
        filter: &PointerFilter,
        look_back_blocks: u64,
    ) -> Result<Vec<Pointer>> {
        let head = self.rpc.block_number().await?;
        let from_block = head.saturating_sub(look_back_blocks);

        let pointers = self
            .rpc
            .logs(&self.contract, event_topics(filter), from_block, None)
            .await?;

        Ok(pointers.into_iter().filter(|p| filter.matches(p)).collect())
    }
}

/// Feed new `MessageSent` logs into a subscription until it is cancelled
async fn poll_new_logs(
    rpc: Arc<RpcClient>,
    contract: Address,
    mut next_block: u64,
    interval: Duration,
    tx: mpsc::UnboundedSender<Pointer>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let topics = event_topics(&PointerFilter::default());

    tracing::debug!(from_block = next_block, "Ledger polling started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let head = match rpc.block_number().await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(error = %e, "Ledger poll failed");
                continue;
            }
        };
        if head < next_block {
            continue;
        }

        match rpc.logs(&contract, topics.clone(), next_block, Some(head)).await {
            Ok(pointers) => {
                for pointer in pointers {
                    if tx.send(pointer).is_err() {
                        return;
                    }
                }
                next_block = head + 1;
            }
            Err(e) => tracing::warn!(error = %e, "Ledger poll failed"),
        }

        if tx.is_closed() {
            break;
        }
    }

    tracing::debug!("Ledger polling stopped");
}

/// Calldata for `sendMessage(recipientKey, storageKey)`
fn encode_send_message(recipient_key: &LookupKey, storage_key: &LookupKey) -> String {
    format!(
        "0x{}{}{}",
        SEND_MESSAGE_SELECTOR,
        hex::encode(recipient_key.as_bytes()),
        hex::encode(storage_key.as_bytes())
    )
}

/// `eth_getLogs` topic list for a filter
fn event_topics(filter: &PointerFilter) -> Value {
    let sender = filter.sender.as_ref().and_then(Address::evm_bytes).map(|bytes| {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&bytes);
        format!("0x{}", hex::encode(word))
    });
    let recipient = filter.recipient_key.map(|key| key.to_hex());

    json!([MESSAGE_SENT_TOPIC, sender, recipient])
}

/// Decode a `MessageSent` log into a pointer
fn decode_log(log: &RpcLog) -> Result<Pointer> {
    let malformed = |what: &str| Error::LedgerUnavailable(format!("Malformed MessageSent log: {}", what));

    if log.topics.len() < 3 || !log.topics[0].eq_ignore_ascii_case(MESSAGE_SENT_TOPIC) {
        return Err(malformed("not a MessageSent event"));
    }

    let sender_word = decode_word(&log.topics[1]).ok_or_else(|| malformed("sender topic"))?;
    let sender = Address::parse(&format!("0x{}", hex::encode(&sender_word[12..])))?;
    let recipient_key = LookupKey::parse(&log.topics[2]).map_err(|_| malformed("recipient topic"))?;

    let data = hex::decode(log.data.trim_start_matches("0x")).map_err(|_| malformed("data"))?;
    if data.len() < 64 {
        return Err(malformed("data too short"));
    }
    let mut storage = [0u8; 32];
    storage.copy_from_slice(&data[..32]);
    if data[32..56].iter().any(|b| *b != 0) {
        return Err(malformed("timestamp out of range"));
    }
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&data[56..64]);

    let block = log
        .block_number
        .as_deref()
        .map(parse_quantity)
        .transpose()?
        .unwrap_or_default();

    Ok(Pointer {
        sender,
        recipient_key,
        storage_key: LookupKey::from_bytes(storage),
        timestamp: u64::from_be_bytes(timestamp),
        block,
        tx_hash: log.transaction_hash.clone(),
    })
}

fn decode_word(hex_str: &str) -> Option<[u8; 32]> {
    hex::decode(hex_str.trim_start_matches("0x")).ok()?.try_into().ok()
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex)
fn parse_quantity(quantity: &str) -> Result<u64> {
    let digits = quantity.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::LedgerUnavailable(format!("Invalid quantity {:?}: {}", quantity, e)))
}
