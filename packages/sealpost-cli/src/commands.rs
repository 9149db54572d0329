//! Subcommand implementations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{eyre, Result, WrapErr};
use sealpost_core::messaging::SyncHandle;
use sealpost_core::{
    Address, Backend, ContentId, InboxEntry, KeyPair, MemoryLedger, MemoryStore, Mode, PublicKey,
    Recipient, SealpostConfig, SentMessage, Session, SessionOptions, SyncEvent,
};
use serde_json::json;
use tokio::sync::mpsc;

pub fn keygen(as_json: bool) -> Result<()> {
    let keypair = KeyPair::generate()?;

    if as_json {
        println!("{}", json!({ "public_key": keypair.public_key() }));
    } else {
        println!("Public key: {}", keypair.public_key());
        println!("(The secret stays in memory and is discarded on exit.)");
    }
    Ok(())
}

pub fn lookup_key(config: &SealpostConfig, input: &str, is_cid: bool, as_json: bool) -> Result<()> {
    let scheme = config.lookup_scheme;
    let (canonical, key) = if is_cid {
        let cid = ContentId::parse(input)?;
        let key = scheme.storage_key(&cid);
        (cid.to_string(), key)
    } else {
        let address = Address::parse(input)?;
        let key = scheme.recipient_key(&address);
        (address.to_string(), key)
    };

    if as_json {
        println!(
            "{}",
            json!({ "input": canonical, "scheme": scheme.to_string(), "lookup_key": key })
        );
    } else {
        println!("{}", key);
    }
    Ok(())
}

pub fn directory(config: &SealpostConfig, as_json: bool) -> Result<()> {
    let directory = config.directory();

    if as_json {
        println!("{}", serde_json::to_string_pretty(directory.entries())?);
        return Ok(());
    }

    for entry in directory.entries() {
        let key = entry
            .public_key
            .map(|k| k.to_hex())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {}  {}", entry.name, entry.address, key);
    }
    Ok(())
}

pub async fn send(
    config: &SealpostConfig,
    from: &str,
    to: &str,
    key: Option<&str>,
    message: &str,
    as_json: bool,
) -> Result<()> {
    let session = start_session(config, from).await?;

    let recipient = match key {
        Some(key) => {
            let address = match session.directory().find(to) {
                Some(entry) => entry.address.clone(),
                None => Address::parse(to)?,
            };
            Recipient::new(address, PublicKey::from_hex(key)?)
        }
        None => session
            .recipient(to)
            .wrap_err("Pass --key with the recipient's session public key")?,
    };

    let sent = session.send(&recipient, message).await?;
    print_sent(&sent, as_json)?;
    session.close();
    Ok(())
}

pub async fn listen(config: &SealpostConfig, address: &str, as_json: bool) -> Result<()> {
    let session = start_session(config, address).await?;

    if !as_json {
        println!("Listening as {} ({})", session.address(), config.mode);
        println!("Session public key: {}", session.public_key());
        println!("Lookup key: {}", session.my_lookup_key());
        println!("Press Ctrl-C to stop.");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = session.synchronizer().with_events(tx).start();

    let token = session.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    print_events(rx, as_json).await?;
    let sync = handle.join().await?;

    tracing::info!(entries = sync.inbox().len(), "Listener stopped");
    Ok(())
}

pub async fn demo(config: &SealpostConfig, message: &str, as_json: bool) -> Result<()> {
    if config.mode != Mode::Simulated {
        tracing::warn!("The demo always runs on simulated collaborators");
    }

    let directory = config.directory();
    let find = |name: &str| -> Result<Address> {
        directory
            .find(name)
            .map(|entry| entry.address.clone())
            .ok_or_else(|| eyre!("{} is missing from the directory", name))
    };
    let (alice_addr, bob_addr, charlie_addr) = (find("Alice")?, find("Bob")?, find("Charlie")?);

    let backend = Backend::simulated(
        Arc::new(MemoryLedger::new()),
        Arc::new(MemoryStore::with_scheme(config.lookup_scheme)),
    );
    let options = SessionOptions::from_config(config);
    let start = |address: Address| {
        Session::start(address, backend.clone(), directory.clone(), options.clone())
    };
    let alice = start(alice_addr)?;
    let bob = start(bob_addr)?;
    let charlie = start(charlie_addr)?;

    // Sent before Bob is listening: found by catch-up
    alice.send(&bob.as_recipient(), message).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = bob.synchronizer().with_events(tx).start();
    wait_for(&mut rx, |e| matches!(e, SyncEvent::CatchUpFinished { .. }), as_json).await?;

    // Not for Bob: filtered out without a trace
    charlie.send(&alice.as_recipient(), "hi Alice").await?;
    // Sent while Bob is listening: arrives live
    charlie.send(&bob.as_recipient(), "hi Bob, Charlie here").await?;
    wait_for(&mut rx, |e| matches!(e, SyncEvent::Received(_)), as_json).await?;

    bob.close();
    let sync = finish(handle, rx, as_json).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(sync.inbox())?);
    } else {
        println!();
        println!("Bob's inbox (newest first):");
        for entry in sync.inbox() {
            print_entry(entry);
        }
    }

    for session in [&alice, &charlie] {
        session.close();
    }
    Ok(())
}

async fn start_session(config: &SealpostConfig, address: &str) -> Result<Session> {
    let address = Address::parse(address)?;
    let backend = Backend::connect(config)
        .await
        .wrap_err_with(|| format!("Could not connect to the {} collaborators", config.mode))?;

    Ok(Session::start(
        address,
        backend,
        config.directory(),
        SessionOptions::from_config(config),
    )?)
}

/// Print events until one matches `done`
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<SyncEvent>,
    done: impl Fn(&SyncEvent) -> bool,
    as_json: bool,
) -> Result<()> {
    while let Some(event) = rx.recv().await {
        let matched = done(&event);
        print_event(&event, as_json);
        if matched {
            return Ok(());
        }
    }
    Err(eyre!("Synchronizer stopped unexpectedly"))
}

async fn finish(
    handle: SyncHandle,
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    as_json: bool,
) -> Result<sealpost_core::InboxSynchronizer> {
    let sync = handle.join().await?;
    print_events(rx, as_json).await?;
    Ok(sync)
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SyncEvent>, as_json: bool) -> Result<()> {
    while let Some(event) = rx.recv().await {
        print_event(&event, as_json);
        if matches!(event, SyncEvent::Closed) {
            break;
        }
    }
    Ok(())
}

fn print_event(event: &SyncEvent, as_json: bool) {
    if as_json {
        let value = match event {
            SyncEvent::CatchUpStarted => json!({ "event": "catch_up_started" }),
            SyncEvent::CatchUpFinished { resolved, skipped } => {
                json!({ "event": "catch_up_finished", "resolved": resolved, "skipped": skipped })
            }
            SyncEvent::CatchUpFailed { error } => {
                json!({ "event": "catch_up_failed", "error": error.to_string() })
            }
            SyncEvent::Received(entry) => json!({ "event": "received", "entry": entry }),
            SyncEvent::Skipped { storage_key, error } => json!({
                "event": "skipped",
                "storage_key": storage_key,
                "code": error.code(),
                "error": error.to_string(),
            }),
            SyncEvent::Closed => json!({ "event": "closed" }),
        };
        println!("{}", value);
        return;
    }

    match event {
        SyncEvent::CatchUpStarted => println!("Checking past messages…"),
        SyncEvent::CatchUpFinished { resolved, skipped } => {
            println!("Caught up: {} message(s), {} skipped", resolved, skipped)
        }
        SyncEvent::CatchUpFailed { error } => println!("Could not load past messages: {}", error),
        SyncEvent::Received(entry) => print_entry(entry),
        SyncEvent::Skipped { error, .. } => println!("Skipped a message: {}", error),
        SyncEvent::Closed => println!("Stopped."),
    }
}

fn print_entry(entry: &InboxEntry) {
    println!(
        "[{}] {} ({}): {}",
        format_millis(entry.timestamp),
        entry.display_name(),
        entry.sender.short(),
        entry.plaintext
    );
}

fn print_sent(sent: &SentMessage, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(sent)?);
    } else {
        println!("Stored as {}", sent.cid);
        println!("Pointer in block {} (tx {})", sent.receipt.block, sent.receipt.tx_hash);
        println!("Recipient key {}", sent.recipient_key);
        println!("Storage key   {}", sent.storage_key);
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_millis(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[tokio::test]
    async fn test_demo_runs() {
        demo(&SealpostConfig::default(), "hello", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_without_key_for_unknown_recipient_fails() {
        let result = send(
            &SealpostConfig::default(),
            "0x71C7656EC7ab88b098defB751B7401B5f6d8976F",
            "0x90F79bf6EB2c4f870365E785982E1f101E93b906",
            None,
            "hello",
            true,
        )
        .await;

        assert!(result.is_err());
    }
}
