//! # Envelope Demo
//!
//! Seals a message for Bob, shows the wire format and the lookup keys a
//! pointer would carry, then opens it again.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example envelope_demo
//! ```

use sealpost_core::{Address, ContentId, Envelope, KeyPair, LookupScheme};

fn main() {
    println!("=== Sealpost Core: Envelope Demo ===\n");

    // Step 1: Session keys for both parties
    println!("Step 1: Generating session keys for Alice and Bob...");

    let alice = KeyPair::generate().expect("Failed to generate Alice's key pair");
    let bob = KeyPair::generate().expect("Failed to generate Bob's key pair");

    println!("  Alice's session key: {}...", &alice.public_key().to_hex()[..16]);
    println!("  Bob's session key:   {}...", &bob.public_key().to_hex()[..16]);
    println!();

    // Step 2: Seal
    println!("Step 2: Sealing a message for Bob...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                      SEALING FLOW                           │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   Alice's secret ─┐                                         │");
    println!("  │                   ├─► X25519 ─► HKDF-SHA256 ─► envelope key │");
    println!("  │   Bob's public ───┘                                         │");
    println!("  │                                                             │");
    println!("  │   envelope key + random 24-byte nonce                       │");
    println!("  │        │                                                    │");
    println!("  │        ▼                                                    │");
    println!("  │   XChaCha20-Poly1305(plaintext, AAD = keys + timestamp)     │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let message = "Meet me at the usual place.";
    let envelope =
        Envelope::encrypt(message, bob.public_key(), &alice).expect("Failed to seal the message");

    println!("  Plaintext:  \"{}\"", message);
    println!("  Ciphertext: {} bytes (tag included)", envelope.ciphertext().len());
    println!("  Nonce:      {}", hex::encode(envelope.nonce().as_bytes()));
    println!();

    // Step 3: Wire format
    println!("Step 3: Serializing for storage...");

    let json = envelope.to_json().expect("Failed to serialize the envelope");
    println!("  {}", json);
    println!();

    // Step 4: Lookup keys
    println!("Step 4: Deriving the pointer's lookup keys...");

    let bob_address = Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        .expect("Demo address is valid");
    let cid = ContentId::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");

    for scheme in [LookupScheme::Legacy, LookupScheme::DomainSeparated] {
        println!("  [{}]", scheme);
        println!("    recipient key: {}", scheme.recipient_key(&bob_address));
        println!("    storage key:   {}", scheme.storage_key(&cid));
    }
    println!();

    // Step 5: Open
    println!("Step 5: Bob opens the envelope...");

    let received = Envelope::from_json(&json).expect("Failed to parse the envelope");
    let opened = received
        .decrypt(received.sender_public_key(), &bob)
        .expect("Bob could not open the envelope");

    println!("  Decrypted: \"{}\"", opened);
    assert_eq!(opened, message);
    println!();

    // Step 6: Anyone else fails
    println!("Step 6: A third party tries to open it...");

    let eve = KeyPair::generate().expect("Failed to generate Eve's key pair");
    match received.decrypt(received.sender_public_key(), &eve) {
        Ok(_) => println!("  Unexpected: Eve opened the envelope"),
        Err(e) => println!("  Rejected: {}", e),
    }
    println!();

    println!("=== Demo Complete ===");
}
