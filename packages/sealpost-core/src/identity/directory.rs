//! Static address book.
//!
//! Maps an address to a display name and the public key that party has
//! declared. It is read-only and only used for labels: a missing entry gives
//! [`UNKNOWN_SENDER`], never an error.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use super::Address;

/// Label for senders that are not in the directory
pub const UNKNOWN_SENDER: &str = "Unknown User";

/// One known party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Display name
    pub name: String,
    /// Ledger address
    pub address: Address,
    /// Declared envelope public key, if the party published one
    #[serde(default)]
    pub public_key: Option<PublicKey>,
}

/// Result of comparing an envelope's sender key with the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCheck {
    /// The envelope key equals the declared key
    Matches,
    /// The sender declared a different key (e.g. a newer session)
    Differs,
    /// No declared key to compare against
    Undeclared,
}

/// Read-only address book
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Build from a list of entries
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    /// The three demo parties
    pub fn demo() -> Self {
        let entry = |name: &str, address: &str, key: &str| DirectoryEntry {
            name: name.to_string(),
            address: Address(address.to_lowercase()),
            public_key: PublicKey::from_hex(key).ok(),
        };

        Self::new(vec![
            entry(
                "Alice",
                "0x71C7656EC7ab88b098defB751B7401B5f6d8976F",
                "8f40c5adb68f25624ee5170fa14c64a4b3c4ce08c14071d9091232e37e85e1d5",
            ),
            entry(
                "Bob",
                "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                "52817c8fbc67aa70f2c9968f91962d9a2676c8bebf62859a5baac8228e363898",
            ),
            entry(
                "Charlie",
                "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
                "4a47f147c6a39d0f8ee935815904ab8a5d2c9f0adfb1f5c837b095c4de87e568",
            ),
        ])
    }

    /// All entries, in declaration order
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Find by address
    pub fn lookup(&self, address: &Address) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| &e.address == address)
    }

    /// Find by display name (case-insensitive) or by address
    pub fn find(&self, name_or_address: &str) -> Option<&DirectoryEntry> {
        let needle = name_or_address.trim();
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(needle))
        {
            return Some(entry);
        }
        let address = Address::parse(needle).ok()?;
        self.lookup(&address)
    }

    /// Display name for an address, [`UNKNOWN_SENDER`] when absent
    pub fn display_name(&self, address: &Address) -> &str {
        self.lookup(address)
            .map(|e| e.name.as_str())
            .unwrap_or(UNKNOWN_SENDER)
    }

    /// Compare an envelope's sender key with the one the sender declared
    pub fn check_sender_key(&self, address: &Address, key: &PublicKey) -> KeyCheck {
        match self.lookup(address).and_then(|e| e.public_key.as_ref()) {
            Some(declared) if declared == key => KeyCheck::Matches,
            Some(_) => KeyCheck::Differs,
            None => KeyCheck::Undeclared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_directory() {
        let dir = Directory::demo();

        assert_eq!(dir.entries().len(), 3);
        assert!(dir.entries().iter().all(|e| e.public_key.is_some()));
    }

    #[test]
    fn test_lookup_is_case_insensitive_on_address() {
        let dir = Directory::demo();
        let bob = Address::parse("0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266").unwrap();

        assert_eq!(dir.display_name(&bob), "Bob");
    }

    #[test]
    fn test_unknown_sender_label() {
        let dir = Directory::demo();
        let stranger = Address::parse("0x0000000000000000000000000000000000000001").unwrap();

        assert_eq!(dir.display_name(&stranger), UNKNOWN_SENDER);
        assert!(dir.lookup(&stranger).is_none());
    }

    #[test]
    fn test_find_by_name_or_address() {
        let dir = Directory::demo();

        assert_eq!(dir.find("charlie").unwrap().name, "Charlie");
        assert_eq!(
            dir.find("0x71c7656ec7ab88b098defb751b7401b5f6d8976f").unwrap().name,
            "Alice"
        );
        assert!(dir.find("mallory").is_none());
    }

    #[test]
    fn test_check_sender_key() {
        let dir = Directory::demo();
        let alice = dir.find("Alice").unwrap().clone();
        let declared = alice.public_key.unwrap();
        let other = PublicKey::from_bytes([1u8; 32]);
        let stranger = Address::parse("0x0000000000000000000000000000000000000001").unwrap();

        assert_eq!(dir.check_sender_key(&alice.address, &declared), KeyCheck::Matches);
        assert_eq!(dir.check_sender_key(&alice.address, &other), KeyCheck::Differs);
        assert_eq!(dir.check_sender_key(&stranger, &other), KeyCheck::Undeclared);
    }

    #[test]
    fn test_entry_deserialization() {
        let json = r#"{"name":"Dana","address":"0x90F79bf6EB2c4f870365E785982E1f101E93b906"}"#;
        let entry: DirectoryEntry = serde_json::from_str(json).unwrap();

        assert_eq!(entry.address.as_str(), "0x90f79bf6eb2c4f870365e785982e1f101e93b906");
        assert!(entry.public_key.is_none());
    }
}
