//! # Identity Module
//!
//! Party identities (ledger addresses) and the static address book used to
//! label inbox entries.
//!
//! ## Canonical Form
//!
//! ```text
//! "  0x71C7656EC7ab88b098defB751B7401B5f6d8976F "
//!                      │ trim + lower-case
//!                      ▼
//! "0x71c7656ec7ab88b098defb751b7401b5f6d8976f"
//! ```
//!
//! Wallets report checksummed or lower-case addresses depending on the
//! source. Senders and recipients hash the canonical form, otherwise they
//! would derive different lookup keys for the same party.

mod directory;

pub use directory::{Directory, DirectoryEntry, KeyCheck, UNKNOWN_SENDER};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of a `0x`-prefixed EVM address
const EVM_ADDRESS_LEN: usize = 42;

/// Canonical party identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub(crate) String);

impl Address {
    /// Parse and canonicalize an address
    ///
    /// `0x`-prefixed input must be a 20-byte hex EVM address. Any other
    /// non-empty identity string is accepted as-is (lower-cased).
    pub fn parse(input: &str) -> Result<Self> {
        let canonical = input.trim().to_lowercase();
        if canonical.is_empty() {
            return Err(Error::InvalidInput("Address must not be empty".into()));
        }
        if canonical.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "Address must not contain whitespace: {:?}",
                input
            )));
        }

        if let Some(body) = canonical.strip_prefix("0x") {
            if canonical.len() != EVM_ADDRESS_LEN || hex::decode(body).is_err() {
                return Err(Error::InvalidInput(format!(
                    "Not a valid EVM address: {}",
                    input.trim()
                )));
            }
        }

        Ok(Self(canonical))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display (`0x71c765…`)
    pub fn short(&self) -> String {
        if self.0.chars().count() > 10 {
            let head: String = self.0.chars().take(8).collect();
            format!("{}…", head)
        } else {
            self.0.clone()
        }
    }

    /// The 20 address bytes, when this is an EVM address
    pub fn evm_bytes(&self) -> Option<[u8; 20]> {
        let body = self.0.strip_prefix("0x")?;
        hex::decode(body).ok()?.try_into().ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}
