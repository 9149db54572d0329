//! # Error Handling
//!
//! Error types shared by every Sealpost module.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   └── CryptoUnavailable     - No secure randomness (fatal)          │
//! │  │                                                                      │
//! │  ├── Input Errors                                                      │
//! │  │   └── InvalidInput          - Rejected before any crypto/network    │
//! │  │                                                                      │
//! │  ├── Envelope Errors                                                   │
//! │  │   ├── MalformedEnvelope     - Wire form could not be parsed         │
//! │  │   └── DecryptionFailed      - Authentication failed (opaque)        │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageUnavailable    - Content store call failed             │
//! │  │   └── ContentNotFound       - No content for an identifier          │
//! │  │                                                                      │
//! │  ├── Ledger Errors                                                     │
//! │  │   └── LedgerUnavailable     - Ledger call failed                    │
//! │  │                                                                      │
//! │  └── Configuration Errors                                              │
//! │      └── Config                - Invalid configuration                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recovery Policy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Fatal        CryptoUnavailable            session cannot start        │
//! │  Recoverable  MalformedEnvelope            skip this message           │
//! │               DecryptionFailed             skip this message           │
//! │               StorageUnavailable           this put/get fails          │
//! │               ContentNotFound              skip this message           │
//! │               LedgerUnavailable            this submit/query fails     │
//! │  Rejected     InvalidInput                 nothing was attempted       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Crypto and parse failures are never retried: a corrupt envelope stays
//! corrupt. Network failures may be retried by the caller.

use thiserror::Error;

/// Result type alias for Sealpost operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sealpost
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Crypto Errors (100-199)
    // ========================================================================

    /// Secure randomness or a required primitive is not available
    #[error("Cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    // ========================================================================
    // Input Errors (200-299)
    // ========================================================================

    /// Recipient or message missing, empty, or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Envelope Errors (300-399)
    // ========================================================================

    /// The serialized envelope could not be parsed
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope did not authenticate.
    ///
    /// Deliberately carries no detail: callers must not learn which check
    /// failed.
    #[error("Could not decrypt message")]
    DecryptionFailed,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// The content store could not complete the request
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The content store has nothing under this identifier or lookup key
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    // ========================================================================
    // Ledger Errors (500-599)
    // ========================================================================

    /// The ledger could not complete the request
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    // ========================================================================
    // Configuration Errors (900-999)
    // ========================================================================

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Numeric error code, grouped by category:
    /// - 100-199: Crypto
    /// - 200-299: Input
    /// - 300-399: Envelope
    /// - 400-499: Storage
    /// - 500-599: Ledger
    /// - 900-999: Configuration
    pub fn code(&self) -> i32 {
        match self {
            Error::CryptoUnavailable(_) => 100,
            Error::InvalidInput(_) => 200,
            Error::MalformedEnvelope(_) => 300,
            Error::DecryptionFailed => 301,
            Error::StorageUnavailable(_) => 400,
            Error::ContentNotFound(_) => 401,
            Error::LedgerUnavailable(_) => 500,
            Error::Config(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// A recoverable error affects one message or one collaborator call; the
    /// session keeps running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedEnvelope(_)
                | Error::DecryptionFailed
                | Error::StorageUnavailable(_)
                | Error::ContentNotFound(_)
                | Error::LedgerUnavailable(_)
        )
    }

    /// Check if this error prevents a session from starting
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CryptoUnavailable(_) | Error::Config(_))
    }

    /// Check if the caller may reasonably retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::LedgerUnavailable(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedEnvelope(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
