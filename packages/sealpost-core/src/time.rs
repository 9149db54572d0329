//! Clock helpers.
//!
//! Envelopes carry milliseconds, ledger pointers carry seconds.

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Converts a pointer timestamp (seconds) into envelope units (milliseconds).
pub fn seconds_to_millis(seconds: u64) -> i64 {
    i64::try_from(seconds)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000)
}
