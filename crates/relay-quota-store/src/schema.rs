//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User quota records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Token quota records, keyed by `token_id`.
    pub const TOKENS: &str = "tokens";

    /// Channel usage aggregates, keyed by `channel_id`.
    pub const CHANNELS: &str = "channels";

    /// Consume logs, keyed by `user_id || log_id` (ULID).
    pub const CONSUME_LOGS: &str = "consume_logs";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::USERS, cf::TOKENS, cf::CHANNELS, cf::CONSUME_LOGS]
}
