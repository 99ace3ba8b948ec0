//! Key encoding utilities for `RocksDB`.
//!
//! Integer ids are encoded big-endian so keys sort numerically.

use relay_quota_core::{ChannelId, ConsumeLogId, TokenId, UserId};

/// Create a user key from a user ID.
#[must_use]
pub fn user_key(user_id: UserId) -> Vec<u8> {
    user_id.to_be_bytes().to_vec()
}

/// Create a token key from a token ID.
#[must_use]
pub fn token_key(token_id: TokenId) -> Vec<u8> {
    token_id.to_be_bytes().to_vec()
}

/// Create a channel key from a channel ID.
#[must_use]
pub fn channel_key(channel_id: ChannelId) -> Vec<u8> {
    channel_id.to_be_bytes().to_vec()
}

/// Create a consume-log key.
///
/// Format: `user_id (8 bytes) || log_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's logs are sorted by time.
#[must_use]
pub fn consume_log_key(user_id: UserId, log_id: &ConsumeLogId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&user_id.to_be_bytes());
    key.extend_from_slice(&log_id.to_bytes());
    key
}

/// Create a prefix for iterating all consume logs of a user.
#[must_use]
pub fn user_consume_logs_prefix(user_id: UserId) -> Vec<u8> {
    user_id.to_be_bytes().to_vec()
}
