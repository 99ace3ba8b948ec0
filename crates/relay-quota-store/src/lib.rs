//! Balance cache and quota ledger storage for relay quota metering.
//!
//! Quota lives in two tiers:
//!
//! - **Balance cache** (`BalanceCache`): a fast, provisional per-user balance used
//!   only for admission decisions. It may drift and is refreshed wholesale from
//!   the ledger.
//! - **Ledger** (`Ledger`): the authoritative store. Tokens are pre-consumed and
//!   post-consumed against it, and it keeps the consume log and the per-user and
//!   per-channel usage aggregates.
//!
//! # Backends
//!
//! - `MemoryLedger` / `MemoryCache`: in-process, mutex-guarded maps
//! - `RocksLedger`: `RocksDB` with column families (feature `rocksdb-backend`)
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> relay_quota_store::Result<()> {
//! use std::sync::Arc;
//! use relay_quota_core::{TokenId, UserId};
//! use relay_quota_store::{BalanceCache, Ledger, MemoryCache, MemoryLedger, TokenQuota, UserQuota};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! ledger.put_user(UserQuota::new(UserId::new(1), 10_000)).await;
//! ledger.put_token(TokenQuota::unlimited(TokenId::new(7), UserId::new(1), "default")).await;
//!
//! let cache = MemoryCache::new(ledger.clone());
//! assert_eq!(cache.get_user_quota(UserId::new(1)).await?, 10_000);
//!
//! ledger.pre_consume_token_quota(TokenId::new(7), 500).await?;
//! assert_eq!(cache.refresh_user_quota(UserId::new(1)).await?, 9_500);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod memory;
pub mod records;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::{MemoryCache, MemoryLedger};
pub use records::{ChannelUsage, TokenQuota, UserQuota};
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksLedger;

use async_trait::async_trait;
use relay_quota_core::{ChannelId, ConsumeLog, TokenId, UserId};

/// The fast, provisional balance tier.
///
/// Implementations must make `decrease_user_quota` atomic: two concurrent
/// decrements must never both succeed against the same stale balance.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Cached quota for a user, loading it from the ledger on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is unknown or the backing store fails.
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64>;

    /// Atomically subtract `amount` from the cached quota.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InsufficientQuota` (and changes nothing) if the cached
    /// quota is below `amount`.
    async fn decrease_user_quota(&self, user_id: UserId, amount: i64) -> Result<()>;

    /// Overwrite the cached quota with the ledger's value and return it.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    async fn refresh_user_quota(&self, user_id: UserId) -> Result<i64>;
}

/// The authoritative quota ledger.
///
/// Token pre-consume and post-consume must be atomic per token.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Authoritative quota of a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64>;

    /// Reserve `amount` against a token and its owner.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is negative.
    /// - `StoreError::NotFound` if the token or its owner doesn't exist.
    /// - `StoreError::InsufficientQuota` if a limited token or the owner can't cover it.
    async fn pre_consume_token_quota(&self, token_id: TokenId, amount: i64) -> Result<()>;

    /// Apply a signed adjustment: positive charges more, negative refunds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the token or its owner doesn't exist.
    async fn post_consume_token_quota(&self, token_id: TokenId, delta: i64) -> Result<()>;

    /// Append a consume-log record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn record_consume_log(&self, log: &ConsumeLog) -> Result<()>;

    /// Add `quota` to a user's used quota and bump its request count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user_used_quota_and_request_count(
        &self,
        user_id: UserId,
        quota: i64,
    ) -> Result<()>;

    /// Add `quota` to a channel's used quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn update_channel_used_quota(&self, channel_id: ChannelId, quota: i64) -> Result<()>;
}
