//! `RocksDB` ledger implementation.
//!
//! This module provides the `RocksLedger` implementation of the `Ledger` trait.
//! Read-modify-write operations are serialized through a write lock and committed
//! with a single `WriteBatch`, which makes each token pre-consume and post-consume
//! atomic.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use relay_quota_core::{ChannelId, ConsumeLog, TokenId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::records::{ChannelUsage, TokenQuota, UserQuota};
use crate::schema::{all_column_families, cf};
use crate::Ledger;

/// RocksDB-backed ledger implementation.
pub struct RocksLedger {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksLedger {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("ledger write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put_user(&self, user: &UserQuota) -> Result<()> {
        let _guard = self.lock()?;
        self.put(cf::USERS, &keys::user_key(user.user_id), user)
    }

    /// Get a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, user_id: UserId) -> Result<Option<UserQuota>> {
        self.get(cf::USERS, &keys::user_key(user_id))
    }

    /// Insert or update a token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put_token(&self, token: &TokenQuota) -> Result<()> {
        let _guard = self.lock()?;
        self.put(cf::TOKENS, &keys::token_key(token.token_id), token)
    }

    /// Get a token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_token(&self, token_id: TokenId) -> Result<Option<TokenQuota>> {
        self.get(cf::TOKENS, &keys::token_key(token_id))
    }

    /// Get a channel aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_channel(&self, channel_id: ChannelId) -> Result<Option<ChannelUsage>> {
        self.get(cf::CHANNELS, &keys::channel_key(channel_id))
    }

    /// List consume logs for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_consume_logs(&self, user_id: UserId, limit: usize) -> Result<Vec<ConsumeLog>> {
        let cf = self.cf(cf::CONSUME_LOGS)?;
        let prefix = keys::user_consume_logs_prefix(user_id);

        let mut logs = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            logs.push(Self::deserialize::<ConsumeLog>(&value)?);
        }

        // Keys are ULID-ordered oldest first
        logs.reverse();
        logs.truncate(limit);
        Ok(logs)
    }

    fn require_token(&self, token_id: TokenId) -> Result<TokenQuota> {
        self.get_token(token_id)?.ok_or(StoreError::NotFound {
            entity: "token",
            id: token_id.get(),
        })
    }

    fn require_user(&self, user_id: UserId) -> Result<UserQuota> {
        self.get_user(user_id)?.ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id.get(),
        })
    }

    /// Write a user and a token record in one batch.
    fn commit(&self, user: &UserQuota, token: &TokenQuota) -> Result<()> {
        let cf_users = self.cf(cf::USERS)?;
        let cf_tokens = self.cf(cf::TOKENS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_users, keys::user_key(user.user_id), Self::serialize(user)?);
        batch.put_cf(
            &cf_tokens,
            keys::token_key(token.token_id),
            Self::serialize(token)?,
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl Ledger for RocksLedger {
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64> {
        Ok(self.require_user(user_id)?.quota)
    }

    async fn pre_consume_token_quota(&self, token_id: TokenId, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let _guard = self.lock()?;
        let mut token = self.require_token(token_id)?;
        if !token.unlimited_quota && token.remain_quota < amount {
            return Err(StoreError::InsufficientQuota {
                balance: token.remain_quota,
                required: amount,
            });
        }

        let mut user = self.require_user(token.user_id)?;
        if user.quota < amount {
            return Err(StoreError::InsufficientQuota {
                balance: user.quota,
                required: amount,
            });
        }

        user.quota -= amount;
        token.charge(amount);
        self.commit(&user, &token)
    }

    async fn post_consume_token_quota(&self, token_id: TokenId, delta: i64) -> Result<()> {
        let _guard = self.lock()?;
        let mut token = self.require_token(token_id)?;
        let mut user = self.require_user(token.user_id)?;

        user.quota -= delta;
        token.charge(delta);
        self.commit(&user, &token)
    }

    async fn record_consume_log(&self, log: &ConsumeLog) -> Result<()> {
        self.put(
            cf::CONSUME_LOGS,
            &keys::consume_log_key(log.user_id, &log.id),
            log,
        )
    }

    async fn update_user_used_quota_and_request_count(
        &self,
        user_id: UserId,
        quota: i64,
    ) -> Result<()> {
        let _guard = self.lock()?;
        let mut user = self.require_user(user_id)?;
        user.used_quota += quota;
        user.request_count += 1;
        self.put(cf::USERS, &keys::user_key(user_id), &user)
    }

    async fn update_channel_used_quota(&self, channel_id: ChannelId, quota: i64) -> Result<()> {
        let _guard = self.lock()?;
        let mut channel = self.get_channel(channel_id)?.unwrap_or(ChannelUsage {
            channel_id,
            used_quota: 0,
        });
        channel.used_quota += quota;
        self.put(cf::CHANNELS, &keys::channel_key(channel_id), &channel)
    }
}
