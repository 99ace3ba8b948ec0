//! In-memory storage implementation.
//!
//! `MemoryLedger` keeps every record behind one async mutex, so each ledger call
//! is atomic. `MemoryCache` is a projection of a ledger's user quotas; it is
//! filled on first read and only ever overwritten wholesale by a refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use relay_quota_core::{ChannelId, ConsumeLog, TokenId, UserId};

use crate::error::{Result, StoreError};
use crate::records::{ChannelUsage, TokenQuota, UserQuota};
use crate::{BalanceCache, Ledger};

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<UserId, UserQuota>,
    tokens: HashMap<TokenId, TokenQuota>,
    channels: HashMap<ChannelId, ChannelUsage>,
    consume_logs: Vec<ConsumeLog>,
}

impl LedgerState {
    fn token(&self, token_id: TokenId) -> Result<&TokenQuota> {
        self.tokens.get(&token_id).ok_or(StoreError::NotFound {
            entity: "token",
            id: token_id.get(),
        })
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut UserQuota> {
        self.users.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id.get(),
        })
    }
}

/// In-memory quota ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record.
    pub async fn put_user(&self, user: UserQuota) {
        self.state.lock().await.users.insert(user.user_id, user);
    }

    /// Insert or replace a token record.
    pub async fn put_token(&self, token: TokenQuota) {
        self.state.lock().await.tokens.insert(token.token_id, token);
    }

    /// Snapshot of a user record.
    pub async fn user(&self, user_id: UserId) -> Option<UserQuota> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    /// Snapshot of a token record.
    pub async fn token(&self, token_id: TokenId) -> Option<TokenQuota> {
        self.state.lock().await.tokens.get(&token_id).cloned()
    }

    /// Snapshot of a channel aggregate.
    pub async fn channel(&self, channel_id: ChannelId) -> Option<ChannelUsage> {
        self.state.lock().await.channels.get(&channel_id).cloned()
    }

    /// All consume-log records, oldest first.
    pub async fn consume_logs(&self) -> Vec<ConsumeLog> {
        self.state.lock().await.consume_logs.clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64> {
        let mut state = self.state.lock().await;
        Ok(state.user_mut(user_id)?.quota)
    }

    async fn pre_consume_token_quota(&self, token_id: TokenId, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        let token = state.token(token_id)?;
        if !token.unlimited_quota && token.remain_quota < amount {
            return Err(StoreError::InsufficientQuota {
                balance: token.remain_quota,
                required: amount,
            });
        }
        let owner = token.user_id;

        let user = state.user_mut(owner)?;
        if user.quota < amount {
            return Err(StoreError::InsufficientQuota {
                balance: user.quota,
                required: amount,
            });
        }
        user.quota -= amount;

        if let Some(token) = state.tokens.get_mut(&token_id) {
            token.charge(amount);
        }
        Ok(())
    }

    async fn post_consume_token_quota(&self, token_id: TokenId, delta: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let user_id = state.token(token_id)?.user_id;
        state.user_mut(user_id)?.quota -= delta;

        if let Some(token) = state.tokens.get_mut(&token_id) {
            token.charge(delta);
        }
        Ok(())
    }

    async fn record_consume_log(&self, log: &ConsumeLog) -> Result<()> {
        self.state.lock().await.consume_logs.push(log.clone());
        Ok(())
    }

    async fn update_user_used_quota_and_request_count(
        &self,
        user_id: UserId,
        quota: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state.user_mut(user_id)?;
        user.used_quota += quota;
        user.request_count += 1;
        Ok(())
    }

    async fn update_channel_used_quota(&self, channel_id: ChannelId, quota: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .channels
            .entry(channel_id)
            .or_insert(ChannelUsage {
                channel_id,
                used_quota: 0,
            })
            .used_quota += quota;
        Ok(())
    }
}

/// In-memory balance cache over a ledger.
pub struct MemoryCache {
    ledger: Arc<dyn Ledger>,
    balances: Mutex<HashMap<UserId, i64>>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("ledger", &"<dyn Ledger>")
            .field("balances", &self.balances)
            .finish()
    }
}

impl MemoryCache {
    /// Create an empty cache backed by `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrite a cached balance without consulting the ledger.
    pub async fn set_user_quota(&self, user_id: UserId, quota: i64) {
        self.balances.lock().await.insert(user_id, quota);
    }

    /// Cached balance, if one has been loaded.
    pub async fn cached(&self, user_id: UserId) -> Option<i64> {
        self.balances.lock().await.get(&user_id).copied()
    }
}

#[async_trait]
impl BalanceCache for MemoryCache {
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64> {
        let mut balances = self.balances.lock().await;
        if let Some(quota) = balances.get(&user_id) {
            return Ok(*quota);
        }
        let quota = self.ledger.get_user_quota(user_id).await?;
        balances.insert(user_id, quota);
        Ok(quota)
    }

    async fn decrease_user_quota(&self, user_id: UserId, amount: i64) -> Result<()> {
        let mut balances = self.balances.lock().await;
        let balance = match balances.get(&user_id) {
            Some(quota) => *quota,
            None => self.ledger.get_user_quota(user_id).await?,
        };
        if balance < amount {
            return Err(StoreError::InsufficientQuota {
                balance,
                required: amount,
            });
        }
        balances.insert(user_id, balance - amount);
        Ok(())
    }

    async fn refresh_user_quota(&self, user_id: UserId) -> Result<i64> {
        let quota = self.ledger.get_user_quota(user_id).await?;
        self.balances.lock().await.insert(user_id, quota);
        tracing::debug!(user_id = %user_id, quota = %quota, "Refreshed cached user quota");
        Ok(quota)
    }
}
