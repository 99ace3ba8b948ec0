//! Common test utilities for quota engine integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use relay_quota::{QuotaConfig, QuotaEngine, RelayContext};
use relay_quota_core::{ChannelId, ConsumeLog, Price, PricingConfig, TokenId, UserId};
use relay_quota_store::{
    BalanceCache, Ledger, MemoryCache, MemoryLedger, StoreError, TokenQuota, UserQuota,
};

pub const USER: UserId = UserId::new(1);
pub const TOKEN: TokenId = TokenId::new(10);
pub const CHANNEL: ChannelId = ChannelId::new(3);

/// A ledger call observed by `RecordingLedger`.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    PreConsume { token_id: TokenId, amount: i64 },
    PostConsume { token_id: TokenId, delta: i64 },
    ConsumeLog { quota: i64 },
    UserUsage { user_id: UserId, quota: i64 },
    ChannelUsage { channel_id: ChannelId, quota: i64 },
}

/// Ledger wrapper that records mutating calls and can be told to fail them.
#[derive(Default)]
pub struct RecordingLedger {
    pub inner: Arc<MemoryLedger>,
    calls: Mutex<Vec<LedgerCall>>,
    pub fail_pre_consume: AtomicBool,
    pub fail_post_consume: AtomicBool,
    pub fail_bookkeeping: AtomicBool,
}

impl RecordingLedger {
    pub fn new(inner: Arc<MemoryLedger>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pre_consume_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, LedgerCall::PreConsume { .. }))
            .count()
    }

    pub fn post_consume_deltas(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LedgerCall::PostConsume { delta, .. } => Some(delta),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: LedgerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn get_user_quota(&self, user_id: UserId) -> Result<i64, StoreError> {
        self.inner.get_user_quota(user_id).await
    }

    async fn pre_consume_token_quota(
        &self,
        token_id: TokenId,
        amount: i64,
    ) -> Result<(), StoreError> {
        self.record(LedgerCall::PreConsume { token_id, amount });
        Self::injected(&self.fail_pre_consume)?;
        self.inner.pre_consume_token_quota(token_id, amount).await
    }

    async fn post_consume_token_quota(
        &self,
        token_id: TokenId,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.record(LedgerCall::PostConsume { token_id, delta });
        Self::injected(&self.fail_post_consume)?;
        self.inner.post_consume_token_quota(token_id, delta).await
    }

    async fn record_consume_log(&self, log: &ConsumeLog) -> Result<(), StoreError> {
        self.record(LedgerCall::ConsumeLog { quota: log.quota });
        Self::injected(&self.fail_bookkeeping)?;
        self.inner.record_consume_log(log).await
    }

    async fn update_user_used_quota_and_request_count(
        &self,
        user_id: UserId,
        quota: i64,
    ) -> Result<(), StoreError> {
        self.record(LedgerCall::UserUsage { user_id, quota });
        Self::injected(&self.fail_bookkeeping)?;
        self.inner
            .update_user_used_quota_and_request_count(user_id, quota)
            .await
    }

    async fn update_channel_used_quota(
        &self,
        channel_id: ChannelId,
        quota: i64,
    ) -> Result<(), StoreError> {
        self.record(LedgerCall::ChannelUsage { channel_id, quota });
        Self::injected(&self.fail_bookkeeping)?;
        self.inner.update_channel_used_quota(channel_id, quota).await
    }
}

/// Balance cache whose every call fails.
pub struct UnavailableCache;

#[async_trait]
impl BalanceCache for UnavailableCache {
    async fn get_user_quota(&self, _user_id: UserId) -> Result<i64, StoreError> {
        Err(StoreError::Database("cache unavailable".into()))
    }

    async fn decrease_user_quota(&self, _user_id: UserId, _amount: i64) -> Result<(), StoreError> {
        Err(StoreError::Database("cache unavailable".into()))
    }

    async fn refresh_user_quota(&self, _user_id: UserId) -> Result<i64, StoreError> {
        Err(StoreError::Database("cache unavailable".into()))
    }
}

/// Pricing used across the integration tests.
pub fn test_pricing() -> PricingConfig {
    PricingConfig::empty()
        .with_price(Price::tokens("cheap", 0.002, 0.002))
        .with_price(Price::tokens("gpt-4", 15.0, 30.0))
        .with_price(Price::tokens("free", 0.0, 0.0))
        .with_price(Price::times("image", 0.03))
        .with_price(Price::times("tiny", 0.0005))
        .with_group_ratio("vip", 0.5)
}

/// Configuration without the per-token offset so estimates are easy to reason about.
pub fn test_config() -> QuotaConfig {
    QuotaConfig {
        pre_consumed_quota: 0,
        ..QuotaConfig::default()
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The engine under test.
    pub engine: QuotaEngine,
    /// Authoritative records.
    pub ledger: Arc<MemoryLedger>,
    /// Recording wrapper the engine talks to.
    pub recorder: Arc<RecordingLedger>,
    /// The cache tier.
    pub cache: Arc<MemoryCache>,
}

impl TestHarness {
    /// Harness with a user holding `user_quota` and an unlimited token.
    pub async fn new(user_quota: i64) -> Self {
        let token = TokenQuota::unlimited(TOKEN, USER, "default");
        Self::with_token(user_quota, token, test_config()).await
    }

    /// Harness with a custom token and configuration.
    pub async fn with_token(user_quota: i64, token: TokenQuota, config: QuotaConfig) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.put_user(UserQuota::new(USER, user_quota)).await;
        ledger.put_token(token).await;

        let recorder = Arc::new(RecordingLedger::new(ledger.clone()));
        let cache = Arc::new(MemoryCache::new(ledger.clone()));
        let engine =
            QuotaEngine::with_pricing(test_pricing(), cache.clone(), recorder.clone(), config);

        Self {
            engine,
            ledger,
            recorder,
            cache,
        }
    }

    /// Request context for the seeded user and token.
    pub fn context(&self) -> RelayContext {
        RelayContext::new(USER, TOKEN, CHANNEL).with_token_name("default")
    }

    /// Authoritative user quota.
    pub async fn ledger_quota(&self) -> i64 {
        self.ledger.user(USER).await.unwrap().quota
    }

    /// Cached user quota.
    pub async fn cached_quota(&self) -> Option<i64> {
        self.cache.cached(USER).await
    }
}
