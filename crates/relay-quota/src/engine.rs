//! Quota engine: admission control, settlement and rollback.

use std::sync::Arc;

use relay_quota_core::{
    ConsumeLog, ConsumeLogId, GroupRatioLookup, PriceLookup, PricingConfig, QuotaError, Rates,
    Result, Usage,
};
use relay_quota_store::{BalanceCache, Ledger, StoreError};

use crate::config::QuotaConfig;
use crate::context::RelayContext;
use crate::quota::Quota;

/// Outcome of a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// True cost charged for the request.
    pub quota: i64,

    /// Adjustment applied to the ledger (`quota - pre_consumed_quota`).
    pub delta: i64,

    /// Cached balance after the refresh, if the refresh succeeded.
    pub cached_quota: Option<i64>,

    /// Milliseconds since the request started.
    pub elapsed_ms: u64,

    /// Consume-log content line.
    pub content: String,
}

/// Shared quota engine.
///
/// Cheap to clone; detached settlement and rollback tasks own a clone.
#[derive(Clone)]
pub struct QuotaEngine {
    prices: Arc<dyn PriceLookup>,
    groups: Arc<dyn GroupRatioLookup>,
    cache: Arc<dyn BalanceCache>,
    ledger: Arc<dyn Ledger>,
    config: QuotaConfig,
}

impl std::fmt::Debug for QuotaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaEngine")
            .field("prices", &"<dyn PriceLookup>")
            .field("groups", &"<dyn GroupRatioLookup>")
            .field("cache", &"<dyn BalanceCache>")
            .field("ledger", &"<dyn Ledger>")
            .field("config", &self.config)
            .finish()
    }
}

impl QuotaEngine {
    /// Create an engine from explicit lookup services and stores.
    #[must_use]
    pub fn new(
        prices: Arc<dyn PriceLookup>,
        groups: Arc<dyn GroupRatioLookup>,
        cache: Arc<dyn BalanceCache>,
        ledger: Arc<dyn Ledger>,
        config: QuotaConfig,
    ) -> Self {
        Self {
            prices,
            groups,
            cache,
            ledger,
            config,
        }
    }

    /// Create an engine whose prices and group ratios both come from `pricing`.
    #[must_use]
    pub fn with_pricing(
        pricing: PricingConfig,
        cache: Arc<dyn BalanceCache>,
        ledger: Arc<dyn Ledger>,
        config: QuotaConfig,
    ) -> Self {
        let pricing = Arc::new(pricing);
        Self::new(pricing.clone(), pricing, cache, ledger, config)
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Price the request and reserve its estimated cost.
    ///
    /// # Errors
    ///
    /// - `QuotaError::UnknownModel` if the model has no price.
    /// - `QuotaError::InsufficientBalance` if the cached or persistent balance is too low.
    /// - `QuotaError::PreConsumeRejected` if the ledger fails the reservation otherwise.
    /// - `QuotaError::Storage` if the cache cannot be read or written.
    ///
    /// On any error the request must be treated as rejected with no reservation.
    pub async fn reserve(
        &self,
        ctx: &RelayContext,
        model: &str,
        prompt_tokens: u64,
    ) -> Result<Quota> {
        let span = tracing::info_span!(
            "quota",
            user_id = %ctx.user_id,
            token_id = %ctx.token_id,
            channel_id = %ctx.channel_id,
            model = %model,
        );

        let rates = Rates::resolve(self.prices.as_ref(), self.groups.as_ref(), model, &ctx.group)?;
        let pre_consumed_quota = rates.estimate(prompt_tokens, self.config.pre_consumed_quota);

        let mut quota = Quota {
            model_name: model.to_string(),
            prompt_tokens,
            rates,
            pre_consumed_quota,
            user_id: ctx.user_id,
            channel_id: ctx.channel_id,
            token_id: ctx.token_id,
            token_name: ctx.token_name.clone(),
            started_at: ctx.started_at,
            reserved: false,
            span,
        };

        self.pre_consume(&mut quota).await?;
        Ok(quota)
    }

    /// Admission control against the cached balance, then the ledger.
    async fn pre_consume(&self, quota: &mut Quota) -> Result<()> {
        if quota.pre_consumed_quota == 0 {
            return Ok(());
        }

        let user_quota = self
            .cache
            .get_user_quota(quota.user_id)
            .await
            .map_err(|e| QuotaError::Storage(format!("failed to read user quota: {e}")))?;

        if user_quota < quota.pre_consumed_quota {
            return Err(QuotaError::InsufficientBalance {
                balance: user_quota,
                required: quota.pre_consumed_quota,
            });
        }

        // A lost race against a concurrent request surfaces as InsufficientBalance.
        self.cache
            .decrease_user_quota(quota.user_id, quota.pre_consumed_quota)
            .await?;

        // Checked after the provisional deduction; the next settlement's refresh
        // reconciles the cache either way.
        if user_quota > self.config.trust_multiplier.saturating_mul(quota.pre_consumed_quota) {
            tracing::debug!(
                parent: &quota.span,
                user_quota = %user_quota,
                estimate = %quota.pre_consumed_quota,
                "User has ample quota, skipping token pre-consume"
            );
            quota.pre_consumed_quota = 0;
        }

        if quota.pre_consumed_quota > 0 {
            self.ledger
                .pre_consume_token_quota(quota.token_id, quota.pre_consumed_quota)
                .await
                .map_err(|e| match e {
                    StoreError::InsufficientQuota { balance, required } => {
                        QuotaError::InsufficientBalance { balance, required }
                    }
                    other => QuotaError::PreConsumeRejected(other.to_string()),
                })?;
            quota.reserved = true;
        }

        Ok(())
    }

    /// Compute the true cost of a finished request and net it against the reservation.
    ///
    /// Only the ledger adjustment is fatal. The cache refresh, consume log and
    /// usage aggregates are best effort: their failures are logged and never undo
    /// or repeat the adjustment.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Settlement` if the ledger adjustment fails.
    pub async fn settle(&self, quota: &Quota, usage: Usage) -> Result<Settlement> {
        let cost = quota.rates.cost(&usage);
        let delta = cost - quota.pre_consumed_quota;

        self.ledger
            .post_consume_token_quota(quota.token_id, delta)
            .await
            .map_err(|e| QuotaError::Settlement {
                stage: "ledger_delta",
                message: e.to_string(),
            })?;

        let cached_quota = match self.cache.refresh_user_quota(quota.user_id).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh cached user quota");
                None
            }
        };

        let elapsed_ms = u64::try_from(quota.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        let content = quota.rates.log_content(self.config.dollar_rate);

        if self.config.log_consume_enabled {
            let log = ConsumeLog {
                id: ConsumeLogId::generate(),
                user_id: quota.user_id,
                channel_id: quota.channel_id,
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                model_name: quota.model_name.clone(),
                token_name: quota.token_name.clone(),
                quota: cost,
                content: content.clone(),
                elapsed_ms,
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = self.ledger.record_consume_log(&log).await {
                tracing::warn!(error = %e, "Failed to record consume log");
            }
        }

        if let Err(e) = self
            .ledger
            .update_user_used_quota_and_request_count(quota.user_id, cost)
            .await
        {
            tracing::warn!(error = %e, "Failed to update user used quota");
        }

        if let Err(e) = self
            .ledger
            .update_channel_used_quota(quota.channel_id, cost)
            .await
        {
            tracing::warn!(error = %e, "Failed to update channel used quota");
        }

        tracing::info!(
            quota = %cost,
            delta = %delta,
            prompt_tokens = %usage.prompt_tokens,
            completion_tokens = %usage.completion_tokens,
            elapsed_ms = %elapsed_ms,
            "Quota settled"
        );

        Ok(Settlement {
            quota: cost,
            delta,
            cached_quota,
            elapsed_ms,
            content,
        })
    }

    /// Return exactly the pre-consumed amount to the ledger.
    ///
    /// A reservation that never reached the ledger is left alone. With
    /// `refresh_cache_on_undo`, the cached balance is also reloaded, whether or
    /// not the refund succeeded.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Storage` if the ledger refund fails.
    pub async fn rollback(&self, quota: &Quota) -> Result<()> {
        let refund = if quota.reserved {
            self.ledger
                .post_consume_token_quota(quota.token_id, -quota.pre_consumed_quota)
                .await
        } else {
            Ok(())
        };

        if quota.reserved && refund.is_ok() {
            tracing::debug!(amount = %quota.pre_consumed_quota, "Returned pre-consumed quota");
        }

        // Refresh regardless of the refund outcome.
        if self.config.refresh_cache_on_undo {
            if let Err(e) = self.cache.refresh_user_quota(quota.user_id).await {
                tracing::warn!(error = %e, "Failed to refresh cached user quota");
            }
        }

        refund.map_err(QuotaError::from)
    }
}
